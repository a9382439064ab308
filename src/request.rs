//! Geographic viewpoint requests parsed from invocation query parameters

use std::collections::HashMap;

/// Query parameter carrying the latitude of the view center
pub const LATITUDE_PARAM: &str = "latitude";
/// Query parameter carrying the longitude of the view center
pub const LONGITUDE_PARAM: &str = "longitude";
/// Query parameter carrying the zoom level
pub const ZOOM_PARAM: &str = "zoom";

/// The viewpoint a single invocation renders.
///
/// Values are never clamped here: out-of-range coordinates or zoom levels
/// are handed to the visualization library as-is, which applies its own
/// `minZoom`/`maxZoom` bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
}

impl Default for RenderRequest {
    /// London, UK (51.12 N, 0.13) at zoom 5
    fn default() -> Self {
        Self {
            latitude: 51.12,
            longitude: 0.13,
            zoom: 5.0,
        }
    }
}

impl RenderRequest {
    /// Build a request from raw query parameters, substituting the matching
    /// field of `defaults` for every parameter that is missing or does not
    /// parse as a finite number.
    pub fn from_query(params: Option<&HashMap<String, String>>, defaults: &RenderRequest) -> Self {
        let lookup = |key: &str| params.and_then(|p| p.get(key)).map(String::as_str);
        Self {
            latitude: parse_param(lookup(LATITUDE_PARAM)).unwrap_or(defaults.latitude),
            longitude: parse_param(lookup(LONGITUDE_PARAM)).unwrap_or(defaults.longitude),
            zoom: parse_param(lookup(ZOOM_PARAM)).unwrap_or(defaults.zoom),
        }
    }
}

/// Parse a single string-encoded number from its longest leading numeric
/// prefix, so `"12abc"` reads as 12 and `"1,5"` as 1. Leading whitespace is
/// skipped. NaN and infinities count as non-numeric.
pub fn parse_param(raw: Option<&str>) -> Option<f64> {
    raw.map(|s| numeric_prefix(s.trim_start()))
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// `[sign] digits [. digits] [e [sign] digits]`, with at least one mantissa
/// digit. An exponent marker without digits is not part of the prefix.
fn numeric_prefix(s: &str) -> &str {
    let b = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = if matches!(b.first(), Some(b'+' | b'-')) { 1 } else { 0 };
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;

    if b.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - (end + 1);
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return "";
    }

    if matches!(b.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(b.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }

    &s[..end]
}
