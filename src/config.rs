//! Capture configuration
//!
//! Everything the handler needs from its environment lives in
//! [`CaptureConfig`]: where the browser binary is, how big the viewport is,
//! which visualization bundle and tile server to use, how long to wait for
//! the globe to finish rendering and how to encode the screenshot.
//!
//! Configuration is built from a preset ([`CaptureConfig::jpeg`] or
//! [`CaptureConfig::png`]) and optionally overridden from `GLOBESHOT_*`
//! environment variables with [`CaptureConfig::from_env`].

use crate::request::RenderRequest;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SCRIPT_SOURCE_URL: &str = "https://unpkg.com/deck.gl@latest/dist.min.js";
pub const DEFAULT_TILE_SERVER_URL_TEMPLATE: &str = "https://c.tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Chrome flags needed to get WebGL out of a GPU-less serverless sandbox.
const DEFAULT_BROWSER_ARGS: &[&str] = &[
    "--use-gl=swiftshader",
    "--enable-webgl",
    "--ignore-gpu-blocklist",
    "--single-process",
    "--no-zygote",
    "--disable-dev-shm-usage",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl FromStr for Viewport {
    type Err = Error;

    /// Parses `WIDTHxHEIGHT`, e.g. `1920x1080`
    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| Error::ConfigError(format!("viewport '{}' is not WIDTHxHEIGHT", s)))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| Error::ConfigError(format!("viewport '{}': {}", s, e)))
        };
        Ok(Viewport {
            width: parse(w)?,
            height: parse(h)?,
        })
    }
}

/// Screenshot encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            other => Err(Error::ConfigError(format!("unsupported image format '{}'", other))),
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageFormat::Jpeg => f.write_str("jpeg"),
            ImageFormat::Png => f.write_str("png"),
        }
    }
}

/// Configuration for the render-and-capture handler
///
/// The defaults reproduce the JPEG variant of the handler: a 1920x1080
/// viewport, deck.gl from unpkg, OpenStreetMap tiles, a globe resolution of
/// 10 and quality-70 JPEG output centered on London.
///
/// # Examples
///
/// ```
/// let cfg = globeshot::CaptureConfig::default();
/// assert_eq!(cfg.viewport.width, 1920);
/// assert_eq!(cfg.image_format.mime_type(), "image/jpeg");
/// ```
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Chrome/Chromium binary; `None` lets the automation client locate one
    pub browser_executable_path: Option<PathBuf>,
    /// Extra command line flags passed to the browser
    pub browser_args: Vec<String>,
    /// Whether to keep Chrome's sandbox enabled
    pub sandbox: bool,
    /// Rendering surface dimensions
    pub viewport: Viewport,
    /// URL of the visualization library bundle injected into the page
    pub script_source_url: String,
    /// Raster tile URL template with `{z}`, `{x}` and `{y}` placeholders
    pub tile_server_url_template: String,
    /// Maximum time to wait for the globe to report that it finished rendering
    pub render_timeout_ms: u64,
    /// Interval between completion checks
    pub poll_interval_ms: u64,
    /// Capture whatever is on screen when the render wait times out instead of failing
    pub capture_on_timeout: bool,
    /// Upper bound on any single automation command
    pub command_timeout_ms: u64,
    /// Screenshot encoding
    pub image_format: ImageFormat,
    /// JPEG quality (0-100); ignored for PNG
    pub image_quality: Option<u32>,
    /// Globe tessellation density
    pub globe_resolution: u32,
    /// Viewpoint used for missing or malformed query parameters
    pub defaults: RenderRequest,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            browser_executable_path: None,
            browser_args: DEFAULT_BROWSER_ARGS.iter().map(|s| s.to_string()).collect(),
            sandbox: false,
            viewport: Viewport::default(),
            script_source_url: DEFAULT_SCRIPT_SOURCE_URL.to_string(),
            tile_server_url_template: DEFAULT_TILE_SERVER_URL_TEMPLATE.to_string(),
            render_timeout_ms: 12000,
            poll_interval_ms: 100,
            capture_on_timeout: true,
            command_timeout_ms: 30000,
            image_format: ImageFormat::Jpeg,
            image_quality: Some(70),
            globe_resolution: 10,
            defaults: RenderRequest::default(),
        }
    }
}

impl CaptureConfig {
    /// Quality-70 JPEG capture at globe resolution 10
    pub fn jpeg() -> Self {
        Self::default()
    }

    /// Lossless PNG capture at globe resolution 7
    pub fn png() -> Self {
        Self {
            image_format: ImageFormat::Png,
            image_quality: None,
            globe_resolution: 7,
            ..Self::default()
        }
    }

    /// Start from the JPEG preset and apply `GLOBESHOT_*` environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unset keys keep the
    /// current value; `GLOBESHOT_PRESET=png` swaps the base preset first.
    pub fn with_overrides<F>(self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut cfg = match get("GLOBESHOT_PRESET").as_deref() {
            None => self,
            Some("jpeg") | Some("jpg") => Self::jpeg(),
            Some("png") => Self::png(),
            Some(other) => return Err(Error::ConfigError(format!("unknown preset '{}'", other))),
        };

        if let Some(path) = get("GLOBESHOT_BROWSER_PATH") {
            cfg.browser_executable_path = Some(PathBuf::from(path));
        }
        if let Some(args) = get("GLOBESHOT_BROWSER_ARGS") {
            cfg.browser_args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = get("GLOBESHOT_SANDBOX") {
            cfg.sandbox = parse_bool("GLOBESHOT_SANDBOX", &v)?;
        }
        if let Some(v) = get("GLOBESHOT_VIEWPORT") {
            cfg.viewport = v.parse()?;
        }
        if let Some(v) = get("GLOBESHOT_SCRIPT_URL") {
            cfg.script_source_url = v;
        }
        if let Some(v) = get("GLOBESHOT_TILE_URL") {
            cfg.tile_server_url_template = v;
        }
        if let Some(v) = get("GLOBESHOT_RENDER_TIMEOUT_MS") {
            cfg.render_timeout_ms = parse_num("GLOBESHOT_RENDER_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("GLOBESHOT_POLL_INTERVAL_MS") {
            cfg.poll_interval_ms = parse_num("GLOBESHOT_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("GLOBESHOT_CAPTURE_ON_TIMEOUT") {
            cfg.capture_on_timeout = parse_bool("GLOBESHOT_CAPTURE_ON_TIMEOUT", &v)?;
        }
        if let Some(v) = get("GLOBESHOT_COMMAND_TIMEOUT_MS") {
            cfg.command_timeout_ms = parse_num("GLOBESHOT_COMMAND_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("GLOBESHOT_IMAGE_FORMAT") {
            cfg.image_format = v.parse()?;
            if cfg.image_format == ImageFormat::Png {
                cfg.image_quality = None;
            }
        }
        if let Some(v) = get("GLOBESHOT_IMAGE_QUALITY") {
            cfg.image_quality = Some(parse_num("GLOBESHOT_IMAGE_QUALITY", &v)?);
        }
        if let Some(v) = get("GLOBESHOT_GLOBE_RESOLUTION") {
            cfg.globe_resolution = parse_num("GLOBESHOT_GLOBE_RESOLUTION", &v)?;
        }
        if let Some(v) = get("GLOBESHOT_DEFAULT_LATITUDE") {
            cfg.defaults.latitude = parse_num("GLOBESHOT_DEFAULT_LATITUDE", &v)?;
        }
        if let Some(v) = get("GLOBESHOT_DEFAULT_LONGITUDE") {
            cfg.defaults.longitude = parse_num("GLOBESHOT_DEFAULT_LONGITUDE", &v)?;
        }
        if let Some(v) = get("GLOBESHOT_DEFAULT_ZOOM") {
            cfg.defaults.zoom = parse_num("GLOBESHOT_DEFAULT_ZOOM", &v)?;
        }

        Ok(cfg)
    }

    /// Reject configurations that cannot possibly produce a screenshot.
    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::ConfigError(format!(
                "viewport must be non-empty, got {}x{}",
                self.viewport.width, self.viewport.height
            )));
        }
        if self.globe_resolution == 0 {
            return Err(Error::ConfigError("globe resolution must be positive".into()));
        }
        if let Some(q) = self.image_quality {
            if q > 100 {
                return Err(Error::ConfigError(format!("image quality {} is above 100", q)));
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::ConfigError("poll interval must be positive".into()));
        }
        if self.command_timeout_ms == 0 {
            return Err(Error::ConfigError("command timeout must be positive".into()));
        }

        url::Url::parse(&self.script_source_url)
            .map_err(|e| Error::ConfigError(format!("script source url '{}': {}", self.script_source_url, e)))?;

        for placeholder in ["{z}", "{x}", "{y}"] {
            if !self.tile_server_url_template.contains(placeholder) {
                return Err(Error::ConfigError(format!(
                    "tile url template '{}' is missing {}",
                    self.tile_server_url_template, placeholder
                )));
            }
        }
        let sample = self
            .tile_server_url_template
            .replace("{z}", "0")
            .replace("{x}", "0")
            .replace("{y}", "0");
        url::Url::parse(&sample)
            .map_err(|e| Error::ConfigError(format!("tile url template '{}': {}", self.tile_server_url_template, e)))?;

        Ok(())
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Quality actually sent with the capture request (JPEG only)
    pub fn effective_quality(&self) -> Option<u32> {
        match self.image_format {
            ImageFormat::Jpeg => self.image_quality,
            ImageFormat::Png => None,
        }
    }
}

fn parse_num<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| Error::ConfigError(format!("{}='{}': {}", key, raw, e)))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::ConfigError(format!("{}='{}' is not a boolean", key, raw))),
    }
}
