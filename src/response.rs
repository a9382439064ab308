//! API Gateway proxy event and response shapes

use crate::{Error, RenderResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The parts of an API Gateway proxy event the handler reads.
///
/// API Gateway sends `"queryStringParameters": null` when the URL has no
/// query string, so the map is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEvent {
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
}

impl ProxyEvent {
    pub fn with_query<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            query_string_parameters: Some(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }
}

/// Proxy integration response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub is_base64_encoded: bool,
    pub body: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ProxyResponse {
    /// 200 with the base64-encoded image
    pub fn image(result: &RenderResult) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), result.mime_type().to_string());
        Self {
            status_code: 200,
            headers,
            is_base64_encoded: true,
            body: result.to_base64(),
        }
    }

    /// JSON error response with a status derived from the error kind
    pub fn error(err: &Error) -> Self {
        let kind = err.kind();
        let body = ErrorBody {
            error: kind.as_str(),
            message: err.to_string(),
        };
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            status_code: kind.status_code(),
            headers,
            is_base64_encoded: false,
            body: serde_json::to_string(&body)
                .unwrap_or_else(|_| format!("{{\"error\":\"{}\"}}", kind.as_str())),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type").map(String::as_str)
    }
}
