//! Shared HTTP utilities for the short-link workspace.
//!
//! Framework-agnostic pieces used by redirect-server and admin-api: the JSON
//! envelope the admin UI expects, error-to-status mapping, and request
//! metadata extraction from headers.

use std::net::IpAddr;

use domain::CoreError;
use http::{HeaderMap, StatusCode, Uri};

// ============================================================================
// JSON envelopes
// ============================================================================

/// `{"success": true, "data": <data>}`
pub fn json_success(data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({"success": true, "data": data})
}

/// `{"success": true}`
pub fn json_ok() -> serde_json::Value {
    serde_json::json!({"success": true})
}

/// `{"success": false, "error": "<message>"}`
pub fn json_failure(message: &str) -> serde_json::Value {
    serde_json::json!({"success": false, "error": message})
}

/// HTTP status for a domain error on the management API.
pub fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::InvalidUrl(_) | CoreError::InvalidShortCode(_) => StatusCode::BAD_REQUEST,
        CoreError::AlreadyExists => StatusCode::CONFLICT,
        CoreError::NotFound => StatusCode::NOT_FOUND,
        CoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Client-facing message for a domain error. Store details stay in the logs.
pub fn public_message(err: &CoreError) -> String {
    match err {
        CoreError::InvalidUrl(_) => {
            "Invalid URL provided. Must start with http:// or https://".to_string()
        }
        CoreError::InvalidShortCode(msg) => format!("Invalid short code: {}", msg),
        CoreError::AlreadyExists => "Custom short code already in use".to_string(),
        CoreError::NotFound => "Short code not found".to_string(),
        CoreError::Store(_) => "Internal Server Error".to_string(),
    }
}

// ============================================================================
// Request metadata
// ============================================================================

/// What the redirect handler knows about the requester.
///
/// Missing headers become empty strings, except geo hints which stay `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub client_ip: String,
    pub user_agent: String,
    pub referrer: String,
    pub hostname: String,
    pub page_location: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
}

impl RequestMeta {
    /// Extract metadata from request headers, the request URI and the peer
    /// address of the connection (if known).
    pub fn from_request_parts(headers: &HeaderMap, uri: &Uri, peer: Option<IpAddr>) -> Self {
        let hostname = header_str(headers, "host")
            .map(str::to_string)
            .or_else(|| uri.host().map(str::to_string))
            .unwrap_or_default();
        let scheme = header_str(headers, "x-forwarded-proto")
            .map(str::to_string)
            .or_else(|| uri.scheme_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());
        let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        let page_location = if hostname.is_empty() {
            path_and_query.to_string()
        } else {
            format!("{}://{}{}", scheme, hostname, path_and_query)
        };

        Self {
            client_ip: client_ip(headers, peer).unwrap_or_default(),
            user_agent: header_str(headers, "user-agent").unwrap_or("").to_string(),
            referrer: header_str(headers, "referer").unwrap_or("").to_string(),
            hostname,
            page_location,
            country: non_empty_header(headers, "cf-ipcountry"),
            city: non_empty_header(headers, "cf-ipcity"),
            region: non_empty_header(headers, "cf-region"),
        }
    }
}

/// Requester IP, in order of preference: `CF-Connecting-IP`, the first
/// `X-Forwarded-For` entry, `X-Real-IP`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<String> {
    if let Some(ip) = non_empty_header(headers, "cf-connecting-ip") {
        return Some(ip);
    }
    if let Some(xff) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = xff.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return Some(first.to_string());
        }
    }
    if let Some(ip) = non_empty_header(headers, "x-real-ip") {
        return Some(ip);
    }
    peer.map(|p| p.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn non_empty_header(headers: &HeaderMap, name: &str) -> Option<String> {
    header_str(headers, name)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
