//! Domain library for the short-link redirect service.
//!
//! Holds the domain types, the key-value store port, the stored-value codec,
//! and error definitions. Dependencies are limited to serde/serde_json (the
//! stored value is JSON-or-plain) and rand (code generation). Keep adapters
//! and network IO out of this crate.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;

use serde::{Deserialize, Serialize};

/// A short code as accepted by the management surfaces.
///
/// The redirect path does not use this type: the resolver treats the path
/// segment as an opaque key and never rejects it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortCode(String);

impl ShortCode {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        if val.is_empty() {
            return Err(CoreError::InvalidShortCode("empty".into()));
        }
        if !val
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidShortCode(
                "only letters, numbers, hyphens, and underscores are allowed".into(),
            ));
        }
        Ok(Self(val))
    }

    /// Wrap a code produced by a generator whose alphabet is already valid.
    pub(crate) fn from_generated(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ShortCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Campaign-tracking fields stored next to a destination URL.
///
/// These never change the redirect target; they are forwarded to analytics
/// only. An empty string in storage is treated as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UtmParams {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
}

impl UtmParams {
    pub fn new(
        source: Option<String>,
        medium: Option<String>,
        campaign: Option<String>,
    ) -> Self {
        fn non_empty(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        Self {
            source: non_empty(source),
            medium: non_empty(medium),
            campaign: non_empty(campaign),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.medium.is_none() && self.campaign.is_none()
    }
}

/// A short code with its decoded value, as shown by the admin surfaces.
///
/// Field names follow the JSON the admin UI has always consumed, hence the
/// mixed `shortCode` / `utm_source` casing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(rename = "shortCode")]
    pub short_code: String,
    #[serde(rename = "longUrl")]
    pub long_url: String,
    #[serde(default)]
    pub utm_source: String,
    #[serde(default)]
    pub utm_medium: String,
    #[serde(default)]
    pub utm_campaign: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Input for creating or overwriting a mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewMapping {
    pub long_url: String,
    pub custom_code: Option<ShortCode>,
    pub utm: UtmParams,
    pub tags: Vec<String>,
}

/// Key-value store port.
///
/// Mirrors the managed store the service runs against: single-key reads and
/// writes, a key listing, last write wins. `get` returning `Ok(None)` is the
/// normal "no mapping" answer and not an error.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, CoreError>> + Send;
    fn put(&self, key: &str, value: &str) -> impl Future<Output = Result<(), CoreError>> + Send;
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), CoreError>> + Send;
    fn list(&self) -> impl Future<Output = Result<Vec<String>, CoreError>> + Send;
}

/// Short code generator for mappings created without a custom code.
pub trait CodeGenerator: Send + Sync {
    fn next_code(&self) -> ShortCode;
}

/// Core domain errors.
#[derive(Debug)]
pub enum CoreError {
    InvalidUrl(String),
    InvalidShortCode(String),
    AlreadyExists,
    NotFound,
    Store(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidUrl(msg) => write!(f, "invalid url: {}", msg),
            CoreError::InvalidShortCode(msg) => write!(f, "invalid short code: {}", msg),
            CoreError::AlreadyExists => write!(f, "short code already exists"),
            CoreError::NotFound => write!(f, "not found"),
            CoreError::Store(msg) => write!(f, "store error: {}", msg),
        }
    }
}

impl Error for CoreError {}

/// Return a short about/version line for binaries to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{}", pkg, ver)
}

pub mod adapters;
pub mod code;
pub mod resolver;
pub mod service;
pub mod validate;
pub mod value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_code_accepts_simple_values() {
        let c = ShortCode::new("abc-123_X").expect("valid code");
        assert_eq!(c.as_str(), "abc-123_X");
    }

    #[test]
    fn short_code_rejects_empty_and_slashes() {
        assert!(matches!(
            ShortCode::new(""),
            Err(CoreError::InvalidShortCode(_))
        ));
        assert!(matches!(
            ShortCode::new("a/b"),
            Err(CoreError::InvalidShortCode(_))
        ));
    }

    #[test]
    fn utm_params_drop_blank_fields() {
        let utm = UtmParams::new(Some("news".into()), Some("  ".into()), None);
        assert_eq!(utm.source.as_deref(), Some("news"));
        assert!(utm.medium.is_none());
        assert!(!utm.is_empty());
        assert!(UtmParams::new(Some(String::new()), None, None).is_empty());
    }

    #[test]
    fn mapping_uses_admin_field_names() {
        let m = Mapping {
            short_code: "foo".into(),
            long_url: "https://example.com".into(),
            utm_source: "news".into(),
            ..Default::default()
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["shortCode"], "foo");
        assert_eq!(v["longUrl"], "https://example.com");
        assert_eq!(v["utm_source"], "news");
        assert_eq!(v["tags"], serde_json::json!([]));
    }
}
