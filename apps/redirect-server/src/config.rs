//! Centralized configuration for redirect-server.
//!
//! Everything is read once at startup and validated so a bad value stops the
//! process before it binds a port. Handlers never look at the environment.

use std::env;
use std::fmt;
use std::time::Duration;

use cloudflare_kv::StorageProvider;
use ga_collector::{CollectorConfig, DEFAULT_COLLECTOR_URL};

pub const DEFAULT_ROOT_REDIRECT_URL: &str = "https://racket.gr";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    /// Listen port (default: 8787)
    pub port: u16,
    /// Landing page for `/` and unknown codes, already normalized
    pub root_redirect_url: String,
    pub storage_provider: StorageProvider,
    pub log_format: LogFormat,
    pub collector: CollectorConfig,
    /// How long shutdown waits for in-flight analytics
    pub shutdown_grace: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(p) => p.trim().parse().map_err(|_| ConfigError {
                field: "PORT",
                message: format!("not a valid port: '{}'", p),
            })?,
            None => 8787,
        };

        let root_raw = get("ROOT_REDIRECT_URL").unwrap_or_else(|| DEFAULT_ROOT_REDIRECT_URL.into());
        let root_redirect_url = normalize_url(root_raw.trim()).map_err(|e| ConfigError {
            field: "ROOT_REDIRECT_URL",
            message: format!("not an absolute URL '{}': {}", root_raw, e),
        })?;

        let storage_provider = get("STORAGE_PROVIDER")
            .unwrap_or_else(|| "cloudflare".into())
            .parse::<StorageProvider>()
            .map_err(|e| ConfigError {
                field: "STORAGE_PROVIDER",
                message: e.to_string(),
            })?;

        let log_format = LogFormat::from_str(&get("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        let timeout_ms = parse_u64(get("ANALYTICS_TIMEOUT_MS"), "ANALYTICS_TIMEOUT_MS", 5000)?;
        let collector = CollectorConfig {
            measurement_id: get("GA_MEASUREMENT_ID"),
            api_secret: get("GA_API_SECRET"),
            endpoint: get("GA_COLLECTOR_URL").unwrap_or_else(|| DEFAULT_COLLECTOR_URL.into()),
            timeout: Duration::from_millis(timeout_ms),
        };

        let grace_secs = parse_u64(get("SHUTDOWN_GRACE_SECS"), "SHUTDOWN_GRACE_SECS", 10)?;

        Ok(Self {
            port,
            root_redirect_url,
            storage_provider,
            log_format,
            collector,
            shutdown_grace: Duration::from_secs(grace_secs),
        })
    }

    pub fn warn_if_incomplete(&self) {
        if self.collector.credentials().is_none() {
            tracing::warn!(
                "GA_MEASUREMENT_ID or GA_API_SECRET not set: click analytics are disabled"
            );
        }
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!("STORAGE_PROVIDER=memory: mappings are empty and lost on restart");
        }
    }
}

fn parse_u64(raw: Option<String>, field: &'static str, default: u64) -> Result<u64, ConfigError> {
    match raw {
        Some(v) => v.trim().parse().map_err(|_| ConfigError {
            field,
            message: format!("expected a non-negative integer, got '{}'", v),
        }),
        None => Ok(default),
    }
}

/// Serialize a URL the way it will appear in a `Location` header, e.g. a
/// bare host gains its trailing slash.
pub fn normalize_url(raw: &str) -> Result<String, url::ParseError> {
    url::Url::parse(raw).map(|u| u.to_string())
}
