//! Centralized configuration for admin-api.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use cloudflare_kv::StorageProvider;
use std::env;
use std::fmt;
use std::path::PathBuf;

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

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    /// CORS allowed origin; `*` means any origin without credentials
    pub cors_allowed_origin: HeaderValue,
    /// CSV cache location (default: ./url-mappings.csv)
    pub csv_cache_path: PathBuf,
    pub storage_provider: StorageProvider,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

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
            None => 3001,
        };

        let origin = get("CORS_ALLOWED_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allowed_origin = if origin == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(origin.trim()).map_err(|e| ConfigError {
                field: "CORS_ALLOWED_ORIGIN",
                message: format!("Invalid header value '{}': {}", origin, e),
            })?
        };

        let csv_cache_path = PathBuf::from(
            get("CSV_CACHE_PATH").unwrap_or_else(|| "./url-mappings.csv".into()),
        );

        let storage_provider = get("STORAGE_PROVIDER")
            .unwrap_or_else(|| "cloudflare".into())
            .parse::<StorageProvider>()
            .map_err(|e| ConfigError {
                field: "STORAGE_PROVIDER",
                message: e.to_string(),
            })?;

        let log_format =
            LogFormat::from_str(&get("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        Ok(Self {
            port,
            cors_allowed_origin,
            csv_cache_path,
            storage_provider,
            log_format,
        })
    }

    pub fn warn_if_insecure(&self) {
        tracing::warn!(
            "admin-api performs no authentication; expose it only behind an access proxy"
        );
        if self.cors_allowed_origin == HeaderValue::from_static("*") {
            tracing::warn!("CORS_ALLOWED_ORIGIN=*: any origin may call the API");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = cfg(&[]).unwrap();
        assert_eq!(c.port, 3001);
        assert_eq!(c.cors_allowed_origin, HeaderValue::from_static("*"));
        assert_eq!(c.csv_cache_path, PathBuf::from("./url-mappings.csv"));
        assert_eq!(c.storage_provider, StorageProvider::Cloudflare);
        assert_eq!(c.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides() {
        let c = cfg(&[
            ("PORT", "4000"),
            ("CORS_ALLOWED_ORIGIN", "https://admin.example"),
            ("CSV_CACHE_PATH", "/tmp/m.csv"),
            ("STORAGE_PROVIDER", "memory"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(c.port, 4000);
        assert_eq!(c.cors_allowed_origin, "https://admin.example");
        assert_eq!(c.csv_cache_path, PathBuf::from("/tmp/m.csv"));
        assert_eq!(c.storage_provider, StorageProvider::Memory);
        assert_eq!(c.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_values_fail_fast() {
        assert_eq!(cfg(&[("PORT", "x")]).unwrap_err().field, "PORT");
        assert_eq!(
            cfg(&[("CORS_ALLOWED_ORIGIN", "bad\nvalue")]).unwrap_err().field,
            "CORS_ALLOWED_ORIGIN"
        );
        assert_eq!(
            cfg(&[("STORAGE_PROVIDER", "dynamo")]).unwrap_err().field,
            "STORAGE_PROVIDER"
        );
    }
}
