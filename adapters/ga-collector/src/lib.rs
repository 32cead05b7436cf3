//! ga-collector: one analytics event per redirect, sent to the GA4
//! Measurement Protocol.
//!
//! Delivery is best effort and at most once. Nothing here is retried or
//! queued, and [`Collector::report`] never returns an error; callers spawn it
//! and forget about it. Missing credentials turn dispatch into a logged
//! no-op.

use std::sync::Arc;
use std::time::Duration;

use domain::UtmParams;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

pub const DEFAULT_COLLECTOR_URL: &str = "https://www.google-analytics.com/mp/collect";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const EVENT_NAME: &str = "short_link_click";

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("failed to build http client")]
    Client(#[source] reqwest::Error),
    #[error("collector request timed out")]
    Timeout,
    #[error(transparent)]
    Request(reqwest::Error),
    #[error("collector returned status {0}")]
    Status(u16),
}

impl From<reqwest::Error> for CollectorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CollectorError::Timeout
        } else {
            CollectorError::Request(e)
        }
    }
}

/// Where and how to send events.
#[derive(Clone, Debug)]
pub struct CollectorConfig {
    pub measurement_id: Option<String>,
    pub api_secret: Option<String>,
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            measurement_id: None,
            api_secret: None,
            endpoint: DEFAULT_COLLECTOR_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl CollectorConfig {
    /// Both credentials, or `None` if either is missing or blank.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let id = self.measurement_id.as_deref().filter(|s| !s.trim().is_empty())?;
        let secret = self.api_secret.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((id, secret))
    }
}

/// Geo hints supplied by the edge in front of the server, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeoHints {
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
}

/// Everything known about one successful redirect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClickEvent {
    pub short_code: String,
    pub destination_url: String,
    pub utm: UtmParams,
    pub ip: String,
    pub user_agent: String,
    pub referrer: String,
    pub hostname: String,
    pub page_location: String,
    pub geo: GeoHints,
}

/// Pseudo-anonymous client id: lowercase hex SHA-256 of IP followed by UA.
pub fn client_id(ip: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(user_agent.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Measurement Protocol body for one click.
///
/// Optional params are left out entirely when absent or empty.
pub fn build_payload(event: &ClickEvent, timestamp_micros: i64) -> Value {
    let mut params = Map::new();
    params.insert("page_location".into(), json!(event.page_location));
    params.insert("page_referrer".into(), json!(event.referrer));
    params.insert("short_code".into(), json!(event.short_code));
    params.insert("destination_url".into(), json!(event.destination_url));
    params.insert("hostname".into(), json!(event.hostname));

    let optional = [
        ("source", &event.utm.source),
        ("medium", &event.utm.medium),
        ("campaign", &event.utm.campaign),
        ("country", &event.geo.country),
        ("city", &event.geo.city),
        ("region", &event.geo.region),
    ];
    for (key, value) in optional {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            params.insert(key.into(), json!(v));
        }
    }

    json!({
        "client_id": client_id(&event.ip, &event.user_agent),
        "timestamp_micros": timestamp_micros,
        "events": [{ "name": EVENT_NAME, "params": params }],
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Sent,
    /// Credentials are not configured.
    Skipped,
}

/// Measurement Protocol client. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Collector {
    client: reqwest::Client,
    config: Arc<CollectorConfig>,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Result<Self, CollectorError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(CollectorError::Client)?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.credentials().is_some()
    }

    /// Send one event and report what happened.
    pub async fn send(&self, event: &ClickEvent) -> Result<Dispatch, CollectorError> {
        let Some((measurement_id, api_secret)) = self.config.credentials() else {
            return Ok(Dispatch::Skipped);
        };
        let body = build_payload(event, chrono::Utc::now().timestamp_micros());
        let resp = self
            .client
            .post(&self.config.endpoint)
            .query(&[("measurement_id", measurement_id), ("api_secret", api_secret)])
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CollectorError::Status(status.as_u16()));
        }
        Ok(Dispatch::Sent)
    }

    /// Fire-and-forget entry point: sends the event and logs the outcome.
    pub async fn report(&self, event: ClickEvent) {
        match self.send(&event).await {
            Ok(Dispatch::Sent) => {
                info!(code = %event.short_code, "analytics event sent");
            }
            Ok(Dispatch::Skipped) => {
                debug!(code = %event.short_code, "analytics credentials not configured; skipping");
            }
            Err(e) => {
                warn!(code = %event.short_code, error = %e, "analytics dispatch failed");
            }
        }
    }
}
