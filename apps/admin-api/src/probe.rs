//! Reachability check behind `GET /api/validate-url`.
//!
//! Sends a HEAD request and turns the outcome into a message for the admin
//! UI. Never fails: every error becomes `isValid: false` with a hint.

use std::error::Error as _;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const MSG_TIMEOUT: &str = "URL validation timed out. The server took too long to respond.";
const MSG_DNS: &str = "The domain name could not be resolved. Please check for typos.";
const MSG_REFUSED: &str =
    "The connection was refused. The server might be down or the URL is incorrect.";
const MSG_GENERIC: &str = "Could not reach URL. Please check the address and try again.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    #[serde(rename = "isValid")]
    pub is_valid: bool,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct UrlProbe {
    client: reqwest::Client,
}

impl UrlProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub async fn check(&self, url: &str) -> ProbeResult {
        match self.client.head(url).send().await {
            Ok(resp) if resp.status().is_success() => ProbeResult {
                is_valid: true,
                message: format!("URL is reachable (Status: {})", resp.status().as_u16()),
            },
            Ok(resp) => ProbeResult {
                is_valid: false,
                message: format!("URL returned an error status: {}", resp.status().as_u16()),
            },
            Err(e) => {
                debug!(url = %url, error = %e, "url probe failed");
                ProbeResult {
                    is_valid: false,
                    message: classify(&e).to_string(),
                }
            }
        }
    }
}

fn classify(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        return MSG_TIMEOUT;
    }
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return MSG_REFUSED;
            }
        }
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return MSG_DNS;
        }
        source = cause.source();
    }
    MSG_GENERIC
}
