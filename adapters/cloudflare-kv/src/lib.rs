//! cloudflare-kv: Workers KV over the Cloudflare REST API.
//!
//! Implements the domain `KvStore` port so the management surfaces (and the
//! redirect server, when it runs outside the edge) can talk to the same
//! namespace the edge worker reads.
//!
//! Endpoints used, relative to `CLOUDFLARE_API_BASE_URL`:
//! - `GET    /accounts/{account}/storage/kv/namespaces/{ns}/keys` (cursor paginated)
//! - `GET    /accounts/{account}/storage/kv/namespaces/{ns}/values/{key}` (404 = absent)
//! - `PUT    /accounts/{account}/storage/kv/namespaces/{ns}/values/{key}` (raw body)
//! - `DELETE /accounts/{account}/storage/kv/namespaces/{ns}/values/{key}`
//!
//! Also hosts [`KvBackend`], the runtime switch between this client and the
//! in-memory store that the binaries use.

use std::str::FromStr;
use std::time::Duration;

use domain::adapters::memory_kv::InMemoryKv;
use domain::{CoreError, KvStore};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Per-request timeout unless `CLOUDFLARE_TIMEOUT_MS` says otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Page size for key listing. The API caps it at 1000.
const LIST_PAGE_LIMIT: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid value for {0}: '{1}'")]
    InvalidEnv(&'static str, String),
    #[error("{0}")]
    Api(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("unknown storage provider '{0}' (expected memory or cloudflare)")]
    UnknownProvider(String),
}

impl From<KvError> for CoreError {
    fn from(e: KvError) -> Self {
        CoreError::Store(e.to_string())
    }
}

/// Account, namespace, and credentials for one KV namespace.
#[derive(Clone, Debug)]
pub struct CloudflareSettings {
    pub api_token: String,
    pub account_id: String,
    pub namespace_id: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl CloudflareSettings {
    /// Read `CLOUDFLARE_API_TOKEN`, `CLOUDFLARE_ACCOUNT_ID`,
    /// `CLOUDFLARE_KV_NAMESPACE_ID`, and the optional `CLOUDFLARE_API_BASE_URL`
    /// and `CLOUDFLARE_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, KvError> {
        fn required(name: &'static str) -> Result<String, KvError> {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(KvError::MissingEnv(name))
        }
        let timeout = match std::env::var("CLOUDFLARE_TIMEOUT_MS")
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .ok_or(KvError::InvalidEnv("CLOUDFLARE_TIMEOUT_MS", raw))?,
            None => DEFAULT_REQUEST_TIMEOUT,
        };
        Ok(Self {
            api_token: required("CLOUDFLARE_API_TOKEN")?,
            account_id: required("CLOUDFLARE_ACCOUNT_ID")?,
            namespace_id: required("CLOUDFLARE_KV_NAMESPACE_ID")?,
            base_url: std::env::var("CLOUDFLARE_API_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            timeout,
        })
    }
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Deserialize)]
struct KeyEntry {
    name: String,
}

#[derive(Deserialize, Default)]
struct ResultInfo {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct ListKeysBody {
    result: Vec<KeyEntry>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

/// KV namespace client. Cheap to clone; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct CloudflareKv {
    client: reqwest::Client,
    settings: CloudflareSettings,
}

impl CloudflareKv {
    /// Client with the settings' request timeout, so a hung API surfaces as
    /// a store error instead of a stuck request.
    pub fn new(settings: CloudflareSettings) -> Result<Self, KvError> {
        let client = reqwest::Client::builder().timeout(settings.timeout).build()?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: reqwest::Client, settings: CloudflareSettings) -> Self {
        Self { client, settings }
    }

    pub fn from_env() -> Result<Self, KvError> {
        Self::new(CloudflareSettings::from_env()?)
    }

    fn namespace_url(&self) -> String {
        format!(
            "{}/accounts/{}/storage/kv/namespaces/{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.account_id,
            self.settings.namespace_id
        )
    }

    fn value_url(&self, key: &str) -> String {
        format!("{}/values/{}", self.namespace_url(), urlencoding::encode(key))
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<String>, KvError> {
        let resp = self
            .client
            .get(self.value_url(key))
            .bearer_auth(&self.settings.api_token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(key = %key, "kv key not found");
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(Some(resp.text().await?))
    }

    pub async fn put_value(&self, key: &str, value: &str) -> Result<(), KvError> {
        let resp = self
            .client
            .put(self.value_url(key))
            .bearer_auth(&self.settings.api_token)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(value.to_string())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }

    pub async fn delete_value(&self, key: &str) -> Result<(), KvError> {
        let resp = self
            .client
            .delete(self.value_url(key))
            .bearer_auth(&self.settings.api_token)
            .send()
            .await?;
        // Deleting an absent key is a no-op, same as the in-memory store.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }

    /// All key names in the namespace, following the listing cursor.
    pub async fn list_keys(&self) -> Result<Vec<String>, KvError> {
        let url = format!("{}/keys", self.namespace_url());
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut req = self
                .client
                .get(&url)
                .bearer_auth(&self.settings.api_token)
                .query(&[("limit", LIST_PAGE_LIMIT.to_string())]);
            if let Some(c) = cursor.as_deref() {
                req = req.query(&[("cursor", c)]);
            }
            let resp = req.send().await?;
            if !resp.status().is_success() {
                return Err(api_error(resp).await);
            }
            let body: ListKeysBody = resp
                .json()
                .await
                .map_err(|e| KvError::Decode(e.to_string()))?;
            keys.extend(body.result.into_iter().map(|k| k.name));

            cursor = body
                .result_info
                .and_then(|info| info.cursor)
                .filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }
        Ok(keys)
    }
}

/// Turn a non-2xx response into an error. Prefers the API's own first error
/// message, otherwise reports status and raw body.
async fn api_error(resp: Response) -> KvError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(&body) {
        if let Some(first) = parsed.errors.into_iter().next() {
            warn!(status, message = %first.message, "cloudflare api error");
            return KvError::Api(first.message);
        }
    }
    warn!(status, "cloudflare api error without message");
    KvError::Api(format!("Cloudflare API error: {} - {}", status, body))
}

impl KvStore for CloudflareKv {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.get_value(key).await?)
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CoreError> {
        Ok(self.put_value(key, value).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        Ok(self.delete_value(key).await?)
    }

    async fn list(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.list_keys().await?)
    }
}

/// Which store a binary runs against (`STORAGE_PROVIDER`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageProvider {
    Memory,
    Cloudflare,
}

impl FromStr for StorageProvider {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StorageProvider::Memory),
            "cloudflare" | "kv" => Ok(StorageProvider::Cloudflare),
            other => Err(KvError::UnknownProvider(other.to_string())),
        }
    }
}

/// Store selected at startup.
#[derive(Clone)]
pub enum KvBackend {
    Memory(InMemoryKv),
    Cloudflare(CloudflareKv),
}

impl KvBackend {
    pub fn memory() -> Self {
        KvBackend::Memory(InMemoryKv::new())
    }

    /// Build the backend for `provider`, reading Cloudflare settings from the
    /// environment when needed.
    pub fn from_provider(provider: StorageProvider) -> Result<Self, KvError> {
        match provider {
            StorageProvider::Memory => Ok(Self::memory()),
            StorageProvider::Cloudflare => Ok(KvBackend::Cloudflare(CloudflareKv::from_env()?)),
        }
    }

    pub fn provider(&self) -> StorageProvider {
        match self {
            KvBackend::Memory(_) => StorageProvider::Memory,
            KvBackend::Cloudflare(_) => StorageProvider::Cloudflare,
        }
    }
}

impl KvStore for KvBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        match self {
            KvBackend::Memory(s) => s.get(key).await,
            KvBackend::Cloudflare(s) => s.get(key).await,
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CoreError> {
        match self {
            KvBackend::Memory(s) => s.put(key, value).await,
            KvBackend::Cloudflare(s) => s.put(key, value).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        match self {
            KvBackend::Memory(s) => s.delete(key).await,
            KvBackend::Cloudflare(s) => s.delete(key).await,
        }
    }

    async fn list(&self) -> Result<Vec<String>, CoreError> {
        match self {
            KvBackend::Memory(s) => s.list().await,
            KvBackend::Cloudflare(s) => s.list().await,
        }
    }
}
