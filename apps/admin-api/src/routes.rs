//! `/api` routes for the admin UI.
//!
//! Every mutation goes straight to the store and then rewrites the CSV
//! cache; listings come from the cache unless `force=true` or the file is
//! missing.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use domain::code::RandomCodeGenerator;
use domain::service::MappingService;
use domain::{CoreError, KvStore, Mapping, NewMapping, ShortCode, UtmParams};
use http_common::{json_failure, json_ok, json_success, public_message, status_for};
use mapping_csv::CsvCache;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::probe::{ProbeResult, UrlProbe};

pub struct AdminState<S: KvStore> {
    pub service: Arc<MappingService<S, RandomCodeGenerator>>,
    pub cache: Arc<CsvCache>,
    pub probe: UrlProbe,
}

impl<S: KvStore> Clone for AdminState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            cache: Arc::clone(&self.cache),
            probe: self.probe.clone(),
        }
    }
}

impl<S: KvStore> AdminState<S> {
    pub fn new(store: S, cache: CsvCache, probe: UrlProbe) -> Self {
        Self {
            service: Arc::new(MappingService::new(store, RandomCodeGenerator::default())),
            cache: Arc::new(cache),
            probe,
        }
    }
}

pub fn router<S: KvStore + 'static>(state: AdminState<S>) -> Router {
    Router::new()
        .route(
            "/api/mappings",
            get(list_mappings::<S>).post(create_mapping::<S>),
        )
        .route(
            "/api/mappings/:code",
            put(update_mapping::<S>).delete(delete_mapping::<S>),
        )
        .route("/api/validate-url", get(validate_url::<S>))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    force: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidateQuery {
    #[serde(default)]
    url: Option<String>,
}

/// Request body for create and update. Everything is optional so missing
/// fields produce our own 400 message instead of a deserializer error.
#[derive(Debug, Default, Deserialize)]
pub struct MappingInput {
    #[serde(rename = "shortCode", default)]
    short_code: Option<String>,
    #[serde(rename = "longUrl", default)]
    long_url: Option<String>,
    #[serde(default)]
    utm_source: Option<String>,
    #[serde(default)]
    utm_medium: Option<String>,
    #[serde(default)]
    utm_campaign: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

impl MappingInput {
    fn long_url(&self) -> Option<String> {
        self.long_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
    }

    fn into_new_mapping(self, long_url: String, custom_code: Option<ShortCode>) -> NewMapping {
        NewMapping {
            long_url,
            custom_code,
            utm: UtmParams::new(self.utm_source, self.utm_medium, self.utm_campaign),
            tags: self.tags,
        }
    }
}

fn reply(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

fn fail(status: StatusCode, message: &str) -> Response {
    reply(status, json_failure(message))
}

/// Admin-facing error: store failures carry their detail under `action`,
/// everything else uses the shared public message.
fn mutation_error(action: &str, e: &CoreError) -> Response {
    match e {
        CoreError::Store(detail) => {
            error!(error = %detail, "{} failed", action);
            fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Failed to {} short URL: {}", action, detail),
            )
        }
        other => fail(status_for(other), &public_message(other)),
    }
}

/// Re-read every mapping from the store and rewrite the cache file.
pub(crate) async fn refresh_cache<S: KvStore>(state: &AdminState<S>) -> Result<Vec<Mapping>, CoreError> {
    let mappings = state.service.list_all().await?;
    if let Err(e) = state.cache.write(&mappings) {
        warn!(path = %state.cache.path().display(), error = %e, "failed to write csv cache");
    }
    Ok(mappings)
}

/// Cache refresh after a successful mutation. The mutation stands even if
/// the refresh fails.
async fn refresh_after_mutation<S: KvStore>(state: &AdminState<S>) {
    if let Err(e) = refresh_cache(state).await {
        warn!(error = %e, "mutation succeeded but csv cache refresh failed");
    }
}

async fn list_mappings<S: KvStore + 'static>(
    State(state): State<AdminState<S>>,
    Query(q): Query<ListQuery>,
) -> Response {
    let force = q.force.as_deref() == Some("true");
    if !force {
        match state.cache.read() {
            Ok(Some(rows)) => return reply(StatusCode::OK, json_success(json!(rows))),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "csv cache unreadable; falling back to store"),
        }
    }
    match refresh_cache(&state).await {
        Ok(rows) => {
            info!(count = rows.len(), force, "mappings loaded from store");
            reply(StatusCode::OK, json_success(json!(rows)))
        }
        Err(CoreError::Store(detail)) => {
            error!(error = %detail, "listing mappings failed");
            fail(StatusCode::INTERNAL_SERVER_ERROR, &detail)
        }
        Err(e) => fail(status_for(&e), &public_message(&e)),
    }
}

async fn create_mapping<S: KvStore + 'static>(
    State(state): State<AdminState<S>>,
    Json(body): Json<MappingInput>,
) -> Response {
    let Some(long_url) = body.long_url() else {
        return fail(StatusCode::BAD_REQUEST, "Long URL is required.");
    };
    let custom_code = match body
        .short_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        Some(c) => match ShortCode::new(c) {
            Ok(code) => Some(code),
            Err(e) => return fail(StatusCode::BAD_REQUEST, &public_message(&e)),
        },
        None => None,
    };

    match state
        .service
        .create(body.into_new_mapping(long_url, custom_code))
        .await
    {
        Ok(m) => {
            info!(code = %m.short_code, long_url = %m.long_url, "mapping created");
            refresh_after_mutation(&state).await;
            reply(
                StatusCode::CREATED,
                json_success(json!({"shortCode": m.short_code, "longUrl": m.long_url})),
            )
        }
        Err(e) => mutation_error("create", &e),
    }
}

async fn update_mapping<S: KvStore + 'static>(
    State(state): State<AdminState<S>>,
    Path(code): Path<String>,
    Json(body): Json<MappingInput>,
) -> Response {
    let Some(long_url) = body.long_url() else {
        return fail(StatusCode::BAD_REQUEST, "Long URL is required.");
    };
    match state
        .service
        .update(&code, body.into_new_mapping(long_url, None))
        .await
    {
        Ok(m) => {
            info!(code = %m.short_code, long_url = %m.long_url, "mapping updated");
            refresh_after_mutation(&state).await;
            reply(
                StatusCode::OK,
                json_success(json!({"shortCode": m.short_code, "longUrl": m.long_url})),
            )
        }
        Err(e) => mutation_error("update", &e),
    }
}

async fn delete_mapping<S: KvStore + 'static>(
    State(state): State<AdminState<S>>,
    Path(code): Path<String>,
) -> Response {
    match state.service.delete(&code).await {
        Ok(()) => {
            info!(code = %code, "mapping deleted");
            refresh_after_mutation(&state).await;
            reply(StatusCode::OK, json_ok())
        }
        Err(e) => mutation_error("delete", &e),
    }
}

async fn validate_url<S: KvStore + 'static>(
    State(state): State<AdminState<S>>,
    Query(q): Query<ValidateQuery>,
) -> Response {
    let Some(url) = q.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ProbeResult {
                is_valid: false,
                message: "URL parameter is required.".into(),
            }),
        )
            .into_response();
    };
    Json(state.probe.check(url).await).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::PROBE_TIMEOUT;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use domain::adapters::memory_kv::{FailingKv, InMemoryKv};
    use serde_json::Value;
    use tower::util::ServiceExt;

    struct Harness {
        kv: InMemoryKv,
        cache: CsvCache,
        app: Router,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let cache = CsvCache::new(dir.path().join("url-mappings.csv"));
        let kv = InMemoryKv::new();
        let state = AdminState::new(kv.clone(), cache.clone(), UrlProbe::new(PROBE_TIMEOUT).unwrap());
        Harness {
            kv,
            cache,
            app: router(state),
            _dir: dir,
        }
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn create_list_update_delete_flow() {
        let h = harness();

        let (status, body) = call(
            &h.app,
            "POST",
            "/api/mappings",
            Some(json!({"shortCode": "promo", "longUrl": "https://shop.example", "utm_source": "news"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"success": true, "data": {"shortCode": "promo", "longUrl": "https://shop.example"}}));

        // Stored in the structured shape and mirrored into the cache.
        let raw = h.kv.get("promo").await.unwrap().unwrap();
        let stored: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["utm_source"], "news");
        assert_eq!(stored["utm_medium"], "");
        let cached = h.cache.read().unwrap().unwrap();
        assert_eq!(cached.len(), 1);

        let (status, body) = call(&h.app, "GET", "/api/mappings", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"][0]["shortCode"], "promo");
        assert_eq!(body["data"][0]["utm_source"], "news");

        let (status, body) = call(
            &h.app,
            "PUT",
            "/api/mappings/promo",
            Some(json!({"longUrl": "https://shop.example/sale"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["longUrl"], "https://shop.example/sale");
        assert_eq!(h.cache.read().unwrap().unwrap()[0].long_url, "https://shop.example/sale");

        let (status, body) = call(&h.app, "DELETE", "/api/mappings/promo", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));
        assert!(h.kv.is_empty());
        assert!(h.cache.read().unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_without_code_generates_one() {
        let h = harness();
        let (status, body) = call(
            &h.app,
            "POST",
            "/api/mappings",
            Some(json!({"longUrl": "https://example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let code = body["data"]["shortCode"].as_str().unwrap();
        assert_eq!(code.len(), 6);
        assert!(h.kv.get(code).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn create_validation_and_conflict() {
        let h = harness();
        h.kv.insert("taken", "https://old.example");

        let (status, body) = call(&h.app, "POST", "/api/mappings", Some(json!({"shortCode": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Long URL is required.");

        let (status, _) = call(
            &h.app,
            "POST",
            "/api/mappings",
            Some(json!({"longUrl": "ftp://example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &h.app,
            "POST",
            "/api/mappings",
            Some(json!({"shortCode": "bad code", "longUrl": "https://example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &h.app,
            "POST",
            "/api/mappings",
            Some(json!({"shortCode": "taken", "longUrl": "https://new.example"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Custom short code already in use");
        assert_eq!(h.kv.get("taken").await.unwrap().as_deref(), Some("https://old.example"));
    }

    #[tokio::test]
    async fn update_requires_long_url_and_upserts() {
        let h = harness();
        let (status, _) = call(&h.app, "PUT", "/api/mappings/new1", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &h.app,
            "PUT",
            "/api/mappings/new1",
            Some(json!({"longUrl": "https://fresh.example"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(h.kv.get("new1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn listing_prefers_cache_unless_forced() {
        let h = harness();
        h.kv.insert("a", "https://a.example");
        h.cache.write(&[]).unwrap();

        let (_, body) = call(&h.app, "GET", "/api/mappings", None).await;
        assert_eq!(body["data"], json!([]));

        let (_, body) = call(&h.app, "GET", "/api/mappings?force=true", None).await;
        assert_eq!(body["data"][0]["shortCode"], "a");
        assert_eq!(body["data"][0]["longUrl"], "https://a.example");
        // forced refresh rewrote the cache
        assert_eq!(h.cache.read().unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn store_failures_are_500_with_detail() {
        let dir = tempfile::tempdir().unwrap();
        let state = AdminState::new(
            FailingKv::new("Authentication error"),
            CsvCache::new(dir.path().join("c.csv")),
            UrlProbe::new(PROBE_TIMEOUT).unwrap(),
        );
        let app = router(state);

        let (status, body) = call(&app, "GET", "/api/mappings", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"success": false, "error": "Authentication error"}));

        let (status, body) = call(&app, "DELETE", "/api/mappings/x", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to delete short URL: Authentication error");
    }

    #[tokio::test]
    async fn validate_url_requires_parameter() {
        let h = harness();
        let (status, body) = call(&h.app, "GET", "/api/validate-url", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"isValid": false, "message": "URL parameter is required."}));
    }
}
