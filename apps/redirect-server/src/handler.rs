//! The redirect endpoint.
//!
//! Every method on every path lands here. The handler resolves the path,
//! answers with a 302, and hands the analytics beacon to the background
//! task registry so the client never waits for the collector.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use domain::resolver::{Resolution, ResolvedLink, Resolver};
use domain::KvStore;
use ga_collector::{ClickEvent, Collector, GeoHints};
use http_common::RequestMeta;
use tracing::{error, info};

use crate::background::DetachedTasks;
use crate::config::normalize_url;

pub struct AppState<S: KvStore> {
    pub resolver: Arc<Resolver<S>>,
    pub collector: Collector,
    pub tasks: DetachedTasks,
}

impl<S: KvStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            collector: self.collector.clone(),
            tasks: self.tasks.clone(),
        }
    }
}

impl<S: KvStore> AppState<S> {
    pub fn new(resolver: Resolver<S>, collector: Collector, tasks: DetachedTasks) -> Self {
        Self {
            resolver: Arc::new(resolver),
            collector,
            tasks,
        }
    }
}

/// Router without middleware; `main` adds tracing and request ids.
pub fn router<S: KvStore + 'static>(state: AppState<S>) -> Router {
    Router::new().fallback(redirect::<S>).with_state(state)
}

pub async fn redirect<S: KvStore + 'static>(
    State(state): State<AppState<S>>,
    req: Request,
) -> Response {
    let (parts, _body) = req.into_parts();
    let path = parts.uri.path();

    let link = match state.resolver.resolve(path).await {
        Ok(Resolution::Root { location }) => {
            info!(path = %path, redirect_to = %location, "redirect to root");
            return found(&location);
        }
        Ok(Resolution::Destination(link)) => link,
        Err(e) => {
            error!(path = %path, error = %e, "lookup failed");
            return internal_error();
        }
    };

    let location = match normalize_url(&link.destination) {
        Ok(l) => l,
        Err(e) => {
            error!(code = %link.short_code, destination = %link.destination, error = %e, "stored destination is not a valid URL");
            return internal_error();
        }
    };

    info!(code = %link.short_code, redirect_to = %location, "resolve ok");

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());
    let meta = RequestMeta::from_request_parts(&parts.headers, &parts.uri, peer);
    let event = click_event(link, meta);
    let collector = state.collector.clone();
    state.tasks.spawn(async move {
        collector.report(event).await;
    });

    found(&location)
}

fn click_event(link: ResolvedLink, meta: RequestMeta) -> ClickEvent {
    ClickEvent {
        short_code: link.short_code,
        destination_url: link.destination,
        utm: link.utm,
        ip: meta.client_ip,
        user_agent: meta.user_agent,
        referrer: meta.referrer,
        hostname: meta.hostname,
        page_location: meta.page_location,
        geo: GeoHints {
            country: meta.country,
            city: meta.city,
            region: meta.region,
        },
    }
}

fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(v) => (StatusCode::FOUND, [(header::LOCATION, v)]).into_response(),
        Err(e) => {
            error!(location = %location, error = %e, "location is not a valid header value");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::extract::Query;
    use axum::http::Request as HttpRequest;
    use axum::routing::post;
    use axum::Json;
    use domain::adapters::memory_kv::{FailingKv, InMemoryKv};
    use ga_collector::CollectorConfig;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::util::ServiceExt;

    const ROOT: &str = "https://racket.gr/";

    type Captured = Arc<Mutex<Vec<Value>>>;

    /// Local stand-in for the Measurement Protocol endpoint.
    async fn fake_collector(status: StatusCode, delay: Duration) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/mp/collect",
                post(
                    move |State(c): State<Captured>,
                          Query(_q): Query<HashMap<String, String>>,
                          Json(body): Json<Value>| async move {
                        tokio::time::sleep(delay).await;
                        c.lock().unwrap().push(body);
                        status
                    },
                ),
            )
            .with_state(captured.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/mp/collect", addr), captured)
    }

    fn collector(endpoint: &str, timeout: Duration) -> Collector {
        Collector::new(CollectorConfig {
            measurement_id: Some("G-TEST".into()),
            api_secret: Some("secret".into()),
            endpoint: endpoint.into(),
            timeout,
        })
        .unwrap()
    }

    fn state_with<S: KvStore>(store: S, root: &str, collector: Collector) -> AppState<S> {
        AppState::new(Resolver::new(store, root), collector, DetachedTasks::new())
    }

    fn seeded(entries: &[(&str, &str)]) -> InMemoryKv {
        let kv = InMemoryKv::new();
        for (k, v) in entries {
            kv.insert(k, v);
        }
        kv
    }

    fn get(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .uri(uri)
            .header("host", "s.example")
            .header("user-agent", "test-agent")
            .header("cf-connecting-ip", "203.0.113.9")
            .body(Body::empty())
            .unwrap()
    }

    fn location(resp: &Response) -> &str {
        resp.headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    #[tokio::test]
    async fn root_path_redirects_to_default_root() {
        let (url, captured) = fake_collector(StatusCode::OK, Duration::ZERO).await;
        let state = state_with(seeded(&[]), ROOT, collector(&url, Duration::from_secs(1)));
        let resp = router(state.clone()).oneshot(get("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "https://racket.gr/");
        assert!(state.tasks.is_empty());
        assert_eq!(state.tasks.drain(Duration::from_secs(1)).await, 0);
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn root_override_is_used_for_root_and_unknown_codes() {
        let (url, _) = fake_collector(StatusCode::OK, Duration::ZERO).await;
        let state = state_with(
            seeded(&[]),
            "https://my-custom-root.com/",
            collector(&url, Duration::from_secs(1)),
        );
        let app = router(state.clone());
        let resp = app.clone().oneshot(get("/")).await.unwrap();
        assert_eq!(location(&resp), "https://my-custom-root.com/");
        let resp = app.oneshot(get("/nonexistent")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "https://my-custom-root.com/");
        assert!(state.tasks.is_empty());
    }

    #[tokio::test]
    async fn plain_value_redirects_to_normalized_url() {
        let (url, captured) = fake_collector(StatusCode::OK, Duration::ZERO).await;
        let state = state_with(
            seeded(&[("foo", "https://integration.example.com")]),
            ROOT,
            collector(&url, Duration::from_secs(1)),
        );
        let resp = router(state.clone()).oneshot(get("/foo")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "https://integration.example.com/");

        assert_eq!(state.tasks.drain(Duration::from_secs(2)).await, 0);
        let calls = captured.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let params = &calls[0]["events"][0]["params"];
        assert_eq!(params["short_code"], "foo");
        assert_eq!(params["hostname"], "s.example");
        assert!(params.get("source").is_none());
    }

    #[tokio::test]
    async fn structured_value_sends_utm_to_analytics_only() {
        let (url, captured) = fake_collector(StatusCode::OK, Duration::ZERO).await;
        let state = state_with(
            seeded(&[(
                "bar",
                r#"{"longUrl":"https://example.com/landing","utm_source":"news"}"#,
            )]),
            ROOT,
            collector(&url, Duration::from_secs(1)),
        );
        let resp = router(state.clone()).oneshot(get("/bar")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        // UTM is never appended to the redirect target
        assert_eq!(location(&resp), "https://example.com/landing");

        state.tasks.drain(Duration::from_secs(2)).await;
        let calls = captured.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["events"][0]["params"]["source"], "news");
        assert_eq!(
            calls[0]["client_id"],
            ga_collector::client_id("203.0.113.9", "test-agent")
        );
    }

    #[tokio::test]
    async fn store_failure_is_500_without_analytics() {
        let (url, captured) = fake_collector(StatusCode::OK, Duration::ZERO).await;
        let state = state_with(FailingKv::new("kv down"), ROOT, collector(&url, Duration::from_secs(1)));
        let resp = router(state.clone()).oneshot(get("/bar")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Internal Server Error");
        assert!(state.tasks.is_empty());
        state.tasks.drain(Duration::from_millis(100)).await;
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparseable_destination_is_500_without_analytics() {
        let (url, captured) = fake_collector(StatusCode::OK, Duration::ZERO).await;
        let state = state_with(
            seeded(&[("broken", "not a url")]),
            ROOT,
            collector(&url, Duration::from_secs(1)),
        );
        let resp = router(state.clone()).oneshot(get("/broken")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(state.tasks.is_empty());
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn any_method_redirects() {
        let (url, _) = fake_collector(StatusCode::OK, Duration::ZERO).await;
        let state = state_with(
            seeded(&[("foo", "https://example.com/")]),
            ROOT,
            collector(&url, Duration::from_secs(1)),
        );
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/foo")
            .body(Body::from("payload"))
            .unwrap();
        let resp = router(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "https://example.com/");
        state.tasks.drain(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn repeated_requests_get_identical_responses() {
        let (url, captured) = fake_collector(StatusCode::OK, Duration::ZERO).await;
        let state = state_with(
            seeded(&[("foo", "https://example.com/a")]),
            ROOT,
            collector(&url, Duration::from_secs(1)),
        );
        let app = router(state.clone());
        let first = app.clone().oneshot(get("/foo")).await.unwrap();
        let second = app.oneshot(get("/foo")).await.unwrap();
        assert_eq!(first.status(), second.status());
        assert_eq!(location(&first), location(&second));
        state.tasks.drain(Duration::from_secs(2)).await;
        assert_eq!(captured.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failing_collector_does_not_change_response() {
        let (url, _) = fake_collector(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
        let state = state_with(
            seeded(&[("foo", "https://example.com/a")]),
            ROOT,
            collector(&url, Duration::from_secs(1)),
        );
        let resp = router(state.clone()).oneshot(get("/foo")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "https://example.com/a");
        assert_eq!(state.tasks.drain(Duration::from_secs(2)).await, 0);
    }

    #[tokio::test]
    async fn slow_collector_does_not_delay_response() {
        let (url, _) = fake_collector(StatusCode::OK, Duration::from_secs(10)).await;
        let state = state_with(
            seeded(&[("foo", "https://example.com/a")]),
            ROOT,
            collector(&url, Duration::from_secs(5)),
        );
        let resp = tokio::time::timeout(
            Duration::from_secs(1),
            router(state.clone()).oneshot(get("/foo")),
        )
        .await
        .expect("response must not wait for analytics")
        .unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        // beacon still in flight; shutdown gives up on it after the grace period
        assert_eq!(state.tasks.drain(Duration::from_millis(50)).await, 1);
    }

    #[tokio::test]
    async fn missing_analytics_credentials_still_redirect() {
        let state = state_with(
            seeded(&[("foo", "https://example.com/a")]),
            ROOT,
            Collector::new(CollectorConfig::default()).unwrap(),
        );
        let resp = router(state.clone()).oneshot(get("/foo")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(state.tasks.drain(Duration::from_secs(1)).await, 0);
    }
}
