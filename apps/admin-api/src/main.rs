//! admin-api: management HTTP API behind the admin UI.
//!
//! - Mappings: list (CSV cache, `?force=true` to refresh), create, update, delete.
//! - URL validation: `GET /api/validate-url?url=..` probes the target with a HEAD request.
//! - CORS: Configurable via CORS_ALLOWED_ORIGIN for the admin frontend.
//!
//! There is no authentication here. Put the API behind an access proxy.
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;
mod probe;
mod routes;

use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use cloudflare_kv::KvBackend;
use mapping_csv::CsvCache;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::probe::{UrlProbe, PROBE_TIMEOUT};
use crate::routes::AdminState;

#[tokio::main]
async fn main() {
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    info!("{}", domain::about());
    cfg.warn_if_insecure();

    let store = match KvBackend::from_provider(cfg.storage_provider) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to initialise key-value store");
            std::process::exit(1);
        }
    };
    info!(provider = ?store.provider(), "key-value store ready");
    let probe = match UrlProbe::new(PROBE_TIMEOUT) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to build url probe client");
            std::process::exit(1);
        }
    };
    let state = AdminState::new(store, CsvCache::new(cfg.csv_cache_path.clone()), probe);

    match routes::refresh_cache(&state).await {
        Ok(rows) => info!(count = rows.len(), path = %cfg.csv_cache_path.display(), "csv cache populated"),
        Err(e) => warn!(error = %e, "initial csv cache population failed"),
    }

    let x_request_id = HeaderName::from_static("x-request-id");
    let mut app = routes::router(state)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allowed_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allowed_origin.clone()]))
            .allow_credentials(true)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(%addr, "admin-api listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
    }
    info!("admin-api stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(fmt::layer().pretty().with_target(true).with_writer(std::io::stdout))
                .init();
        }
    }
}
