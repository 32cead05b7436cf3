//! redirect-server: the public short-link endpoint.
//!
//! Answers every request with a 302: to the stored destination for a known
//! code, otherwise to the configured root URL. Click analytics go to the GA4
//! Measurement Protocol from detached tasks that are drained on shutdown.
//!
//! Run:
//! ```bash
//! # local, empty in-memory store
//! STORAGE_PROVIDER=memory cargo run -p redirect-server
//!
//! # against a Workers KV namespace
//! CLOUDFLARE_API_TOKEN=.. CLOUDFLARE_ACCOUNT_ID=.. CLOUDFLARE_KV_NAMESPACE_ID=.. \
//!   cargo run -p redirect-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod background;
mod config;
mod handler;

use std::net::SocketAddr;

use axum::http::HeaderName;
use cloudflare_kv::KvBackend;
use domain::resolver::Resolver;
use ga_collector::Collector;
use tokio::signal;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::background::DetachedTasks;
use crate::handler::AppState;

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    info!("{}", domain::about());
    cfg.warn_if_incomplete();

    let store = match KvBackend::from_provider(cfg.storage_provider) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to initialise key-value store");
            std::process::exit(1);
        }
    };
    info!(provider = ?store.provider(), "key-value store ready");
    let collector = match Collector::new(cfg.collector.clone()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to initialise analytics client");
            std::process::exit(1);
        }
    };

    let tasks = DetachedTasks::new();
    let state = AppState::new(
        Resolver::new(store, cfg.root_redirect_url.clone()),
        collector,
        tasks.clone(),
    );

    let x_request_id = HeaderName::from_static("x-request-id");
    let app = handler::router(state)
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

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(%addr, root = %cfg.root_redirect_url, "redirect-server listening");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;
    if let Err(e) = served {
        error!(error = %e, "server error");
    }

    if !tasks.is_empty() {
        info!(pending = tasks.len(), grace_secs = cfg.shutdown_grace.as_secs(), "waiting for analytics");
    }
    let abandoned = tasks.drain(cfg.shutdown_grace).await;
    if abandoned > 0 {
        warn!(abandoned, "analytics events dropped at shutdown");
    }
    info!("redirect-server stopped");
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
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}
