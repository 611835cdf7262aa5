//! Scamwatch Analysis Server
//!
//! Hosts the detector set over HTTP for the monitor loop.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  SCAMWATCH ANALYSIS SERVER               │
//! ├──────────────────────────────────────────────────────────┤
//! │  POST /api/v1/analyze        GET /health                 │
//! │        │                          │                      │
//! │        ▼                          ▼                      │
//! │  ┌──────────────┐          ┌──────────────┐              │
//! │  │   Detector   │ ───────▶ │  Capability  │              │
//! │  │   Registry   │          │    probe     │              │
//! │  └──────┬───────┘          └──────────────┘              │
//! │         ▼                                                │
//! │  ┌──────────────┐                                        │
//! │  │  Aggregator  │ ──▶ Verdict ──▶ audit log              │
//! │  └──────────────┘                                        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Detector resources are loaded once at startup and shared read-only
//! across requests.

mod config;
mod error;
mod handlers;


use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scamwatch_core::logic::detector::{Capabilities, DetectorRegistry};
use scamwatch_core::logic::telemetry;

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging (core `log` records are forwarded into tracing)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "scamwatch_server=debug,scamwatch_core=info,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env().context("invalid configuration")?;

    tracing::info!("Scamwatch analysis server v{} starting...", env!("CARGO_PKG_VERSION"));

    // Probe optional capabilities once; never re-probed
    let capabilities = Capabilities::probe();
    let registry = DetectorRegistry::standard(&config.detectors, capabilities);
    tracing::info!("Detectors loaded: {}", registry.names().join(", "));

    if let Err(e) = telemetry::init(&config.state_dir, "server") {
        tracing::warn!("Audit log unavailable: {} - verdicts will not be recorded", e);
    }

    let addr = config.addr();
    let state = AppState {
        registry: Arc::new(registry),
        config,
        started: Instant::now(),
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    telemetry::shutdown();
    tracing::info!("Analysis server stopped");
    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DetectorRegistry>,
    pub config: config::Config,
    pub started: Instant,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/api/v1/analyze", post(handlers::analyze::analyze))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
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

    tracing::info!("Shutdown requested, draining connections");
}
