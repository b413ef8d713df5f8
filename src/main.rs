//! Camera Capture Service
//!
//! Main entry point: wires state and serves the REST API.

use camserve::frame_acquirer::FfmpegAcquirer;
use camserve::state::{AppConfig, AppState};
use camserve::web_api;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camserve=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::default();

    tracing::info!(
        host = %config.host,
        port = config.port,
        facilities_dir = %config.facilities_dir.display(),
        cache_ttl_sec = config.cache_ttl_secs,
        "Starting camera capture service"
    );

    let state = AppState::new(config.clone(), Arc::new(FfmpegAcquirer::new()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = web_api::create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind {}: {}", addr, e));

    tracing::info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
