//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - Request validation
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::models::HealthResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    /// Facility to probe for recorder connectivity
    facility: Option<String>,
}

/// Health check endpoint
pub async fn health_check(
    State(state): State<AppState>,
    Query(query): Query<HealthQuery>,
) -> impl IntoResponse {
    let nvr_connectivity = match &query.facility {
        Some(facility) => state
            .directory
            .check_connectivity(
                facility,
                state.acquirer.as_ref(),
                state.config.capture_timeout(),
            )
            .await
            .ok(),
        None => None,
    };

    let response = HealthResponse {
        status: "ok".to_string(),
        service: "camera-capture".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache_stats: state.cache.stats().await,
        nvr_connectivity,
    };

    Json(response)
}
