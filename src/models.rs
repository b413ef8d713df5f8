//! Shared API models
//!
//! Types shared across the web layer to avoid circular dependencies.

use crate::facility_directory::ConnectivityStatus;
use crate::image_cache::CacheStats;
use serde::Serialize;

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub cache_stats: CacheStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nvr_connectivity: Option<ConnectivityStatus>,
}
