//! API Routes

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::capture_orchestrator::cache_key;
use crate::channel_scanner::NvrScanner;
use crate::error::Error;
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(super::health_check))
        // Cameras
        .route("/api/cameras/:facility", get(list_cameras))
        .route("/api/cameras/:facility/:id/info", get(camera_info))
        .route("/api/cameras/:facility/:id/latest", get(latest_frame))
        .route("/api/cameras/:facility/:id/capture", get(capture_frame))
        .route("/api/cameras/:facility/batch", post(capture_batch))
        .route("/api/cameras/:facility/capture-all", post(capture_all))
        // Scanning
        .route("/api/scan", post(scan_nvr))
        .route(
            "/api/cameras/:facility/scan-and-update",
            post(scan_and_update),
        )
        // Cache management
        .route("/api/cache/:facility/:id", delete(invalidate_cache_entry))
        .route("/api/cache", delete(clear_cache))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct FrameQuery {
    /// "image" returns JPEG bytes, "base64" returns JSON
    #[serde(default = "default_format")]
    format: String,
    /// Update the cache with the fresh frame (capture endpoint only)
    #[serde(default = "default_true")]
    refresh_cache: bool,
}

fn default_format() -> String {
    "image".to_string()
}

fn default_true() -> bool {
    true
}

/// Render a captured frame as binary JPEG or base64-wrapped JSON
fn frame_response(facility: &str, camera_id: &str, data: Vec<u8>, format: &str) -> Response {
    if format == "base64" {
        Json(json!({
            "facility": facility,
            "camera_id": camera_id,
            "image": base64::engine::general_purpose::STANDARD.encode(&data),
            "format": "jpeg"
        }))
        .into_response()
    } else {
        ([(header::CONTENT_TYPE, "image/jpeg")], data).into_response()
    }
}

async fn list_cameras(
    State(state): State<AppState>,
    Path(facility): Path<String>,
) -> impl IntoResponse {
    match state.directory.list_cameras(&facility).await {
        Ok(cameras) => Json(json!({
            "facility": facility,
            "count": cameras.len(),
            "cameras": cameras
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn camera_info(
    State(state): State<AppState>,
    Path((facility, id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.directory.find_camera(&facility, &id).await {
        Ok(Some(camera)) => Json(camera).into_response(),
        Ok(None) => Error::NotFound(format!(
            "Camera '{}' not found in facility '{}'",
            id, facility
        ))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Cached-or-fresh frame (no recorder hit when cached)
async fn latest_frame(
    State(state): State<AppState>,
    Path((facility, id)): Path<(String, String)>,
    Query(query): Query<FrameQuery>,
) -> impl IntoResponse {
    match state.orchestrator.latest(&facility, &id).await {
        Ok((data, _cached)) => frame_response(&facility, &id, data, &query.format),
        Err(e) => e.into_response(),
    }
}

/// Always-fresh frame (always hits the recorder)
async fn capture_frame(
    State(state): State<AppState>,
    Path((facility, id)): Path<(String, String)>,
    Query(query): Query<FrameQuery>,
) -> impl IntoResponse {
    match state
        .orchestrator
        .capture_fresh(&facility, &id, query.refresh_cache)
        .await
    {
        Ok(data) => frame_response(&facility, &id, data, &query.format),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct BatchCaptureRequest {
    camera_ids: Vec<String>,
    #[serde(default = "default_true")]
    use_cache: bool,
}

async fn capture_batch(
    State(state): State<AppState>,
    Path(facility): Path<String>,
    Json(request): Json<BatchCaptureRequest>,
) -> impl IntoResponse {
    let b64 = &base64::engine::general_purpose::STANDARD;
    let mut results = serde_json::Map::new();

    for camera_id in &request.camera_ids {
        if request.use_cache {
            if let Some(data) = state.cache.get(&cache_key(&facility, camera_id)).await {
                results.insert(
                    camera_id.clone(),
                    json!({
                        "success": true,
                        "cached": true,
                        "image": b64.encode(&data)
                    }),
                );
                continue;
            }
        }

        let entry = match state
            .orchestrator
            .capture_fresh(&facility, camera_id, true)
            .await
        {
            Ok(data) => json!({
                "success": true,
                "cached": false,
                "image": b64.encode(&data)
            }),
            Err(e) => json!({
                "success": false,
                "error": e.to_string()
            }),
        };
        results.insert(camera_id.clone(), entry);
    }

    let successful = results
        .values()
        .filter(|r| r["success"].as_bool().unwrap_or(false))
        .count();

    Json(json!({
        "facility": facility,
        "requested": request.camera_ids.len(),
        "successful": successful,
        "results": results
    }))
}

async fn capture_all(
    State(state): State<AppState>,
    Path(facility): Path<String>,
) -> impl IntoResponse {
    let captured = match state.orchestrator.capture_all(&facility).await {
        Ok(captured) => captured,
        Err(e) => return e.into_response(),
    };

    let b64 = &base64::engine::general_purpose::STANDARD;
    let total = captured.len();
    let mut successful = 0;
    let mut results = serde_json::Map::new();

    for (camera_id, result) in captured {
        let entry = match result {
            Ok(data) => {
                successful += 1;
                state.cache.set(&cache_key(&facility, &camera_id), data.clone()).await;
                json!({
                    "success": true,
                    "image": b64.encode(&data)
                })
            }
            Err(e) => json!({
                "success": false,
                "error": e.to_string()
            }),
        };
        results.insert(camera_id, entry);
    }

    Json(json!({
        "facility": facility,
        "total": total,
        "successful": successful,
        "failed": total - successful,
        "results": results
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct ScanRequest {
    nvr_host: String,
    #[serde(default = "default_scan_username")]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default = "default_rtsp_port")]
    port: u16,
    #[serde(default = "default_max_channels")]
    max_channels: u32,
    #[serde(default = "default_true")]
    quick: bool,
}

fn default_scan_username() -> String {
    "admin".to_string()
}

fn default_rtsp_port() -> u16 {
    554
}

fn default_max_channels() -> u32 {
    32
}

/// Ad-hoc recorder scan; results are not persisted
async fn scan_nvr(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> impl IntoResponse {
    let scanner = NvrScanner::new(
        request.nvr_host.clone(),
        request.username,
        request.password,
        request.port,
        state.acquirer.clone(),
        state.config.scan_timeout(),
    );

    let outcome = if request.quick {
        let channels: Vec<u32> = (1..=request.max_channels).collect();
        scanner.quick_scan(&channels).await
    } else {
        scanner.scan(request.max_channels, None).await
    };

    Json(json!({
        "nvr_host": request.nvr_host,
        "channels_found": outcome.channels.len(),
        "channels": outcome.channels,
        "tested": outcome.tested,
        "recorder_unreachable": outcome.recorder_unreachable
    }))
}

#[derive(Debug, Deserialize)]
struct ScanAndUpdateQuery {
    #[serde(default = "default_true")]
    quick: bool,
    #[serde(default = "default_max_channels")]
    max_channels: u32,
    #[serde(default = "default_true")]
    preserve_identity: bool,
}

/// Scan the facility's own recorder and reconcile the directory
async fn scan_and_update(
    State(state): State<AppState>,
    Path(facility): Path<String>,
    Query(query): Query<ScanAndUpdateQuery>,
) -> impl IntoResponse {
    let config = match state.directory.load(&facility).await {
        Ok(config) => config,
        Err(e) => return e.into_response(),
    };

    let scanner = NvrScanner::new(
        config.nvr.host.clone(),
        config.nvr.username.clone(),
        config.nvr.password.clone(),
        config.nvr.port,
        state.acquirer.clone(),
        state.config.scan_timeout(),
    );

    let outcome = if query.quick {
        let channels: Vec<u32> = (1..=query.max_channels).collect();
        scanner.quick_scan(&channels).await
    } else {
        scanner.scan(query.max_channels, None).await
    };

    if outcome.channels.is_empty() {
        let detail = if outcome.recorder_unreachable {
            format!("Recorder {} unreachable", config.nvr.host)
        } else {
            format!("No channels found on {}", config.nvr.host)
        };
        return Error::NotFound(detail).into_response();
    }

    match state
        .reconciler
        .update_from_scan(&facility, &outcome.channels, query.preserve_identity)
        .await
    {
        Ok(reconciled) => Json(json!({
            "facility": facility,
            "nvr_host": config.nvr.host,
            "channels_found": outcome.channels.len(),
            "channels_updated": reconciled.config.channels.len(),
            "preserved_identity": reconciled.preserved,
            "added": reconciled.added,
            "message": format!(
                "Updated {} cameras ({} preserved, {} new)",
                reconciled.config.channels.len(),
                reconciled.preserved,
                reconciled.added
            )
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn invalidate_cache_entry(
    State(state): State<AppState>,
    Path((facility, id)): Path<(String, String)>,
) -> impl IntoResponse {
    let key = cache_key(&facility, &id);
    let removed = state.cache.invalidate(&key).await;

    Json(json!({
        "facility": facility,
        "camera_id": id,
        "cache_key": key,
        "removed": removed
    }))
}

async fn clear_cache(State(state): State<AppState>) -> impl IntoResponse {
    state.cache.clear().await;

    Json(json!({
        "message": "Cache cleared",
        "stats": state.cache.stats().await
    }))
}

