//! Application state
//!
//! Holds all shared components and state

use crate::capture_orchestrator::CaptureOrchestrator;
use crate::facility_directory::FacilityDirectory;
use crate::frame_acquirer::FrameAcquirer;
use crate::image_cache::ImageCache;
use crate::reconciler::Reconciler;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Root directory holding per-facility config records
    pub facilities_dir: PathBuf,
    /// Default image cache TTL in seconds
    pub cache_ttl_secs: u64,
    /// Timeout per frame acquisition in seconds
    pub capture_timeout_secs: u64,
    /// Timeout per scan probe in seconds
    pub scan_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8001),
            facilities_dir: std::env::var("FACILITIES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./facilities")),
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            capture_timeout_secs: std::env::var("CAPTURE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            scan_timeout_secs: std::env::var("SCAN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        }
    }
}

impl AppConfig {
    /// Acquisition timeout as a Duration
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    /// Scan probe timeout as a Duration
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Image cache (TTL, expiry-on-read)
    pub cache: Arc<ImageCache>,
    /// Facility directory (per-facility camera configs)
    pub directory: Arc<FacilityDirectory>,
    /// Frame acquisition boundary
    pub acquirer: Arc<dyn FrameAcquirer>,
    /// Capture orchestrator (directory + acquirer + cache)
    pub orchestrator: Arc<CaptureOrchestrator>,
    /// Reconciler (scan results -> directory)
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    /// Wire up all components from config and an acquirer implementation
    pub fn new(config: AppConfig, acquirer: Arc<dyn FrameAcquirer>) -> Self {
        let cache = Arc::new(ImageCache::new(Duration::from_secs(config.cache_ttl_secs)));
        let directory = Arc::new(FacilityDirectory::new(config.facilities_dir.clone()));
        let orchestrator = Arc::new(CaptureOrchestrator::new(
            directory.clone(),
            cache.clone(),
            acquirer.clone(),
            config.capture_timeout(),
        ));
        let reconciler = Arc::new(Reconciler::new(directory.clone()));

        Self {
            config,
            cache,
            directory,
            acquirer,
            orchestrator,
            reconciler,
        }
    }
}
