//! CaptureOrchestrator - Capture Requests Composed over Directory + Cache
//!
//! ## Responsibilities
//!
//! - Resolve (facility, camera id) to a stream address via the directory
//! - One acquisition per request, fixed timeout, no retry
//! - Cache-aware read path with per-key in-flight de-duplication:
//!   concurrent misses for the same key join one acquisition instead of
//!   each opening its own stream against the recorder
//!
//! Sequential batch capture on purpose; the recorder connection is not
//! pooled, so every concurrent capture opens its own stream.

use crate::error::{Error, Result};
use crate::facility_directory::FacilityDirectory;
use crate::frame_acquirer::FrameAcquirer;
use crate::image_cache::ImageCache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};

/// Shared in-flight acquisition result
///
/// The error side is a plain string: camera resolution happens before the
/// flight is created, so anything in here is a capture failure.
type FlightCell = Arc<OnceCell<std::result::Result<Vec<u8>, String>>>;

/// Capture orchestration over directory, acquirer, and cache
pub struct CaptureOrchestrator {
    directory: Arc<FacilityDirectory>,
    cache: Arc<ImageCache>,
    acquirer: Arc<dyn FrameAcquirer>,
    /// Fixed timeout for every acquisition attempt
    capture_timeout: Duration,
    /// cache key -> pending acquisition, joined by concurrent misses
    in_flight: Mutex<HashMap<String, FlightCell>>,
}

/// Cache key for a (facility, camera) pair
pub fn cache_key(facility: &str, camera_id: &str) -> String {
    format!("{}/{}", facility, camera_id)
}

impl CaptureOrchestrator {
    pub fn new(
        directory: Arc<FacilityDirectory>,
        cache: Arc<ImageCache>,
        acquirer: Arc<dyn FrameAcquirer>,
        capture_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            cache,
            acquirer,
            capture_timeout,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Capture one frame from a specific camera
    ///
    /// NotFound when the camera id is unknown; the acquirer is not invoked
    /// in that case. A single acquisition attempt is the unit of work.
    pub async fn capture_one(&self, facility: &str, camera_id: &str) -> Result<Vec<u8>> {
        let camera = self
            .directory
            .find_camera(facility, camera_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Camera '{}' not found in facility '{}'",
                    camera_id, facility
                ))
            })?;

        tracing::info!(facility = %facility, camera_id = %camera_id, name = %camera.name, "Capturing frame");

        let frame = self
            .acquirer
            .acquire(&camera.stream_url, self.capture_timeout)
            .await
            .map_err(|e| {
                tracing::warn!(facility = %facility, camera_id = %camera_id, error = %e, "Capture failed");
                Error::Capture(format!("camera '{}': {}", camera_id, e))
            })?;

        Ok(frame.data)
    }

    /// Capture every camera in the facility, sequentially, directory order
    ///
    /// A failure on one camera does not abort the others.
    pub async fn capture_all(&self, facility: &str) -> Result<Vec<(String, Result<Vec<u8>>)>> {
        let cameras = self.directory.list_cameras(facility).await?;
        let mut results = Vec::with_capacity(cameras.len());

        for camera in cameras {
            let result = self
                .acquirer
                .acquire(&camera.stream_url, self.capture_timeout)
                .await
                .map(|frame| frame.data)
                .map_err(|e| Error::Capture(format!("camera '{}': {}", camera.id, e)));

            if let Err(e) = &result {
                tracing::warn!(facility = %facility, camera_id = %camera.id, error = %e, "Capture failed");
            }

            results.push((camera.id, result));
        }

        Ok(results)
    }

    /// Cached-or-fresh read path
    ///
    /// Returns the image and whether it came from the cache. On miss,
    /// concurrent callers for the same key join a single acquisition; the
    /// success is written to the cache before any of them return.
    pub async fn latest(&self, facility: &str, camera_id: &str) -> Result<(Vec<u8>, bool)> {
        let key = cache_key(facility, camera_id);

        if let Some(data) = self.cache.get(&key).await {
            return Ok((data, true));
        }

        // Resolve before joining a flight so unknown cameras surface as
        // NotFound rather than a stringified capture failure.
        let camera = self
            .directory
            .find_camera(facility, camera_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Camera '{}' not found in facility '{}'",
                    camera_id, facility
                ))
            })?;

        let cell: FlightCell = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.entry(key.clone()).or_default().clone()
        };

        let result = cell
            .get_or_init(|| async {
                tracing::info!(facility = %facility, camera_id = %camera_id, "Cache miss, capturing fresh frame");
                match self
                    .acquirer
                    .acquire(&camera.stream_url, self.capture_timeout)
                    .await
                {
                    Ok(frame) => {
                        self.cache.set(&key, frame.data.clone()).await;
                        Ok(frame.data)
                    }
                    Err(e) => Err(format!("camera '{}': {}", camera_id, e)),
                }
            })
            .await
            .clone();

        // Retire the flight so the next miss starts a fresh acquisition
        {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(current) = in_flight.get(&key) {
                if Arc::ptr_eq(current, &cell) {
                    in_flight.remove(&key);
                }
            }
        }

        match result {
            Ok(data) => Ok((data, false)),
            Err(msg) => Err(Error::Capture(msg)),
        }
    }

    /// Always-fresh capture, optionally refreshing the cache
    pub async fn capture_fresh(
        &self,
        facility: &str,
        camera_id: &str,
        refresh_cache: bool,
    ) -> Result<Vec<u8>> {
        let data = self.capture_one(facility, camera_id).await?;

        if refresh_cache {
            let key = cache_key(facility, camera_id);
            self.cache.set(&key, data.clone()).await;
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility_directory::{CameraIdentity, FacilityConfig, NvrInfo};
    use crate::frame_acquirer::testing::ScriptedAcquirer;
    use crate::frame_acquirer::{AcquireError, Frame};
    use chrono::Utc;
    use tempfile::TempDir;

    fn camera(id: &str, channel: u32) -> CameraIdentity {
        CameraIdentity {
            id: id.to_string(),
            name: format!("Camera {}", id),
            number: channel,
            location: "dock".to_string(),
            resolution: "1920x1080".to_string(),
            channel,
            stream_url: format!("rtsp://admin:@10.0.0.5:554/ch{:02}/0", channel),
        }
    }

    async fn seed(tmp: &TempDir, channels: Vec<CameraIdentity>) -> Arc<FacilityDirectory> {
        let config = FacilityConfig {
            nvr: NvrInfo {
                host: "10.0.0.5".to_string(),
                username: "admin".to_string(),
                password: String::new(),
                port: 554,
            },
            channels,
            updated_at: Utc::now(),
        };

        let dir = tmp.path().join("lodge").join("cameras");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            dir.join("config.json"),
            serde_json::to_string_pretty(&config).unwrap(),
        )
        .await
        .unwrap();

        Arc::new(FacilityDirectory::new(tmp.path().to_path_buf()))
    }

    fn orchestrator(
        directory: Arc<FacilityDirectory>,
        acquirer: Arc<ScriptedAcquirer>,
    ) -> CaptureOrchestrator {
        CaptureOrchestrator::new(
            directory,
            Arc::new(ImageCache::new(Duration::from_secs(30))),
            acquirer,
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_capture_one_unknown_camera_skips_acquirer() {
        let tmp = TempDir::new().unwrap();
        let directory = seed(&tmp, vec![camera("bagel", 1)]).await;
        let acquirer = Arc::new(ScriptedAcquirer::always(Frame::stub(1920, 1080)));
        let orch = orchestrator(directory, acquirer.clone());

        let err = orch.capture_one("lodge", "nonexistent").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(acquirer.calls(), 0);
    }

    #[tokio::test]
    async fn test_capture_one_returns_frame_bytes() {
        let tmp = TempDir::new().unwrap();
        let directory = seed(&tmp, vec![camera("bagel", 1)]).await;
        let acquirer = Arc::new(ScriptedAcquirer::always(Frame::stub_with_data(b"jpg1")));
        let orch = orchestrator(directory, acquirer.clone());

        let data = orch.capture_one("lodge", "bagel").await.unwrap();
        assert_eq!(data, b"jpg1");
        assert_eq!(acquirer.calls(), 1);
    }

    #[tokio::test]
    async fn test_capture_failure_surfaces_without_retry() {
        let tmp = TempDir::new().unwrap();
        let directory = seed(&tmp, vec![camera("bagel", 1)]).await;
        let acquirer = Arc::new(ScriptedAcquirer::failing(AcquireError::Timeout(1)));
        let orch = orchestrator(directory, acquirer.clone());

        let err = orch.capture_one("lodge", "bagel").await.unwrap_err();
        assert!(matches!(err, Error::Capture(_)));
        assert_eq!(acquirer.calls(), 1);
    }

    #[tokio::test]
    async fn test_capture_all_isolates_per_camera_failures() {
        let tmp = TempDir::new().unwrap();
        let directory = seed(&tmp, vec![camera("bagel", 1), camera("donut", 2)]).await;
        let acquirer = Arc::new(ScriptedAcquirer::new(|url: &str| {
            if url.contains("ch01/0") {
                Ok(Frame::stub_with_data(b"jpg1"))
            } else {
                Err(AcquireError::NoFrame("dark".into()))
            }
        }));
        let orch = orchestrator(directory, acquirer);

        let results = orch.capture_all("lodge").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "bagel");
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].0, "donut");
        assert!(results[1].1.is_err());
    }

    #[tokio::test]
    async fn test_latest_populates_cache_on_miss() {
        let tmp = TempDir::new().unwrap();
        let directory = seed(&tmp, vec![camera("bagel", 1)]).await;
        let acquirer = Arc::new(ScriptedAcquirer::always(Frame::stub_with_data(b"jpg1")));
        let orch = orchestrator(directory, acquirer.clone());

        let (data, cached) = orch.latest("lodge", "bagel").await.unwrap();
        assert_eq!(data, b"jpg1");
        assert!(!cached);

        let (data, cached) = orch.latest("lodge", "bagel").await.unwrap();
        assert_eq!(data, b"jpg1");
        assert!(cached);

        // The second read was served from cache
        assert_eq!(acquirer.calls(), 1);
    }

    #[tokio::test]
    async fn test_latest_concurrent_misses_join_one_flight() {
        let tmp = TempDir::new().unwrap();
        let directory = seed(&tmp, vec![camera("bagel", 1)]).await;
        let acquirer = Arc::new(
            ScriptedAcquirer::always(Frame::stub_with_data(b"jpg1"))
                .with_delay(Duration::from_millis(50)),
        );
        let orch = Arc::new(orchestrator(directory, acquirer.clone()));

        let a = tokio::spawn({
            let orch = orch.clone();
            async move { orch.latest("lodge", "bagel").await }
        });
        let b = tokio::spawn({
            let orch = orch.clone();
            async move { orch.latest("lodge", "bagel").await }
        });

        let (ra, rb) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(ra.0, b"jpg1");
        assert_eq!(rb.0, b"jpg1");
        assert_eq!(acquirer.calls(), 1);
    }

    #[tokio::test]
    async fn test_latest_failure_is_not_cached() {
        let tmp = TempDir::new().unwrap();
        let directory = seed(&tmp, vec![camera("bagel", 1)]).await;
        let acquirer = Arc::new(ScriptedAcquirer::failing(AcquireError::NoFrame("dark".into())));
        let orch = orchestrator(directory, acquirer.clone());

        assert!(orch.latest("lodge", "bagel").await.is_err());

        // The failed flight was retired; the next miss captures again
        assert!(orch.latest("lodge", "bagel").await.is_err());
        assert_eq!(acquirer.calls(), 2);
    }

    #[tokio::test]
    async fn test_capture_fresh_refreshes_cache_only_when_asked() {
        let tmp = TempDir::new().unwrap();
        let directory = seed(&tmp, vec![camera("bagel", 1)]).await;
        let acquirer = Arc::new(ScriptedAcquirer::always(Frame::stub_with_data(b"jpg2")));
        let orch = orchestrator(directory, acquirer.clone());

        orch.capture_fresh("lodge", "bagel", false).await.unwrap();
        let (_, cached) = orch.latest("lodge", "bagel").await.unwrap();
        assert!(!cached);

        orch.capture_fresh("lodge", "bagel", true).await.unwrap();
        let (data, cached) = orch.latest("lodge", "bagel").await.unwrap();
        assert!(cached);
        assert_eq!(data, b"jpg2");
    }
}
