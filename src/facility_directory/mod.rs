//! FacilityDirectory - Per-Facility Camera Configuration Store
//!
//! ## Responsibilities
//!
//! - Load and memoize the facility -> camera identity mapping
//! - Resolve (facility, camera id) to channel metadata
//! - Persist the camera collection after reconciliation
//! - Recorder connectivity probe
//!
//! Configs live at `<facilities_dir>/<facility>/cameras/config.json`,
//! parsed at most once per process unless `reload` is called. The
//! in-memory copy is replaced only after a successful persist, so memory
//! and durable state cannot diverge on a failed write.

mod types;

pub use types::{CameraIdentity, ConnectivityStatus, FacilityConfig, NvrInfo};

use crate::error::{Error, Result};
use crate::frame_acquirer::FrameAcquirer;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tokio::sync::RwLock;

/// Facility configuration directory
pub struct FacilityDirectory {
    /// Root directory holding one subdirectory per facility
    facilities_dir: PathBuf,
    /// facility -> memoized config
    configs: RwLock<HashMap<String, FacilityConfig>>,
}

impl FacilityDirectory {
    /// Create a directory rooted at `facilities_dir`
    pub fn new(facilities_dir: PathBuf) -> Self {
        Self {
            facilities_dir,
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Path to a facility's config file
    fn config_path(&self, facility: &str) -> PathBuf {
        self.facilities_dir
            .join(facility)
            .join("cameras")
            .join("config.json")
    }

    /// Facility names become path components; reject separators outright
    fn validate_facility(facility: &str) -> Result<()> {
        if facility.is_empty() || facility.contains(['/', '\\']) || facility.contains("..") {
            return Err(Error::Validation(format!(
                "Invalid facility name: {}",
                facility
            )));
        }
        Ok(())
    }

    /// Load a facility's config, memoized
    ///
    /// Returns the cached copy if already loaded; otherwise reads and
    /// parses the persisted record, failing with NotFound if none exists.
    pub async fn load(&self, facility: &str) -> Result<FacilityConfig> {
        Self::validate_facility(facility)?;

        {
            let configs = self.configs.read().await;
            if let Some(config) = configs.get(facility) {
                return Ok(config.clone());
            }
        }

        let config = self.read_from_disk(facility).await?;

        let mut configs = self.configs.write().await;
        configs.insert(facility.to_string(), config.clone());

        tracing::info!(
            facility = %facility,
            cameras = config.channels.len(),
            "Loaded facility config"
        );

        Ok(config)
    }

    /// Drop the memoized copy and reread from disk
    ///
    /// Invoked by the reconciler and any manual-edit path so out-of-band
    /// edits do not require a process restart.
    pub async fn reload(&self, facility: &str) -> Result<FacilityConfig> {
        Self::validate_facility(facility)?;

        let config = self.read_from_disk(facility).await?;

        let mut configs = self.configs.write().await;
        configs.insert(facility.to_string(), config.clone());

        Ok(config)
    }

    /// Read and parse the persisted record
    async fn read_from_disk(&self, facility: &str) -> Result<FacilityConfig> {
        let path = self.config_path(facility);

        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Camera config not found for facility '{}'",
                facility
            )));
        }

        let raw = fs::read_to_string(&path).await?;
        let config: FacilityConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid config for '{}': {}", facility, e)))?;

        Ok(config)
    }

    /// Find a camera by id, linear scan over the facility's collection
    ///
    /// Returns None (not an error) when the facility is known but the
    /// camera id is not.
    pub async fn find_camera(&self, facility: &str, camera_id: &str) -> Result<Option<CameraIdentity>> {
        let config = self.load(facility).await?;
        Ok(config.channels.iter().find(|c| c.id == camera_id).cloned())
    }

    /// Read-only projection of the facility's cameras, channel order
    pub async fn list_cameras(&self, facility: &str) -> Result<Vec<CameraIdentity>> {
        let config = self.load(facility).await?;
        Ok(config.channels)
    }

    /// Probe recorder reachability
    ///
    /// Reachability is inferred by attempting exactly one capture from the
    /// first camera in the list. An empty camera list is defined as
    /// unreachable without attempting any capture.
    pub async fn check_connectivity(
        &self,
        facility: &str,
        acquirer: &dyn FrameAcquirer,
        timeout: Duration,
    ) -> Result<ConnectivityStatus> {
        let config = self.load(facility).await?;

        let reachable = match config.channels.first() {
            Some(first) => acquirer.acquire(&first.stream_url, timeout).await.is_ok(),
            None => false,
        };

        Ok(ConnectivityStatus {
            nvr_host: config.nvr.host,
            reachable,
            total_cameras: config.channels.len(),
        })
    }

    /// Replace the facility's camera collection, persist-first
    ///
    /// The durable record is written before the in-memory copy is swapped;
    /// a persist failure leaves the memoized config untouched.
    pub async fn replace_channels(
        &self,
        facility: &str,
        channels: Vec<CameraIdentity>,
    ) -> Result<FacilityConfig> {
        let mut config = self.load(facility).await?;
        config.channels = channels;
        config.updated_at = Utc::now();

        self.persist(facility, &config).await?;

        let mut configs = self.configs.write().await;
        configs.insert(facility.to_string(), config.clone());

        tracing::info!(
            facility = %facility,
            cameras = config.channels.len(),
            "Persisted facility config"
        );

        Ok(config)
    }

    /// Write the config atomically: temp file then rename
    async fn persist(&self, facility: &str, config: &FacilityConfig) -> Result<()> {
        let path = self.config_path(facility);
        let parent = path
            .parent()
            .ok_or_else(|| Error::Internal(format!("Bad config path for '{}'", facility)))?;

        fs::create_dir_all(parent).await?;

        let raw = serde_json::to_string_pretty(config)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, raw).await?;
        fs::rename(&tmp, &path).await?;

        Ok(())
    }
}
