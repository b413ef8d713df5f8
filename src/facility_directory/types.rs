//! FacilityDirectory data types
//!
//! Persisted per-facility configuration: recorder connection info plus the
//! stable camera identity collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable camera identity, facility-scoped
///
/// Created and edited only by the reconciler or manual config edits;
/// never deleted automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraIdentity {
    /// Stable short id (e.g. "bagel")
    pub id: String,
    /// Display name
    pub name: String,
    /// Numeric camera number
    pub number: u32,
    /// Physical location label
    pub location: String,
    /// Resolution string, e.g. "1920x1080"
    pub resolution: String,
    /// Recorder channel number this camera currently maps to
    pub channel: u32,
    /// Stream address for frame acquisition
    pub stream_url: String,
}

/// Recorder (NVR) connection info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvrInfo {
    pub host: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_rtsp_port")]
    pub port: u16,
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_rtsp_port() -> u16 {
    554
}

/// Per-facility configuration record
///
/// Channel numbers are unique within `channels`. Rewritten wholesale
/// after every reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityConfig {
    pub nvr: NvrInfo,
    pub channels: Vec<CameraIdentity>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Result of a recorder connectivity probe
#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityStatus {
    pub nvr_host: String,
    pub reachable: bool,
    pub total_cameras: usize,
}
