//! Warehouse Camera Capture Service
//!
//! On-demand still-image access to surveillance cameras behind a network
//! video recorder, shielding automation agents, dashboards, and
//! calibration tools from the cost of opening a video stream per request.
//!
//! ## Architecture (6 Components)
//!
//! 1. FrameAcquirer - open address, decode one frame, bounded time
//! 2. ImageCache - TTL key/bytes store, expiry-on-read
//! 3. FacilityDirectory - camera identity <-> channel mapping, persisted
//! 4. ChannelScanner - vendor-pattern channel discovery
//! 5. Reconciler - scan results merged into the directory
//! 6. CaptureOrchestrator - composition point with in-flight de-duplication
//!
//! ## Design Principles
//!
//! - The FacilityDirectory is the single source of truth for identities
//! - The acquirer is the only suspension point of consequence; every
//!   acquisition carries a bounded timeout
//! - Readers pay eviction cost; no background sweeps

pub mod capture_orchestrator;
pub mod channel_scanner;
pub mod error;
pub mod facility_directory;
pub mod frame_acquirer;
pub mod image_cache;
pub mod models;
pub mod reconciler;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::{AppConfig, AppState};
