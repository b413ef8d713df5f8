//! Reconciler - Merge Scan Results into the Facility Directory
//!
//! ## Responsibilities
//!
//! - Absorb scanner candidates into stable camera identities
//! - Preserve operator-assigned identity for channels that still exist
//! - Fabricate placeholder identity for newly discovered channels
//!
//! The reconciled set is exactly the scanned set, re-skinned with
//! preserved metadata where possible: channels present in the old config
//! but absent from the new scan are dropped. Address and resolution
//! always come from the fresh scan. Persistence goes through
//! `FacilityDirectory::replace_channels`, which writes the durable record
//! before swapping the in-memory copy.
//!
//! Concurrent reconciliation of the same facility is not supported;
//! callers must serialize scan-and-update requests per facility.

use crate::channel_scanner::ChannelCandidate;
use crate::error::Result;
use crate::facility_directory::{CameraIdentity, FacilityConfig, FacilityDirectory};
use std::collections::HashMap;
use std::sync::Arc;

/// Placeholder location for channels without operator-assigned metadata
const DEFAULT_LOCATION: &str = "needs configuration";

/// Outcome of a reconciliation run
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub config: FacilityConfig,
    /// Channels that kept their prior identity
    pub preserved: usize,
    /// Channels that received a synthesized placeholder identity
    pub added: usize,
}

/// Merges scan candidates into the facility directory
pub struct Reconciler {
    directory: Arc<FacilityDirectory>,
}

impl Reconciler {
    pub fn new(directory: Arc<FacilityDirectory>) -> Self {
        Self { directory }
    }

    /// Replace a facility's camera collection with the scanned set
    ///
    /// With `preserve_identity`, a candidate whose channel number matches
    /// an existing entry carries forward its id, display name, camera
    /// number, and location. Otherwise (or for channels with no prior
    /// entry) a placeholder identity deterministic in the channel number
    /// is synthesized. Candidates without a channel tag (full-scan mode)
    /// are assigned positional channel numbers in scan order.
    pub async fn update_from_scan(
        &self,
        facility: &str,
        candidates: &[ChannelCandidate],
        preserve_identity: bool,
    ) -> Result<ReconcileOutcome> {
        let existing = self.directory.load(facility).await?;

        let by_channel: HashMap<u32, &CameraIdentity> =
            existing.channels.iter().map(|c| (c.channel, c)).collect();

        let mut channels = Vec::with_capacity(candidates.len());
        let mut preserved = 0;
        let mut added = 0;

        for (i, candidate) in candidates.iter().enumerate() {
            let channel = candidate.channel.unwrap_or(i as u32 + 1);

            let identity = match by_channel.get(&channel) {
                Some(prior) if preserve_identity => {
                    preserved += 1;
                    CameraIdentity {
                        id: prior.id.clone(),
                        name: prior.name.clone(),
                        number: prior.number,
                        location: prior.location.clone(),
                        resolution: candidate.resolution.clone(),
                        channel,
                        stream_url: candidate.url.clone(),
                    }
                }
                _ => {
                    added += 1;
                    CameraIdentity {
                        id: format!("camera_{}", channel),
                        name: format!("Camera {}", channel),
                        number: channel,
                        location: DEFAULT_LOCATION.to_string(),
                        resolution: candidate.resolution.clone(),
                        channel,
                        stream_url: candidate.url.clone(),
                    }
                }
            };

            channels.push(identity);
        }

        let config = self.directory.replace_channels(facility, channels).await?;

        tracing::info!(
            facility = %facility,
            scanned = candidates.len(),
            preserved = preserved,
            added = added,
            "Reconciled facility from scan"
        );

        Ok(ReconcileOutcome {
            config,
            preserved,
            added,
        })
    }
}
