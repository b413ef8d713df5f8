//! ChannelScanner - NVR Channel Discovery
//!
//! ## Responsibilities
//!
//! - Probe a recorder's channel address space with a catalogue of vendor
//!   URL patterns, without prior knowledge of the recorder's make
//! - Report the subset of channels that yield a decodable frame, with the
//!   discovered resolution
//! - Short-circuit against a recorder that is down entirely
//!
//! Probes run sequentially on purpose: discovery must not overwhelm the
//! recorder with concurrent connections. Individual channel-test failures
//! are expected (a recorder rarely has all 32 channels populated) and the
//! scan as a whole never fails outright.

use crate::frame_acquirer::FrameAcquirer;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Consecutive connection-level failures before the recorder is declared
/// unreachable and the scan is cut short. Decode failures reset the run.
const UNREACHABLE_AFTER: usize = 12;

/// A channel that answered a probe
///
/// Ephemeral; only the reconciler absorbs these into camera identities.
/// `channel` is set only by quick scan, where one probe maps to one
/// channel number. Full scan tries several patterns per channel, so
/// channel identity is ambiguous there.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelCandidate {
    pub path: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub resolution: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u32>,
}

/// Outcome of a scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    /// Channels that yielded a decodable frame, probe order
    pub channels: Vec<ChannelCandidate>,
    /// Patterns actually tested (smaller than the catalogue when the scan
    /// short-circuited)
    pub tested: usize,
    /// Set when a run of consecutive connection failures cut the scan short
    pub recorder_unreachable: bool,
}

/// Progress callback: (tested, total, found so far)
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize, usize) + Send + Sync);

/// Scans an NVR for live camera channels
pub struct NvrScanner {
    host: String,
    username: String,
    password: String,
    port: u16,
    acquirer: Arc<dyn FrameAcquirer>,
    probe_timeout: Duration,
}

impl NvrScanner {
    /// Create a scanner for one recorder
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        port: u16,
        acquirer: Arc<dyn FrameAcquirer>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            port,
            acquirer,
            probe_timeout,
        }
    }

    /// Generate the exhaustive full-scan probe order
    ///
    /// For each channel 1..=max_channels, one path per known vendor
    /// convention. The ordering is stable: generic numeric first, then the
    /// two commercial NVR schemes at both stream qualities, then fallback
    /// naming conventions.
    pub fn generate_patterns(max_channels: u32) -> Vec<String> {
        let chans = 1..=max_channels;
        let mut patterns = Vec::new();

        // Generic numeric (most common)
        patterns.extend(chans.clone().map(|i| format!("ch{:02}/0", i)));

        // Hikvision, main then sub stream
        patterns.extend(chans.clone().map(|i| format!("Streaming/Channels/{}01", i)));
        patterns.extend(chans.clone().map(|i| format!("Streaming/Channels/{}02", i)));

        // Dahua, main then sub stream
        patterns.extend(
            chans
                .clone()
                .map(|i| format!("cam/realmonitor?channel={}&subtype=0", i)),
        );
        patterns.extend(
            chans
                .clone()
                .map(|i| format!("cam/realmonitor?channel={}&subtype=1", i)),
        );

        // Fallback conventions
        patterns.extend(
            chans
                .clone()
                .map(|i| format!("rtsp/streaming?channel={}&subtype=0", i)),
        );
        patterns.extend(chans.clone().map(|i| format!("channel{}", i)));
        patterns.extend(chans.clone().map(|i| format!("live/ch{:02}", i)));
        patterns.extend(chans.map(|i| format!("stream{}", i)));

        patterns
    }

    /// Compose the full stream address for a channel path
    fn compose_url(&self, path: &str) -> String {
        format!(
            "rtsp://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, path
        )
    }

    /// Test whether a channel path yields a decodable frame
    ///
    /// Returns (success, width, height); zeros on any failure. Timeout,
    /// refusal, and decode errors are all collapsed to "not found" here.
    pub async fn test_channel(&self, path: &str) -> (bool, u32, u32) {
        match self
            .acquirer
            .acquire(&self.compose_url(path), self.probe_timeout)
            .await
        {
            Ok(frame) => (true, frame.width, frame.height),
            Err(_) => (false, 0, 0),
        }
    }

    /// Full scan: test every generated pattern in order
    ///
    /// O(max_channels x patterns-per-channel) network round-trips, and the
    /// dominant cost of the subsystem. Stops early once a run of
    /// consecutive connection-level failures marks the recorder as down.
    pub async fn scan(&self, max_channels: u32, progress: Option<ProgressFn<'_>>) -> ScanOutcome {
        tracing::info!(host = %self.host, max_channels = max_channels, "Scanning NVR for channels");

        let patterns = Self::generate_patterns(max_channels);
        let total = patterns.len();
        let mut found = Vec::new();
        let mut tested = 0;
        let mut consecutive_connect_failures = 0;
        let mut unreachable = false;

        for path in &patterns {
            tested += 1;

            let url = self.compose_url(path);
            match self.acquirer.acquire(&url, self.probe_timeout).await {
                Ok(frame) => {
                    consecutive_connect_failures = 0;
                    tracing::info!(path = %path, width = frame.width, height = frame.height, "Found channel");
                    found.push(ChannelCandidate {
                        path: path.clone(),
                        url,
                        width: frame.width,
                        height: frame.height,
                        resolution: format!("{}x{}", frame.width, frame.height),
                        channel: None,
                    });
                }
                Err(e) if e.is_connection() => {
                    consecutive_connect_failures += 1;
                }
                Err(_) => {
                    // Decode failure: the recorder answered, just not with video
                    consecutive_connect_failures = 0;
                }
            }

            if let Some(cb) = progress {
                cb(tested, total, found.len());
            }

            if consecutive_connect_failures >= UNREACHABLE_AFTER {
                tracing::warn!(
                    host = %self.host,
                    failures = consecutive_connect_failures,
                    tested = tested,
                    "Recorder unreachable, aborting scan"
                );
                unreachable = true;
                break;
            }
        }

        tracing::info!(
            host = %self.host,
            found = found.len(),
            tested = tested,
            "Scan complete"
        );

        ScanOutcome {
            channels: found,
            tested,
            recorder_unreachable: unreachable,
        }
    }

    /// Quick scan: one probe per channel using the most common convention
    ///
    /// Strictly faster than a full scan and the default discovery mode.
    /// Results are tagged with the originating channel number.
    pub async fn quick_scan(&self, channel_numbers: &[u32]) -> ScanOutcome {
        tracing::info!(host = %self.host, channels = channel_numbers.len(), "Quick scanning NVR");

        let mut found = Vec::new();
        let mut tested = 0;
        let mut consecutive_connect_failures = 0;
        let mut unreachable = false;

        for &n in channel_numbers {
            tested += 1;

            let path = format!("ch{:02}/0", n);
            let url = self.compose_url(&path);
            match self.acquirer.acquire(&url, self.probe_timeout).await {
                Ok(frame) => {
                    consecutive_connect_failures = 0;
                    tracing::info!(channel = n, width = frame.width, height = frame.height, "Found channel");
                    found.push(ChannelCandidate {
                        path,
                        url,
                        width: frame.width,
                        height: frame.height,
                        resolution: format!("{}x{}", frame.width, frame.height),
                        channel: Some(n),
                    });
                }
                Err(e) if e.is_connection() => {
                    consecutive_connect_failures += 1;
                }
                Err(_) => {
                    consecutive_connect_failures = 0;
                }
            }

            if consecutive_connect_failures >= UNREACHABLE_AFTER {
                tracing::warn!(host = %self.host, tested = tested, "Recorder unreachable, aborting quick scan");
                unreachable = true;
                break;
            }
        }

        tracing::info!(host = %self.host, found = found.len(), "Quick scan complete");

        ScanOutcome {
            channels: found,
            tested,
            recorder_unreachable: unreachable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_acquirer::testing::ScriptedAcquirer;
    use crate::frame_acquirer::{AcquireError, Frame};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scanner(acquirer: ScriptedAcquirer) -> NvrScanner {
        NvrScanner::new(
            "10.0.0.5",
            "admin",
            "",
            554,
            Arc::new(acquirer),
            Duration::from_millis(50),
        )
    }

    #[test]
    fn test_generate_patterns_order_and_count() {
        let patterns = NvrScanner::generate_patterns(4);

        // 9 conventions per channel
        assert_eq!(patterns.len(), 4 * 9);
        assert_eq!(patterns[0], "ch01/0");
        assert_eq!(patterns[3], "ch04/0");
        assert_eq!(patterns[4], "Streaming/Channels/101");
        assert!(patterns.contains(&"cam/realmonitor?channel=2&subtype=1".to_string()));
        assert_eq!(patterns.last().unwrap(), "stream4");
    }

    #[test]
    fn test_generate_patterns_is_deterministic() {
        assert_eq!(
            NvrScanner::generate_patterns(16),
            NvrScanner::generate_patterns(16)
        );
    }

    #[tokio::test]
    async fn test_quick_scan_tags_answering_channel() {
        // Recorder only answers on channel 2
        let acquirer = ScriptedAcquirer::new(|url| {
            if url.contains("/ch02/0") {
                Ok(Frame::stub(1280, 720))
            } else {
                Err(AcquireError::NoFrame("no such channel".into()))
            }
        });

        let outcome = scanner(acquirer).quick_scan(&[1, 2, 3]).await;

        assert_eq!(outcome.channels.len(), 1);
        assert_eq!(outcome.channels[0].channel, Some(2));
        assert_eq!(outcome.channels[0].resolution, "1280x720");
        assert!(!outcome.recorder_unreachable);
        assert_eq!(outcome.tested, 3);
    }

    #[tokio::test]
    async fn test_full_scan_collects_without_channel_tags() {
        let acquirer = ScriptedAcquirer::new(|url| {
            if url.contains("ch01/0") {
                Ok(Frame::stub(1920, 1080))
            } else {
                Err(AcquireError::NoFrame("no such channel".into()))
            }
        });

        let outcome = scanner(acquirer).scan(2, None).await;

        assert_eq!(outcome.channels.len(), 1);
        assert_eq!(outcome.channels[0].path, "ch01/0");
        assert!(outcome.channels.iter().all(|c| c.channel.is_none()));
        assert!(!outcome.recorder_unreachable);
    }

    #[tokio::test]
    async fn test_scan_empty_result_is_not_an_error() {
        let acquirer = ScriptedAcquirer::failing(AcquireError::NoFrame("dark".into()));
        let outcome = scanner(acquirer).scan(2, None).await;

        assert!(outcome.channels.is_empty());
        assert!(!outcome.recorder_unreachable);
        assert_eq!(outcome.tested, 2 * 9);
    }

    #[tokio::test]
    async fn test_scan_short_circuits_on_connection_failures() {
        let acquirer = ScriptedAcquirer::failing(AcquireError::Connect("refused".into()));
        let outcome = scanner(acquirer).scan(32, None).await;

        assert!(outcome.recorder_unreachable);
        assert_eq!(outcome.tested, UNREACHABLE_AFTER);
        assert!(outcome.channels.is_empty());
    }

    #[tokio::test]
    async fn test_decode_failures_reset_the_connection_run() {
        // Alternating connect/decode failures never accumulate a run
        let flip = AtomicUsize::new(0);
        let acquirer = ScriptedAcquirer::new(move |_| {
            if flip.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Err(AcquireError::Connect("refused".into()))
            } else {
                Err(AcquireError::NoFrame("garbled".into()))
            }
        });

        let outcome = scanner(acquirer).scan(3, None).await;
        assert!(!outcome.recorder_unreachable);
        assert_eq!(outcome.tested, 3 * 9);
    }

    #[tokio::test]
    async fn test_scan_reports_progress() {
        let acquirer = ScriptedAcquirer::failing(AcquireError::NoFrame("dark".into()));
        let calls = AtomicUsize::new(0);

        let progress = |tested: usize, total: usize, found: usize| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert!(tested <= total);
            assert_eq!(found, 0);
        };

        let outcome = scanner(acquirer).scan(2, Some(&progress)).await;
        assert_eq!(calls.load(Ordering::SeqCst), outcome.tested);
    }
}
