//! FrameAcquirer - Single-Frame Capture from Network Streams
//!
//! ## Responsibilities
//!
//! - Open a stream address, decode exactly one frame, release resources
//! - Bounded timeout on every acquisition attempt
//! - Distinguish connection-level failures from decode failures
//!   (the scanner uses this to detect an unreachable recorder)
//!
//! The production implementation shells out to ffmpeg for RTSP sources
//! and falls back to a plain HTTP GET for http(s) snapshot URLs. The
//! boundary is a trait so tests can substitute scripted outcomes without
//! touching cache, directory, or scanner logic.

use async_trait::async_trait;
use std::time::Duration;

/// One decoded still frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// JPEG image data
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

/// Acquisition failure taxonomy
///
/// Connection-level failures are kept distinct so the channel scanner
/// can short-circuit a scan against a recorder that is down entirely.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AcquireError {
    /// Could not reach the stream endpoint at all
    #[error("connection failed: {0}")]
    Connect(String),

    /// Acquisition did not complete within the timeout
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// Stream opened but no frame could be decoded
    #[error("no frame decoded: {0}")]
    NoFrame(String),
}

impl AcquireError {
    /// True for failures that indicate the endpoint itself is unreachable
    pub fn is_connection(&self) -> bool {
        matches!(self, AcquireError::Connect(_) | AcquireError::Timeout(_))
    }
}

/// Frame acquisition boundary
///
/// Stateless, no retries of its own. Every exit path releases the
/// underlying stream resources.
#[async_trait]
pub trait FrameAcquirer: Send + Sync {
    /// Open `url`, decode one frame within `timeout`, and return it
    async fn acquire(&self, url: &str, timeout: Duration) -> Result<Frame, AcquireError>;
}

/// Production acquirer: ffmpeg for RTSP, reqwest for HTTP snapshot URLs
pub struct FfmpegAcquirer {
    /// HTTP client for http(s) snapshot sources
    client: reqwest::Client,
}

impl FfmpegAcquirer {
    /// Create a new acquirer
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Capture one frame from an RTSP stream using ffmpeg
    ///
    /// Uses kill_on_drop(true) so that when the timeout fires and the
    /// future is cancelled, the Child is dropped and SIGKILL is sent to
    /// the ffmpeg process. This prevents zombie ffmpeg processes from
    /// accumulating when cameras are unresponsive.
    async fn acquire_rtsp(&self, url: &str, timeout: Duration) -> Result<Frame, AcquireError> {
        use std::process::Stdio;
        use tokio::process::Command;

        // -rtsp_transport tcp: TCP for RTSP (more reliable)
        // -frames:v 1: capture only 1 frame
        // -f image2pipe -vcodec mjpeg: output as MJPEG to pipe
        let child = Command::new("ffmpeg")
            .args([
                "-rtsp_transport",
                "tcp",
                "-i",
                url,
                "-frames:v",
                "1",
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "-loglevel",
                "error",
                "-y",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AcquireError::NoFrame(format!("ffmpeg spawn failed: {}", e)))?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(classify_ffmpeg_stderr(stderr.trim()));
                }

                if output.stdout.is_empty() {
                    return Err(AcquireError::NoFrame("ffmpeg returned empty output".into()));
                }

                decode_frame(output.stdout)
            }
            Ok(Err(e)) => Err(AcquireError::NoFrame(format!(
                "ffmpeg execution failed: {}",
                e
            ))),
            Err(_) => {
                tracing::warn!(
                    timeout_sec = timeout.as_secs(),
                    url = %url,
                    "ffmpeg timeout, process killed via kill_on_drop"
                );
                Err(AcquireError::Timeout(timeout.as_secs()))
            }
        }
    }

    /// Capture via HTTP snapshot URL
    async fn acquire_http(&self, url: &str, timeout: Duration) -> Result<Frame, AcquireError> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AcquireError::Timeout(timeout.as_secs())
                } else if e.is_connect() {
                    AcquireError::Connect(e.to_string())
                } else {
                    AcquireError::NoFrame(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(AcquireError::NoFrame(format!(
                "snapshot HTTP error: {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AcquireError::NoFrame(e.to_string()))?;

        decode_frame(bytes.to_vec())
    }
}

impl Default for FfmpegAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameAcquirer for FfmpegAcquirer {
    async fn acquire(&self, url: &str, timeout: Duration) -> Result<Frame, AcquireError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            self.acquire_http(url, timeout).await
        } else {
            self.acquire_rtsp(url, timeout).await
        }
    }
}

/// Classify ffmpeg stderr into a connection or decode failure
fn classify_ffmpeg_stderr(stderr: &str) -> AcquireError {
    const CONNECT_MARKERS: &[&str] = &[
        "Connection refused",
        "Connection timed out",
        "No route to host",
        "Network is unreachable",
        "Name or service not known",
        "Temporary failure in name resolution",
    ];

    if CONNECT_MARKERS.iter().any(|m| stderr.contains(m)) {
        AcquireError::Connect(stderr.to_string())
    } else {
        AcquireError::NoFrame(stderr.to_string())
    }
}

/// Read pixel dimensions off the captured JPEG
fn decode_frame(data: Vec<u8>) -> Result<Frame, AcquireError> {
    let img = image::load_from_memory(&data)
        .map_err(|e| AcquireError::NoFrame(format!("frame decode failed: {}", e)))?;

    Ok(Frame {
        width: img.width(),
        height: img.height(),
        data,
    })
}

#[cfg(test)]
pub mod testing;
