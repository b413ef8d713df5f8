//! Scripted acquirer test double
//!
//! Responds to acquisitions with a caller-supplied function keyed on the
//! requested URL, counts invocations, and can hold each response for a
//! configurable delay (used to exercise in-flight de-duplication).

use super::{AcquireError, Frame, FrameAcquirer};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Responder = Box<dyn Fn(&str) -> Result<Frame, AcquireError> + Send + Sync>;

/// Test double for [`FrameAcquirer`]
pub struct ScriptedAcquirer {
    respond: Responder,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedAcquirer {
    /// Respond per-URL with the given function
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str) -> Result<Frame, AcquireError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always succeed with the same frame
    pub fn always(frame: Frame) -> Self {
        Self::new(move |_| Ok(frame.clone()))
    }

    /// Always fail with the same error
    pub fn failing(err: AcquireError) -> Self {
        Self::new(move |_| Err(err.clone()))
    }

    /// Hold each response for `delay` before returning
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of acquisitions issued so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Frame {
    /// Minimal frame for tests; the payload is opaque to the core
    pub fn stub(width: u32, height: u32) -> Self {
        Self {
            data: b"jpeg-bytes".to_vec(),
            width,
            height,
        }
    }

    /// Stub frame with a distinguishable payload
    pub fn stub_with_data(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            width: 1920,
            height: 1080,
        }
    }
}

#[async_trait]
impl FrameAcquirer for ScriptedAcquirer {
    async fn acquire(&self, url: &str, _timeout: Duration) -> Result<Frame, AcquireError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(url)
    }
}
