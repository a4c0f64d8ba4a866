use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::format::StreamFormat;

/// Largest accepted `chunk_size_frames`, about 21 s at 48 kHz.
pub const MAX_CHUNK_FRAMES: usize = 1 << 20;

/// How the capture loop waits when the OS buffer is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitModePreference {
    /// Block on the channel's OS event when it has one, otherwise poll.
    Auto,
    /// Always sleep `poll_interval` between empty reads.
    Polling,
}

/// Configuration for a capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfiguration {
    /// Frames per emitted chunk (default: 480, 10 ms at 48 kHz).
    pub chunk_size_frames: usize,

    /// Maximum chunks held before the oldest is dropped (default: 1000).
    pub queue_capacity: usize,

    /// Upper bound on the activation handshake (default: 5 s).
    pub activation_timeout: Duration,

    /// Event-driven or forced polling (default: `Auto`).
    pub wait_mode: WaitModePreference,

    /// Longest single wait on the channel event, so a stop request is
    /// noticed even when no audio is flowing (default: 100 ms).
    pub event_wait_timeout: Duration,

    /// Sleep between empty reads in polling mode (default: 1 ms).
    pub poll_interval: Duration,

    /// Format requested for process-scoped capture, which cannot negotiate
    /// (default: 48 kHz, stereo, f32). System-wide capture uses the device format.
    pub process_format: StreamFormat,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size_frames == 0 {
            return Err("chunk size must be at least one frame".into());
        }
        if self.chunk_size_frames > MAX_CHUNK_FRAMES {
            return Err(format!(
                "chunk size of {} frames exceeds the limit of {MAX_CHUNK_FRAMES}",
                self.chunk_size_frames
            ));
        }
        if self.queue_capacity == 0 {
            return Err("queue capacity must be at least one chunk".into());
        }
        if self.activation_timeout.is_zero() {
            return Err("activation timeout must be non-zero".into());
        }
        if self.event_wait_timeout.is_zero() {
            return Err("event wait timeout must be non-zero".into());
        }
        self.process_format.validate()
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            chunk_size_frames: 480,
            queue_capacity: 1000,
            activation_timeout: Duration::from_secs(5),
            wait_mode: WaitModePreference::Auto,
            event_wait_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(1),
            process_format: StreamFormat::process_default(),
        }
    }
}
