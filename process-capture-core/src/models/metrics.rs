use serde::{Deserialize, Serialize};

/// Wait strategy the capture loop is running with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    EventDriven,
    Polling,
}

/// Snapshot of the bounded queue's counters.
///
/// After quiescence `pushed == popped + dropped + len`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pushed: u64,
    pub popped: u64,
    pub dropped: u64,
    pub len: usize,
    pub capacity: usize,
}

/// Point-in-time view of a capture session.
///
/// Producer counters are read with relaxed atomics, so values taken while
/// capture is running are approximate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetrics {
    pub state: String,
    pub capturing: bool,
    pub mode: Option<CaptureMode>,
    pub frames_captured: u64,
    pub silent_frames: u64,
    pub errors: u64,
    pub queue_len: usize,
    pub pushed: u64,
    pub popped: u64,
    pub dropped: u64,
    pub chunk_size_frames: usize,
    pub elapsed_secs: f64,
    pub frames_per_second: f64,
    pub session_id: Option<String>,
    pub started_at: Option<String>,
    pub last_error: Option<String>,
}

impl CaptureMetrics {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
