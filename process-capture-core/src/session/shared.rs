use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::state::SessionState;

/// State shared between a session and its capture thread.
///
/// The counters only ever grow and are read with relaxed ordering; the
/// stop flag uses release/acquire so the loop's final flush happens after
/// it observes the request.
#[derive(Debug, Default)]
pub struct CaptureShared {
    stop_requested: AtomicBool,
    frames_captured: AtomicU64,
    silent_frames: AtomicU64,
    errors: AtomicU64,
    state: Mutex<SessionState>,
}

impl CaptureShared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    pub fn silent_frames(&self) -> u64 {
        self.silent_frames.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Apply `next` only if the current state satisfies `when`.
    pub(crate) fn transition<F>(&self, when: F, next: SessionState) -> bool
    where
        F: FnOnce(&SessionState) -> bool,
    {
        let mut state = self.state.lock();
        if when(&state) {
            *state = next;
            true
        } else {
            false
        }
    }

    /// Move a live session to `Failed`. Sessions already at rest are left alone.
    pub(crate) fn fail(&self, error: CaptureError) -> bool {
        self.transition(|s| !s.is_at_rest(), SessionState::Failed(error))
    }

    pub(crate) fn add_frames(&self, frames: u64, silent: bool) {
        self.frames_captured.fetch_add(frames, Ordering::Relaxed);
        if silent {
            self.silent_frames.fetch_add(frames, Ordering::Relaxed);
        }
    }

    /// Count one transient error, returning the new total.
    pub(crate) fn add_error(&self) -> u64 {
        self.errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Clear the stop flag and counters for a new run.
    pub(crate) fn reset_for_run(&self) {
        self.stop_requested.store(false, Ordering::Release);
        self.frames_captured.store(0, Ordering::Relaxed);
        self.silent_frames.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}
