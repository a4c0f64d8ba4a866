use std::time::Duration;

use crate::models::error::ChannelError;
use crate::models::format::StreamFormat;

/// A read-only view of frames the OS has ready.
///
/// Borrowed from the channel; it must be dropped before the segment is
/// released with [`CaptureChannel::release_segment`].
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    /// Raw interleaved samples in the channel's `format()`.
    /// May be empty or hold garbage when `silent` is set.
    pub data: &'a [u8],
    pub frames: u32,
    /// Set by the OS when the segment should be treated as silence.
    pub silent: bool,
}

/// An activated, initialized capture channel bound to one target.
///
/// Implemented by:
/// - `WasapiChannel` (Windows)
/// - `ScriptedChannel` (in-memory, for tests)
///
/// `format`, `supports_event_wait` and `start` are called by the session
/// before the capture thread exists; everything else runs on that thread.
pub trait CaptureChannel: Send {
    /// Format of the frames delivered in each segment.
    fn format(&self) -> StreamFormat;

    /// Whether `wait_for_frames` blocks on an OS-signaled event.
    fn supports_event_wait(&self) -> bool;

    /// Start the OS stream. Called once, before the capture thread spawns.
    fn start(&mut self) -> Result<(), ChannelError>;

    /// Stop the OS stream. Called by the capture thread as it exits.
    fn stop(&mut self) -> Result<(), ChannelError>;

    /// Per-thread setup (COM apartment, scheduling class) on the capture thread.
    fn attach_thread(&mut self) {}

    /// Frames ready to be read right now (may be zero).
    fn frames_available(&mut self) -> Result<u32, ChannelError>;

    /// Block until the OS signals new frames or `timeout` elapses.
    ///
    /// Returns `true` when signaled.
    fn wait_for_frames(&mut self, timeout: Duration) -> Result<bool, ChannelError>;

    /// View the next ready segment.
    fn read_segment(&mut self) -> Result<Segment<'_>, ChannelError>;

    /// Hand `frames` frames of the last segment back to the OS.
    fn release_segment(&mut self, frames: u32) -> Result<(), ChannelError>;
}
