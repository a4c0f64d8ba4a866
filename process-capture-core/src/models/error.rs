use std::time::Duration;

use thiserror::Error;

/// Failure of the activation handshake with the OS audio subsystem.
///
/// Every variant is distinct so the session can tell a timeout apart from
/// a callback-reported failure or a null channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActivationError {
    #[error("audio subsystem unavailable")]
    SubsystemUnavailable,

    #[error("audio subsystem call failed: {0}")]
    SubsystemCall(String),

    #[error("target process {0} not found")]
    TargetNotFound(u32),

    #[error("permission denied")]
    PermissionDenied,

    #[error("process-scoped capture is not supported on this OS version")]
    UnsupportedOsVersion,

    #[error("activation completed with failure: {0}")]
    CompletionFailed(String),

    #[error("activation did not complete within {0:?}")]
    Timeout(Duration),

    #[error("activation completed without a capture channel")]
    NullChannel,

    #[error("unsupported stream format: {0}")]
    UnsupportedFormat(String),

    #[error("unknown activation error: {0}")]
    Unknown(String),
}

/// Failure of a single call on an active capture channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The call failed but the channel is still usable.
    #[error("transient channel error: {0}")]
    Transient(String),

    /// The channel is gone (device invalidated, target exited, ...).
    #[error("fatal channel error: {0}")]
    Fatal(String),
}

impl ChannelError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Errors surfaced by the capture session control surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to start capture channel: {0}")]
    ChannelStart(String),

    #[error("failed to spawn capture thread: {0}")]
    ThreadSpawn(String),

    #[error("capture failed: {0}")]
    Fatal(String),
}
