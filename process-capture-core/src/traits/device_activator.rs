use std::time::Duration;

use crate::models::error::ActivationError;
use crate::models::format::StreamFormat;
use crate::models::target::CaptureTarget;
use crate::traits::capture_channel::CaptureChannel;

/// Everything an activator needs to open a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationRequest {
    pub target: CaptureTarget,
    /// Fixed format requested for process-scoped targets. Ignored for
    /// system-wide capture, which uses the device's own format.
    pub process_format: StreamFormat,
    /// Maximum time to wait for the completion notification.
    pub timeout: Duration,
    /// Ask for an event-signaled channel when the OS can provide one.
    pub event_driven: bool,
}

/// A ready-to-use channel plus the fixed format it delivers.
pub struct Activation {
    pub channel: Box<dyn CaptureChannel>,
    pub format: StreamFormat,
}

impl std::fmt::Debug for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activation")
            .field("format", &self.format)
            .field("event_wait", &self.channel.supports_event_wait())
            .finish()
    }
}

/// Tagged result of the activation handshake.
pub type ActivationOutcome = Result<Activation, ActivationError>;

/// Performs the asynchronous activation handshake with the OS audio
/// subsystem and blocks the caller until it completes or times out.
pub trait DeviceActivator: Send {
    fn activate(&mut self, request: &ActivationRequest) -> ActivationOutcome;
}
