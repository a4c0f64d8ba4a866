//! # process-capture-windows
//!
//! Windows WASAPI backend for process-capture.
//!
//! Provides:
//! - `WasapiActivator`: `DeviceActivator` for process loopback
//!   (`ActivateAudioInterfaceAsync`) and system-wide loopback on the default
//!   render endpoint
//! - `WasapiChannel`: `CaptureChannel` over an initialized capture client,
//!   event-driven when the engine allows it, polled otherwise
//!
//! ## Platform Requirements
//! - Windows 10 build 20348+ / Windows 11 for process loopback
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use process_capture_core::{CaptureConfiguration, CaptureTarget};
//! use process_capture_windows::new_session;
//!
//! let mut session = new_session(CaptureConfiguration::default());
//! session.start(CaptureTarget::process(pid, true))?;
//! let chunks = session.pop_batch(10, std::time::Duration::from_millis(10));
//! ```

#[cfg(target_os = "windows")]
pub mod activation;
#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
mod hresult;
#[cfg(target_os = "windows")]
mod process_watch;
#[cfg(target_os = "windows")]
pub mod wasapi_channel;
#[cfg(target_os = "windows")]
mod wave_format;

#[cfg(target_os = "windows")]
pub use activation::WasapiActivator;
#[cfg(target_os = "windows")]
pub use wasapi_channel::WasapiChannel;

/// A capture session on the WASAPI backend.
#[cfg(target_os = "windows")]
pub fn new_session(
    config: process_capture_core::CaptureConfiguration,
) -> process_capture_core::CaptureSession<WasapiActivator> {
    process_capture_core::CaptureSession::new(WasapiActivator::new(), config)
}
