//! # process-capture-core
//!
//! Platform-agnostic process-scoped audio capture pipeline.
//!
//! An OS backend implements [`DeviceActivator`] and [`CaptureChannel`];
//! [`CaptureSession`] drives activation, runs the [`CaptureLoop`] on a
//! dedicated thread and hands fixed-size [`AudioChunk`]s to consumers
//! through a drop-oldest [`BoundedAudioQueue`].
//!
//! ## Architecture
//!
//! ```text
//! process-capture-core (this crate)
//! ├── activation/   ← ActivationRendezvous (callback → blocking wait)
//! ├── consumer/     ← AdaptivePoller, Pacing
//! ├── models/       ← AudioChunk, StreamFormat, CaptureTarget, errors, config, metrics
//! ├── processing/   ← BoundedAudioQueue, ChunkAccumulator, sample conversion
//! ├── session/      ← CaptureLoop (producer), CaptureSession (state machine)
//! ├── traits/       ← DeviceActivator, CaptureChannel
//! └── scripted      ← in-memory backend for tests and demos
//! ```

pub mod activation;
pub mod consumer;
pub mod models;
pub mod processing;
pub mod scripted;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use activation::{await_completion, ActivationRendezvous, CompletionResult};
pub use consumer::adaptive_poller::{AdaptivePoller, AdaptivePollerConfig, Pacing, MAX_POLL_INTERVAL};
pub use models::audio_chunk::{AudioChunk, ChunkStatistics};
pub use models::config::{CaptureConfiguration, WaitModePreference, MAX_CHUNK_FRAMES};
pub use models::error::{ActivationError, CaptureError, ChannelError};
pub use models::format::{SampleFormat, StreamFormat};
pub use models::metrics::{CaptureMetrics, CaptureMode, QueueStats};
pub use models::state::SessionState;
pub use models::target::CaptureTarget;
pub use processing::bounded_queue::BoundedAudioQueue;
pub use session::capture_loop::{CaptureLoop, LoopExit, LoopSettings};
pub use session::capture_session::CaptureSession;
pub use traits::capture_channel::{CaptureChannel, Segment};
pub use traits::device_activator::{Activation, ActivationOutcome, ActivationRequest, DeviceActivator};
