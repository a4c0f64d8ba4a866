use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::audio_chunk::AudioChunk;
use crate::models::config::{CaptureConfiguration, WaitModePreference};
use crate::models::error::CaptureError;
use crate::models::format::StreamFormat;
use crate::models::metrics::{CaptureMetrics, CaptureMode};
use crate::models::state::SessionState;
use crate::models::target::CaptureTarget;
use crate::processing::bounded_queue::BoundedAudioQueue;
use crate::session::capture_loop::{CaptureLoop, LoopExit, LoopSettings};
use crate::session::shared::CaptureShared;
use crate::traits::device_activator::{Activation, ActivationRequest, DeviceActivator};

/// Details of the current (or most recent) capture run.
#[derive(Debug, Clone)]
struct RunInfo {
    session_id: Uuid,
    target: CaptureTarget,
    format: StreamFormat,
    mode: CaptureMode,
    started_at: DateTime<Utc>,
    started: Instant,
    stopped: Option<Instant>,
}

impl RunInfo {
    fn elapsed(&self) -> Duration {
        self.stopped.unwrap_or_else(Instant::now).duration_since(self.started)
    }
}

/// Owns one capture pipeline: activation, the producer thread, the queue.
///
/// Generic over the OS boundary through [`DeviceActivator`]:
/// ```text
/// start(target) → [DeviceActivator] → CaptureChannel
///                                        ↓ (capture thread)
///                                   [CaptureLoop] → [BoundedAudioQueue] → pop_batch()/drain()
/// ```
///
/// A session can be restarted after it stops or fails. Dropping it stops
/// capture and joins the producer thread.
pub struct CaptureSession<A: DeviceActivator> {
    activator: A,
    config: CaptureConfiguration,
    queue: Arc<BoundedAudioQueue>,
    shared: Arc<CaptureShared>,
    capture_handle: Option<thread::JoinHandle<LoopExit>>,
    run: Option<RunInfo>,
}

impl<A: DeviceActivator> CaptureSession<A> {
    pub fn new(activator: A, config: CaptureConfiguration) -> Self {
        let queue = Arc::new(BoundedAudioQueue::new(config.queue_capacity));
        Self {
            activator,
            config,
            queue,
            shared: Arc::new(CaptureShared::new()),
            capture_handle: None,
            run: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.state().is_capturing()
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    pub fn activator(&self) -> &A {
        &self.activator
    }

    pub fn activator_mut(&mut self) -> &mut A {
        &mut self.activator
    }

    /// Format delivered by the current or last run.
    pub fn format(&self) -> Option<StreamFormat> {
        self.run.as_ref().map(|r| r.format)
    }

    pub fn target(&self) -> Option<&CaptureTarget> {
        self.run.as_ref().map(|r| &r.target)
    }

    pub fn mode(&self) -> Option<CaptureMode> {
        self.run.as_ref().map(|r| r.mode)
    }

    /// Identifier assigned at the last `start`.
    pub fn session_id(&self) -> Option<Uuid> {
        self.run.as_ref().map(|r| r.session_id)
    }

    /// Replace the whole configuration. Only valid while no capture is in
    /// progress (`Idle`, `Stopped` or `Failed`).
    pub fn configure(&mut self, config: CaptureConfiguration) -> Result<(), CaptureError> {
        let state = self.shared.state();
        if !state.is_at_rest() {
            return Err(CaptureError::InvalidState(format!(
                "cannot configure while {}",
                state.label()
            )));
        }
        config.validate().map_err(CaptureError::InvalidConfiguration)?;

        self.reap_thread();
        if config.queue_capacity != self.queue.capacity() {
            self.queue = Arc::new(BoundedAudioQueue::new(config.queue_capacity));
        }
        log::debug!(
            "session configured: {} frames/chunk, queue capacity {}",
            config.chunk_size_frames,
            config.queue_capacity
        );
        self.config = config;
        Ok(())
    }

    /// Change only the chunk size, with the same state rules as `configure`.
    pub fn set_chunk_size(&mut self, chunk_size_frames: usize) -> Result<(), CaptureError> {
        let config = CaptureConfiguration {
            chunk_size_frames,
            ..self.config.clone()
        };
        self.configure(config)
    }

    /// Start capturing `target`.
    ///
    /// Blocks for at most the activation timeout. On failure no thread is
    /// left running, no channel is held, and the state is `Failed`.
    pub fn start(&mut self, target: CaptureTarget) -> Result<(), CaptureError> {
        let state = self.shared.state();
        if !state.is_at_rest() {
            return Err(CaptureError::InvalidState(format!(
                "cannot start while {}",
                state.label()
            )));
        }
        self.config.validate().map_err(CaptureError::InvalidConfiguration)?;
        self.reap_thread();

        let session_id = Uuid::new_v4();
        log::info!("[{}] starting capture of {}", session_id, target);

        self.shared.reset_for_run();
        self.queue.reset();
        self.shared.set_state(SessionState::Activating);

        let request = ActivationRequest {
            target,
            process_format: self.config.process_format,
            timeout: self.config.activation_timeout,
            event_driven: self.config.wait_mode == WaitModePreference::Auto,
        };

        let Activation { mut channel, format } = match self.activator.activate(&request) {
            Ok(activation) => activation,
            Err(err) => {
                log::error!("[{}] activation failed: {}", session_id, err);
                let err = CaptureError::from(err);
                self.shared.set_state(SessionState::Failed(err.clone()));
                return Err(err);
            }
        };

        self.shared.set_state(SessionState::Initializing);

        let mode = if self.config.wait_mode == WaitModePreference::Auto && channel.supports_event_wait() {
            CaptureMode::EventDriven
        } else {
            CaptureMode::Polling
        };
        log::debug!("[{}] activated: {}, {:?}", session_id, format, mode);

        if let Err(err) = channel.start() {
            log::error!("[{}] capture channel failed to start: {}", session_id, err);
            let err = CaptureError::ChannelStart(err.to_string());
            self.shared.set_state(SessionState::Failed(err.clone()));
            return Err(err);
        }

        let settings = LoopSettings {
            chunk_size_frames: self.config.chunk_size_frames,
            mode,
            event_wait_timeout: self.config.event_wait_timeout,
            poll_interval: self.config.poll_interval,
        };
        let capture_loop = CaptureLoop::new(channel, Arc::clone(&self.queue), Arc::clone(&self.shared), settings);

        // Capturing before the thread exists, so a fatal error from the
        // loop can never be overwritten by this thread.
        self.shared.set_state(SessionState::Capturing);

        let spawned = thread::Builder::new()
            .name("process-capture".into())
            .spawn(move || capture_loop.run());

        match spawned {
            Ok(handle) => self.capture_handle = Some(handle),
            Err(e) => {
                log::error!("[{}] failed to spawn capture thread: {}", session_id, e);
                let err = CaptureError::ThreadSpawn(e.to_string());
                self.shared.set_state(SessionState::Failed(err.clone()));
                return Err(err);
            }
        }

        self.run = Some(RunInfo {
            session_id,
            target,
            format,
            mode,
            started_at: Utc::now(),
            started: Instant::now(),
            stopped: None,
        });
        log::info!("[{}] capturing", session_id);
        Ok(())
    }

    /// Stop capture and join the producer thread.
    ///
    /// The loop flushes its partial chunk before the queue is closed, so
    /// everything captured stays available to `pop_batch`/`drain`.
    /// Calling `stop` again, or before `start`, does nothing.
    pub fn stop(&mut self) {
        let Some(handle) = self.capture_handle.take() else {
            return;
        };

        self.shared.transition(SessionState::is_capturing, SessionState::Stopping);
        self.shared.request_stop();

        match handle.join() {
            Ok(exit) => log::debug!("capture thread joined: {:?}", exit),
            Err(_) => {
                log::error!("capture thread panicked");
                self.shared.fail(CaptureError::Fatal("capture thread panicked".into()));
            }
        }

        self.queue.close();
        self.shared
            .transition(|s| matches!(s, SessionState::Stopping), SessionState::Stopped);

        if let Some(run) = self.run.as_mut() {
            run.stopped = Some(Instant::now());
            log::info!(
                "[{}] stopped after {:.2}s, {} frames",
                run.session_id,
                run.elapsed().as_secs_f64(),
                self.shared.frames_captured()
            );
        }
    }

    /// Up to `max_items` chunks in FIFO order, waiting at most `timeout`
    /// for the first one.
    pub fn pop_batch(&self, max_items: usize, timeout: Duration) -> Vec<AudioChunk> {
        self.queue.pop_batch(max_items, timeout)
    }

    pub fn pop(&self, timeout: Duration) -> Option<AudioChunk> {
        self.queue.pop(timeout)
    }

    /// Everything queued right now, without waiting.
    pub fn drain(&self) -> Vec<AudioChunk> {
        self.queue.drain()
    }

    /// Queue shared with the producer, for consumers on other threads.
    ///
    /// `configure` may replace the queue when its capacity changes, so
    /// fetch a fresh handle after reconfiguring.
    pub fn queue_handle(&self) -> Arc<BoundedAudioQueue> {
        Arc::clone(&self.queue)
    }

    pub fn metrics(&self) -> CaptureMetrics {
        let state = self.shared.state();
        let stats = self.queue.stats();
        let frames_captured = self.shared.frames_captured();

        let elapsed = self.run.as_ref().map(RunInfo::elapsed).unwrap_or_default();
        let elapsed_secs = elapsed.as_secs_f64();
        let frames_per_second = if elapsed_secs > 0.0 {
            frames_captured as f64 / elapsed_secs
        } else {
            0.0
        };

        CaptureMetrics {
            state: state.label().to_string(),
            capturing: state.is_capturing(),
            mode: self.mode(),
            frames_captured,
            silent_frames: self.shared.silent_frames(),
            errors: self.shared.errors(),
            queue_len: stats.len,
            pushed: stats.pushed,
            popped: stats.popped,
            dropped: stats.dropped,
            chunk_size_frames: self.config.chunk_size_frames,
            elapsed_secs,
            frames_per_second,
            session_id: self.run.as_ref().map(|r| r.session_id.to_string()),
            started_at: self.run.as_ref().map(|r| r.started_at.to_rfc3339()),
            last_error: match state {
                SessionState::Failed(err) => Some(err.to_string()),
                _ => None,
            },
        }
    }

    /// Join a producer thread that already exited on its own (fatal error).
    fn reap_thread(&mut self) {
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("capture thread panicked");
            }
        }
    }
}

impl<A: DeviceActivator> Drop for CaptureSession<A> {
    fn drop(&mut self) {
        self.stop();
    }
}
