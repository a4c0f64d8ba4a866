//! Deterministic in-memory backend.
//!
//! `ScriptedActivator` and `ScriptedChannel` stand in for the OS audio
//! subsystem: segments, transient and fatal failures are queued on a
//! [`ScriptHandle`] and replayed to the capture loop in order. Activation
//! goes through the real [`ActivationRendezvous`], completed from a helper
//! thread the way an OS callback would be.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::activation::{await_completion, ActivationRendezvous, CompletionResult};
use crate::models::error::{ActivationError, ChannelError};
use crate::models::format::{SampleFormat, StreamFormat};
use crate::processing::sample_convert;
use crate::traits::capture_channel::{CaptureChannel, Segment};
use crate::traits::device_activator::{Activation, ActivationOutcome, ActivationRequest, DeviceActivator};

/// One scripted event, consumed in order by the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Segment { data: Vec<u8>, frames: u32, silent: bool },
    /// Reported once by the next `frames_available` call.
    Transient(String),
    /// Reported by every `frames_available` call from then on.
    Fatal(String),
}

#[derive(Debug, Default)]
struct ScriptInner {
    steps: VecDeque<ScriptStep>,
    released_frames: u64,
    start_calls: u32,
    stop_calls: u32,
    attached: bool,
    fail_next_start: Option<String>,
}

#[derive(Debug, Default)]
struct ScriptState {
    inner: Mutex<ScriptInner>,
    ready: Condvar,
}

/// Shared, cloneable handle used to feed and observe a scripted channel.
#[derive(Debug, Clone, Default)]
pub struct ScriptHandle {
    state: Arc<ScriptState>,
}

impl ScriptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: ScriptStep) {
        self.state.inner.lock().steps.push_back(step);
        self.state.ready.notify_all();
    }

    /// Queue a segment with raw bytes exactly as the OS would hand them over.
    pub fn push_raw(&self, data: Vec<u8>, frames: u32, silent: bool) {
        self.push(ScriptStep::Segment { data, frames, silent });
    }

    /// Queue interleaved samples encoded in `format`.
    pub fn push_samples(&self, format: SampleFormat, samples: &[f32], channels: u16, silent: bool) {
        let frames = (samples.len() / channels.max(1) as usize) as u32;
        self.push_raw(sample_convert::encode(format, samples), frames, silent);
    }

    /// Queue `frames` f32 frames all holding `value`.
    pub fn push_constant(&self, frames: u32, channels: u16, value: f32, silent: bool) {
        let samples = vec![value; frames as usize * channels as usize];
        self.push_samples(SampleFormat::F32, &samples, channels, silent);
    }

    pub fn push_transient_error(&self, message: &str) {
        self.push(ScriptStep::Transient(message.into()));
    }

    pub fn push_fatal_error(&self, message: &str) {
        self.push(ScriptStep::Fatal(message.into()));
    }

    /// Make the next `CaptureChannel::start` fail.
    pub fn fail_next_start(&self, message: &str) {
        self.state.inner.lock().fail_next_start = Some(message.into());
    }

    /// Drop every step not yet consumed.
    pub fn clear(&self) {
        self.state.inner.lock().steps.clear();
    }

    pub fn released_frames(&self) -> u64 {
        self.state.inner.lock().released_frames
    }

    pub fn start_calls(&self) -> u32 {
        self.state.inner.lock().start_calls
    }

    pub fn stop_calls(&self) -> u32 {
        self.state.inner.lock().stop_calls
    }

    pub fn thread_attached(&self) -> bool {
        self.state.inner.lock().attached
    }
}

/// A capture channel replaying a script.
#[derive(Debug)]
pub struct ScriptedChannel {
    script: ScriptHandle,
    format: StreamFormat,
    event_wait: bool,
    current: Option<(Vec<u8>, u32, bool)>,
}

impl ScriptedChannel {
    pub fn new(script: ScriptHandle, format: StreamFormat, event_wait: bool) -> Self {
        Self {
            script,
            format,
            event_wait,
            current: None,
        }
    }
}

impl CaptureChannel for ScriptedChannel {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn supports_event_wait(&self) -> bool {
        self.event_wait
    }

    fn start(&mut self) -> Result<(), ChannelError> {
        let mut inner = self.script.state.inner.lock();
        inner.start_calls += 1;
        match inner.fail_next_start.take() {
            Some(message) => Err(ChannelError::Fatal(message)),
            None => Ok(()),
        }
    }

    fn stop(&mut self) -> Result<(), ChannelError> {
        self.script.state.inner.lock().stop_calls += 1;
        Ok(())
    }

    fn attach_thread(&mut self) {
        self.script.state.inner.lock().attached = true;
    }

    fn frames_available(&mut self) -> Result<u32, ChannelError> {
        let mut inner = self.script.state.inner.lock();
        loop {
            match inner.steps.front() {
                None => return Ok(0),
                Some(ScriptStep::Segment { frames: 0, .. }) => {
                    inner.steps.pop_front();
                }
                Some(ScriptStep::Segment { frames, .. }) => return Ok(*frames),
                Some(ScriptStep::Fatal(message)) => return Err(ChannelError::Fatal(message.clone())),
                Some(ScriptStep::Transient(_)) => {
                    if let Some(ScriptStep::Transient(message)) = inner.steps.pop_front() {
                        return Err(ChannelError::Transient(message));
                    }
                }
            }
        }
    }

    fn wait_for_frames(&mut self, timeout: Duration) -> Result<bool, ChannelError> {
        let state = &self.script.state;
        let mut inner = state.inner.lock();
        if inner.steps.is_empty() {
            state.ready.wait_for(&mut inner, timeout);
        }
        Ok(!inner.steps.is_empty())
    }

    fn read_segment(&mut self) -> Result<Segment<'_>, ChannelError> {
        let step = {
            let mut inner = self.script.state.inner.lock();
            match inner.steps.front() {
                Some(ScriptStep::Segment { .. }) => inner.steps.pop_front(),
                _ => None,
            }
        };

        let Some(ScriptStep::Segment { data, frames, silent }) = step else {
            return Err(ChannelError::Transient("no segment ready".into()));
        };

        let (data, frames, silent) = self.current.insert((data, frames, silent));
        Ok(Segment {
            data: data.as_slice(),
            frames: *frames,
            silent: *silent,
        })
    }

    fn release_segment(&mut self, frames: u32) -> Result<(), ChannelError> {
        if self.current.take().is_none() {
            return Err(ChannelError::Transient("release without an outstanding segment".into()));
        }
        self.script.state.inner.lock().released_frames += frames as u64;
        Ok(())
    }
}

/// How a scripted activation completes.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivationBehavior {
    /// Deliver a channel replaying the shared script.
    Succeed,
    /// The completion callback reports this failure.
    Fail(ActivationError),
    /// The completion callback delivers a null channel.
    CompleteWithNull,
    /// The completion callback never fires.
    NeverComplete,
}

/// Activator handing out [`ScriptedChannel`]s.
#[derive(Debug)]
pub struct ScriptedActivator {
    script: ScriptHandle,
    behavior: ActivationBehavior,
    device_format: StreamFormat,
    event_capable: bool,
    completion_delay: Duration,
    requests: Vec<ActivationRequest>,
}

impl ScriptedActivator {
    pub fn new(script: ScriptHandle) -> Self {
        Self {
            script,
            behavior: ActivationBehavior::Succeed,
            device_format: StreamFormat::new(44_100, 2, SampleFormat::I16),
            event_capable: true,
            completion_delay: Duration::from_millis(1),
            requests: Vec::new(),
        }
    }

    pub fn with_behavior(mut self, behavior: ActivationBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Format reported by the emulated output device for system-wide capture.
    pub fn with_device_format(mut self, format: StreamFormat) -> Self {
        self.device_format = format;
        self
    }

    /// Hand out channels that can only be polled.
    pub fn without_events(mut self) -> Self {
        self.event_capable = false;
        self
    }

    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay = delay;
        self
    }

    pub fn set_behavior(&mut self, behavior: ActivationBehavior) {
        self.behavior = behavior;
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> &[ActivationRequest] {
        &self.requests
    }
}

impl DeviceActivator for ScriptedActivator {
    fn activate(&mut self, request: &ActivationRequest) -> ActivationOutcome {
        self.requests.push(request.clone());

        let format = if request.target.is_system_wide() {
            self.device_format
        } else {
            request.process_format
        };

        let delivery: Option<CompletionResult<ScriptedChannel>> = match &self.behavior {
            ActivationBehavior::Succeed => Some(Ok(Some(ScriptedChannel::new(
                self.script.clone(),
                format,
                self.event_capable && request.event_driven,
            )))),
            ActivationBehavior::Fail(err) => Some(Err(err.clone())),
            ActivationBehavior::CompleteWithNull => Some(Ok(None)),
            ActivationBehavior::NeverComplete => None,
        };

        let rendezvous = ActivationRendezvous::new();
        if let Some(result) = delivery {
            let rendezvous = Arc::clone(&rendezvous);
            let delay = self.completion_delay;
            thread::Builder::new()
                .name("scripted-activation".into())
                .spawn(move || {
                    thread::sleep(delay);
                    rendezvous.complete(result);
                })
                .map_err(|e| ActivationError::SubsystemCall(e.to_string()))?;
        }

        let channel = await_completion(&rendezvous, request.timeout)?;
        Ok(Activation {
            channel: Box::new(channel),
            format,
        })
    }
}
