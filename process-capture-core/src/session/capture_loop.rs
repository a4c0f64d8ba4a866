use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::error::{CaptureError, ChannelError};
use crate::models::format::StreamFormat;
use crate::models::metrics::CaptureMode;
use crate::processing::bounded_queue::BoundedAudioQueue;
use crate::processing::chunker::ChunkAccumulator;
use crate::session::shared::CaptureShared;
use crate::traits::capture_channel::CaptureChannel;

/// Transient errors are logged on the first occurrence and then every Nth.
const ERROR_LOG_EVERY: u64 = 100;

/// Parameters fixed for the lifetime of one capture loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    pub chunk_size_frames: usize,
    pub mode: CaptureMode,
    pub event_wait_timeout: Duration,
    pub poll_interval: Duration,
}

/// How the capture loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    /// Stop was requested; `flushed_frames` went out in the final short chunk.
    Stopped { flushed_frames: usize },
    /// The channel reported a fatal error; pending frames were discarded.
    Failed(ChannelError),
}

/// The producer: pulls segments from a capture channel, re-blocks them
/// into fixed-size chunks and pushes those onto the queue.
///
/// Runs on a dedicated thread until the shared stop flag is raised or the
/// channel fails fatally. Nothing unwinds out of `run`; every channel error
/// becomes a counter or a state transition.
pub struct CaptureLoop {
    channel: Box<dyn CaptureChannel>,
    queue: Arc<BoundedAudioQueue>,
    shared: Arc<CaptureShared>,
    accumulator: ChunkAccumulator,
    format: StreamFormat,
    settings: LoopSettings,
}

impl CaptureLoop {
    pub fn new(
        channel: Box<dyn CaptureChannel>,
        queue: Arc<BoundedAudioQueue>,
        shared: Arc<CaptureShared>,
        settings: LoopSettings,
    ) -> Self {
        let format = channel.format();
        Self {
            channel,
            queue,
            shared,
            accumulator: ChunkAccumulator::new(settings.chunk_size_frames, format.channels),
            format,
            settings,
        }
    }

    /// Run until stopped or failed. Consumes the loop and its channel.
    pub fn run(mut self) -> LoopExit {
        self.channel.attach_thread();
        log::debug!(
            "capture loop running: {} frames/chunk, {:?}, {}",
            self.settings.chunk_size_frames,
            self.settings.mode,
            self.format
        );

        let exit = loop {
            if self.shared.stop_requested() {
                break self.finish_stopped();
            }

            if let Err(err) = self.step() {
                if err.is_fatal() {
                    break self.finish_failed(err);
                }
                self.record_transient(&err);
                thread::sleep(self.settings.poll_interval);
            }
        };

        if let Err(err) = self.channel.stop() {
            log::warn!("failed to stop capture channel: {}", err);
        }
        log::debug!("capture loop exited: {:?}", exit);
        exit
    }

    /// One pass: wait when the OS has nothing ready, otherwise move one
    /// segment into the accumulator and release it.
    pub(crate) fn step(&mut self) -> Result<(), ChannelError> {
        let available = self.channel.frames_available()?;
        if available == 0 {
            return self.wait_for_data();
        }
        self.transfer_segment()
    }

    fn wait_for_data(&mut self) -> Result<(), ChannelError> {
        match self.settings.mode {
            CaptureMode::EventDriven => {
                self.channel.wait_for_frames(self.settings.event_wait_timeout)?;
            }
            CaptureMode::Polling => thread::sleep(self.settings.poll_interval),
        }
        Ok(())
    }

    fn transfer_segment(&mut self) -> Result<(), ChannelError> {
        let sample_format = self.format.sample_format;
        let block_align = self.format.block_align();
        let queue = &self.queue;

        let segment = self.channel.read_segment()?;
        let frames = segment.frames;
        let silent = segment.silent;
        let data_len = segment.data.len();

        self.accumulator
            .ingest(segment.data, sample_format, frames as usize, silent, |chunk| {
                log::trace!("chunk {} ({} frames)", chunk.sequence(), chunk.frames());
                queue.push(chunk);
            });
        self.shared.add_frames(frames as u64, silent);

        if !silent && data_len < frames as usize * block_align {
            // The missing tail was zero-filled by the converter.
            self.record_transient(&ChannelError::Transient(format!(
                "segment of {} frames carried only {} bytes",
                frames, data_len
            )));
        }

        self.channel.release_segment(frames)
    }

    fn record_transient(&self, err: &ChannelError) {
        let total = self.shared.add_error();
        if total == 1 || total % ERROR_LOG_EVERY == 0 {
            log::warn!("transient capture error (#{}): {}", total, err);
        }
    }

    fn finish_stopped(&mut self) -> LoopExit {
        let flushed_frames = match self.accumulator.flush() {
            Some(chunk) => {
                let frames = chunk.frames();
                self.queue.push(chunk);
                frames
            }
            None => 0,
        };
        log::debug!(
            "stop observed after {} chunks, flushed {} frames",
            self.accumulator.emitted(),
            flushed_frames
        );
        LoopExit::Stopped { flushed_frames }
    }

    fn finish_failed(&mut self, err: ChannelError) -> LoopExit {
        let discarded = self.accumulator.discard();
        log::error!("fatal capture error, discarding {} pending frames: {}", discarded, err);

        self.shared.fail(CaptureError::Fatal(err.to_string()));
        // No further chunks will arrive; wake consumers so they drain what is left.
        self.queue.close();
        LoopExit::Failed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_chunk::AudioChunk;
    use crate::models::format::SampleFormat;
    use crate::models::state::SessionState;
    use crate::scripted::{ScriptHandle, ScriptedChannel};

    const FORMAT: StreamFormat = StreamFormat::new(48_000, 2, SampleFormat::F32);

    fn settings(chunk_size_frames: usize, mode: CaptureMode) -> LoopSettings {
        LoopSettings {
            chunk_size_frames,
            mode,
            event_wait_timeout: Duration::from_millis(5),
            poll_interval: Duration::from_millis(1),
        }
    }

    fn build(chunk_size_frames: usize) -> (CaptureLoop, ScriptHandle, Arc<BoundedAudioQueue>, Arc<CaptureShared>) {
        let script = ScriptHandle::new();
        let channel = ScriptedChannel::new(script.clone(), FORMAT, true);
        let queue = Arc::new(BoundedAudioQueue::new(64));
        let shared = Arc::new(CaptureShared::new());
        shared.set_state(SessionState::Capturing);
        let capture_loop = CaptureLoop::new(
            Box::new(channel),
            Arc::clone(&queue),
            Arc::clone(&shared),
            settings(chunk_size_frames, CaptureMode::EventDriven),
        );
        (capture_loop, script, queue, shared)
    }

    fn frames(chunks: &[AudioChunk]) -> Vec<usize> {
        chunks.iter().map(AudioChunk::frames).collect()
    }

    #[test]
    fn three_segments_make_one_full_chunk_then_partial_on_stop() {
        let (mut capture_loop, script, queue, shared) = build(480);
        script.push_constant(200, 2, 0.1, false);
        script.push_constant(600, 2, 0.2, false);
        script.push_constant(100, 2, 0.3, false);

        for _ in 0..3 {
            capture_loop.step().unwrap();
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(shared.frames_captured(), 900);

        shared.request_stop();
        assert_eq!(capture_loop.run(), LoopExit::Stopped { flushed_frames: 420 });

        let chunks = queue.drain();
        assert_eq!(frames(&chunks), vec![480, 420]);
        assert_eq!(script.released_frames(), 900);
        assert!(script.stop_calls() >= 1);
    }

    #[test]
    fn silent_segment_ignores_source_bytes() {
        let (mut capture_loop, script, queue, shared) = build(4);
        script.push_constant(4, 2, 0.9, true);

        capture_loop.step().unwrap();

        let chunk = queue.pop(Duration::ZERO).unwrap();
        assert!(chunk.is_silent());
        assert!(chunk.samples().iter().all(|&s| s == 0.0));
        assert_eq!(shared.silent_frames(), 4);
    }

    #[test]
    fn empty_buffer_waits_without_producing() {
        let (mut capture_loop, _script, queue, shared) = build(4);
        capture_loop.step().unwrap();
        assert!(queue.is_empty());
        assert_eq!(shared.frames_captured(), 0);
    }

    #[test]
    fn transient_errors_are_counted_and_capture_continues() {
        let (capture_loop, script, queue, shared) = build(4);
        script.push_transient_error("glitch");
        script.push_transient_error("glitch");
        script.push_constant(4, 2, 0.5, false);

        let handle = std::thread::spawn(move || capture_loop.run());
        let chunk = queue.pop(Duration::from_secs(5)).expect("chunk after transient errors");
        assert_eq!(chunk.frames(), 4);

        shared.request_stop();
        assert_eq!(handle.join().unwrap(), LoopExit::Stopped { flushed_frames: 0 });
        assert_eq!(shared.errors(), 2);
        assert_eq!(shared.state(), SessionState::Capturing);
    }

    #[test]
    fn fatal_error_fails_session_and_discards_partial() {
        let (capture_loop, script, queue, shared) = build(480);
        script.push_constant(480, 2, 0.5, false);
        script.push_constant(100, 2, 0.5, false);
        script.push_fatal_error("device invalidated");

        let exit = capture_loop.run();

        assert!(matches!(exit, LoopExit::Failed(ChannelError::Fatal(_))));
        assert!(shared.state().is_failed());
        assert!(queue.is_closed());
        assert_eq!(frames(&queue.drain()), vec![480]);
    }

    #[test]
    fn truncated_segment_is_zero_padded_and_counted() {
        let (mut capture_loop, script, queue, shared) = build(4);
        script.push_raw(vec![0u8; 8], 4, false);

        capture_loop.step().unwrap();

        assert_eq!(shared.errors(), 1);
        let chunk = queue.pop(Duration::ZERO).unwrap();
        assert_eq!(chunk.frames(), 4);
        assert!(chunk.samples().iter().all(|&s| s == 0.0));
        assert!(!chunk.is_silent());
    }

    #[test]
    fn polling_mode_runs_without_events() {
        let script = ScriptHandle::new();
        let channel = ScriptedChannel::new(script.clone(), FORMAT, false);
        let queue = Arc::new(BoundedAudioQueue::new(8));
        let shared = Arc::new(CaptureShared::new());
        let capture_loop = CaptureLoop::new(
            Box::new(channel),
            Arc::clone(&queue),
            Arc::clone(&shared),
            settings(2, CaptureMode::Polling),
        );

        let handle = std::thread::spawn(move || capture_loop.run());
        std::thread::sleep(Duration::from_millis(10));
        script.push_constant(3, 2, 0.25, false);

        let chunk = queue.pop(Duration::from_secs(5)).unwrap();
        assert_eq!(chunk.frames(), 2);

        shared.request_stop();
        assert_eq!(handle.join().unwrap(), LoopExit::Stopped { flushed_frames: 1 });
    }
}
