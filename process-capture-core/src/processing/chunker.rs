use crate::models::audio_chunk::AudioChunk;
use crate::models::config::MAX_CHUNK_FRAMES;
use crate::models::format::SampleFormat;
use crate::processing::sample_convert;

/// Re-blocks irregular OS segments into uniformly sized chunks.
///
/// Frames are written straight into the pending chunk's sample buffer;
/// a chunk is emitted as soon as it holds `chunk_frames` frames.
#[derive(Debug)]
pub struct ChunkAccumulator {
    chunk_frames: usize,
    channels: usize,
    pending: Vec<f32>,
    filled_frames: usize,
    pending_silent: bool,
    next_sequence: u64,
}

impl ChunkAccumulator {
    pub fn new(chunk_frames: usize, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        // Keeps `chunk_frames * channels` representable.
        let chunk_frames = chunk_frames.clamp(1, MAX_CHUNK_FRAMES.min(usize::MAX / channels));
        Self {
            chunk_frames,
            channels,
            pending: vec![0.0; chunk_frames * channels],
            filled_frames: 0,
            pending_silent: true,
            next_sequence: 0,
        }
    }

    /// Append one OS segment of `frames` frames.
    ///
    /// `data` holds the raw samples in `format`. When `silent` is set the
    /// data is not read at all and zeros are written instead. Completed
    /// chunks are handed to `emit` in production order.
    pub fn ingest<F>(&mut self, data: &[u8], format: SampleFormat, frames: usize, silent: bool, mut emit: F)
    where
        F: FnMut(AudioChunk),
    {
        let frame_bytes = self.channels * format.bytes_per_sample();
        let mut consumed = 0;

        while consumed < frames {
            let take = (frames - consumed).min(self.chunk_frames - self.filled_frames);
            let dst_start = self.filled_frames * self.channels;
            let dst = &mut self.pending[dst_start..dst_start + take * self.channels];

            if silent {
                dst.fill(0.0);
            } else {
                let src_start = (consumed * frame_bytes).min(data.len());
                let src_end = ((consumed + take) * frame_bytes).min(data.len());
                sample_convert::decode_into(format, &data[src_start..src_end], dst);
            }

            self.pending_silent &= silent;
            self.filled_frames += take;
            consumed += take;

            if self.filled_frames == self.chunk_frames {
                emit(self.complete());
            }
        }
    }

    /// Emit whatever is pending as a short final chunk.
    pub fn flush(&mut self) -> Option<AudioChunk> {
        if self.filled_frames == 0 {
            return None;
        }
        Some(self.complete())
    }

    /// Throw away pending frames without emitting them.
    pub fn discard(&mut self) -> usize {
        let discarded = self.filled_frames;
        self.filled_frames = 0;
        self.pending_silent = true;
        discarded
    }

    pub fn pending_frames(&self) -> usize {
        self.filled_frames
    }

    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames
    }

    /// Number of chunks emitted so far.
    pub fn emitted(&self) -> u64 {
        self.next_sequence
    }

    fn complete(&mut self) -> AudioChunk {
        let mut samples = std::mem::replace(&mut self.pending, vec![0.0; self.chunk_frames * self.channels]);
        samples.truncate(self.filled_frames * self.channels);

        let chunk = AudioChunk::new(samples, self.channels as u16, self.pending_silent, self.next_sequence);
        self.next_sequence += 1;
        self.filled_frames = 0;
        self.pending_silent = true;
        chunk
    }
}
