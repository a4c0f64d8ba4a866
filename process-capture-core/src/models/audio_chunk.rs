use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Floor added before taking logarithms so silence maps to a finite dB value.
const DB_FLOOR: f32 = 1e-10;

/// A fixed-length block of interleaved f32 samples produced by the capture loop.
///
/// Fields are private: a chunk is never mutated after the capture loop
/// builds it, which is what lets it cross from the producer thread to a
/// consumer without any per-chunk locking.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    samples: Box<[f32]>,
    frames: usize,
    channels: u16,
    timestamp: Instant,
    silent: bool,
    sequence: u64,
}

impl AudioChunk {
    /// Build a chunk from interleaved samples.
    ///
    /// `samples.len()` must be a multiple of `channels`; any trailing partial
    /// frame is discarded.
    pub fn new(samples: Vec<f32>, channels: u16, silent: bool, sequence: u64) -> Self {
        let channels = channels.max(1);
        let frames = samples.len() / channels as usize;
        let mut samples = samples;
        samples.truncate(frames * channels as usize);
        Self {
            samples: samples.into_boxed_slice(),
            frames,
            channels,
            timestamp: Instant::now(),
            silent,
            sequence,
        }
    }

    /// Interleaved samples, `frames() * channels()` long.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Monotonic instant at which the chunk was completed.
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// True when every frame came from a segment the OS flagged as silent.
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Position of this chunk in the session's production order.
    ///
    /// Gaps between consecutive received chunks mean drop-oldest eviction.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn duration(&self, sample_rate: u32) -> Duration {
        if sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / sample_rate as f64)
    }

    /// Consume the chunk, returning its interleaved samples.
    pub fn into_samples(self) -> Vec<f32> {
        self.samples.into_vec()
    }

    /// Average all channels of each frame into one mono sample.
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels as usize;
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Convert to 16-bit PCM, clamping out-of-range samples.
    pub fn to_i16(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect()
    }

    /// RMS and peak levels over every sample in the chunk.
    pub fn statistics(&self) -> ChunkStatistics {
        let sum_sq: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = if self.samples.is_empty() {
            0.0
        } else {
            (sum_sq / self.samples.len() as f64).sqrt() as f32
        };
        let peak = self.samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));

        ChunkStatistics {
            rms,
            peak,
            rms_db: 20.0 * (rms + DB_FLOOR).log10(),
            peak_db: 20.0 * (peak + DB_FLOOR).log10(),
            frames: self.frames,
            channels: self.channels,
        }
    }
}

/// Level summary of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkStatistics {
    pub rms: f32,
    pub peak: f32,
    pub rms_db: f32,
    pub peak_db: f32,
    pub frames: usize,
    pub channels: u16,
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn frames_follow_channel_count() {
        let chunk = AudioChunk::new(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 2, false, 0);
        assert_eq!(chunk.frames(), 3);
        assert_eq!(chunk.samples().len(), 6);
    }

    #[test]
    fn trailing_partial_frame_is_dropped() {
        let chunk = AudioChunk::new(vec![0.1, 0.2, 0.3], 2, false, 0);
        assert_eq!(chunk.frames(), 1);
        assert_eq!(chunk.samples(), &[0.1, 0.2]);
        assert_eq!(chunk.into_samples(), vec![0.1, 0.2]);
    }

    #[test]
    fn duration_at_48k() {
        let chunk = AudioChunk::new(vec![0.0; 480 * 2], 2, true, 0);
        assert_eq!(chunk.duration(48_000), Duration::from_millis(10));
        assert_eq!(chunk.duration(0), Duration::ZERO);
    }

    #[test]
    fn to_mono_averages_channels() {
        let chunk = AudioChunk::new(vec![0.2, 0.4, -1.0, 1.0], 2, false, 0);
        let mono = chunk.to_mono();
        assert_relative_eq!(mono[0], 0.3, epsilon = 1e-6);
        assert_relative_eq!(mono[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn to_i16_clamps() {
        let chunk = AudioChunk::new(vec![2.0, -2.0, 0.0, 0.5], 2, false, 0);
        assert_eq!(chunk.to_i16(), vec![i16::MAX, -i16::MAX, 0, 16383]);
    }

    #[test]
    fn statistics_of_constant_signal() {
        let chunk = AudioChunk::new(vec![0.5, -0.5, 0.5, -0.5], 2, false, 0);
        let stats = chunk.statistics();
        assert_relative_eq!(stats.rms, 0.5, epsilon = 1e-6);
        assert_relative_eq!(stats.peak, 0.5, epsilon = 1e-6);
        assert_relative_eq!(stats.peak_db, -6.0206, epsilon = 1e-3);
        assert_eq!(stats.frames, 2);
    }

    #[test]
    fn statistics_of_empty_chunk() {
        let chunk = AudioChunk::new(Vec::new(), 2, true, 0);
        let stats = chunk.statistics();
        assert_eq!(stats.rms, 0.0);
        assert_relative_eq!(stats.rms_db, -200.0, epsilon = 1e-3);
        assert_eq!(stats.frames, 0);
    }
}
