use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::audio_chunk::AudioChunk;
use crate::models::metrics::QueueStats;

/// Fixed-capacity FIFO of audio chunks shared between the capture thread
/// and its consumers.
///
/// Overflow behavior: drops the oldest chunk. The producer is tied to a
/// real-time OS buffer and must never wait on a slow consumer.
#[derive(Debug)]
pub struct BoundedAudioQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
    capacity: usize,
}

#[derive(Debug, Default)]
struct QueueInner {
    items: VecDeque<AudioChunk>,
    pushed: u64,
    popped: u64,
    dropped: u64,
    closed: bool,
}

impl BoundedAudioQueue {
    /// A queue holding at most `capacity` chunks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.min(1024)),
                ..Default::default()
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Append a chunk, evicting the oldest one if the queue is full.
    ///
    /// Returns `false` and discards the chunk if the queue is closed.
    pub fn push(&self, chunk: AudioChunk) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }

        if inner.items.len() >= self.capacity {
            inner.items.pop_front();
            inner.dropped += 1;
        }
        inner.items.push_back(chunk);
        inner.pushed += 1;
        drop(inner);

        self.available.notify_one();
        true
    }

    /// Remove up to `max_items` chunks in FIFO order.
    ///
    /// Blocks until at least one chunk is queued, the queue is closed, or
    /// `timeout` elapses. Returns an empty vector on timeout and on a
    /// closed, drained queue.
    pub fn pop_batch(&self, max_items: usize, timeout: Duration) -> Vec<AudioChunk> {
        if max_items == 0 {
            return Vec::new();
        }

        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.inner.lock();
        while inner.items.is_empty() && !inner.closed {
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut inner, deadline).timed_out() {
                        break;
                    }
                }
                None => self.available.wait(&mut inner),
            }
        }

        Self::take(&mut inner, max_items)
    }

    /// Pop a single chunk, waiting at most `timeout`.
    pub fn pop(&self, timeout: Duration) -> Option<AudioChunk> {
        self.pop_batch(1, timeout).into_iter().next()
    }

    /// Remove everything currently queued without waiting.
    pub fn drain(&self) -> Vec<AudioChunk> {
        let mut inner = self.inner.lock();
        Self::take(&mut inner, usize::MAX)
    }

    /// Stop accepting pushes and wake every waiting consumer.
    ///
    /// Chunks already queued stay available to `pop_batch`.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Empty the queue, zero its counters and reopen it for a new session.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        *inner = QueueInner::default();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            pushed: inner.pushed,
            popped: inner.popped,
            dropped: inner.dropped,
            len: inner.items.len(),
            capacity: self.capacity,
        }
    }

    fn take(inner: &mut QueueInner, max_items: usize) -> Vec<AudioChunk> {
        let count = max_items.min(inner.items.len());
        let batch: Vec<AudioChunk> = inner.items.drain(..count).collect();
        inner.popped += batch.len() as u64;
        batch
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use proptest::prelude::*;

    use super::*;

    fn chunk(sequence: u64) -> AudioChunk {
        AudioChunk::new(vec![sequence as f32; 4], 2, false, sequence)
    }

    fn sequences(batch: &[AudioChunk]) -> Vec<u64> {
        batch.iter().map(AudioChunk::sequence).collect()
    }

    #[test]
    fn fifo_order() {
        let queue = BoundedAudioQueue::new(10);
        for i in 0..5 {
            assert!(queue.push(chunk(i)));
        }

        let batch = queue.pop_batch(10, Duration::from_millis(10));
        assert_eq!(sequences(&batch), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn overflow_drops_oldest() {
        let queue = BoundedAudioQueue::new(3);
        for i in 0..4 {
            queue.push(chunk(i)); // A, B, C, D
        }

        let stats = queue.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.len, 3);

        let batch = queue.pop_batch(10, Duration::from_millis(10));
        assert_eq!(sequences(&batch), vec![1, 2, 3]);
    }

    #[test]
    fn pop_batch_respects_max_items() {
        let queue = BoundedAudioQueue::new(10);
        for i in 0..5 {
            queue.push(chunk(i));
        }

        assert_eq!(sequences(&queue.pop_batch(2, Duration::ZERO)), vec![0, 1]);
        assert_eq!(sequences(&queue.pop_batch(2, Duration::ZERO)), vec![2, 3]);
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_batch(0, Duration::ZERO).is_empty());
    }

    #[test]
    fn pop_batch_times_out_empty() {
        let queue = BoundedAudioQueue::new(4);
        let start = Instant::now();
        let batch = queue.pop_batch(4, Duration::from_millis(30));
        assert!(batch.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn closed_queue_returns_remaining_then_empty() {
        let queue = BoundedAudioQueue::new(4);
        queue.push(chunk(0));
        queue.push(chunk(1));
        queue.close();

        assert!(!queue.push(chunk(2)));
        assert_eq!(sequences(&queue.pop_batch(10, Duration::from_secs(1))), vec![0, 1]);

        // Closed and drained: returns immediately rather than waiting.
        let start = Instant::now();
        assert!(queue.pop_batch(10, Duration::from_secs(5)).is_empty());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(queue.stats().pushed, 2);
    }

    #[test]
    fn close_wakes_waiting_consumer() {
        let queue = Arc::new(BoundedAudioQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let start = Instant::now();
                let batch = queue.pop_batch(4, Duration::from_secs(10));
                (batch.len(), start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();

        let (len, waited) = consumer.join().unwrap();
        assert_eq!(len, 0);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn push_wakes_waiting_consumer() {
        let queue = Arc::new(BoundedAudioQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_batch(4, Duration::from_secs(10)))
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(chunk(9));

        assert_eq!(sequences(&consumer.join().unwrap()), vec![9]);
    }

    #[test]
    fn reset_reopens_and_zeroes_counters() {
        let queue = BoundedAudioQueue::new(2);
        for i in 0..3 {
            queue.push(chunk(i));
        }
        queue.close();
        queue.reset();

        assert!(!queue.is_closed());
        assert_eq!(queue.stats(), QueueStats { capacity: 2, ..Default::default() });
        assert!(queue.push(chunk(7)));
    }

    #[test]
    fn concurrent_push_pop_conserves_counts() {
        let queue = Arc::new(BoundedAudioQueue::new(8));
        let total = 5_000u64;

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..total {
                    queue.push(chunk(i));
                }
            })
        };

        let mut received = Vec::new();
        while !producer.is_finished() || !queue.is_empty() {
            received.extend(sequences(&queue.pop_batch(3, Duration::from_millis(1))));
        }
        producer.join().unwrap();
        received.extend(sequences(&queue.drain()));

        let stats = queue.stats();
        assert_eq!(stats.pushed, total);
        assert_eq!(stats.pushed, stats.popped + stats.dropped + stats.len as u64);
        assert_eq!(received.len() as u64, stats.popped);
        // Eviction removes, never reorders.
        assert!(received.windows(2).all(|w| w[0] < w[1]));
    }

    proptest! {
        #[test]
        fn length_never_exceeds_capacity(capacity in 1usize..16, pushes in 0usize..64) {
            let queue = BoundedAudioQueue::new(capacity);
            for i in 0..pushes {
                queue.push(chunk(i as u64));
                prop_assert!(queue.len() <= capacity);
            }

            let stats = queue.stats();
            prop_assert_eq!(stats.dropped, pushes.saturating_sub(capacity) as u64);
            prop_assert_eq!(stats.len, pushes.min(capacity));
        }

        #[test]
        fn survivors_are_the_newest_in_order(capacity in 1usize..16, pushes in 1usize..64) {
            let queue = BoundedAudioQueue::new(capacity);
            for i in 0..pushes {
                queue.push(chunk(i as u64));
            }

            let first = pushes.saturating_sub(capacity) as u64;
            let expected: Vec<u64> = (first..pushes as u64).collect();
            prop_assert_eq!(sequences(&queue.pop_batch(usize::MAX, Duration::ZERO)), expected);
        }
    }
}
