use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
enum Slot<T> {
    Pending,
    Done(T),
    Taken,
}

/// One-shot hand-off from an OS completion callback to a blocked caller.
///
/// The callback side calls [`complete`](Self::complete) from whatever thread
/// the OS chooses; the caller blocks in [`wait`](Self::wait) on the paired
/// condition variable until the slot is filled or the timeout elapses.
#[derive(Debug)]
pub struct ActivationRendezvous<T> {
    slot: Mutex<Slot<T>>,
    done: Condvar,
}

impl<T: Send> ActivationRendezvous<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot::Pending),
            done: Condvar::new(),
        })
    }

    /// Record the outcome and wake the waiter.
    ///
    /// Only the first completion is kept; later calls return `false`.
    pub fn complete(&self, value: T) -> bool {
        let mut slot = self.slot.lock();
        if !matches!(*slot, Slot::Pending) {
            return false;
        }
        *slot = Slot::Done(value);
        drop(slot);

        self.done.notify_all();
        true
    }

    /// Block until completed, returning `None` on timeout.
    ///
    /// The value is moved out; a second `wait` after success returns `None`.
    pub fn wait(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.slot.lock();
        while matches!(*slot, Slot::Pending) {
            match deadline {
                Some(deadline) => {
                    if self.done.wait_until(&mut slot, deadline).timed_out() {
                        break;
                    }
                }
                None => self.done.wait(&mut slot),
            }
        }

        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Done(value) => Some(value),
            Slot::Pending => {
                // Timed out: keep accepting (and ignoring) a late completion.
                *slot = Slot::Pending;
                None
            }
            Slot::Taken => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        !matches!(*self.slot.lock(), Slot::Pending)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn completion_from_another_thread_wakes_waiter() {
        let rendezvous = ActivationRendezvous::new();
        let completer = {
            let rendezvous = Arc::clone(&rendezvous);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                rendezvous.complete(42u32)
            })
        };

        assert_eq!(rendezvous.wait(Duration::from_secs(5)), Some(42));
        assert!(completer.join().unwrap());
    }

    #[test]
    fn completion_before_wait_is_not_lost() {
        let rendezvous = ActivationRendezvous::new();
        assert!(rendezvous.complete("ready"));
        assert_eq!(rendezvous.wait(Duration::from_millis(1)), Some("ready"));
    }

    #[test]
    fn wait_times_out_without_completion() {
        let rendezvous = ActivationRendezvous::<u8>::new();
        let start = Instant::now();
        assert_eq!(rendezvous.wait(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(25));
        assert!(!rendezvous.is_completed());
    }

    #[test]
    fn only_first_completion_counts() {
        let rendezvous = ActivationRendezvous::new();
        assert!(rendezvous.complete(1));
        assert!(!rendezvous.complete(2));
        assert_eq!(rendezvous.wait(Duration::ZERO), Some(1));
        assert_eq!(rendezvous.wait(Duration::ZERO), None);
    }
}
