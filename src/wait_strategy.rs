//! Consumer wait strategies
//!
//! A wait strategy decides how a consumer thread passes the time until a
//! requested sequence becomes visible. The strategies trade CPU usage against
//! wake-up latency: busy-spin burns a core for the lowest latency, yielding
//! and sleeping back off progressively, and the blocking strategy parks on a
//! condition variable until a producer signals.
//!
//! Every strategy re-checks the caller's alert flag on each iteration, so a
//! barrier `alert()` interrupts spinning and blocking waiters alike.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::sequence::{minimum_sequence, Sequence};
use crate::{Result, RingError};

/// Strategy for waiting until a sequence becomes available
pub trait WaitStrategy: Send + Sync + std::fmt::Debug {
    /// Wait until `sequence` is reachable through `cursor` and every
    /// dependent sequence, then return the highest sequence currently known
    /// available (which may exceed the request).
    ///
    /// # Errors
    /// Returns `RingError::Alerted` as soon as `alerted` is observed set.
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64>;

    /// Wake any thread parked inside `wait_for`. Called after every publish
    /// and on alert; a no-op for strategies that never park.
    fn signal_all_when_blocking(&self);
}

/// Highest sequence visible through the cursor and all dependent sequences.
#[inline]
fn available_sequence(cursor: &Sequence, dependent_sequences: &[Arc<Sequence>]) -> i64 {
    let cursor_value = cursor.get();
    minimum_sequence(dependent_sequences, cursor_value).min(cursor_value)
}

/// Busy-spin strategy: lowest latency, one core pegged per waiter
///
/// Only sensible when dedicated cores are available for consumers.
#[derive(Debug, Default)]
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(RingError::Alerted);
            }
            let available = available_sequence(cursor, dependent_sequences);
            if available >= sequence {
                return Ok(available);
            }
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Yielding strategy: spins but hands the core back to the scheduler
#[derive(Debug, Default)]
pub struct YieldingWaitStrategy;

impl YieldingWaitStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(RingError::Alerted);
            }
            let available = available_sequence(cursor, dependent_sequences);
            if available >= sequence {
                return Ok(available);
            }
            thread::yield_now();
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Sleeping strategy: fixed short sleeps between polls
#[derive(Debug)]
pub struct SleepingWaitStrategy {
    sleep_duration: Duration,
}

impl SleepingWaitStrategy {
    pub fn new() -> Self {
        Self {
            sleep_duration: Duration::from_micros(100),
        }
    }

    /// Use a custom poll interval instead of the 100µs default.
    pub fn with_duration(sleep_duration: Duration) -> Self {
        Self { sleep_duration }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(RingError::Alerted);
            }
            let available = available_sequence(cursor, dependent_sequences);
            if available >= sequence {
                return Ok(available);
            }
            thread::sleep(self.sleep_duration);
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Blocking strategy: parks on a condition variable until publish signals
///
/// The most CPU-friendly option. The wait carries a short timeout so a
/// waiter also notices cursor advances published by non-signalling paths.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl BlockingWaitStrategy {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alerted: &AtomicBool,
    ) -> Result<i64> {
        loop {
            if alerted.load(Ordering::Acquire) {
                return Err(RingError::Alerted);
            }
            let available = available_sequence(cursor, dependent_sequences);
            if available >= sequence {
                return Ok(available);
            }

            let mut guard = self.mutex.lock();
            // Recheck under the lock so a signal between the check above and
            // the park below is not lost.
            if available_sequence(cursor, dependent_sequences) >= sequence
                || alerted.load(Ordering::Acquire)
            {
                continue;
            }
            let _timed_out = self
                .condvar
                .wait_for(&mut guard, Duration::from_millis(1));
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategies() -> Vec<Box<dyn WaitStrategy>> {
        vec![
            Box::new(BusySpinWaitStrategy::new()),
            Box::new(YieldingWaitStrategy::new()),
            Box::new(SleepingWaitStrategy::with_duration(Duration::from_micros(10))),
            Box::new(BlockingWaitStrategy::new()),
        ]
    }

    #[test]
    fn test_returns_immediately_when_available() {
        let cursor = Sequence::new(10);
        let alerted = AtomicBool::new(false);

        for strategy in strategies() {
            let available = strategy.wait_for(5, &cursor, &[], &alerted).unwrap();
            assert_eq!(available, 10);
        }
    }

    #[test]
    fn test_dependent_sequences_bound_availability() {
        let cursor = Sequence::new(10);
        let dependents = vec![Arc::new(Sequence::new(6))];
        let alerted = AtomicBool::new(false);

        for strategy in strategies() {
            let available = strategy
                .wait_for(5, &cursor, &dependents, &alerted)
                .unwrap();
            assert_eq!(available, 6);
        }
    }

    #[test]
    fn test_alert_interrupts_wait() {
        let cursor = Arc::new(Sequence::new(0));
        let alerted = Arc::new(AtomicBool::new(false));

        for strategy in [
            Arc::new(BlockingWaitStrategy::new()) as Arc<dyn WaitStrategy>,
            Arc::new(BusySpinWaitStrategy::new()),
        ] {
            let cursor = Arc::clone(&cursor);
            let alerted = Arc::clone(&alerted);
            alerted.store(false, Ordering::Release);

            let waiter = {
                let strategy = Arc::clone(&strategy);
                let cursor = Arc::clone(&cursor);
                let alerted = Arc::clone(&alerted);
                thread::spawn(move || strategy.wait_for(100, &cursor, &[], &alerted))
            };

            thread::sleep(Duration::from_millis(20));
            alerted.store(true, Ordering::Release);
            strategy.signal_all_when_blocking();

            let result = waiter.join().unwrap();
            assert!(matches!(result, Err(RingError::Alerted)));
        }
    }

    #[test]
    fn test_wait_resolves_when_cursor_advances() {
        let strategy = Arc::new(BlockingWaitStrategy::new());
        let cursor = Arc::new(Sequence::new(-1));
        let alerted = Arc::new(AtomicBool::new(false));

        let waiter = {
            let strategy = Arc::clone(&strategy);
            let cursor = Arc::clone(&cursor);
            let alerted = Arc::clone(&alerted);
            thread::spawn(move || strategy.wait_for(3, &cursor, &[], &alerted))
        };

        thread::sleep(Duration::from_millis(10));
        cursor.set(3);
        strategy.signal_all_when_blocking();

        assert_eq!(waiter.join().unwrap().unwrap(), 3);
    }
}
