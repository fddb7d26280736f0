//! Atomic sequence counter
//!
//! A `Sequence` tracks progress through the ring buffer and coordinates
//! producers and consumers. The counter is padded to its own cache line so
//! that hot producer and consumer counters never false-share.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::INITIAL_CURSOR_VALUE;

/// A cache-line padded, atomically updated 64-bit sequence counter
///
/// Reads use acquire ordering and writes use release ordering, so a value
/// observed through `get` carries with it every write made before the
/// corresponding `set`. This is the visibility guarantee the publish
/// protocol is built on.
pub struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    /// Create a sequence with the given initial value.
    pub fn new(initial_value: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(initial_value)),
        }
    }

    /// Read the current value (acquire).
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Store a new value (release).
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Store a new value with a full fence, for the rare spots that need a
    /// StoreLoad barrier.
    #[inline]
    pub fn set_volatile(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Atomically set the value to `new` if the current value equals
    /// `expected`. Returns true on success.
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Atomically add `increment` and return the new value.
    #[inline]
    pub fn add_and_get(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel) + increment
    }

    /// Atomically increment and return the new value.
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence").field("value", &self.get()).finish()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Minimum value across `sequences`, or `default` when the slice is empty.
///
/// Callers pick the empty-set default that matches their context: claim
/// gating uses an unbounded sentinel, capacity accounting uses
/// [`INITIAL_CURSOR_VALUE`].
pub fn minimum_sequence(sequences: &[Arc<Sequence>], default: i64) -> i64 {
    sequences.iter().map(|s| s.get()).min().unwrap_or(default)
}
