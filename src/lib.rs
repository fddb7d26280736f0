//! `seqring` - Fixed-capacity sequenced ring buffer
//!
//! A pre-allocated circular buffer for exchanging events between producer and
//! consumer threads without per-event heap allocation and without locks on the
//! fast path. The design follows the LMAX Disruptor pattern: sequence numbers
//! define a global publication order, a sequencer hands out exclusive claims,
//! and gating sequences give producers an explicit backpressure contract so a
//! slot is never overwritten while a lagging consumer still needs it.
//!
//! ## Components
//!
//! - [`RingBuffer`]: owns the slot storage and maps sequences to slots; every
//!   coordination call is delegated to the injected sequencer.
//! - [`Sequence`]: cache-padded atomic sequence counter.
//! - [`Sequencer`]: claim/publish coordination; [`SingleProducerSequencer`]
//!   and [`MultiProducerSequencer`] are the reference implementations.
//! - [`SequenceBarrier`]: consumer-side wait handle with alert-based
//!   cancellation.
//! - [`WaitStrategy`]: pluggable consumer waiting (busy-spin, yield, sleep,
//!   condition-based blocking).
//!
//! ## Quick start
//!
//! ```rust
//! use seqring::{DefaultEventFactory, RingBuffer, YieldingWaitStrategy};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct Tick {
//!     value: i64,
//! }
//!
//! let factory = DefaultEventFactory::<Tick>::new();
//! let buffer = RingBuffer::with_single_producer(
//!     factory,
//!     1024, // must be a power of two
//!     Arc::new(YieldingWaitStrategy::new()),
//! )
//! .unwrap();
//!
//! // Producer side: claim, write, publish.
//! let seq = buffer.next();
//! unsafe {
//!     (*buffer.get_mut_unchecked(seq)).value = 42;
//! }
//! buffer.publish(seq);
//!
//! // Consumer side: wait, read, advance a gating sequence.
//! let barrier = buffer.new_barrier();
//! let available = barrier.wait_for(seq).unwrap();
//! assert!(available >= seq);
//! assert_eq!(buffer.get(seq).value, 42);
//! ```
//!
//! Events are pre-allocated eagerly at construction, so the steady-state
//! claim/write/publish/consume cycle performs no allocation at all.

pub mod barrier;
pub mod event_factory;
pub mod ring_buffer;
pub mod sequence;
pub mod sequencer;
pub mod wait_strategy;


pub use barrier::{ProcessingSequenceBarrier, SequenceBarrier};
pub use event_factory::{ClosureEventFactory, DefaultEventFactory, EventFactory};
pub use ring_buffer::RingBuffer;
pub use sequence::Sequence;
pub use sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
pub use wait_strategy::{
    BlockingWaitStrategy, BusySpinWaitStrategy, SleepingWaitStrategy, WaitStrategy,
    YieldingWaitStrategy,
};

/// The value a sequence holds before anything has been claimed or published.
/// The first claimed sequence is therefore `0`.
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Errors surfaced by the ring buffer and its collaborators
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    /// Construction-time configuration error; never recoverable.
    #[error("buffer size must be a power of two and >= 1, got: {0}")]
    InvalidBufferSize(usize),

    /// Non-blocking claim found no free slot. Recoverable: the caller decides
    /// whether to drop, retry or redirect.
    #[error("insufficient capacity to claim the requested sequence(s)")]
    InsufficientCapacity,

    /// A barrier wait was cancelled via `alert()`, typically during consumer
    /// shutdown. Distinct from a normal "sequence available" return.
    #[error("sequence barrier alerted")]
    Alerted,
}

pub type Result<T> = std::result::Result<T, RingError>;

/// Check whether `n` is a power of two (and non-zero).
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_power_of_two() {
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(2));
        assert!(is_power_of_two(4));
        assert!(is_power_of_two(1024));

        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(3));
        assert!(!is_power_of_two(6));
        assert!(!is_power_of_two(1023));
    }

    #[test]
    fn test_error_display() {
        assert!(RingError::InvalidBufferSize(7).to_string().contains('7'));
        assert!(!RingError::InsufficientCapacity.to_string().is_empty());
        assert!(!RingError::Alerted.to_string().is_empty());
    }
}
