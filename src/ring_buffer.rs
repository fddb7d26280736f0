//! Ring buffer storage and facade
//!
//! The ring buffer owns the pre-allocated slot array and the sequence-to-slot
//! address translation; every coordination concern (claiming, publishing,
//! gating, barriers, capacity) is delegated to the injected sequencer. All
//! slots are created eagerly at construction, so the steady-state
//! claim/write/publish/consume cycle never allocates.

use std::cell::UnsafeCell;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::barrier::SequenceBarrier;
use crate::event_factory::EventFactory;
use crate::sequence::Sequence;
use crate::sequencer::{MultiProducerSequencer, Sequencer, SingleProducerSequencer};
use crate::wait_strategy::WaitStrategy;
use crate::{is_power_of_two, Result, RingError};

/// Fixed-capacity ring of reusable event slots
///
/// `E` is the event type stored in each slot. The buffer maps any sequence
/// `s` to slot `s & (buffer_size - 1)`; the power-of-two size constraint
/// exists exactly so this mask is a valid modulo.
///
/// Writing a slot: only the producer holding the claim for a sequence may
/// write it, through [`RingBuffer::get_mut_unchecked`], and must call
/// [`RingBuffer::publish`] exactly once afterwards. Publishing a sequence
/// whose slot write is not complete, or publishing it twice, is a contract
/// violation with undefined results; it is not runtime-checked.
#[derive(Debug)]
pub struct RingBuffer<E> {
    slots: Box<[UnsafeCell<E>]>,
    index_mask: i64,
    sequencer: Arc<dyn Sequencer>,
}

// SAFETY: slot access is coordinated by the sequencer. A slot is written by
// at most one producer (exclusive claim ranges) and read by consumers only
// after the release/acquire edge of publish, so there are no unsynchronized
// aliasing mutations.
unsafe impl<E: Send + Sync> Send for RingBuffer<E> {}
unsafe impl<E: Send + Sync> Sync for RingBuffer<E> {}

impl<E> RingBuffer<E>
where
    E: Send + Sync,
{
    /// Create a ring buffer over `sequencer`, pre-filling every slot from
    /// `event_factory`.
    ///
    /// # Errors
    /// `RingError::InvalidBufferSize` if the sequencer's buffer size is not
    /// a power of two (which also covers sizes < 1).
    pub fn new<F>(event_factory: F, sequencer: Arc<dyn Sequencer>) -> Result<Self>
    where
        F: EventFactory<E>,
    {
        let buffer_size = sequencer.buffer_size();
        if !is_power_of_two(buffer_size) {
            return Err(RingError::InvalidBufferSize(buffer_size));
        }

        let slots: Box<[UnsafeCell<E>]> = (0..buffer_size)
            .map(|_| UnsafeCell::new(event_factory.new_instance()))
            .collect();
        debug!(buffer_size, "ring buffer slots pre-allocated");

        Ok(Self {
            slots,
            index_mask: (buffer_size - 1) as i64,
            sequencer,
        })
    }

    /// Create a buffer with a [`SingleProducerSequencer`] of `buffer_size`.
    ///
    /// # Errors
    /// `RingError::InvalidBufferSize` if `buffer_size` is not a power of two.
    pub fn with_single_producer<F>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<E>,
    {
        let sequencer = SingleProducerSequencer::new(buffer_size, wait_strategy)?;
        Self::new(event_factory, Arc::new(sequencer))
    }

    /// Create a buffer with a [`MultiProducerSequencer`] of `buffer_size`.
    ///
    /// # Errors
    /// `RingError::InvalidBufferSize` if `buffer_size` is not a power of two.
    pub fn with_multi_producer<F>(
        event_factory: F,
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self>
    where
        F: EventFactory<E>,
    {
        let sequencer = MultiProducerSequencer::new(buffer_size, wait_strategy)?;
        Self::new(event_factory, Arc::new(sequencer))
    }

    /// The slot for `sequence`. The mask makes any sequence a valid index;
    /// the caller is responsible for only reading sequences a barrier has
    /// reported available.
    pub fn get(&self, sequence: i64) -> &E {
        let index = (sequence & self.index_mask) as usize;
        // SAFETY: the mask keeps the index in bounds.
        let slot = unsafe { self.slots.get_unchecked(index) };
        unsafe { &*slot.get() }
    }

    /// Raw write access to the slot for `sequence`.
    ///
    /// # Safety
    /// The caller must hold the claim for `sequence` and must not have
    /// published it yet; this is what guarantees no other reference to the
    /// slot exists while it is written.
    pub unsafe fn get_mut_unchecked(&self, sequence: i64) -> *mut E {
        let index = (sequence & self.index_mask) as usize;
        self.slots.get_unchecked(index).get()
    }

    /// Claim the next sequence, blocking while the buffer is full under the
    /// current gating sequences.
    pub fn next(&self) -> i64 {
        self.sequencer.next()
    }

    /// Claim the next `n` contiguous sequences (blocking) and return the
    /// highest of the range.
    ///
    /// # Panics
    /// Panics if `n < 1` (contract violation).
    pub fn next_n(&self, n: i64) -> i64 {
        self.sequencer.next_n(n)
    }

    /// Claim the next sequence without blocking.
    ///
    /// # Errors
    /// `RingError::InsufficientCapacity`. Never swallowed; the caller
    /// applies its own backpressure policy.
    pub fn try_next(&self) -> Result<i64> {
        self.sequencer.try_next()
    }

    /// Claim the next `n` contiguous sequences without blocking.
    ///
    /// # Errors
    /// `RingError::InsufficientCapacity` when fewer than `n` slots are free.
    ///
    /// # Panics
    /// Panics if `n < 1` (contract violation).
    pub fn try_next_n(&self, n: i64) -> Result<i64> {
        self.sequencer.try_next_n(n)
    }

    /// Make `sequence` visible to consumers. Call exactly once per claimed
    /// sequence, after the slot write is complete.
    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// Make the contiguous claimed range `lo..=hi` visible to consumers.
    pub fn publish_range(&self, lo: i64, hi: i64) {
        self.sequencer.publish_range(lo, hi);
    }

    /// Claim and immediately publish `sequence`, repositioning the buffer.
    ///
    /// Administrative use only: initialization or rewind before any
    /// producer/consumer threads are running. There is no concurrency guard;
    /// calling this while producers are live is undefined behavior.
    pub fn reset_to(&self, sequence: i64) {
        warn!(sequence, "administrative reset of ring buffer position");
        self.sequencer.claim(sequence);
        self.sequencer.publish(sequence);
    }

    /// Register consumer sequences that bound producer advancement.
    pub fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.sequencer.add_gating_sequences(gating_sequences);
    }

    /// Unregister a gating sequence. Returns whether it was present;
    /// subsequent capacity computations no longer consider it.
    pub fn remove_gating_sequence(&self, sequence: Arc<Sequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    /// Lowest registered gating sequence.
    pub fn minimum_gating_sequence(&self) -> i64 {
        self.sequencer.minimum_gating_sequence(None)
    }

    /// Lowest registered gating sequence, optionally excluding one. A
    /// consumer excludes its own sequence when computing how far it may read
    /// so it does not skew the result.
    pub fn minimum_gating_sequence_excluding(&self, exclude: Option<&Arc<Sequence>>) -> i64 {
        self.sequencer.minimum_gating_sequence(exclude)
    }

    /// Build a barrier over this buffer's cursor.
    pub fn new_barrier(&self) -> Arc<dyn SequenceBarrier> {
        self.new_barrier_tracking(vec![])
    }

    /// Build a barrier that also stays behind `sequences_to_track` (upstream
    /// consumers this consumer depends on).
    pub fn new_barrier_tracking(
        &self,
        sequences_to_track: Vec<Arc<Sequence>>,
    ) -> Arc<dyn SequenceBarrier> {
        self.sequencer
            .new_barrier(Arc::clone(&self.sequencer), sequences_to_track)
    }

    /// Highest published sequence.
    pub fn cursor(&self) -> i64 {
        self.sequencer.cursor_value()
    }

    /// Number of slots.
    pub fn buffer_size(&self) -> usize {
        self.slots.len()
    }

    /// Free slots under the current gating sequences; never negative.
    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }
}
