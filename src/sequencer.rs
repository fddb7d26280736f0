//! Sequencers: claim/publish coordination
//!
//! A sequencer owns the allocation of sequence numbers to producers, tracks
//! the gating sequences that bound how far producers may advance, and makes
//! published sequences visible to consumers. The ring buffer holds one as a
//! trait object so single- and multi-producer strategies are interchangeable
//! without touching the storage logic.
//!
//! Gating conventions:
//! - A registered gating sequence is the lowest sequence its consumer still
//!   has in use. A producer may claim at most `gating + buffer_size - 1`;
//!   claiming `gating + buffer_size` would overwrite the in-use slot.
//! - With no gating sequences registered, claims are unconstrained (there is
//!   nobody to overrun), while `remaining_capacity` treats the buffer as
//!   consumed-nothing and reports how much of it published events occupy.

use parking_lot::RwLock;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace};

use crate::barrier::{ProcessingSequenceBarrier, SequenceBarrier};
use crate::sequence::{minimum_sequence, Sequence};
use crate::wait_strategy::WaitStrategy;
use crate::{is_power_of_two, Result, RingError, INITIAL_CURSOR_VALUE};

/// Sequence-allocation capability the ring buffer delegates to
///
/// Implementations must guarantee exclusive, non-overlapping claim ranges
/// and the publish happens-before contract: once `publish(s)` is visible to
/// a consumer, so is every slot write made before it.
pub trait Sequencer: Send + Sync + std::fmt::Debug {
    /// Size of the ring this sequencer is bound to.
    fn buffer_size(&self) -> usize;

    /// Shared handle to the cursor sequence.
    fn get_cursor(&self) -> Arc<Sequence>;

    /// Current cursor value.
    fn cursor_value(&self) -> i64 {
        self.get_cursor().get()
    }

    /// Claim the next sequence, blocking while capacity is exhausted.
    fn next(&self) -> i64 {
        self.next_n(1)
    }

    /// Claim the next `n` contiguous sequences, blocking while capacity is
    /// exhausted, and return the highest of the range.
    ///
    /// # Panics
    /// Panics if `n < 1` (contract violation).
    fn next_n(&self, n: i64) -> i64;

    /// Claim the next sequence without blocking.
    ///
    /// # Errors
    /// `RingError::InsufficientCapacity` when no slot is free.
    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    /// Claim the next `n` contiguous sequences without blocking.
    ///
    /// # Errors
    /// `RingError::InsufficientCapacity` when fewer than `n` slots are free.
    ///
    /// # Panics
    /// Panics if `n < 1` (contract violation).
    fn try_next_n(&self, n: i64) -> Result<i64>;

    /// Make a previously claimed sequence visible to consumers.
    fn publish(&self, sequence: i64);

    /// Make a contiguous range of previously claimed sequences visible.
    fn publish_range(&self, lo: i64, hi: i64);

    /// Position the sequencer at `sequence` without publishing. Administrative
    /// only; not safe under concurrent claims.
    fn claim(&self, sequence: i64);

    /// Whether `sequence` has been published.
    fn is_available(&self, sequence: i64) -> bool;

    /// Highest sequence in `lowest..=available` such that every sequence
    /// below it is published. Consumers never see gaps.
    fn highest_published_sequence(&self, lowest: i64, available: i64) -> i64;

    /// Register consumer sequences that bound producer advancement.
    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]);

    /// Unregister a gating sequence. Returns whether it was present.
    fn remove_gating_sequence(&self, sequence: Arc<Sequence>) -> bool;

    /// Lowest value among registered gating sequences, optionally excluding
    /// one (a consumer excludes its own sequence when computing how far it
    /// may read). [`INITIAL_CURSOR_VALUE`] when the remaining set is empty.
    fn minimum_gating_sequence(&self, exclude: Option<&Arc<Sequence>>) -> i64;

    /// Build a consumer barrier over this sequencer's cursor.
    ///
    /// `handle` must be another reference to this sequencer; the barrier
    /// keeps it to trim waits to the contiguous published prefix.
    fn new_barrier(
        &self,
        handle: Arc<dyn Sequencer>,
        sequences_to_track: Vec<Arc<Sequence>>,
    ) -> Arc<dyn SequenceBarrier>;

    /// Free slots as `buffer_size - (cursor - min_gating)`, floored at zero.
    fn remaining_capacity(&self) -> i64;
}

/// Claim watermark sentinel meaning "no gating constraint".
const UNGATED: i64 = i64::MAX;

/// Sentinel forcing the next claim to re-read the gating set.
const GATE_STALE: i64 = i64::MIN;

/// Shared gating-set bookkeeping for both sequencer implementations.
#[derive(Debug)]
struct GatingSequences {
    sequences: RwLock<Vec<Arc<Sequence>>>,
    /// Cached claim gate; `GATE_STALE` after any membership change.
    cached_gate: Sequence,
}

impl GatingSequences {
    fn new() -> Self {
        Self {
            sequences: RwLock::new(Vec::new()),
            cached_gate: Sequence::new(GATE_STALE),
        }
    }

    fn add(&self, gating_sequences: &[Arc<Sequence>]) {
        let mut sequences = self.sequences.write();
        sequences.extend_from_slice(gating_sequences);
        debug!(gating = sequences.len(), "registered gating sequence(s)");
        self.cached_gate.set(GATE_STALE);
    }

    fn remove(&self, sequence: &Arc<Sequence>) -> bool {
        let mut sequences = self.sequences.write();
        let removed = if let Some(pos) = sequences.iter().position(|s| Arc::ptr_eq(s, sequence)) {
            sequences.remove(pos);
            true
        } else {
            false
        };
        if removed {
            debug!(gating = sequences.len(), "removed gating sequence");
            self.cached_gate.set(GATE_STALE);
        }
        removed
    }

    fn minimum(&self, exclude: Option<&Arc<Sequence>>) -> i64 {
        let sequences = self.sequences.read();
        sequences
            .iter()
            .filter(|s| exclude.map_or(true, |e| !Arc::ptr_eq(s, e)))
            .map(|s| s.get())
            .min()
            .unwrap_or(INITIAL_CURSOR_VALUE)
    }

    /// The value producers gate claims against: the minimum registered
    /// sequence, or `UNGATED` when nothing is registered.
    fn claim_gate(&self) -> i64 {
        let sequences = self.sequences.read();
        let gate = minimum_sequence(&sequences, UNGATED);
        self.cached_gate.set(gate);
        gate
    }

    fn cached_gate(&self) -> i64 {
        self.cached_gate.get()
    }
}

/// Claiming `next_sequence` is forbidden once its wrap point reaches the
/// slowest in-use sequence: that slot is still being read.
#[inline]
fn gated(wrap_point: i64, gate: i64) -> bool {
    wrap_point >= gate
}

/// Sequencer for exactly one producer thread
///
/// The claimed watermark is tracked separately from the published cursor, so
/// the cursor only ever moves on `publish` and consumers never observe a
/// claimed-but-unwritten sequence.
#[derive(Debug)]
pub struct SingleProducerSequencer {
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    /// Highest published sequence.
    cursor: Arc<Sequence>,
    /// Highest claimed sequence; only the owning producer thread mutates it.
    next_value: Sequence,
    gating: GatingSequences,
}

impl SingleProducerSequencer {
    /// Create a sequencer bound to a ring of `buffer_size` slots.
    ///
    /// # Errors
    /// `RingError::InvalidBufferSize` unless `buffer_size` is a power of two.
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        if !is_power_of_two(buffer_size) {
            return Err(RingError::InvalidBufferSize(buffer_size));
        }
        Ok(Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::default()),
            next_value: Sequence::default(),
            gating: GatingSequences::new(),
        })
    }

    /// Gate check for a claim ending at `next_sequence`. Refreshes the cached
    /// gate only when the cached value would reject the claim.
    fn has_capacity_for(&self, next_sequence: i64) -> bool {
        let wrap_point = next_sequence - self.buffer_size as i64;
        if gated(wrap_point, self.gating.cached_gate()) {
            return !gated(wrap_point, self.gating.claim_gate());
        }
        true
    }
}

impl Sequencer for SingleProducerSequencer {
    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn get_cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn next_n(&self, n: i64) -> i64 {
        assert!(n >= 1, "claim batch size must be >= 1");
        let next_sequence = self.next_value.get() + n;

        // Backpressure: spin until the slowest consumer frees the slots.
        while !self.has_capacity_for(next_sequence) {
            thread::yield_now();
        }

        self.next_value.set(next_sequence);
        next_sequence
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        assert!(n >= 1, "claim batch size must be >= 1");
        let next_sequence = self.next_value.get() + n;

        if !self.has_capacity_for(next_sequence) {
            return Err(RingError::InsufficientCapacity);
        }

        self.next_value.set(next_sequence);
        Ok(next_sequence)
    }

    fn publish(&self, sequence: i64) {
        // Release store: slot writes made before this call happen-before any
        // consumer's acquire of the new cursor value.
        self.cursor.set(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, _lo: i64, hi: i64) {
        self.publish(hi);
    }

    fn claim(&self, sequence: i64) {
        trace!(sequence, "administrative claim");
        self.next_value.set(sequence);
    }

    fn is_available(&self, sequence: i64) -> bool {
        sequence <= self.cursor.get()
    }

    fn highest_published_sequence(&self, _lowest: i64, available: i64) -> i64 {
        // A single producer publishes in order; the cursor is always the
        // contiguous frontier.
        available
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.gating.add(gating_sequences);
    }

    fn remove_gating_sequence(&self, sequence: Arc<Sequence>) -> bool {
        self.gating.remove(&sequence)
    }

    fn minimum_gating_sequence(&self, exclude: Option<&Arc<Sequence>>) -> i64 {
        self.gating.minimum(exclude)
    }

    fn new_barrier(
        &self,
        handle: Arc<dyn Sequencer>,
        sequences_to_track: Vec<Arc<Sequence>>,
    ) -> Arc<dyn SequenceBarrier> {
        Arc::new(ProcessingSequenceBarrier::new(
            Arc::clone(&self.cursor),
            Arc::clone(&self.wait_strategy),
            sequences_to_track,
            handle,
        ))
    }

    fn remaining_capacity(&self) -> i64 {
        let consumed = self.minimum_gating_sequence(None);
        let produced = self.cursor.get();
        (self.buffer_size as i64 - (produced - consumed)).max(0)
    }
}

/// Sequencer for concurrent producer threads
///
/// Claims race on the cursor with compare-and-set, so the cursor is the
/// claimed watermark here; visibility is carried per slot by an availability
/// flag (`sequence >> log2(buffer_size)`, the ring lap number) written on
/// publish. Consumers read through the contiguous-prefix scan in
/// [`Sequencer::highest_published_sequence`].
#[derive(Debug)]
pub struct MultiProducerSequencer {
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    gating: GatingSequences,
    /// One flag per slot; holds the lap number of the last published
    /// sequence that mapped to the slot, or -1 when never published.
    available: Vec<AtomicI64>,
    index_mask: usize,
    index_shift: u32,
}

impl MultiProducerSequencer {
    /// Create a sequencer bound to a ring of `buffer_size` slots.
    ///
    /// # Errors
    /// `RingError::InvalidBufferSize` unless `buffer_size` is a power of two.
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        if !is_power_of_two(buffer_size) {
            return Err(RingError::InvalidBufferSize(buffer_size));
        }
        let available = (0..buffer_size).map(|_| AtomicI64::new(-1)).collect();
        Ok(Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::default()),
            gating: GatingSequences::new(),
            available,
            index_mask: buffer_size - 1,
            index_shift: buffer_size.trailing_zeros(),
        })
    }

    #[inline]
    fn slot_index(&self, sequence: i64) -> usize {
        (sequence as usize) & self.index_mask
    }

    #[inline]
    fn availability_flag(&self, sequence: i64) -> i64 {
        sequence >> self.index_shift
    }

    fn set_available(&self, sequence: i64) {
        let index = self.slot_index(sequence);
        let flag = self.availability_flag(sequence);
        self.available[index].store(flag, Ordering::Release);
    }

    fn has_capacity_for(&self, next_sequence: i64) -> bool {
        let wrap_point = next_sequence - self.buffer_size as i64;
        if gated(wrap_point, self.gating.cached_gate()) {
            return !gated(wrap_point, self.gating.claim_gate());
        }
        true
    }
}

impl Sequencer for MultiProducerSequencer {
    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn get_cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn next_n(&self, n: i64) -> i64 {
        assert!(n >= 1, "claim batch size must be >= 1");
        loop {
            let current = self.cursor.get();
            let next_sequence = current + n;

            if !self.has_capacity_for(next_sequence) {
                thread::yield_now();
                continue;
            }
            if self.cursor.compare_and_set(current, next_sequence) {
                return next_sequence;
            }
            // Lost the race to another producer; retry from its claim.
        }
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        assert!(n >= 1, "claim batch size must be >= 1");
        loop {
            let current = self.cursor.get();
            let next_sequence = current + n;

            if !self.has_capacity_for(next_sequence) {
                return Err(RingError::InsufficientCapacity);
            }
            if self.cursor.compare_and_set(current, next_sequence) {
                return Ok(next_sequence);
            }
        }
    }

    fn publish(&self, sequence: i64) {
        self.set_available(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, lo: i64, hi: i64) {
        for sequence in lo..=hi {
            self.set_available(sequence);
        }
        self.wait_strategy.signal_all_when_blocking();
    }

    fn claim(&self, sequence: i64) {
        trace!(sequence, "administrative claim");
        self.cursor.set(sequence);
    }

    fn is_available(&self, sequence: i64) -> bool {
        let index = self.slot_index(sequence);
        let flag = self.availability_flag(sequence);
        self.available[index].load(Ordering::Acquire) == flag
    }

    fn highest_published_sequence(&self, lowest: i64, available: i64) -> i64 {
        // Producers publish out of claim order; report only the prefix with
        // no gaps so consumers never read an unwritten slot.
        let mut sequence = lowest;
        while sequence <= available {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
            sequence += 1;
        }
        available
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.gating.add(gating_sequences);
    }

    fn remove_gating_sequence(&self, sequence: Arc<Sequence>) -> bool {
        self.gating.remove(&sequence)
    }

    fn minimum_gating_sequence(&self, exclude: Option<&Arc<Sequence>>) -> i64 {
        self.gating.minimum(exclude)
    }

    fn new_barrier(
        &self,
        handle: Arc<dyn Sequencer>,
        sequences_to_track: Vec<Arc<Sequence>>,
    ) -> Arc<dyn SequenceBarrier> {
        Arc::new(ProcessingSequenceBarrier::new(
            Arc::clone(&self.cursor),
            Arc::clone(&self.wait_strategy),
            sequences_to_track,
            handle,
        ))
    }

    fn remaining_capacity(&self) -> i64 {
        let consumed = self.minimum_gating_sequence(None);
        let produced = self.cursor.get();
        (self.buffer_size as i64 - (produced - consumed)).max(0)
    }
}
