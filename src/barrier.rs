//! Consumer-side sequence barrier
//!
//! A barrier is the handle a consumer waits on: it blocks (via the
//! sequencer's wait strategy) until a requested sequence is published, and it
//! carries the alert flag that lets a shutting-down consumer be woken out of
//! any wait with a distinct cancellation error.

use std::sync::atomic::{fence, AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::sequence::Sequence;
use crate::sequencer::Sequencer;
use crate::wait_strategy::WaitStrategy;
use crate::{Result, RingError};

/// Wait handle binding a consumer to a sequencer's cursor
pub trait SequenceBarrier: Send + Sync {
    /// Wait until `sequence` is published, then return the highest published
    /// sequence currently readable (may exceed the request, never precedes
    /// an unpublished gap).
    ///
    /// # Errors
    /// `RingError::Alerted` if [`SequenceBarrier::alert`] was called.
    fn wait_for(&self, sequence: i64) -> Result<i64>;

    /// The cursor sequence this barrier tracks.
    fn get_cursor(&self) -> Arc<Sequence>;

    /// Whether the barrier is in the alerted state.
    fn is_alerted(&self) -> bool;

    /// Cancel current and future waits; callable from any thread.
    fn alert(&self);

    /// Leave the alerted state so the barrier can be waited on again.
    fn clear_alert(&self);

    /// Fail fast with `RingError::Alerted` if the barrier is alerted.
    fn check_alert(&self) -> Result<()>;
}

/// Standard barrier implementation
///
/// Tracks the sequencer's cursor plus any upstream consumer sequences this
/// consumer must stay behind (dependency chains between consumers).
#[derive(Debug)]
pub struct ProcessingSequenceBarrier {
    cursor: Arc<Sequence>,
    wait_strategy: Arc<dyn WaitStrategy>,
    dependent_sequences: Vec<Arc<Sequence>>,
    alerted: AtomicBool,
    sequencer: Arc<dyn Sequencer>,
}

impl ProcessingSequenceBarrier {
    pub fn new(
        cursor: Arc<Sequence>,
        wait_strategy: Arc<dyn WaitStrategy>,
        dependent_sequences: Vec<Arc<Sequence>>,
        sequencer: Arc<dyn Sequencer>,
    ) -> Self {
        Self {
            cursor,
            wait_strategy,
            dependent_sequences,
            alerted: AtomicBool::new(false),
            sequencer,
        }
    }
}

impl SequenceBarrier for ProcessingSequenceBarrier {
    fn wait_for(&self, sequence: i64) -> Result<i64> {
        self.check_alert()?;

        let available = self.wait_strategy.wait_for(
            sequence,
            &self.cursor,
            &self.dependent_sequences,
            &self.alerted,
        )?;

        // Pair with the publisher's release store before reading slots.
        fence(Ordering::Acquire);

        if available < sequence {
            return Ok(available);
        }
        // Under multiple producers the cursor can run ahead of what is
        // actually published; trim to the contiguous prefix.
        Ok(self
            .sequencer
            .highest_published_sequence(sequence, available))
    }

    fn get_cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    fn alert(&self) {
        debug!("sequence barrier alerted");
        self.alerted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }

    fn check_alert(&self) -> Result<()> {
        if self.is_alerted() {
            Err(RingError::Alerted)
        } else {
            Ok(())
        }
    }
}
