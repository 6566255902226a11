//! The consumer-side gate between a processor and what it depends on.

use crate::sequence::Sequence;
use crate::{FixedSequenceGroup, Sequencer, WaitError, WaitStrategy};
use crossbeam_utils::CachePadded;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Coordinates a consumer with the producer cursor and any upstream
/// consumers it must stay behind.
///
/// `wait_for` never returns a sequence that is not yet published, even on a
/// multi-producer ring where claims complete out of order.
pub struct SequenceBarrier {
    sequencer: Arc<dyn Sequencer>,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    /// Upstream consumers, or the cursor alone when there are none
    dependent: FixedSequenceGroup,
    alerted: CachePadded<AtomicBool>,
}

impl SequenceBarrier {
    /// Creates a barrier over `sequencer` that also gates on `dependencies`.
    pub fn new(sequencer: Arc<dyn Sequencer>, dependencies: &[Arc<Sequence>]) -> Self {
        Self::with_dependents(sequencer, FixedSequenceGroup::new(dependencies))
    }

    /// Creates a barrier that trails `dependents`, which may mix single
    /// sequences and [`SequenceGroup`](crate::SequenceGroup)s. An empty group
    /// means the barrier trails the cursor alone.
    pub fn with_dependents(sequencer: Arc<dyn Sequencer>, dependents: FixedSequenceGroup) -> Self {
        let wait_strategy = Arc::clone(sequencer.wait_strategy());
        let cursor = Arc::clone(sequencer.cursor_sequence());
        let dependent = if dependents.is_empty() {
            FixedSequenceGroup::new(&[Arc::clone(&cursor)])
        } else {
            dependents
        };

        Self {
            sequencer,
            wait_strategy,
            cursor,
            dependent,
            alerted: CachePadded::new(AtomicBool::new(false)),
        }
    }

    /// Waits until `sequence` is available and returns the highest sequence
    /// that is safe to read, which may be below `sequence` on a
    /// multi-producer ring (a gap) or above it (a batch).
    ///
    /// # Errors
    ///
    /// [`WaitError::Alerted`] if the barrier is alerted before or during the
    /// wait; [`WaitError::Timeout`] from timeout-capable strategies.
    pub fn wait_for(&self, sequence: i64) -> Result<i64, WaitError> {
        self.check_alert()?;

        let available = self
            .wait_strategy
            .wait_for(sequence, &self.cursor, &self.dependent, self)?;

        if available < sequence {
            return Ok(available);
        }

        Ok(self
            .sequencer
            .highest_published_sequence(sequence, available))
    }

    /// Current value of the dependent sequence.
    #[inline]
    pub fn cursor(&self) -> i64 {
        self.dependent.get()
    }

    /// Whether the barrier is alerted.
    #[inline]
    pub fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    /// Alerts the barrier and wakes any blocked waiter.
    pub fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    /// Clears a previous alert.
    pub fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }

    /// Returns [`WaitError::Alerted`] if the barrier is alerted.
    #[inline]
    pub fn check_alert(&self) -> Result<(), WaitError> {
        if self.is_alerted() {
            Err(WaitError::Alerted)
        } else {
            Ok(())
        }
    }

    /// The sequencer this barrier reads from.
    pub fn sequencer(&self) -> &Arc<dyn Sequencer> {
        &self.sequencer
    }
}

impl fmt::Debug for SequenceBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceBarrier")
            .field("cursor", &self.cursor)
            .field("dependent", &self.dependent)
            .field("alerted", &self.is_alerted())
            .finish_non_exhaustive()
    }
}
