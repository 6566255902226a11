//! Claim and publish coordination for producers.
//!
//! A sequencer owns the producer cursor and the set of gating sequences it
//! must not lap. [`SingleProducerSequencer`] trusts that one thread claims, so
//! claiming is a plain store. [`MultiProducerSequencer`] races claims through a
//! CAS on the cursor and tracks per-slot availability because claims may be
//! published out of order.

mod multi;
mod single;

pub use multi::MultiProducerSequencer;
pub use single::SingleProducerSequencer;

use crate::sequence::{GatingSequence, Sequence};
use crate::sequence_group::SequenceSet;
use crate::{ClaimError, Config, ConfigError, WaitStrategy};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The producer-side contract shared by both sequencer variants.
pub trait Sequencer: Send + Sync + fmt::Debug {
    /// Number of slots in the ring.
    fn buffer_size(&self) -> usize;

    /// Current cursor value.
    ///
    /// Single producer: the highest published sequence. Multi producer: the
    /// highest *claimed* sequence; use [`Sequencer::is_available`] or
    /// [`Sequencer::highest_published_sequence`] for visibility.
    fn cursor(&self) -> i64;

    /// The cursor itself, for barriers and pollers.
    fn cursor_sequence(&self) -> &Arc<Sequence>;

    /// The strategy consumers of this sequencer wait with.
    fn wait_strategy(&self) -> &Arc<dyn WaitStrategy>;

    /// Whether `required` slots could be claimed right now without wrapping.
    fn has_available_capacity(&self, required: usize) -> bool;

    /// Free slots between the cursor and the slowest gating sequence.
    fn remaining_capacity(&self) -> i64;

    /// Claims the next sequence, blocking while the ring is full.
    fn next(&self) -> i64;

    /// Claims the next `n` sequences and returns the highest, blocking while
    /// the ring is full.
    fn next_n(&self, n: usize) -> Result<i64, ClaimError>;

    /// Claims the next sequence or fails with
    /// [`ClaimError::InsufficientCapacity`].
    fn try_next(&self) -> Result<i64, ClaimError>;

    /// Claims the next `n` sequences or fails without blocking.
    fn try_next_n(&self, n: usize) -> Result<i64, ClaimError>;

    /// Forces the claim position. Only for initialisation and recovery, with
    /// no producer active.
    fn claim(&self, sequence: i64);

    /// Makes `sequence` visible to consumers.
    fn publish(&self, sequence: i64);

    /// Makes `lo..=hi` visible to consumers.
    fn publish_range(&self, lo: i64, hi: i64);

    /// Whether `sequence` has been published and not yet lapped.
    fn is_available(&self, sequence: i64) -> bool;

    /// Highest sequence in `next_sequence..=available` such that every
    /// sequence up to it is published.
    fn highest_published_sequence(&self, next_sequence: i64, available: i64) -> i64;

    /// Adds consumer sequences (or groups of them) the producer must not
    /// lap. Safe while publishing; each is seeded from the cursor.
    fn add_gating_sequences(&self, sequences: &[Arc<dyn GatingSequence>]);

    /// Removes a gating sequence. Returns false if it was not registered.
    fn remove_gating_sequence(&self, sequence: &Arc<dyn GatingSequence>) -> bool;

    /// Minimum of the gating sequences and the cursor.
    fn minimum_sequence(&self) -> i64;
}

/// State common to both sequencer variants.
pub(crate) struct SequencerCore {
    pub(crate) buffer_size: usize,
    pub(crate) wait_strategy: Arc<dyn WaitStrategy>,
    pub(crate) cursor: Arc<Sequence>,
    pub(crate) gating: SequenceSet<dyn GatingSequence>,
}

impl SequencerCore {
    /// Fails with [`ConfigError::InvalidBufferSize`] unless `buffer_size` is
    /// a positive power of two; the slot mask and lap shift depend on it.
    pub(crate) fn new(
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self, ConfigError> {
        Config::single_producer(buffer_size).validate()?;

        Ok(Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::default()),
            gating: SequenceSet::new(),
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> i64 {
        self.buffer_size as i64
    }

    /// Rejects claim sizes outside `[1, buffer_size]`.
    #[inline]
    pub(crate) fn check_claim_size(&self, n: usize) -> Result<i64, ClaimError> {
        if n == 0 || n > self.buffer_size {
            return Err(ClaimError::InvalidClaimSize {
                requested: n,
                buffer_size: self.buffer_size,
            });
        }
        Ok(n as i64)
    }

    pub(crate) fn add_gating_sequences(&self, sequences: &[Arc<dyn GatingSequence>]) {
        self.gating.add_all(|| self.cursor.get(), sequences);
        debug!(
            added = sequences.len(),
            total = self.gating.len(),
            "gating sequences added"
        );
    }

    pub(crate) fn remove_gating_sequence(&self, sequence: &Arc<dyn GatingSequence>) -> bool {
        let removed = self.gating.remove(sequence);
        if removed {
            debug!(total = self.gating.len(), "gating sequence removed");
        }
        removed
    }

    #[inline]
    pub(crate) fn minimum_sequence(&self) -> i64 {
        self.gating.minimum(self.cursor.get())
    }
}

impl fmt::Debug for SequencerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequencerCore")
            .field("buffer_size", &self.buffer_size)
            .field("wait_strategy", &self.wait_strategy)
            .field("cursor", &self.cursor)
            .field("gating", &self.gating)
            .finish()
    }
}
