use super::{Sequencer, SequencerCore};
use crate::invariants::{debug_assert_claim_size, debug_assert_no_overwrite};
use crate::sequence::{GatingSequence, Sequence, INITIAL_CURSOR_VALUE};
use crate::{Backoff, ClaimError, ConfigError, WaitStrategy};
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

// =============================================================================
// SINGLE PRODUCER PROTOCOL
// =============================================================================
//
// Only the producer thread touches `next_value` and `cached_value`, so they
// are accessed with Relaxed ordering; they are atomics only so the sequencer
// can be shared behind `Arc<dyn Sequencer>`.
//
// Claim (next_n):
// 1. next_sequence = next_value + n, wrap_point = next_sequence - buffer_size
// 2. If wrap_point is beyond the cached gating minimum (or the cache is ahead
//    of next_value after a `claim` rewind), store the cursor with SeqCst.
//    The StoreLoad barrier makes the producer's position visible before it
//    reads the gating sequences, so consumers blocked on it re-check.
// 3. Back off until the real gating minimum clears wrap_point, cache it.
// 4. next_value = next_sequence
//
// Publish: Release store of the cursor, then wake blocked waiters. One
// producer publishes in claim order, so the cursor alone expresses
// visibility.
// =============================================================================

/// Sequencer for exactly one publishing thread.
///
/// Claiming from more than one thread at a time corrupts the claim order;
/// use [`MultiProducerSequencer`](crate::MultiProducerSequencer) for that.
#[derive(Debug)]
pub struct SingleProducerSequencer {
    core: SequencerCore,
    /// Last claimed sequence (may be ahead of the cursor until published)
    next_value: CachePadded<AtomicI64>,
    /// Producer's cached view of the slowest gating sequence
    cached_value: CachePadded<AtomicI64>,
}

impl SingleProducerSequencer {
    /// Creates a sequencer for a ring of `buffer_size` slots.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidBufferSize`] unless `buffer_size` is a positive
    /// power of two.
    pub fn new(
        buffer_size: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            core: SequencerCore::new(buffer_size, wait_strategy)?,
            next_value: CachePadded::new(AtomicI64::new(INITIAL_CURSOR_VALUE)),
            cached_value: CachePadded::new(AtomicI64::new(INITIAL_CURSOR_VALUE)),
        })
    }

    fn claim_blocking(&self, n: i64) -> i64 {
        debug_assert_claim_size!(n, self.core.buffer_size);

        let next_value = self.next_value.load(Ordering::Relaxed);
        let next_sequence = next_value + n;
        let wrap_point = next_sequence - self.core.capacity();
        let cached_gating = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating || cached_gating > next_value {
            self.core.cursor.set_volatile(next_value);

            let mut backoff = Backoff::new();
            let min_sequence = loop {
                let min = self.core.gating.minimum(next_value);
                if wrap_point <= min {
                    break min;
                }
                backoff.snooze();
            };

            self.cached_value.store(min_sequence, Ordering::Relaxed);
        }

        debug_assert_no_overwrite!(
            next_sequence,
            self.cached_value.load(Ordering::Relaxed),
            self.core.buffer_size
        );
        self.next_value.store(next_sequence, Ordering::Relaxed);
        next_sequence
    }

    fn claim_nonblocking(&self, n: i64) -> Result<i64, ClaimError> {
        if !self.has_capacity(n, true) {
            return Err(ClaimError::InsufficientCapacity);
        }
        let next_sequence = self.next_value.load(Ordering::Relaxed) + n;
        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn has_capacity(&self, required: i64, store_cursor: bool) -> bool {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let wrap_point = (next_value + required) - self.core.capacity();
        let cached_gating = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating || cached_gating > next_value {
            if store_cursor {
                self.core.cursor.set_volatile(next_value);
            }

            let min_sequence = self.core.gating.minimum(next_value);
            self.cached_value.store(min_sequence, Ordering::Relaxed);

            if wrap_point > min_sequence {
                return false;
            }
        }

        true
    }
}

impl Sequencer for SingleProducerSequencer {
    #[inline]
    fn buffer_size(&self) -> usize {
        self.core.buffer_size
    }

    #[inline]
    fn cursor(&self) -> i64 {
        self.core.cursor.get()
    }

    fn cursor_sequence(&self) -> &Arc<Sequence> {
        &self.core.cursor
    }

    fn wait_strategy(&self) -> &Arc<dyn WaitStrategy> {
        &self.core.wait_strategy
    }

    fn has_available_capacity(&self, required: usize) -> bool {
        self.has_capacity(required as i64, false)
    }

    fn remaining_capacity(&self) -> i64 {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let consumed = self.core.gating.minimum(next_value);
        self.core.capacity() - (next_value - consumed)
    }

    #[inline]
    fn next(&self) -> i64 {
        self.claim_blocking(1)
    }

    fn next_n(&self, n: usize) -> Result<i64, ClaimError> {
        let n = self.core.check_claim_size(n)?;
        Ok(self.claim_blocking(n))
    }

    #[inline]
    fn try_next(&self) -> Result<i64, ClaimError> {
        self.claim_nonblocking(1)
    }

    fn try_next_n(&self, n: usize) -> Result<i64, ClaimError> {
        let n = self.core.check_claim_size(n)?;
        self.claim_nonblocking(n)
    }

    fn claim(&self, sequence: i64) {
        self.next_value.store(sequence, Ordering::Relaxed);
    }

    #[inline]
    fn publish(&self, sequence: i64) {
        self.core.cursor.set(sequence);
        self.core.wait_strategy.signal_all_when_blocking();
    }

    #[inline]
    fn publish_range(&self, _lo: i64, hi: i64) {
        self.publish(hi);
    }

    fn is_available(&self, sequence: i64) -> bool {
        let current = self.core.cursor.get();
        sequence <= current && sequence > current - self.core.capacity()
    }

    #[inline]
    fn highest_published_sequence(&self, _next_sequence: i64, available: i64) -> i64 {
        available
    }

    fn add_gating_sequences(&self, sequences: &[Arc<dyn GatingSequence>]) {
        self.core.add_gating_sequences(sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<dyn GatingSequence>) -> bool {
        self.core.remove_gating_sequence(sequence)
    }

    fn minimum_sequence(&self) -> i64 {
        self.core.minimum_sequence()
    }
}
