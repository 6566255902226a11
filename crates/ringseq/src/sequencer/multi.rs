use super::{Sequencer, SequencerCore};
use crate::invariants::{debug_assert_claim_size, debug_assert_no_overwrite};
use crate::sequence::{GatingSequence, Sequence};
use crate::{Backoff, ClaimError, ConfigError, WaitStrategy};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

// =============================================================================
// MULTI PRODUCER PROTOCOL
// =============================================================================
//
// Claim: optimistic CAS loop on the cursor. Each iteration reads the cursor,
// checks the wrap point against the cached gating minimum (refreshing it, or
// backing off while the ring is full) and attempts `cursor: current -> next`.
// A failed CAS means another producer claimed first; retry from scratch.
//
// Because claims complete out of order, the cursor is the highest *claimed*
// sequence, not the highest published one. Each slot therefore carries a lap
// tag in `available_buffer`:
//
//     lap(s) = s >> log2(buffer_size)
//
// Publishing `s` stores lap(s) into slot `s & mask` with Release; a reader
// considers `s` published iff it loads (Acquire) the same lap. Slot reuse
// bumps the lap, so stale tags from an earlier lap never read as published.
//
// `highest_published_sequence(lo, hi)` scans upward and stops before the
// first unpublished sequence, so a consumer never reads past a gap left by a
// producer still writing its slot.
// =============================================================================

/// Sequencer for any number of concurrently publishing threads.
#[derive(Debug)]
pub struct MultiProducerSequencer {
    core: SequencerCore,
    /// Cached minimum of the gating sequences, shared by all producers
    gating_sequence_cache: Sequence,
    /// Per-slot lap tag of the last published sequence
    available_buffer: Box<[AtomicI32]>,
    index_mask: usize,
    index_shift: u32,
}

impl MultiProducerSequencer {
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
        let core = SequencerCore::new(buffer_size, wait_strategy)?;
        let available_buffer = (0..buffer_size).map(|_| AtomicI32::new(-1)).collect();

        Ok(Self {
            core,
            gating_sequence_cache: Sequence::default(),
            available_buffer,
            index_mask: buffer_size - 1,
            index_shift: buffer_size.trailing_zeros(),
        })
    }

    fn claim_blocking(&self, n: i64) -> i64 {
        debug_assert_claim_size!(n, self.core.buffer_size);

        let mut backoff = Backoff::new();
        loop {
            let current = self.core.cursor.get();
            let next = current + n;
            let wrap_point = next - self.core.capacity();
            let cached_gating = self.gating_sequence_cache.get();

            if wrap_point > cached_gating || cached_gating > current {
                let gating = self.core.gating.minimum(current);
                if wrap_point > gating {
                    backoff.snooze();
                    continue;
                }
                self.gating_sequence_cache.set(gating);
                backoff.reset();
            } else if self.core.cursor.compare_and_set(current, next) {
                debug_assert_no_overwrite!(next, cached_gating, self.core.buffer_size);
                return next;
            }
        }
    }

    fn claim_nonblocking(&self, n: i64) -> Result<i64, ClaimError> {
        loop {
            let current = self.core.cursor.get();
            let next = current + n;

            if !self.has_capacity(n, current) {
                return Err(ClaimError::InsufficientCapacity);
            }
            if self.core.cursor.compare_and_set(current, next) {
                return Ok(next);
            }
        }
    }

    fn has_capacity(&self, required: i64, cursor_value: i64) -> bool {
        let wrap_point = (cursor_value + required) - self.core.capacity();
        let cached_gating = self.gating_sequence_cache.get();

        if wrap_point > cached_gating || cached_gating > cursor_value {
            let min_sequence = self.core.gating.minimum(cursor_value);
            self.gating_sequence_cache.set(min_sequence);

            if wrap_point > min_sequence {
                return false;
            }
        }

        true
    }

    #[inline]
    fn index(&self, sequence: i64) -> usize {
        (sequence as usize) & self.index_mask
    }

    #[inline]
    fn lap(&self, sequence: i64) -> i32 {
        (sequence >> self.index_shift) as i32
    }

    #[inline]
    fn set_available(&self, sequence: i64) {
        self.available_buffer[self.index(sequence)].store(self.lap(sequence), Ordering::Release);
    }
}

impl Sequencer for MultiProducerSequencer {
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
        self.has_capacity(required as i64, self.core.cursor.get())
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.core.cursor.get();
        let consumed = self.core.gating.minimum(produced);
        self.core.capacity() - (produced - consumed)
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
        self.core.cursor.set(sequence);
    }

    #[inline]
    fn publish(&self, sequence: i64) {
        self.set_available(sequence);
        self.core.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, lo: i64, hi: i64) {
        for sequence in lo..=hi {
            self.set_available(sequence);
        }
        self.core.wait_strategy.signal_all_when_blocking();
    }

    #[inline]
    fn is_available(&self, sequence: i64) -> bool {
        self.available_buffer[self.index(sequence)].load(Ordering::Acquire) == self.lap(sequence)
    }

    fn highest_published_sequence(&self, next_sequence: i64, available: i64) -> i64 {
        for sequence in next_sequence..=available {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
        }
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
