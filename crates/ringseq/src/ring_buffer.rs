use crate::sequence::{as_gating, GatingSequence, Sequence};
use crate::{
    Claim, ClaimError, Config, ConfigError, EventPoller, FixedSequenceGroup,
    MultiProducerSequencer, ProducerType, SequenceBarrier, Sequencer, SingleProducerSequencer,
    WaitStrategy,
};
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// SLOT OWNERSHIP
// =============================================================================
//
// Slots are pre-built by the factory and reused forever; nothing is moved in
// or out after construction. Who may touch slot `s & mask` at any moment is
// decided entirely by sequences:
//
// - A producer owns `s` mutably from the claim until it publishes `s`. The
//   sequencer never hands out `s` while a gating sequence is still below
//   `s - buffer_size`, so no consumer can be reading the previous lap.
// - A consumer may read `s` after its barrier reports `s` available and until
//   it advances its own sequence past `s`. Several consumers may read the
//   same slot concurrently, hence `E: Sync`.
//
// The publish (Release store of the cursor or lap tag) and the barrier's
// Acquire load give the happens-before edge between the producer's writes
// and the consumer's reads.
// =============================================================================

/// Pre-allocated ring of events indexed by sequence.
pub struct RingBuffer<E> {
    slots: Box<[UnsafeCell<E>]>,
    mask: usize,
    sequencer: Arc<dyn Sequencer>,
}

// Safety: slot access is partitioned by the sequencing protocol above.
// Producers write from any thread (E: Send), consumers share reads (E: Sync).
unsafe impl<E: Send> Send for RingBuffer<E> {}
unsafe impl<E: Send + Sync> Sync for RingBuffer<E> {}

impl<E> RingBuffer<E> {
    /// Creates a ring for `config`, filling every slot from `factory`.
    ///
    /// `factory` runs exactly `buffer_size` times, and not at all when the
    /// size is rejected.
    pub fn new<F>(
        config: Config,
        factory: F,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self, ConfigError>
    where
        F: FnMut() -> E,
    {
        let sequencer: Arc<dyn Sequencer> = match config.producer_type {
            ProducerType::Single => Arc::new(SingleProducerSequencer::new(
                config.buffer_size,
                wait_strategy,
            )?),
            ProducerType::Multi => Arc::new(MultiProducerSequencer::new(
                config.buffer_size,
                wait_strategy,
            )?),
        };

        Ok(Self::build(sequencer, factory))
    }

    /// Single-producer ring of `buffer_size` slots.
    pub fn single_producer<F>(
        buffer_size: usize,
        factory: F,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self, ConfigError>
    where
        F: FnMut() -> E,
    {
        Self::new(Config::single_producer(buffer_size), factory, wait_strategy)
    }

    /// Multi-producer ring of `buffer_size` slots.
    pub fn multi_producer<F>(
        buffer_size: usize,
        factory: F,
        wait_strategy: Arc<dyn WaitStrategy>,
    ) -> Result<Self, ConfigError>
    where
        F: FnMut() -> E,
    {
        Self::new(Config::multi_producer(buffer_size), factory, wait_strategy)
    }

    /// Wraps an existing sequencer, which must not have claimed anything yet.
    pub fn with_sequencer<F>(sequencer: Arc<dyn Sequencer>, factory: F) -> Result<Self, ConfigError>
    where
        F: FnMut() -> E,
    {
        Config::single_producer(sequencer.buffer_size()).validate()?;
        Ok(Self::build(sequencer, factory))
    }

    fn build<F>(sequencer: Arc<dyn Sequencer>, mut factory: F) -> Self
    where
        F: FnMut() -> E,
    {
        let buffer_size = sequencer.buffer_size();
        let slots = (0..buffer_size)
            .map(|_| UnsafeCell::new(factory()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            mask: buffer_size - 1,
            sequencer,
        }
    }

    /// Slot index for `sequence`.
    #[inline]
    pub fn slot_index(&self, sequence: i64) -> usize {
        (sequence as usize) & self.mask
    }

    /// The event for `sequence`.
    ///
    /// # Safety
    ///
    /// `sequence` must be published and not yet lapped: the caller is a
    /// consumer whose barrier reported it available and whose own sequence
    /// (gating the producer) is still below it.
    #[inline]
    pub unsafe fn get(&self, sequence: i64) -> &E {
        &*self.slots[self.slot_index(sequence)].get()
    }

    /// Mutable access to the event for `sequence`.
    ///
    /// # Safety
    ///
    /// The caller must hold the claim for `sequence` (from `next*`/`try_next*`)
    /// and must not have published it yet. Prefer [`RingBuffer::claim`].
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, sequence: i64) -> &mut E {
        &mut *self.slots[self.slot_index(sequence)].get()
    }

    // ---- claim & publish --------------------------------------------------

    /// Claims the next sequence, blocking while the ring is full.
    #[inline]
    pub fn next(&self) -> i64 {
        self.sequencer.next()
    }

    /// Claims `n` sequences and returns the highest.
    pub fn next_n(&self, n: usize) -> Result<i64, ClaimError> {
        self.sequencer.next_n(n)
    }

    /// Claims the next sequence without blocking.
    #[inline]
    pub fn try_next(&self) -> Result<i64, ClaimError> {
        self.sequencer.try_next()
    }

    /// Claims `n` sequences without blocking and returns the highest.
    pub fn try_next_n(&self, n: usize) -> Result<i64, ClaimError> {
        self.sequencer.try_next_n(n)
    }

    /// Publishes `sequence`.
    #[inline]
    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// Publishes `lo..=hi`.
    pub fn publish_range(&self, lo: i64, hi: i64) {
        self.sequencer.publish_range(lo, hi);
    }

    /// Claims one slot behind a guard that publishes on drop.
    pub fn claim(&self) -> Claim<'_, E> {
        let sequence = self.sequencer.next();
        Claim::new(self, sequence, sequence)
    }

    /// Claims `n` slots behind a guard that publishes on drop.
    pub fn claim_n(&self, n: usize) -> Result<Claim<'_, E>, ClaimError> {
        let hi = self.sequencer.next_n(n)?;
        Ok(Claim::new(self, hi - (n as i64 - 1), hi))
    }

    /// Non-blocking [`RingBuffer::claim_n`].
    pub fn try_claim(&self, n: usize) -> Result<Claim<'_, E>, ClaimError> {
        let hi = self.sequencer.try_next_n(n)?;
        Ok(Claim::new(self, hi - (n as i64 - 1), hi))
    }

    // ---- translators ------------------------------------------------------

    /// Claims a slot, fills it with `translate` and publishes it.
    ///
    /// The slot is published even if `translate` panics.
    pub fn publish_event<F>(&self, translate: F)
    where
        F: FnOnce(&mut E, i64),
    {
        let mut claim = self.claim();
        let sequence = claim.lo();
        translate(claim.get_mut(sequence), sequence);
    }

    /// Non-blocking [`RingBuffer::publish_event`]. `translate` is not called
    /// when the ring is full.
    pub fn try_publish_event<F>(&self, translate: F) -> Result<(), ClaimError>
    where
        F: FnOnce(&mut E, i64),
    {
        let mut claim = self.try_claim(1)?;
        let sequence = claim.lo();
        translate(claim.get_mut(sequence), sequence);
        Ok(())
    }

    /// Claims `args.len()` slots, fills slot `i` from `args[i]` and publishes
    /// them as one range.
    ///
    /// Fails with [`ClaimError::InvalidClaimSize`] if `args` is empty or longer
    /// than the ring.
    pub fn publish_events<A, F>(&self, args: &[A], mut translate: F) -> Result<(), ClaimError>
    where
        F: FnMut(&mut E, i64, &A),
    {
        let mut claim = self.claim_n(args.len())?;
        Self::fill(&mut claim, args, &mut translate);
        Ok(())
    }

    /// Non-blocking [`RingBuffer::publish_events`].
    pub fn try_publish_events<A, F>(&self, args: &[A], mut translate: F) -> Result<(), ClaimError>
    where
        F: FnMut(&mut E, i64, &A),
    {
        let mut claim = self.try_claim(args.len())?;
        Self::fill(&mut claim, args, &mut translate);
        Ok(())
    }

    fn fill<A, F>(claim: &mut Claim<'_, E>, args: &[A], translate: &mut F)
    where
        F: FnMut(&mut E, i64, &A),
    {
        for (sequence, arg) in (claim.lo()..=claim.hi()).zip(args) {
            translate(claim.get_mut(sequence), sequence, arg);
        }
    }

    // ---- queries ----------------------------------------------------------

    /// Number of slots.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.sequencer.buffer_size()
    }

    /// Producer cursor (highest claimed on a multi-producer ring).
    #[inline]
    pub fn cursor(&self) -> i64 {
        self.sequencer.cursor()
    }

    /// Free slots ahead of the slowest gating sequence.
    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    /// Whether `n` slots could be claimed right now.
    pub fn has_available_capacity(&self, n: usize) -> bool {
        self.sequencer.has_available_capacity(n)
    }

    /// Whether `sequence` is published and not yet lapped.
    pub fn is_published(&self, sequence: i64) -> bool {
        self.sequencer.is_available(sequence)
    }

    /// Minimum of the gating sequences and the cursor.
    pub fn minimum_gating_sequence(&self) -> i64 {
        self.sequencer.minimum_sequence()
    }

    /// Moves the cursor to `sequence` and publishes it.
    ///
    /// Recovery only: no producer may be active, and consumers see every
    /// sequence up to `sequence` as published.
    pub fn reset_to(&self, sequence: i64) {
        self.sequencer.claim(sequence);
        self.sequencer.publish(sequence);
    }

    // ---- wiring -----------------------------------------------------------

    /// Adds consumer sequences the producers must not lap.
    ///
    /// Accepts plain [`Sequence`]s or a [`SequenceGroup`](crate::SequenceGroup),
    /// whose members can then come and go while producers run.
    pub fn add_gating_sequences<S: GatingSequence + 'static>(&self, sequences: &[Arc<S>]) {
        let gating: Vec<_> = sequences.iter().map(as_gating).collect();
        self.sequencer.add_gating_sequences(&gating);
    }

    /// Removes a gating sequence. Returns false if it was not registered.
    pub fn remove_gating_sequence<S: GatingSequence + 'static>(&self, sequence: &Arc<S>) -> bool {
        self.sequencer.remove_gating_sequence(&as_gating(sequence))
    }

    /// A barrier over this ring that also waits for `dependencies`.
    pub fn new_barrier(&self, dependencies: &[Arc<Sequence>]) -> SequenceBarrier {
        SequenceBarrier::new(Arc::clone(&self.sequencer), dependencies)
    }

    /// A barrier over this ring that waits for `dependents`, which may
    /// include sequence groups.
    pub fn new_barrier_with(&self, dependents: FixedSequenceGroup) -> SequenceBarrier {
        SequenceBarrier::with_dependents(Arc::clone(&self.sequencer), dependents)
    }

    /// A pull-style consumer over this ring that also trails `dependencies`.
    ///
    /// The poller's sequence is registered for gating; remove it with
    /// [`RingBuffer::remove_gating_sequence`] once the poller is retired.
    pub fn new_poller(self: &Arc<Self>, dependencies: &[Arc<Sequence>]) -> EventPoller<E> {
        EventPoller::new(Arc::clone(self), dependencies)
    }

    /// The underlying sequencer.
    pub fn sequencer(&self) -> &Arc<dyn Sequencer> {
        &self.sequencer
    }
}

impl<E> fmt::Debug for RingBuffer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("buffer_size", &self.slots.len())
            .field("sequencer", &self.sequencer)
            .finish_non_exhaustive()
    }
}
