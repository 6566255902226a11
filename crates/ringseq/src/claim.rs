use crate::RingBuffer;

/// Exclusive write access to a claimed window `[lo, hi]` of the ring.
///
/// The producer fills slots through [`Claim::get_mut`] and the whole window
/// is published when the guard is dropped or [`Claim::publish`]ed, including
/// when the filling code panics. A claimed sequence that is never published
/// would stall every consumer, so there is no way to abandon a claim.
///
/// # Example
///
/// ```ignore
/// let mut claim = ring.claim_n(3)?;
/// claim.for_each_mut(|event, sequence| event.value = sequence);
/// claim.publish(); // or let it drop
/// ```
#[must_use = "a claim publishes when dropped; bind it to fill the slots first"]
pub struct Claim<'a, E> {
    ring: &'a RingBuffer<E>,
    lo: i64,
    hi: i64,
}

impl<'a, E> Claim<'a, E> {
    pub(crate) fn new(ring: &'a RingBuffer<E>, lo: i64, hi: i64) -> Self {
        Self { ring, lo, hi }
    }

    /// Lowest claimed sequence.
    #[inline]
    pub fn lo(&self) -> i64 {
        self.lo
    }

    /// Highest claimed sequence.
    #[inline]
    pub fn hi(&self) -> i64 {
        self.hi
    }

    /// Number of claimed slots.
    #[inline]
    pub fn len(&self) -> usize {
        (self.hi - self.lo + 1) as usize
    }

    /// Always false: a claim covers at least one slot.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The slot for `sequence`.
    ///
    /// # Panics
    ///
    /// If `sequence` is outside `[lo, hi]`.
    #[inline]
    pub fn get_mut(&mut self, sequence: i64) -> &mut E {
        assert!(
            sequence >= self.lo && sequence <= self.hi,
            "sequence {} outside claimed window [{}, {}]",
            sequence,
            self.lo,
            self.hi
        );
        // SAFETY: the sequencer handed `[lo, hi]` to this claim alone, and no
        // consumer reads these slots before the drop below publishes them.
        // `&mut self` prevents two live borrows from this guard.
        unsafe { self.ring.get_mut(sequence) }
    }

    /// Visits every claimed slot in sequence order.
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut E, i64),
    {
        for sequence in self.lo..=self.hi {
            f(self.get_mut(sequence), sequence);
        }
    }

    /// Publishes the window now.
    #[inline]
    pub fn publish(self) {
        drop(self);
    }
}

impl<E> Drop for Claim<'_, E> {
    fn drop(&mut self) {
        if self.lo == self.hi {
            self.ring.publish(self.hi);
        } else {
            self.ring.publish_range(self.lo, self.hi);
        }
    }
}
