use crossbeam_utils::CachePadded;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Value of every sequence before anything has been produced or consumed.
pub const INITIAL_CURSOR_VALUE: i64 = -1;

// =============================================================================
// MEMORY ORDERING
// =============================================================================
//
// `set` is a Release store and `get` an Acquire load: a consumer that observes
// a cursor value also observes every slot write made before the producer
// stored it. `set_volatile` is SeqCst, which adds the StoreLoad barrier the
// single-producer claim path needs before it scans the gating sequences.
//
// The counter lives in `CachePadded`, which aligns and pads it to 128 bytes on
// x86_64/aarch64 (two lines, defeating the adjacent-line prefetcher). Two hot
// sequences therefore never share a cache line.
// =============================================================================

/// A padded, atomically updated position in the ring.
///
/// Used for the producer cursor, each consumer's progress and the shared
/// work sequence of a worker pool.
pub struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    /// Creates a sequence with the given initial value.
    pub const fn new(initial: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(initial)),
        }
    }

    /// Acquire load of the current value.
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Ordered (Release) store.
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Sequentially consistent store; orders this write before any later load.
    #[inline]
    pub fn set_volatile(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Atomically sets `new` if the current value equals `expected`.
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::Acquire)
            .is_ok()
    }

    /// Atomically increments and returns the new value.
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    /// Atomically adds `increment` and returns the new value.
    #[inline]
    pub fn add_and_get(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::SeqCst) + increment
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sequence").field(&self.get()).finish()
    }
}

/// Anything that can stand in for a consumer's progress: a single
/// [`Sequence`] or a [`SequenceGroup`](crate::SequenceGroup) that reads as the
/// minimum of its members.
///
/// Gating sets and barrier dependencies hold `Arc<dyn GatingSequence>`, so a
/// group can gate a producer and grow while it runs.
pub trait GatingSequence: Send + Sync + fmt::Debug {
    /// Current value (Acquire).
    fn get(&self) -> i64;

    /// Moves the value (Release). Used to seed late joiners from the cursor.
    fn set(&self, value: i64);
}

impl GatingSequence for Sequence {
    #[inline]
    fn get(&self) -> i64 {
        Sequence::get(self)
    }

    #[inline]
    fn set(&self, value: i64) {
        Sequence::set(self, value);
    }
}

/// Erases `sequence` to a gating trait object.
#[inline]
pub(crate) fn as_gating<S: GatingSequence + 'static>(sequence: &Arc<S>) -> Arc<dyn GatingSequence> {
    sequence.clone()
}

/// Whether `a` and `b` point at the same gating sequence.
#[inline]
pub(crate) fn same_sequence<S: ?Sized, T: ?Sized>(a: &Arc<S>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Smallest value among `sequences`, or `minimum` if that is smaller or the
/// slice is empty.
#[inline]
pub fn minimum_sequence<S: GatingSequence + ?Sized>(sequences: &[Arc<S>], minimum: i64) -> i64 {
    sequences
        .iter()
        .fold(minimum, |min, sequence| min.min(sequence.get()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;
    use std::thread;

    #[test]
    fn test_initial_value() {
        assert_eq!(Sequence::default().get(), INITIAL_CURSOR_VALUE);
        assert_eq!(Sequence::new(7).get(), 7);
    }

    #[test]
    fn test_own_cache_line() {
        assert!(mem::align_of::<Sequence>() >= 64);
        assert!(mem::size_of::<Sequence>() >= 64);
    }

    #[test]
    fn test_operations() {
        let seq = Sequence::new(0);

        seq.set(10);
        assert_eq!(seq.get(), 10);

        seq.set_volatile(20);
        assert_eq!(seq.get(), 20);

        assert!(seq.compare_and_set(20, 30));
        assert!(!seq.compare_and_set(20, 40));
        assert_eq!(seq.get(), 30);

        assert_eq!(seq.increment_and_get(), 31);
        assert_eq!(seq.add_and_get(5), 36);
    }

    #[test]
    fn test_concurrent_increment() {
        let seq = Arc::new(Sequence::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = Arc::clone(&seq);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        seq.increment_and_get();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(seq.get(), 8000);
    }

    #[test]
    fn test_minimum_sequence() {
        let seqs = vec![
            Arc::new(Sequence::new(10)),
            Arc::new(Sequence::new(5)),
            Arc::new(Sequence::new(15)),
        ];
        assert_eq!(minimum_sequence(&seqs, i64::MAX), 5);
        assert_eq!(minimum_sequence(&seqs, 3), 3);
        assert_eq!(minimum_sequence::<Sequence>(&[], i64::MAX), i64::MAX);
    }

    #[test]
    fn test_minimum_over_trait_objects() {
        let low = Arc::new(Sequence::new(3));
        let high = Arc::new(Sequence::new(8));
        let gating = vec![as_gating(&high), as_gating(&low)];
        assert_eq!(minimum_sequence(&gating, i64::MAX), 3);

        assert!(same_sequence(&gating[1], &low));
        assert!(!same_sequence(&gating[0], &low));
    }
}
