//! Aggregates of sequences that report the minimum member.
//!
//! The dynamic variants share one copy-on-write registry protocol: readers
//! load an immutable `Arc<Vec<_>>` snapshot; writers copy it, modify the copy
//! and publish it with a compare-and-swap, retrying from a fresh snapshot when
//! another writer won the race. Producers scanning the set never block.

use crate::sequence::{as_gating, minimum_sequence, same_sequence, GatingSequence, Sequence};
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A copy-on-write set of sequences.
pub(crate) struct SequenceSet<S: ?Sized = Sequence> {
    members: ArcSwap<Vec<Arc<S>>>,
}

impl<S: GatingSequence + ?Sized> SequenceSet<S> {
    pub(crate) fn new() -> Self {
        Self {
            members: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Current snapshot of members.
    #[inline]
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<S>>> {
        self.members.load_full()
    }

    /// Minimum member value, or `minimum` if smaller (or the set is empty).
    #[inline]
    pub(crate) fn minimum(&self, minimum: i64) -> i64 {
        minimum_sequence(self.members.load().as_slice(), minimum)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.members.load().len()
    }

    /// Copies the current snapshot, applies `edit` and swaps the copy in,
    /// retrying from a fresh snapshot if another writer got there first.
    fn update(&self, mut edit: impl FnMut(&mut Vec<Arc<S>>)) {
        loop {
            let current = self.members.load_full();
            let mut updated = Vec::with_capacity(current.len() + 1);
            updated.extend(current.iter().cloned());
            edit(&mut updated);

            let previous = self.members.compare_and_swap(&current, Arc::new(updated));
            if Arc::ptr_eq(&*previous, &current) {
                return;
            }
        }
    }

    /// Adds `to_add` without touching their values.
    pub(crate) fn insert(&self, to_add: &[Arc<S>]) {
        self.update(|members| members.extend(to_add.iter().cloned()));
        trace!(added = to_add.len(), "sequence set grew");
    }

    /// Adds `to_add`, seeding each from `cursor` so a late joiner does not
    /// appear to lag a full lap behind.
    ///
    /// The seed is written inside the retry loop (so it is in place when the
    /// new snapshot becomes visible) and once more afterwards, in case the
    /// cursor moved while the swap was in flight.
    pub(crate) fn add_all(&self, cursor: impl Fn() -> i64, to_add: &[Arc<S>]) {
        self.update(|members| {
            let cursor_value = cursor();
            for sequence in to_add {
                sequence.set(cursor_value);
                members.push(Arc::clone(sequence));
            }
        });

        let cursor_value = cursor();
        for sequence in to_add {
            sequence.set(cursor_value);
        }
        trace!(added = to_add.len(), "sequence set grew");
    }

    /// Removes every occurrence of `sequence`. Returns false if it was absent.
    pub(crate) fn remove<T: ?Sized>(&self, sequence: &Arc<T>) -> bool {
        loop {
            let current = self.members.load_full();
            let to_remove = current
                .iter()
                .filter(|&s| same_sequence(s, sequence))
                .count();
            if to_remove == 0 {
                return false;
            }

            let updated: Vec<_> = current
                .iter()
                .filter(|&s| !same_sequence(s, sequence))
                .cloned()
                .collect();

            let previous = self.members.compare_and_swap(&current, Arc::new(updated));
            if Arc::ptr_eq(&*previous, &current) {
                trace!(removed = to_remove, "sequence set shrank");
                return true;
            }
        }
    }
}

impl<S: fmt::Debug + ?Sized> fmt::Debug for SequenceSet<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.members.load().iter()).finish()
    }
}

/// A dynamic group of sequences that reads as the minimum of its members.
///
/// Members may be added and removed while other threads read the group.
/// An empty group reads as `i64::MAX` so it never gates anything.
///
/// The group is itself a [`GatingSequence`]: register it with
/// [`RingBuffer::add_gating_sequences`](crate::RingBuffer::add_gating_sequences)
/// and grow it later with [`SequenceGroup::add_while_running`] to attach
/// consumers to a live ring.
#[derive(Debug)]
pub struct SequenceGroup {
    set: SequenceSet,
}

impl SequenceGroup {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self {
            set: SequenceSet::new(),
        }
    }

    /// Minimum of the members, `i64::MAX` when empty.
    #[inline]
    pub fn get(&self) -> i64 {
        self.set.minimum(i64::MAX)
    }

    /// Sets every member to `value`.
    pub fn set(&self, value: i64) {
        for sequence in self.set.snapshot().iter() {
            sequence.set(value);
        }
    }

    /// Adds a member as-is. Not safe to use while the group is gating a
    /// running producer; see [`SequenceGroup::add_while_running`].
    pub fn add(&self, sequence: Arc<Sequence>) {
        self.set.insert(&[sequence]);
    }

    /// Adds a member to a live group, first moving it to `cursor`.
    pub fn add_while_running(&self, cursor: &Sequence, sequence: Arc<Sequence>) {
        self.set.add_all(|| cursor.get(), &[sequence]);
    }

    /// Removes every occurrence of `sequence`. Returns false if absent.
    pub fn remove(&self, sequence: &Arc<Sequence>) -> bool {
        self.set.remove(sequence)
    }

    /// Number of members.
    pub fn size(&self) -> usize {
        self.set.len()
    }
}

impl GatingSequence for SequenceGroup {
    #[inline]
    fn get(&self) -> i64 {
        SequenceGroup::get(self)
    }

    fn set(&self, value: i64) {
        SequenceGroup::set(self, value);
    }
}

impl Default for SequenceGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable group of sequences that reads as the minimum of its members.
///
/// Used by barriers to merge upstream dependencies into one dependent
/// sequence. A single-member group reads straight through.
#[derive(Debug, Clone)]
pub struct FixedSequenceGroup {
    sequences: Box<[Arc<dyn GatingSequence>]>,
}

impl FixedSequenceGroup {
    /// Creates a group over `sequences`.
    pub fn new<S: GatingSequence + 'static>(sequences: &[Arc<S>]) -> Self {
        sequences.iter().map(as_gating).collect()
    }

    /// Minimum of the members, `i64::MAX` when empty.
    #[inline]
    pub fn get(&self) -> i64 {
        match &*self.sequences {
            [only] => only.get(),
            all => minimum_sequence(all, i64::MAX),
        }
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// The member sequences.
    pub fn sequences(&self) -> &[Arc<dyn GatingSequence>] {
        &self.sequences
    }
}

impl FromIterator<Arc<dyn GatingSequence>> for FixedSequenceGroup {
    fn from_iter<I: IntoIterator<Item = Arc<dyn GatingSequence>>>(iter: I) -> Self {
        Self {
            sequences: iter.into_iter().collect(),
        }
    }
}
