use crate::invariants::debug_assert_in_window;
use crate::sequence::Sequence;
use crate::{FixedSequenceGroup, HandlerError, RingBuffer};
use std::fmt;
use std::sync::Arc;

/// What a call to [`EventPoller::poll`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// At least one event was handed to the handler.
    Processing,
    /// The producer is ahead but an upstream dependency (or an in-flight
    /// multi-producer claim) has not released the next event yet.
    Gating,
    /// Nothing new has been claimed.
    Idle,
}

/// Pull-based consumer: the caller decides when to take events.
///
/// Nothing blocks; each `poll` hands over whatever is available and returns.
/// The poller's sequence is registered as a gating sequence of the ring on
/// construction.
pub struct EventPoller<E> {
    ring: Arc<RingBuffer<E>>,
    sequence: Arc<Sequence>,
    gating: FixedSequenceGroup,
}

impl<E> EventPoller<E> {
    pub(crate) fn new(ring: Arc<RingBuffer<E>>, dependencies: &[Arc<Sequence>]) -> Self {
        let gating = if dependencies.is_empty() {
            FixedSequenceGroup::new(&[Arc::clone(ring.sequencer().cursor_sequence())])
        } else {
            FixedSequenceGroup::new(dependencies)
        };
        let sequence = Arc::new(Sequence::default());
        ring.add_gating_sequences(&[Arc::clone(&sequence)]);

        Self {
            ring,
            sequence,
            gating,
        }
    }

    /// Hands available events to `handler` in order until it returns
    /// `Ok(false)` or the available range is exhausted.
    ///
    /// The handler gets `(event, sequence, end_of_batch)`. The sequence of the
    /// last event handled successfully is recorded even when a later one
    /// fails; the failing event is offered again on the next poll.
    ///
    /// # Errors
    ///
    /// The first error returned by `handler`.
    pub fn poll<F>(&self, mut handler: F) -> Result<PollState, HandlerError>
    where
        F: FnMut(&E, i64, bool) -> Result<bool, HandlerError>,
    {
        let current = self.sequence.get();
        let mut next_sequence = current + 1;
        let available = self
            .ring
            .sequencer()
            .highest_published_sequence(next_sequence, self.gating.get());

        if next_sequence > available {
            return if self.ring.cursor() >= next_sequence {
                Ok(PollState::Gating)
            } else {
                Ok(PollState::Idle)
            };
        }

        let mut processed = current;
        let result = loop {
            debug_assert_in_window!(next_sequence, current + 1, available);
            // SAFETY: next_sequence is published (<= available) and our
            // sequence (< next_sequence) gates the producers.
            let event = unsafe { self.ring.get(next_sequence) };
            match handler(event, next_sequence, next_sequence == available) {
                Ok(more) => {
                    processed = next_sequence;
                    next_sequence += 1;
                    if !more || next_sequence > available {
                        break Ok(PollState::Processing);
                    }
                }
                Err(error) => break Err(error),
            }
        };

        self.sequence.set(processed);
        result
    }

    /// The poller's progress sequence.
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }
}

impl<E> fmt::Debug for EventPoller<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPoller")
            .field("sequence", &self.sequence)
            .field("gating", &self.gating)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BusySpinWaitStrategy, WaitStrategy};

    fn strategy() -> Arc<dyn WaitStrategy> {
        Arc::new(BusySpinWaitStrategy::new())
    }

    #[test]
    fn test_idle_then_processing() {
        let ring = Arc::new(RingBuffer::single_producer(8, || 0i64, strategy()).unwrap());
        let poller = ring.new_poller(&[]);

        assert_eq!(poller.poll(|_, _, _| Ok(true)).unwrap(), PollState::Idle);

        ring.publish_events(&[5, 6, 7], |slot, _, v| *slot = *v).unwrap();
        let mut seen = Vec::new();
        let state = poller
            .poll(|event, sequence, end| {
                seen.push((*event, sequence, end));
                Ok(true)
            })
            .unwrap();

        assert_eq!(state, PollState::Processing);
        assert_eq!(seen, vec![(5, 0, false), (6, 1, false), (7, 2, true)]);
        assert_eq!(poller.sequence().get(), 2);
        assert_eq!(poller.poll(|_, _, _| Ok(true)).unwrap(), PollState::Idle);
    }

    #[test]
    fn test_handler_can_stop_early() {
        let ring = Arc::new(RingBuffer::single_producer(8, || 0i64, strategy()).unwrap());
        let poller = ring.new_poller(&[]);
        ring.publish_events(&[1, 2, 3], |slot, _, v| *slot = *v).unwrap();

        let state = poller.poll(|_, _, _| Ok(false)).unwrap();
        assert_eq!(state, PollState::Processing);
        assert_eq!(poller.sequence().get(), 0);
    }

    #[test]
    fn test_error_keeps_failed_event() {
        let ring = Arc::new(RingBuffer::single_producer(8, || 0i64, strategy()).unwrap());
        let poller = ring.new_poller(&[]);
        ring.publish_events(&[1, 2, 3], |slot, _, v| *slot = *v).unwrap();

        let err = poller
            .poll(|event, _, _| {
                if *event == 2 {
                    Err("two".into())
                } else {
                    Ok(true)
                }
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "two");
        assert_eq!(poller.sequence().get(), 0);

        let mut seen = Vec::new();
        poller
            .poll(|event, _, _| {
                seen.push(*event);
                Ok(true)
            })
            .unwrap();
        assert_eq!(seen, vec![2, 3]);
    }

    #[test]
    fn test_gating_on_dependency() {
        let ring = Arc::new(RingBuffer::single_producer(8, || 0i64, strategy()).unwrap());
        let upstream = Arc::new(Sequence::default());
        let poller = ring.new_poller(&[Arc::clone(&upstream)]);
        ring.publish_events(&[1, 2], |slot, _, v| *slot = *v).unwrap();

        assert_eq!(poller.poll(|_, _, _| Ok(true)).unwrap(), PollState::Gating);

        upstream.set(0);
        let mut count = 0;
        poller
            .poll(|_, _, _| {
                count += 1;
                Ok(true)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_multi_producer_gap_reports_gating() {
        let ring = Arc::new(RingBuffer::multi_producer(8, || 0i64, strategy()).unwrap());
        let poller = ring.new_poller(&[]);

        let hi = ring.next_n(2).unwrap();
        ring.publish(hi);

        assert_eq!(poller.poll(|_, _, _| Ok(true)).unwrap(), PollState::Gating);
        ring.publish(hi - 1);
        assert_eq!(poller.poll(|_, _, _| Ok(true)).unwrap(), PollState::Processing);
        assert_eq!(poller.sequence().get(), 1);
    }
}
