//! How a consumer waits for a sequence to become available.
//!
//! Each strategy trades CPU for latency:
//!
//! | strategy                          | latency  | cpu     | wake-up          |
//! |-----------------------------------|----------|---------|------------------|
//! | [`BusySpinWaitStrategy`]          | lowest   | highest | none needed      |
//! | [`YieldingWaitStrategy`]          | low      | high    | none needed      |
//! | [`SleepingWaitStrategy`]          | moderate | low     | none needed      |
//! | [`PhasedBackoffWaitStrategy`]     | adaptive | adaptive| fallback's       |
//! | [`BlockingWaitStrategy`]          | higher   | minimal | condvar          |
//! | [`LiteBlockingWaitStrategy`]      | higher   | minimal | condvar, if armed|
//! | [`TimeoutBlockingWaitStrategy`]   | higher   | minimal | condvar/timeout  |
//! | [`LiteTimeoutBlockingWaitStrategy`]| higher  | minimal | condvar/timeout  |
//!
//! Every strategy re-checks the barrier's alert flag on each iteration or
//! wake-up, and `signal_all_when_blocking` is a no-op when nobody waits.

mod blocking;
mod phased;
mod spinning;

pub use blocking::{
    BlockingWaitStrategy, LiteBlockingWaitStrategy, LiteTimeoutBlockingWaitStrategy,
    TimeoutBlockingWaitStrategy,
};
pub use phased::PhasedBackoffWaitStrategy;
pub use spinning::{BusySpinWaitStrategy, SleepingWaitStrategy, YieldingWaitStrategy};

use crate::sequence::Sequence;
use crate::{FixedSequenceGroup, SequenceBarrier, WaitError};
use std::fmt;

/// Pluggable policy for waiting on a sequence.
pub trait WaitStrategy: Send + Sync + fmt::Debug {
    /// Waits until `dependent` reaches `sequence` and returns its value.
    ///
    /// `cursor` is the producer cursor, which blocking strategies sleep on;
    /// `dependent` is the minimum over upstream consumers (or the cursor
    /// itself when there are none). The returned value may exceed `sequence`.
    ///
    /// Returns [`WaitError::Alerted`] as soon as `barrier` is alerted and
    /// [`WaitError::Timeout`] if a timeout-capable strategy gives up.
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &FixedSequenceGroup,
        barrier: &SequenceBarrier,
    ) -> Result<i64, WaitError>;

    /// Wakes every thread blocked in `wait_for`.
    fn signal_all_when_blocking(&self);
}

/// Spin on `dependent` until it reaches `sequence`, re-checking the alert.
///
/// Blocking strategies finish with this once the cursor has moved: upstream
/// consumers are expected to be close behind.
#[inline]
pub(crate) fn spin_on_dependent(
    sequence: i64,
    dependent: &FixedSequenceGroup,
    barrier: &SequenceBarrier,
) -> Result<i64, WaitError> {
    loop {
        let available = dependent.get();
        if available >= sequence {
            return Ok(available);
        }
        barrier.check_alert()?;
        std::hint::spin_loop();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared scaffolding for wait strategy tests.

    use crate::{RingBuffer, SequenceBarrier, WaitError, WaitStrategy};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    pub(crate) fn ring(strategy: Arc<dyn WaitStrategy>) -> Arc<RingBuffer<i64>> {
        Arc::new(RingBuffer::single_producer(8, || 0, strategy).unwrap())
    }

    /// A waiter blocked on sequence 0 is released by a publish from another thread.
    pub(crate) fn assert_wakes_on_publish(strategy: Arc<dyn WaitStrategy>) {
        let ring = ring(strategy);
        let barrier = Arc::new(ring.new_barrier(&[]));

        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait_for(0))
        };

        thread::sleep(Duration::from_millis(20));
        let seq = ring.next();
        ring.publish(seq);

        assert_eq!(waiter.join().unwrap(), Ok(0));
    }

    /// An alert unblocks a waiter that would otherwise wait forever.
    pub(crate) fn assert_alert_unblocks(strategy: Arc<dyn WaitStrategy>) {
        let ring = ring(strategy);
        let barrier: Arc<SequenceBarrier> = Arc::new(ring.new_barrier(&[]));

        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait_for(0))
        };

        thread::sleep(Duration::from_millis(20));
        barrier.alert();

        assert_eq!(waiter.join().unwrap(), Err(WaitError::Alerted));
    }

    /// Signalling with nobody waiting is harmless.
    pub(crate) fn assert_signal_without_waiters(strategy: Arc<dyn WaitStrategy>) {
        strategy.signal_all_when_blocking();
        strategy.signal_all_when_blocking();
    }
}
