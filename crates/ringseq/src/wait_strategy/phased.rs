use super::{BlockingWaitStrategy, LiteBlockingWaitStrategy, SleepingWaitStrategy, WaitStrategy};
use crate::sequence::Sequence;
use crate::{FixedSequenceGroup, SequenceBarrier, WaitError};
use std::hint;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Spins for `spin_timeout`, yields until `spin_timeout + yield_timeout`,
/// then hands the wait to a fallback strategy.
///
/// Suited to bursty load: sub-microsecond reaction while traffic flows, low
/// CPU once the burst is over.
#[derive(Debug)]
pub struct PhasedBackoffWaitStrategy {
    spin_timeout: Duration,
    yield_timeout: Duration,
    fallback: Arc<dyn WaitStrategy>,
}

impl PhasedBackoffWaitStrategy {
    const SPIN_TRIES: u32 = 10_000;

    /// Creates a strategy with an explicit fallback.
    ///
    /// `yield_timeout` is measured from the end of the spin phase.
    pub fn new(
        spin_timeout: Duration,
        yield_timeout: Duration,
        fallback: Arc<dyn WaitStrategy>,
    ) -> Self {
        Self {
            spin_timeout,
            yield_timeout: spin_timeout + yield_timeout,
            fallback,
        }
    }

    /// Falls back to [`BlockingWaitStrategy`].
    pub fn with_lock(spin_timeout: Duration, yield_timeout: Duration) -> Self {
        Self::new(spin_timeout, yield_timeout, Arc::new(BlockingWaitStrategy::new()))
    }

    /// Falls back to [`LiteBlockingWaitStrategy`].
    pub fn with_lite_lock(spin_timeout: Duration, yield_timeout: Duration) -> Self {
        Self::new(
            spin_timeout,
            yield_timeout,
            Arc::new(LiteBlockingWaitStrategy::new()),
        )
    }

    /// Falls back to [`SleepingWaitStrategy`] with no spin/yield budget of its own.
    pub fn with_sleep(spin_timeout: Duration, yield_timeout: Duration) -> Self {
        Self::new(
            spin_timeout,
            yield_timeout,
            Arc::new(SleepingWaitStrategy::new().with_retries(0)),
        )
    }
}

impl WaitStrategy for PhasedBackoffWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &FixedSequenceGroup,
        barrier: &SequenceBarrier,
    ) -> Result<i64, WaitError> {
        let mut start: Option<Instant> = None;
        let mut counter = Self::SPIN_TRIES;

        loop {
            let available = dependent.get();
            if available >= sequence {
                return Ok(available);
            }

            counter -= 1;
            if counter == 0 {
                barrier.check_alert()?;
                match start {
                    None => start = Some(Instant::now()),
                    Some(start) => {
                        let elapsed = start.elapsed();
                        if elapsed > self.yield_timeout {
                            return self.fallback.wait_for(sequence, cursor, dependent, barrier);
                        } else if elapsed > self.spin_timeout {
                            thread::yield_now();
                        }
                    }
                }
                counter = Self::SPIN_TRIES;
            } else {
                hint::spin_loop();
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        self.fallback.signal_all_when_blocking();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait_strategy::test_support::*;

    fn short() -> (Duration, Duration) {
        (Duration::from_micros(100), Duration::from_micros(100))
    }

    #[test]
    fn test_with_lock() {
        let (spin, yld) = short();
        assert_wakes_on_publish(Arc::new(PhasedBackoffWaitStrategy::with_lock(spin, yld)));
        assert_alert_unblocks(Arc::new(PhasedBackoffWaitStrategy::with_lock(spin, yld)));
        assert_signal_without_waiters(Arc::new(PhasedBackoffWaitStrategy::with_lock(spin, yld)));
    }

    #[test]
    fn test_with_lite_lock() {
        let (spin, yld) = short();
        assert_wakes_on_publish(Arc::new(PhasedBackoffWaitStrategy::with_lite_lock(spin, yld)));
        assert_alert_unblocks(Arc::new(PhasedBackoffWaitStrategy::with_lite_lock(spin, yld)));
    }

    #[test]
    fn test_with_sleep() {
        let (spin, yld) = short();
        assert_wakes_on_publish(Arc::new(PhasedBackoffWaitStrategy::with_sleep(spin, yld)));
        assert_alert_unblocks(Arc::new(PhasedBackoffWaitStrategy::with_sleep(spin, yld)));
    }
}
