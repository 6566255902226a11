use super::{spin_on_dependent, WaitStrategy};
use crate::sequence::Sequence;
use crate::{FixedSequenceGroup, SequenceBarrier, WaitError};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

// All four strategies sleep on a condvar while the *cursor* is behind, then
// spin on the dependent sequence. The cursor is re-checked under the mutex
// and `signal_all_when_blocking` notifies under the same mutex, so a publish
// between the check and the wait cannot be lost.

/// Condvar wait, woken by every publish.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl BlockingWaitStrategy {
    /// Creates a new strategy.
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &FixedSequenceGroup,
        barrier: &SequenceBarrier,
    ) -> Result<i64, WaitError> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                barrier.check_alert()?;
                self.condvar.wait(&mut guard);
            }
        }

        spin_on_dependent(sequence, dependent, barrier)
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Blocking wait that skips the mutex on publish unless a waiter has armed
/// the signal flag. Cheaper for producers when consumers are keeping up.
#[derive(Debug, Default)]
pub struct LiteBlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    signal_needed: AtomicBool,
}

impl LiteBlockingWaitStrategy {
    /// Creates a new strategy.
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for LiteBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &FixedSequenceGroup,
        barrier: &SequenceBarrier,
    ) -> Result<i64, WaitError> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            loop {
                self.signal_needed.swap(true, Ordering::SeqCst);
                if cursor.get() >= sequence {
                    break;
                }
                barrier.check_alert()?;
                self.condvar.wait(&mut guard);
                if cursor.get() >= sequence {
                    break;
                }
            }
        }

        spin_on_dependent(sequence, dependent, barrier)
    }

    fn signal_all_when_blocking(&self) {
        if self.signal_needed.swap(false, Ordering::SeqCst) {
            let _guard = self.mutex.lock();
            self.condvar.notify_all();
        }
    }
}

/// Blocking wait that gives up with [`WaitError::Timeout`] after `timeout`,
/// letting the processor run its timeout hook.
#[derive(Debug)]
pub struct TimeoutBlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    timeout: Duration,
}

impl TimeoutBlockingWaitStrategy {
    /// Creates a strategy that times out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            timeout,
        }
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl WaitStrategy for TimeoutBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &FixedSequenceGroup,
        barrier: &SequenceBarrier,
    ) -> Result<i64, WaitError> {
        if cursor.get() < sequence {
            let deadline = Instant::now() + self.timeout;
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                barrier.check_alert()?;
                if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                    return Err(WaitError::Timeout);
                }
            }
        }

        spin_on_dependent(sequence, dependent, barrier)
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// [`LiteBlockingWaitStrategy`] with a timeout.
#[derive(Debug)]
pub struct LiteTimeoutBlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    signal_needed: AtomicBool,
    timeout: Duration,
}

impl LiteTimeoutBlockingWaitStrategy {
    /// Creates a strategy that times out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            signal_needed: AtomicBool::new(false),
            timeout,
        }
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl WaitStrategy for LiteTimeoutBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent: &FixedSequenceGroup,
        barrier: &SequenceBarrier,
    ) -> Result<i64, WaitError> {
        if cursor.get() < sequence {
            let deadline = Instant::now() + self.timeout;
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                self.signal_needed.swap(true, Ordering::SeqCst);
                if cursor.get() >= sequence {
                    break;
                }
                barrier.check_alert()?;
                if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                    return Err(WaitError::Timeout);
                }
            }
        }

        spin_on_dependent(sequence, dependent, barrier)
    }

    fn signal_all_when_blocking(&self) {
        if self.signal_needed.swap(false, Ordering::SeqCst) {
            let _guard = self.mutex.lock();
            self.condvar.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait_strategy::test_support::*;
    use std::sync::Arc;

    #[test]
    fn test_blocking_wakes_and_alerts() {
        assert_wakes_on_publish(Arc::new(BlockingWaitStrategy::new()));
        assert_alert_unblocks(Arc::new(BlockingWaitStrategy::new()));
        assert_signal_without_waiters(Arc::new(BlockingWaitStrategy::new()));
    }

    #[test]
    fn test_lite_blocking_wakes_and_alerts() {
        assert_wakes_on_publish(Arc::new(LiteBlockingWaitStrategy::new()));
        assert_alert_unblocks(Arc::new(LiteBlockingWaitStrategy::new()));
        assert_signal_without_waiters(Arc::new(LiteBlockingWaitStrategy::new()));
    }

    #[test]
    fn test_timeout_blocking_times_out() {
        let strategy = Arc::new(TimeoutBlockingWaitStrategy::new(Duration::from_millis(10)));
        let ring = ring(strategy.clone());
        let barrier = ring.new_barrier(&[]);

        let start = Instant::now();
        assert_eq!(barrier.wait_for(0), Err(WaitError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_timeout_blocking_wakes_and_alerts() {
        let long = Duration::from_secs(5);
        assert_wakes_on_publish(Arc::new(TimeoutBlockingWaitStrategy::new(long)));
        assert_alert_unblocks(Arc::new(TimeoutBlockingWaitStrategy::new(long)));
        assert_signal_without_waiters(Arc::new(TimeoutBlockingWaitStrategy::new(long)));
    }

    #[test]
    fn test_lite_timeout_blocking() {
        let strategy = Arc::new(LiteTimeoutBlockingWaitStrategy::new(Duration::from_millis(10)));
        let ring = ring(strategy);
        let barrier = ring.new_barrier(&[]);
        assert_eq!(barrier.wait_for(0), Err(WaitError::Timeout));

        let long = Duration::from_secs(5);
        assert_wakes_on_publish(Arc::new(LiteTimeoutBlockingWaitStrategy::new(long)));
        assert_alert_unblocks(Arc::new(LiteTimeoutBlockingWaitStrategy::new(long)));
    }

    #[test]
    fn test_returns_immediately_when_available() {
        let ring = ring(Arc::new(BlockingWaitStrategy::new()));
        let hi = ring.next_n(3).unwrap();
        ring.publish(hi);

        let barrier = ring.new_barrier(&[]);
        assert_eq!(barrier.wait_for(1), Ok(2));
    }
}
