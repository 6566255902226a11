use super::WaitStrategy;
use crate::sequence::Sequence;
use crate::{FixedSequenceGroup, SequenceBarrier, WaitError};
use std::hint;
use std::thread;
use std::time::Duration;

/// Tight re-check loop with a PAUSE hint. Lowest latency; burns a core per
/// waiting consumer, so only use it with dedicated cores.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    /// Creates a new strategy.
    pub const fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    #[inline]
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent: &FixedSequenceGroup,
        barrier: &SequenceBarrier,
    ) -> Result<i64, WaitError> {
        loop {
            let available = dependent.get();
            if available >= sequence {
                return Ok(available);
            }
            barrier.check_alert()?;
            hint::spin_loop();
        }
    }

    #[inline]
    fn signal_all_when_blocking(&self) {}
}

/// Spins `spin_tries` times, then yields the thread on every further
/// iteration. Good latency without monopolising a shared core.
#[derive(Debug, Clone, Copy)]
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl YieldingWaitStrategy {
    /// Default number of spins before yielding.
    pub const DEFAULT_SPIN_TRIES: u32 = 100;

    /// Creates a strategy with the default spin budget.
    pub const fn new() -> Self {
        Self {
            spin_tries: Self::DEFAULT_SPIN_TRIES,
        }
    }

    /// Sets the number of spins before yielding.
    pub const fn with_spin_tries(mut self, spin_tries: u32) -> Self {
        self.spin_tries = spin_tries;
        self
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent: &FixedSequenceGroup,
        barrier: &SequenceBarrier,
    ) -> Result<i64, WaitError> {
        let mut counter = self.spin_tries;
        loop {
            let available = dependent.get();
            if available >= sequence {
                return Ok(available);
            }
            barrier.check_alert()?;

            if counter == 0 {
                thread::yield_now();
            } else {
                counter -= 1;
                hint::spin_loop();
            }
        }
    }

    #[inline]
    fn signal_all_when_blocking(&self) {}
}

/// Spins, then yields, then sleeps `sleep` per iteration.
///
/// Low CPU when idle, with latency spikes bounded by the sleep duration.
#[derive(Debug, Clone, Copy)]
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep: Duration,
}

impl SleepingWaitStrategy {
    /// Default iterations before sleeping; the first half spins, the second
    /// half yields.
    pub const DEFAULT_RETRIES: u32 = 200;
    /// Default sleep per iteration once spinning and yielding are spent.
    pub const DEFAULT_SLEEP: Duration = Duration::from_nanos(100);

    /// Creates a strategy with the default budget.
    pub const fn new() -> Self {
        Self {
            retries: Self::DEFAULT_RETRIES,
            sleep: Self::DEFAULT_SLEEP,
        }
    }

    /// Sets the spin + yield budget.
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the sleep per idle iteration.
    pub const fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependent: &FixedSequenceGroup,
        barrier: &SequenceBarrier,
    ) -> Result<i64, WaitError> {
        let spin_until = self.retries / 2;
        let mut counter = self.retries;
        loop {
            let available = dependent.get();
            if available >= sequence {
                return Ok(available);
            }
            barrier.check_alert()?;

            if counter > spin_until {
                counter -= 1;
                hint::spin_loop();
            } else if counter > 0 {
                counter -= 1;
                thread::yield_now();
            } else {
                thread::sleep(self.sleep);
            }
        }
    }

    #[inline]
    fn signal_all_when_blocking(&self) {}
}
