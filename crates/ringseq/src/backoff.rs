use std::hint;
use std::thread;
use std::time::Duration;

/// Producer-side backoff for a full ring.
///
/// Escalates spin with PAUSE → yield to OS → short park. Unlike a consumer
/// wait strategy it never gives up: a blocked `next()` must keep waiting until
/// the slowest gating sequence moves.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6; // 2^6 = 64 spins max before yielding
    const YIELD_LIMIT: u32 = 10; // then park
    const PARK: Duration = Duration::from_micros(1);

    /// Creates a new backoff instance.
    #[inline]
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Wait a little longer than last time.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..1u32 << self.step {
                hint::spin_loop();
            }
        } else if self.step <= Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::park_timeout(Self::PARK);
            return;
        }
        self.step += 1;
    }

    /// Returns true once spinning and yielding are exhausted and each
    /// `snooze` parks the thread.
    #[cfg(test)]
    fn is_parking(&self) -> bool {
        self.step > Self::YIELD_LIMIT
    }

    /// Back to spinning, after the awaited sequence moved.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
