//! Error types for ringseq operations.
//!
//! Every control-flow error is a `Copy` enum so that raising one on the hot
//! path (a full ring, an alert, a wait timeout) never allocates.

use thiserror::Error;

/// Error returned by user callbacks (event, lifecycle and timeout hooks).
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Invalid construction or tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Buffer size is zero, not a power of two, or too large.
    #[error("buffer size must be a positive power of two, got {size}")]
    InvalidBufferSize {
        /// The rejected size.
        size: usize,
    },

    /// A batch limit outside the accepted range.
    #[error("batch size must be at least 1, got {size}")]
    InvalidBatchSize {
        /// The rejected size.
        size: usize,
    },
}

/// Errors from claiming sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClaimError {
    /// Not enough free slots for the claim. Only returned by the `try_*` family.
    #[error("insufficient capacity in ring buffer")]
    InsufficientCapacity,

    /// Claim size outside `[1, buffer_size]`.
    #[error("cannot claim {requested} slots from a buffer of {buffer_size}")]
    InvalidClaimSize {
        /// The number of slots requested.
        requested: usize,
        /// The ring buffer size.
        buffer_size: usize,
    },
}

impl ClaimError {
    /// Returns `true` if retrying later may succeed (backpressure).
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientCapacity)
    }
}

/// Reasons a [`SequenceBarrier::wait_for`](crate::SequenceBarrier::wait_for) returns early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    /// The barrier was alerted, usually because the processor is halting.
    #[error("sequence barrier alerted")]
    Alerted,

    /// A timeout-capable wait strategy gave up.
    #[error("timed out waiting for sequence")]
    Timeout,
}

/// Lifecycle misuse of an event processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProcessorError {
    /// `run` was called while another thread is running the processor.
    #[error("event processor is already running")]
    AlreadyRunning,
}

/// Lifecycle misuse of a worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// `start` was called on a pool that is already started.
    #[error("worker pool has already been started")]
    AlreadyStarted,

    /// The executor could not start a worker. Workers already started are
    /// halted and the pool can be started again.
    #[error("executor failed to start a worker")]
    SpawnFailed,
}
