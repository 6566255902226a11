//! User callbacks driven by the processors.
//!
//! Optional lifecycle hooks are default trait methods: a handler overrides
//! only what it needs, and the processor calls every hook unconditionally
//! through static dispatch. The defaults are empty and inline away.

use crate::sequence::Sequence;
use crate::HandlerError;
use std::sync::Arc;
use tracing::{error, warn};

/// Callback for a [`BatchEventProcessor`](crate::BatchEventProcessor).
///
/// Every handler on a ring sees every event, in sequence order.
pub trait EventHandler<E>: Send {
    /// Handles one event. `end_of_batch` is true on the last event of a
    /// batch, a natural point to flush buffered work.
    ///
    /// An error is passed to the processor's
    /// [`ExceptionHandler`] and the event is not retried.
    fn on_event(&mut self, event: &E, sequence: i64, end_of_batch: bool)
        -> Result<(), HandlerError>;

    /// Called before each batch with the number of events about to be
    /// dispatched and the number available (which exceeds `batch_size` when
    /// the processor caps its batches).
    #[inline]
    fn on_batch_start(&mut self, batch_size: i64, queue_depth: i64) {
        let _ = (batch_size, queue_depth);
    }

    /// Called once on the processor thread before the first event.
    fn on_start(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called once on the processor thread after the last event.
    fn on_shutdown(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called when a timeout-capable wait strategy gives up. `sequence` is
    /// the processor's current sequence.
    fn on_timeout(&mut self, sequence: i64) -> Result<(), HandlerError> {
        let _ = sequence;
        Ok(())
    }

    /// Receives the processor's sequence before `on_start`.
    ///
    /// A handler that finishes with events asynchronously can store it and
    /// advance it early, releasing slots before the batch ends.
    fn set_sequence_callback(&mut self, sequence: Arc<Sequence>) {
        let _ = sequence;
    }
}

/// Callback for a [`WorkProcessor`](crate::WorkProcessor).
///
/// Each event goes to exactly one handler in the pool.
pub trait WorkHandler<E>: Send {
    /// Handles one event. An error is passed to the
    /// [`ExceptionHandler`] and the event is not retried.
    fn on_event(&mut self, event: &E, sequence: i64) -> Result<(), HandlerError>;

    /// Called once on the worker thread before the first event.
    fn on_start(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called once on the worker thread after the last event.
    fn on_shutdown(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called when a timeout-capable wait strategy gives up.
    fn on_timeout(&mut self, sequence: i64) -> Result<(), HandlerError> {
        let _ = sequence;
        Ok(())
    }
}

/// Receives errors from handler callbacks. Processing always continues.
pub trait ExceptionHandler<E>: Send + Sync {
    /// An `on_event` (or `on_timeout`) callback failed at `sequence`.
    /// `event` is `None` for timeouts.
    fn handle_event_exception(&self, error: HandlerError, sequence: i64, event: Option<&E>);

    /// `on_start` failed. The processor still runs.
    fn handle_on_start_exception(&self, error: HandlerError);

    /// `on_shutdown` failed. The processor still returns to idle.
    fn handle_on_shutdown_exception(&self, error: HandlerError);
}

/// Logs every error at `error` level and carries on. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingExceptionHandler;

impl<E> ExceptionHandler<E> for LoggingExceptionHandler {
    fn handle_event_exception(&self, error: HandlerError, sequence: i64, _event: Option<&E>) {
        error!(sequence, error = %error, "exception processing event");
    }

    fn handle_on_start_exception(&self, error: HandlerError) {
        error!(error = %error, "exception during on_start");
    }

    fn handle_on_shutdown_exception(&self, error: HandlerError) {
        error!(error = %error, "exception during on_shutdown");
    }
}

/// Logs every error at `warn` level. For handlers whose failures are expected.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreExceptionHandler;

impl<E> ExceptionHandler<E> for IgnoreExceptionHandler {
    fn handle_event_exception(&self, error: HandlerError, sequence: i64, _event: Option<&E>) {
        warn!(sequence, error = %error, "ignoring exception processing event");
    }

    fn handle_on_start_exception(&self, error: HandlerError) {
        warn!(error = %error, "ignoring exception during on_start");
    }

    fn handle_on_shutdown_exception(&self, error: HandlerError) {
        warn!(error = %error, "ignoring exception during on_shutdown");
    }
}
