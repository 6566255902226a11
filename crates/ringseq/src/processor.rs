//! Batch consumption loop for one handler.

use crate::invariants::debug_assert_monotonic;
use crate::sequence::Sequence;
use crate::{
    ConfigError, EventHandler, ExceptionHandler, LoggingExceptionHandler, ProcessorError,
    RingBuffer, SequenceBarrier, WaitError,
};
use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Lifecycle of a processor that can be run, halted and run again.
pub trait EventProcessor: Send + Sync {
    /// Runs the processing loop on the calling thread until halted.
    ///
    /// # Errors
    ///
    /// [`ProcessorError::AlreadyRunning`] if another thread is running it.
    fn run(&self) -> Result<(), ProcessorError>;

    /// Asks a running processor to stop after its current event. Returns
    /// immediately; the loop exits once it observes the request.
    fn halt(&self);

    /// Whether `run` is in progress (including while a halt is pending).
    fn is_running(&self) -> bool;

    /// The processor's progress sequence.
    fn sequence(&self) -> &Arc<Sequence>;
}

// Run state. IDLE -> RUNNING -> IDLE on a normal exit; halt() moves RUNNING
// (or IDLE) to HALTED and the loop, or the early exit, returns it to IDLE.
const IDLE: u8 = 0;
const HALTED: u8 = 1;
const RUNNING: u8 = 2;

/// Outcome of [`RunState::try_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Start {
    Started,
    AlreadyRunning,
    /// Halted before `run` began; pair the lifecycle hooks and return.
    Halted,
}

/// The run state shared by both processor kinds.
#[derive(Debug)]
pub(crate) struct RunState(CachePadded<AtomicU8>);

impl RunState {
    pub(crate) fn new() -> Self {
        Self(CachePadded::new(AtomicU8::new(IDLE)))
    }

    pub(crate) fn try_start(&self) -> Start {
        match self
            .0
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Start::Started,
            Err(RUNNING) => Start::AlreadyRunning,
            Err(_) => Start::Halted,
        }
    }

    pub(crate) fn halt(&self) {
        self.0.store(HALTED, Ordering::Release);
    }

    /// True until a halt is requested.
    #[inline]
    pub(crate) fn should_run(&self) -> bool {
        self.0.load(Ordering::Acquire) == RUNNING
    }

    /// True from `run` entry until it returns, halt pending or not.
    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire) != IDLE
    }

    /// Returns the state to IDLE when dropped, including by panic.
    pub(crate) fn idle_on_exit(&self) -> IdleOnExit<'_> {
        IdleOnExit(&self.0)
    }
}

pub(crate) struct IdleOnExit<'a>(&'a AtomicU8);

impl Drop for IdleOnExit<'_> {
    fn drop(&mut self) {
        self.0.store(IDLE, Ordering::Release);
    }
}

/// Dispatches every event on the ring to one [`EventHandler`], in batches.
///
/// The processor waits on its barrier for the next sequence, hands the whole
/// available range to the handler and then advances its own sequence once
/// per batch. Chain processors by building a downstream barrier over the
/// upstream processors' sequences.
///
/// The processor's sequence is registered as a gating sequence of the ring
/// on construction, so producers never lap events it has yet to read.
pub struct BatchEventProcessor<E, H> {
    ring: Arc<RingBuffer<E>>,
    barrier: SequenceBarrier,
    handler: Mutex<H>,
    exception_handler: RwLock<Arc<dyn ExceptionHandler<E>>>,
    sequence: Arc<Sequence>,
    running: RunState,
    max_batch_size: i64,
}

impl<E, H> BatchEventProcessor<E, H>
where
    E: Send + Sync + 'static,
    H: EventHandler<E>,
{
    /// Creates a processor reading `ring` through `barrier`.
    pub fn new(ring: Arc<RingBuffer<E>>, barrier: SequenceBarrier, mut handler: H) -> Self {
        let sequence = Arc::new(Sequence::default());
        ring.add_gating_sequences(&[Arc::clone(&sequence)]);
        handler.set_sequence_callback(Arc::clone(&sequence));

        Self {
            ring,
            barrier,
            handler: Mutex::new(handler),
            exception_handler: RwLock::new(Arc::new(LoggingExceptionHandler)),
            sequence,
            running: RunState::new(),
            max_batch_size: i64::MAX,
        }
    }

    /// Caps the events dispatched per batch; the rest of an available range
    /// follows in later batches.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidBatchSize`] if `max_batch_size` is zero.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Result<Self, ConfigError> {
        if max_batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize {
                size: max_batch_size,
            });
        }
        self.max_batch_size = i64::try_from(max_batch_size).unwrap_or(i64::MAX);
        Ok(self)
    }

    /// Replaces the exception handler. Takes effect for the next error, even
    /// while running.
    pub fn set_exception_handler(&self, exception_handler: Arc<dyn ExceptionHandler<E>>) {
        *self.exception_handler.write() = exception_handler;
    }

    /// The barrier this processor waits on.
    pub fn barrier(&self) -> &SequenceBarrier {
        &self.barrier
    }

    /// Consumes the processor and returns its handler.
    pub fn into_handler(self) -> H {
        self.handler.into_inner()
    }

    fn exception_handler(&self) -> Arc<dyn ExceptionHandler<E>> {
        self.exception_handler.read().clone()
    }

    fn notify_start(&self, handler: &mut H) {
        if let Err(error) = handler.on_start() {
            self.exception_handler().handle_on_start_exception(error);
        }
    }

    fn notify_shutdown(&self, handler: &mut H) {
        if let Err(error) = handler.on_shutdown() {
            self.exception_handler().handle_on_shutdown_exception(error);
        }
    }

    fn notify_timeout(&self, handler: &mut H, sequence: i64) {
        if let Err(error) = handler.on_timeout(sequence) {
            self.exception_handler()
                .handle_event_exception(error, sequence, None);
        }
    }

    /// Halted before `run` got going: still pair the lifecycle hooks.
    fn early_exit(&self) {
        let _idle = self.running.idle_on_exit();
        let mut handler = self.handler.lock();
        self.notify_start(&mut handler);
        self.notify_shutdown(&mut handler);
        debug!(sequence = self.sequence.get(), "event processor halted before start");
    }

    fn process_events(&self, handler: &mut H) {
        let mut next_sequence = self.sequence.get() + 1;

        loop {
            match self.barrier.wait_for(next_sequence) {
                Ok(available) => {
                    let end_of_batch =
                        available.min(next_sequence.saturating_add(self.max_batch_size - 1));

                    if next_sequence <= end_of_batch {
                        handler.on_batch_start(
                            end_of_batch - next_sequence + 1,
                            available - next_sequence + 1,
                        );
                    }

                    while next_sequence <= end_of_batch {
                        // SAFETY: the barrier reported next_sequence published,
                        // and our sequence (< next_sequence) gates the producers.
                        let event = unsafe { self.ring.get(next_sequence) };
                        if let Err(error) =
                            handler.on_event(event, next_sequence, next_sequence == end_of_batch)
                        {
                            self.exception_handler().handle_event_exception(
                                error,
                                next_sequence,
                                Some(event),
                            );
                        }
                        next_sequence += 1;
                    }

                    debug_assert_monotonic!(
                        "processor sequence",
                        self.sequence.get(),
                        end_of_batch
                    );
                    self.sequence.set(end_of_batch);
                }
                Err(WaitError::Timeout) => self.notify_timeout(handler, self.sequence.get()),
                Err(WaitError::Alerted) => {
                    if !self.running.should_run() {
                        break;
                    }
                }
            }
        }
    }
}

impl<E, H> EventProcessor for BatchEventProcessor<E, H>
where
    E: Send + Sync + 'static,
    H: EventHandler<E>,
{
    fn run(&self) -> Result<(), ProcessorError> {
        match self.running.try_start() {
            Start::Started => {}
            Start::AlreadyRunning => return Err(ProcessorError::AlreadyRunning),
            Start::Halted => {
                self.early_exit();
                return Ok(());
            }
        }

        let _idle = self.running.idle_on_exit();
        let mut handler = self.handler.lock();

        self.barrier.clear_alert();
        self.notify_start(&mut handler);
        debug!(sequence = self.sequence.get(), "event processor started");

        if self.running.should_run() {
            self.process_events(&mut handler);
        }

        self.notify_shutdown(&mut handler);
        debug!(sequence = self.sequence.get(), "event processor stopped");
        Ok(())
    }

    fn halt(&self) {
        self.running.halt();
        self.barrier.alert();
    }

    #[inline]
    fn is_running(&self) -> bool {
        self.running.is_running()
    }

    #[inline]
    fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }
}

impl<E, H> fmt::Debug for BatchEventProcessor<E, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchEventProcessor")
            .field("sequence", &self.sequence)
            .field("running", &self.running.is_running())
            .field("max_batch_size", &self.max_batch_size)
            .finish_non_exhaustive()
    }
}
