//! Competing consumers: each event goes to exactly one worker.

use crate::processor::{RunState, Start};
use crate::sequence::{minimum_sequence, Sequence};
use crate::{
    EventProcessor, ExceptionHandler, Executor, PoolError, ProcessorError, RingBuffer,
    SequenceBarrier, WaitError, WorkHandler,
};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error};

// =============================================================================
// WORK CLAIM PROTOCOL
// =============================================================================
//
// Workers share `work_sequence`, the highest sequence handed to any worker.
// To take work a worker:
//
// 1. reads next = work_sequence + 1
// 2. sets its own sequence to next - 1 *before* claiming, so the pool's
//    minimum never claims more progress than has actually been made
// 3. CASes work_sequence: next - 1 -> next, retrying from 1 on failure
//
// A successful CAS makes `next` exclusively this worker's. The worker then
// waits on the barrier only when `next` is beyond the last available
// sequence it saw, so a backlog is claimed without re-waiting.
// =============================================================================

/// One worker of a [`WorkerPool`].
pub struct WorkProcessor<E, H> {
    ring: Arc<RingBuffer<E>>,
    barrier: Arc<SequenceBarrier>,
    handler: Mutex<H>,
    exception_handler: RwLock<Arc<dyn ExceptionHandler<E>>>,
    sequence: Arc<Sequence>,
    work_sequence: Arc<Sequence>,
    running: RunState,
}

impl<E, H> WorkProcessor<E, H>
where
    E: Send + Sync + 'static,
    H: WorkHandler<E>,
{
    /// Creates a worker claiming from `work_sequence`.
    ///
    /// The worker's own sequence is not registered for gating; a
    /// [`WorkerPool`] registers all of its workers at once.
    pub fn new(
        ring: Arc<RingBuffer<E>>,
        barrier: Arc<SequenceBarrier>,
        handler: H,
        exception_handler: Arc<dyn ExceptionHandler<E>>,
        work_sequence: Arc<Sequence>,
    ) -> Self {
        Self {
            ring,
            barrier,
            handler: Mutex::new(handler),
            exception_handler: RwLock::new(exception_handler),
            sequence: Arc::new(Sequence::default()),
            work_sequence,
            running: RunState::new(),
        }
    }

    /// Replaces the exception handler.
    pub fn set_exception_handler(&self, exception_handler: Arc<dyn ExceptionHandler<E>>) {
        *self.exception_handler.write() = exception_handler;
    }

    fn exception_handler(&self) -> Arc<dyn ExceptionHandler<E>> {
        self.exception_handler.read().clone()
    }

    /// Claims the next unclaimed sequence for this worker.
    fn claim(&self) -> i64 {
        loop {
            let next = self.work_sequence.get() + 1;
            self.sequence.set(next - 1);
            if self.work_sequence.compare_and_set(next - 1, next) {
                return next;
            }
        }
    }

    fn process_events(&self, handler: &mut H) {
        let mut claimed = true;
        let mut cached_available = i64::MIN;
        let mut next_sequence = self.sequence.get();

        loop {
            if claimed {
                claimed = false;
                next_sequence = self.claim();
            }

            if cached_available >= next_sequence {
                // SAFETY: next_sequence is published (<= cached_available) and
                // exclusively ours; our sequence (next_sequence - 1) gates it.
                let event = unsafe { self.ring.get(next_sequence) };
                if let Err(error) = handler.on_event(event, next_sequence) {
                    self.exception_handler()
                        .handle_event_exception(error, next_sequence, Some(event));
                }
                claimed = true;
                continue;
            }

            match self.barrier.wait_for(next_sequence) {
                Ok(available) => cached_available = available,
                Err(WaitError::Timeout) => {
                    let sequence = self.sequence.get();
                    if let Err(error) = handler.on_timeout(sequence) {
                        self.exception_handler()
                            .handle_event_exception(error, sequence, None);
                    }
                }
                Err(WaitError::Alerted) => {
                    if !self.running.should_run() {
                        break;
                    }
                }
            }
        }
    }
}

impl<E, H> EventProcessor for WorkProcessor<E, H>
where
    E: Send + Sync + 'static,
    H: WorkHandler<E>,
{
    fn run(&self) -> Result<(), ProcessorError> {
        let start = self.running.try_start();
        if start == Start::AlreadyRunning {
            return Err(ProcessorError::AlreadyRunning);
        }

        let _idle = self.running.idle_on_exit();
        let mut handler = self.handler.lock();

        if start == Start::Started {
            self.barrier.clear_alert();
        }
        if let Err(error) = handler.on_start() {
            self.exception_handler().handle_on_start_exception(error);
        }

        if self.running.should_run() {
            self.process_events(&mut handler);
        }

        if let Err(error) = handler.on_shutdown() {
            self.exception_handler().handle_on_shutdown_exception(error);
        }
        Ok(())
    }

    /// Stops this worker.
    ///
    /// The barrier is shared by every worker of a pool, so the alert reaches
    /// all of them: the others keep running but spin on the alert until they
    /// are halted as well. Stop a pool with [`WorkerPool::halt`] or
    /// [`WorkerPool::drain_and_halt`] rather than worker by worker.
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

impl<E, H> fmt::Debug for WorkProcessor<E, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkProcessor")
            .field("sequence", &self.sequence)
            .field("work_sequence", &self.work_sequence)
            .field("running", &self.running.is_running())
            .finish_non_exhaustive()
    }
}

/// A pool of [`WorkProcessor`]s sharing one work sequence.
///
/// Every worker and the work sequence itself are registered as gating
/// sequences of the ring on construction.
pub struct WorkerPool<E, H> {
    ring: Arc<RingBuffer<E>>,
    work_sequence: Arc<Sequence>,
    workers: Vec<Arc<WorkProcessor<E, H>>>,
    started: AtomicBool,
}

impl<E, H> WorkerPool<E, H>
where
    E: Send + Sync + 'static,
    H: WorkHandler<E> + 'static,
{
    /// Creates one worker per handler, all waiting on `barrier`.
    pub fn new(
        ring: Arc<RingBuffer<E>>,
        barrier: SequenceBarrier,
        exception_handler: Arc<dyn ExceptionHandler<E>>,
        handlers: Vec<H>,
    ) -> Self {
        let barrier = Arc::new(barrier);
        let work_sequence = Arc::new(Sequence::default());

        let workers = handlers
            .into_iter()
            .map(|handler| {
                Arc::new(WorkProcessor::new(
                    Arc::clone(&ring),
                    Arc::clone(&barrier),
                    handler,
                    Arc::clone(&exception_handler),
                    Arc::clone(&work_sequence),
                ))
            })
            .collect();

        let pool = Self {
            ring,
            work_sequence,
            workers,
            started: AtomicBool::new(false),
        };
        pool.ring.add_gating_sequences(&pool.worker_sequences());
        pool
    }

    /// Every worker's sequence followed by the shared work sequence.
    pub fn worker_sequences(&self) -> Vec<Arc<Sequence>> {
        self.workers
            .iter()
            .map(|worker| Arc::clone(worker.sequence()))
            .chain(std::iter::once(Arc::clone(&self.work_sequence)))
            .collect()
    }

    /// Starts every worker on `executor`, skipping events published before now.
    ///
    /// # Errors
    ///
    /// [`PoolError::AlreadyStarted`] if the pool is running, and
    /// [`PoolError::SpawnFailed`] if the executor rejects a worker (the
    /// workers started so far are halted).
    pub fn start(&self, executor: &dyn Executor) -> Result<(), PoolError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PoolError::AlreadyStarted);
        }

        let cursor = self.ring.cursor();
        self.work_sequence.set(cursor);
        for worker in &self.workers {
            worker.sequence().set(cursor);
        }

        for (index, worker) in self.workers.iter().enumerate() {
            let task_worker = Arc::clone(worker);
            let spawned = executor.execute(Box::new(move || {
                if let Err(e) = task_worker.run() {
                    error!(error = %e, "worker failed to run");
                }
            }));

            if let Err(e) = spawned {
                error!(worker = index, error = %e, "failed to start worker");
                for started in &self.workers[..index] {
                    started.halt();
                }
                self.started.store(false, Ordering::Release);
                return Err(PoolError::SpawnFailed);
            }
        }

        debug!(workers = self.workers.len(), cursor, "worker pool started");
        Ok(())
    }

    /// Waits until every published event has been processed, then halts.
    pub fn drain_and_halt(&self) {
        let sequences = self.worker_sequences();
        while self.ring.cursor() > minimum_sequence(&sequences, i64::MAX) {
            thread::yield_now();
        }

        debug!(cursor = self.ring.cursor(), "worker pool drained");
        self.halt();
    }

    /// Halts every worker without waiting for outstanding events.
    pub fn halt(&self) {
        for worker in &self.workers {
            worker.halt();
        }
        self.started.store(false, Ordering::Release);
        debug!(workers = self.workers.len(), "worker pool halted");
    }

    /// Whether the pool has been started and not halted.
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// The workers, for inspecting their state.
    pub fn workers(&self) -> &[Arc<WorkProcessor<E, H>>] {
        &self.workers
    }
}

impl<E, H> fmt::Debug for WorkerPool<E, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("work_sequence", &self.work_sequence)
            .field("workers", &self.workers.len())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
