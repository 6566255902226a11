use parking_lot::Mutex;
use std::any::Any;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// A unit of work handed to an [`Executor`], typically a processor's `run`.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs processor loops somewhere other than the calling thread.
pub trait Executor {
    /// Starts `task`. Processor loops block until halted, so each task needs
    /// a thread of its own.
    fn execute(&self, task: Task) -> io::Result<()>;
}

/// One named OS thread per task, joined by [`ThreadExecutor::join_all`].
#[derive(Debug)]
pub struct ThreadExecutor {
    name: String,
    spawned: AtomicUsize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadExecutor {
    /// Threads are named `{name}-{n}`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spawned: AtomicUsize::new(0),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Waits for every thread started so far.
    ///
    /// # Errors
    ///
    /// The panic payload of the first thread that panicked. Every thread is
    /// joined regardless.
    pub fn join_all(&self) -> Result<(), Box<dyn Any + Send + 'static>> {
        let handles = std::mem::take(&mut *self.handles.lock());
        let mut first_panic = None;

        for handle in handles {
            let name = handle.thread().name().map(str::to_owned);
            if let Err(payload) = handle.join() {
                error!(thread = ?name, "executor thread panicked");
                first_panic.get_or_insert(payload);
            }
        }

        first_panic.map_or(Ok(()), Err)
    }

    /// Threads started and not yet joined.
    pub fn pending(&self) -> usize {
        self.handles.lock().len()
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, task: Task) -> io::Result<()> {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.name, n);
        let handle = thread::Builder::new().name(name.clone()).spawn(task)?;
        debug!(thread = %name, "executor thread started");
        self.handles.lock().push(handle);
        Ok(())
    }
}
