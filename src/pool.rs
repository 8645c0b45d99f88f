use std::{
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

use crossbeam_channel::{bounded, unbounded, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

use crate::{
    error::{BoxError, PoolError, PoolResult, WorkFailure},
    task::{panic_message, Task, TaskHandle},
    thread::{on_worker, Thread},
};

const DEFAULT_THREAD_NAME: &str = "mailpool-worker";

/// Receives every [`WorkFailure`] caught on a worker thread.
pub trait FailureHook: Send + Sync {
    fn on_failure(&self, failure: &WorkFailure);
}

impl<F> FailureHook for F
where
    F: Fn(&WorkFailure) + Send + Sync,
{
    fn on_failure(&self, failure: &WorkFailure) {
        self(failure)
    }
}

/// The default [`FailureHook`]: reports through the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFailures;

impl FailureHook for LogFailures {
    fn on_failure(&self, failure: &WorkFailure) {
        log::error!("{failure}");
    }
}

/// Point-in-time counters for a [`Pool`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub discarded: u64,
    pub rejected: u64,
    /// Work running right now.
    pub active: usize,
    /// Work waiting for a free thread.
    pub queued: usize,
}

/// State shared between the pool handle and its worker threads.
pub(crate) struct Shared {
    discarding: AtomicBool,
    active: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
    rejected: AtomicU64,
    failure_hook: Arc<dyn FailureHook>,
}

impl Shared {
    pub fn new(failure_hook: Arc<dyn FailureHook>) -> Self {
        Self {
            discarding: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failure_hook,
        }
    }

    pub fn is_discarding(&self) -> bool {
        self.discarding.load(Ordering::SeqCst)
    }

    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn begin(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end(&self, result: Result<(), WorkFailure>) {
        match result {
            Ok(()) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(failure) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                let hook = &self.failure_hook;
                // A panicking hook must not take the worker down with it.
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hook.on_failure(&failure))) {
                    log::error!(
                        "failure hook panicked while reporting task {}: {}",
                        failure.task(),
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            active: self.active.load(Ordering::SeqCst),
            queued: 0,
        }
    }
}

/// Configures and builds a [`Pool`].
///
/// ```rust
/// use mailpool::pool::Builder;
///
/// let pool = Builder::new()
///     .num_threads(2)
///     .thread_name("example-worker")
///     .build()?;
/// # Ok::<(), mailpool::error::PoolError>(())
/// ```
pub struct Builder {
    num_threads: usize,
    thread_name: String,
    queue_capacity: Option<usize>,
    failure_hook: Arc<dyn FailureHook>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Defaults to one thread per available CPU, an unbounded queue and
    /// [`LogFailures`].
    pub fn new() -> Self {
        let num_threads = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            num_threads,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            queue_capacity: None,
            failure_hook: Arc::new(LogFailures),
        }
    }

    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Prefix for worker thread names; workers are named `{prefix}-{index}`.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Bound the number of queued (not yet running) units of work. When the
    /// queue is full, [`Pool::submit`] returns [`PoolError::Rejected`].
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn failure_hook(mut self, hook: impl FailureHook + 'static) -> Self {
        self.failure_hook = Arc::new(hook);
        self
    }

    pub fn build(self) -> PoolResult<Pool> {
        if self.num_threads == 0 {
            return Err(PoolError::InvalidConfiguration {
                reason: "num_threads must be positive".to_string(),
            });
        }
        if self.queue_capacity == Some(0) {
            return Err(PoolError::InvalidConfiguration {
                reason: "queue_capacity must be positive".to_string(),
            });
        }

        let (tx, rx) = match self.queue_capacity {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };
        let shared = Arc::new(Shared::new(self.failure_hook));

        let mut threads = Vec::with_capacity(self.num_threads);
        for index in 0..self.num_threads {
            let name = format!("{}-{index}", self.thread_name);
            match Thread::new(name, rx.clone(), Arc::clone(&shared)) {
                Ok(thread) => threads.push(thread),
                Err(err) => {
                    // Release the workers spawned so far.
                    drop(tx);
                    threads.into_iter().for_each(Thread::join);
                    return Err(PoolError::Spawn(err));
                }
            }
        }
        log::debug!(
            "started pool of {} threads ({})",
            self.num_threads,
            self.queue_capacity
                .map_or_else(|| "unbounded queue".to_string(), |c| format!("queue capacity {c}"))
        );

        Ok(Pool {
            num_threads: self.num_threads,
            capacity: self.queue_capacity,
            next_id: AtomicU64::new(0),
            tx: RwLock::new(Some(tx)),
            threads: Mutex::new(threads),
            shared,
        })
    }
}

/// A fixed-size pool of worker threads.
///
/// At most `num_threads` units of work run at once; the rest wait in a FIFO
/// queue. Workers exit once the sender is dropped and the queue is empty.
pub struct Pool {
    num_threads: usize,
    capacity: Option<usize>,
    next_id: AtomicU64,
    /// `None` once the pool is shut down.
    tx: RwLock<Option<Sender<Arc<Task>>>>,
    threads: Mutex<Vec<Thread>>,
    shared: Arc<Shared>,
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Workers finish the queued work and exit on their own.
        self.close();
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("num_threads", &self.num_threads)
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Pool {
    pub fn new(num_threads: usize) -> PoolResult<Self> {
        Builder::new().num_threads(num_threads).build()
    }

    /// Queue `f` to run on a worker thread and return immediately.
    ///
    /// Errors and panics raised by `f` are reported to the pool's
    /// [`FailureHook`]; they never reach the caller.
    pub fn submit<F>(&self, f: F) -> PoolResult<TaskHandle>
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        let tx = self.tx.read();
        let Some(tx) = tx.as_ref() else {
            return Err(PoolError::ShutDown);
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new(Task::new(id, f));
        match tx.try_send(Arc::clone(&inner)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.shared.rejected.fetch_add(1, Ordering::Relaxed);
                log::warn!("rejected task {id}: queue full");
                return Err(PoolError::Rejected {
                    capacity: self.capacity.unwrap_or_default(),
                });
            }
            Err(TrySendError::Disconnected(_)) => return Err(PoolError::ShutDown),
        }
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        log::trace!("submitted task {id}");

        Ok(TaskHandle { inner })
    }

    /// Stop accepting work and wait for the workers to exit.
    ///
    /// With `drain`, queued work runs before the workers exit. Without it,
    /// queued work is discarded; running work always completes. Called from
    /// a worker thread, this only stops intake and does not wait.
    pub fn shutdown(&self, drain: bool) {
        if !drain {
            self.shared.discarding.store(true, Ordering::SeqCst);
        }
        if self.close() {
            log::debug!("shutting down pool (drain: {drain})");
        }
        if on_worker() {
            return;
        }

        let mut threads = self.threads.lock();
        for thread in threads.drain(..) {
            log::trace!("joining {}", thread.name());
            thread.join();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.tx.read().is_none()
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = self.shared.snapshot();
        stats.queued = self.tx.read().as_ref().map_or(0, Sender::len);
        stats
    }

    /// Stop intake by dropping the sender; workers drain what is queued and
    /// exit. Never blocks. Returns `false` if the pool was already closed.
    fn close(&self) -> bool {
        let tx = self.tx.write().take();
        tx.is_some()
    }
}
