//! A Task is the unit of work that runs on one of the pool's threads.

use std::{
    any::Any,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use parking_lot::Mutex;

use crate::{
    error::{BoxError, WorkFailure},
    state::TaskState,
};

pub(crate) type Job = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;

/// Handle to a submitted unit of work.
///
/// Dropping the handle does not cancel the work. Awaiting it (or calling
/// [`wait`](Self::wait)) resolves to the terminal [`TaskState`].
#[derive(Clone)]
pub struct TaskHandle {
    pub(crate) inner: Arc<Task>,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> TaskState {
        self.inner.get_state()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Block the current thread until the work reaches a terminal state.
    pub fn wait(self) -> TaskState {
        futures::executor::block_on(self)
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Future for TaskHandle {
    type Output = TaskState;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Hold the waker slot while checking so `finish` cannot slip between.
        let mut waker = self.inner.waker.lock();
        let state = self.inner.get_state();
        if state.is_terminal() {
            Poll::Ready(state)
        } else {
            *waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

pub(crate) struct Task {
    id: u64,
    state: Mutex<TaskState>,
    waker: Mutex<Option<Waker>>,
    job: Mutex<Option<Job>>,
}

impl Task {
    pub fn new<F>(id: u64, f: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        Self {
            id,
            state: Mutex::new(TaskState::Queued),
            waker: Mutex::default(),
            job: Mutex::new(Some(Box::new(f))),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn get_state(&self) -> TaskState {
        *self.state.lock()
    }

    /// Run the job on the calling thread, catching errors and panics.
    pub fn run(&self) -> Result<(), WorkFailure> {
        let Some(job) = self.job.lock().take() else {
            // Already run or discarded.
            return Ok(());
        };
        *self.state.lock() = TaskState::Running;

        let result = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(WorkFailure::Errored {
                task: self.id,
                source,
            }),
            Err(payload) => Err(WorkFailure::Panicked {
                task: self.id,
                message: panic_message(payload.as_ref()),
            }),
        };

        self.finish(if result.is_ok() {
            TaskState::Completed
        } else {
            TaskState::Failed
        });
        result
    }

    pub fn discard(&self) {
        drop(self.job.lock().take());
        self.finish(TaskState::Discarded);
    }

    fn finish(&self, state: TaskState) {
        *self.state.lock() = state;
        if let Some(waker) = self.waker.lock().take() {
            waker.wake();
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
