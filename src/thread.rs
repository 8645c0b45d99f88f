use std::{
    cell::Cell,
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::Receiver;

use crate::{pool::Shared, task::Task};

thread_local! {
    static IS_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// `true` when called from one of a pool's worker threads.
pub(crate) fn on_worker() -> bool {
    IS_WORKER.with(Cell::get)
}

pub(crate) struct Thread {
    handle: JoinHandle<()>,
}

impl Thread {
    /// Spawn a named worker that runs tasks until every sender is gone and
    /// the queue is empty.
    pub fn new(name: String, rx: Receiver<Arc<Task>>, shared: Arc<Shared>) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || Self::work(&rx, &shared))?;
        Ok(Self { handle })
    }

    pub fn name(&self) -> &str {
        self.handle.thread().name().unwrap_or("<unnamed>")
    }

    pub fn join(self) {
        let _ = self.handle.join();
    }

    fn work(rx: &Receiver<Arc<Task>>, shared: &Shared) {
        IS_WORKER.with(|w| w.set(true));
        log::trace!("worker started");
        while let Ok(task) = rx.recv() {
            if shared.is_discarding() {
                task.discard();
                shared.record_discarded();
                continue;
            }
            log::trace!("running task {}", task.id());
            shared.begin();
            let result = task.run();
            shared.end(result);
        }
        log::trace!("worker exiting");
    }
}
