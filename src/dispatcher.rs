//! Dispatchers move messages from the shared mailbox onto the shared pool.
//!
//! Each [`Dispatcher`] is one logical sender/receiver identity. `send`
//! enqueues into the [`PriorityMailbox`]; a single receive loop per
//! dispatcher blocks on the mailbox and submits each message it takes to the
//! [`Pool`] for processing by the dispatcher's [`Handler`].
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use mailpool::{
//!     dispatcher::Dispatcher, error::BoxError, event::DispatcherId, mailbox::PriorityMailbox,
//!     message::Message, pool::Pool,
//! };
//!
//! let mailbox = Arc::new(PriorityMailbox::new());
//! let pool = Arc::new(Pool::new(2)?);
//!
//! let handler = |id: &DispatcherId, message: &Message| -> Result<(), BoxError> {
//!     println!("{id} handled {}", message.content());
//!     Ok(())
//! };
//! let dispatcher = Dispatcher::new("thread 0", mailbox, Arc::clone(&pool), handler);
//! dispatcher.send("hello", 1)?;
//!
//! dispatcher.stop();
//! dispatcher.join();
//! pool.shutdown(true);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
};

use parking_lot::Mutex;

use crate::{
    cancel::CancellationToken,
    error::{BoxError, DispatchError, DispatchResult, PoolError},
    event::{DispatcherId, EventHook, EventKind, LogEvents},
    mailbox::PriorityMailbox,
    message::{Message, Priority},
    pool::Pool,
    state::DispatcherState,
    task::panic_message,
};

/// Processes one message on a pool thread.
///
/// Returned errors and panics are contained by the pool; they never stop the
/// receive loop.
pub trait Handler: Send + Sync {
    fn process(&self, dispatcher: &DispatcherId, message: &Message) -> Result<(), BoxError>;
}

impl<F> Handler for F
where
    F: Fn(&DispatcherId, &Message) -> Result<(), BoxError> + Send + Sync,
{
    fn process(&self, dispatcher: &DispatcherId, message: &Message) -> Result<(), BoxError> {
        self(dispatcher, message)
    }
}

struct Inner {
    id: DispatcherId,
    mailbox: Arc<PriorityMailbox>,
    pool: Arc<Pool>,
    handler: Arc<dyn Handler>,
    events: Arc<dyn EventHook>,
    token: CancellationToken,
    state: Mutex<DispatcherState>,
}

impl Inner {
    /// Report `kind` to the event hook. A panicking hook is logged and
    /// otherwise ignored so it cannot take down the receive loop.
    fn emit(&self, kind: EventKind, message: &Message) {
        let events = &self.events;
        if let Err(payload) =
            panic::catch_unwind(AssertUnwindSafe(|| events.on_event(kind, &self.id, message)))
        {
            log::error!(
                "{} event hook panicked on {kind}: {}",
                self.id,
                panic_message(payload.as_ref())
            );
        }
    }

    fn receive_loop(self: Arc<Self>) {
        log::debug!("{} receive loop started", self.id);
        while let Some(message) = self.mailbox.dequeue_wait(&self.token) {
            self.emit(EventKind::Received, &message);

            let message = Arc::new(message);
            let inner = Arc::clone(&self);
            let work = Arc::clone(&message);
            match self.pool.submit(move || inner.process(&work)) {
                Ok(_) => {}
                Err(err @ PoolError::ShutDown) => {
                    log::warn!("{} stopping receive loop: {err}", self.id);
                    self.emit(EventKind::Dropped, &message);
                    break;
                }
                Err(err) => {
                    log::warn!("{} dropping message: {err}", self.id);
                    self.emit(EventKind::Dropped, &message);
                }
            }
        }
        *self.state.lock() = DispatcherState::Stopped;
        log::debug!("{} receive loop stopped", self.id);
    }

    fn process(&self, message: &Message) -> Result<(), BoxError> {
        self.emit(EventKind::Processing, message);
        match self.handler.process(&self.id, message) {
            Ok(()) => {
                self.emit(EventKind::Processed, message);
                Ok(())
            }
            Err(err) => {
                self.emit(EventKind::Failed, message);
                Err(err)
            }
        }
    }
}

pub struct Dispatcher {
    inner: Arc<Inner>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create an idle dispatcher that reports events through [`LogEvents`].
    pub fn new(
        id: impl Into<DispatcherId>,
        mailbox: Arc<PriorityMailbox>,
        pool: Arc<Pool>,
        handler: impl Handler + 'static,
    ) -> Self {
        Self::with_events(id, mailbox, pool, handler, LogEvents)
    }

    pub fn with_events(
        id: impl Into<DispatcherId>,
        mailbox: Arc<PriorityMailbox>,
        pool: Arc<Pool>,
        handler: impl Handler + 'static,
        events: impl EventHook + 'static,
    ) -> Self {
        let inner = Inner {
            id: id.into(),
            mailbox,
            pool,
            handler: Arc::new(handler),
            events: Arc::new(events),
            token: CancellationToken::new(),
            state: Mutex::new(DispatcherState::Idle),
        };
        Self {
            inner: Arc::new(inner),
            receiver: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &DispatcherId {
        &self.inner.id
    }

    pub fn state(&self) -> DispatcherState {
        *self.inner.state.lock()
    }

    /// Enqueue a message into the shared mailbox and make sure this
    /// dispatcher's receive loop is running.
    ///
    /// A stopped dispatcher still enqueues; the message is left for the
    /// other dispatchers sharing the mailbox.
    pub fn send(&self, content: impl Into<String>, priority: Priority) -> DispatchResult<()> {
        let message = Message::new(content, priority);
        self.inner.emit(EventKind::Sent, &message);
        self.inner.mailbox.enqueue(message);

        match self.start() {
            Ok(()) | Err(DispatchError::Stopped { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Spawn the receive loop. Does nothing if it is already running.
    pub fn start(&self) -> DispatchResult<()> {
        let mut state = self.inner.state.lock();
        match *state {
            DispatcherState::Polling => return Ok(()),
            DispatcherState::Stopping | DispatcherState::Stopped => {
                return Err(DispatchError::Stopped {
                    identity: self.inner.id.to_string(),
                })
            }
            DispatcherState::Idle => {}
        }

        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name(format!("dispatcher-{}", self.inner.id))
            .spawn(move || inner.receive_loop())
            .map_err(|source| DispatchError::Spawn {
                identity: self.inner.id.to_string(),
                source,
            })?;
        *state = DispatcherState::Polling;
        *self.receiver.lock() = Some(handle);
        Ok(())
    }

    /// Ask the receive loop to exit. Work already handed to the pool keeps
    /// running. Repeated calls have no effect.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        match *state {
            DispatcherState::Idle => *state = DispatcherState::Stopped,
            DispatcherState::Polling => *state = DispatcherState::Stopping,
            DispatcherState::Stopping | DispatcherState::Stopped => return,
        }
        drop(state);

        log::debug!("{} stopping", self.inner.id);
        self.inner.token.cancel();
        self.inner.mailbox.wake_all();
    }

    /// Wait for the receive loop to exit. Blocks until [`stop`](Self::stop)
    /// is called if the loop is still polling.
    pub fn join(&self) {
        let handle = self.receiver.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("{} receive loop panicked", self.inner.id);
                *self.inner.state.lock() = DispatcherState::Stopped;
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::mpsc::{channel, Receiver},
        time::Duration,
    };

    use super::*;
    use crate::pool::Builder;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn collect(rx: &Receiver<String>, n: usize) -> Vec<String> {
        (0..n).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect()
    }

    fn recording_handler() -> (impl Handler, Receiver<String>) {
        let (tx, rx) = channel();
        let tx = Mutex::new(tx);
        let handler = move |_: &DispatcherId, message: &Message| -> Result<(), BoxError> {
            tx.lock().send(message.content().to_string())?;
            Ok(())
        };
        (handler, rx)
    }

    #[test]
    fn processes_in_priority_order() {
        let mailbox = Arc::new(PriorityMailbox::new());
        let pool = Arc::new(Pool::new(1).unwrap());
        let (handler, rx) = recording_handler();
        let dispatcher = Dispatcher::new("thread 0", Arc::clone(&mailbox), Arc::clone(&pool), handler);

        for (content, priority) in [("p2", 2), ("p0-first", 0), ("p1", 1), ("p0-second", 0)] {
            mailbox.enqueue(Message::new(content, priority));
        }
        dispatcher.start().unwrap();

        assert_eq!(collect(&rx, 4), ["p0-first", "p0-second", "p1", "p2"]);
        dispatcher.stop();
        dispatcher.join();
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        pool.shutdown(true);
    }

    #[test]
    fn send_starts_a_single_loop() {
        let mailbox = Arc::new(PriorityMailbox::new());
        let pool = Arc::new(Pool::new(2).unwrap());
        let (handler, rx) = recording_handler();
        let receivers = Arc::new(Mutex::new(Vec::new()));
        let recorder = {
            let receivers = Arc::clone(&receivers);
            move |kind: EventKind, _: &DispatcherId, _: &Message| {
                if kind == EventKind::Received {
                    let current = thread::current();
                    receivers
                        .lock()
                        .push((current.id(), current.name().map(str::to_string)));
                }
            }
        };
        let dispatcher = Dispatcher::with_events("thread 1", mailbox, Arc::clone(&pool), handler, recorder);
        assert_eq!(dispatcher.state(), DispatcherState::Idle);

        thread::scope(|scope| {
            for sender in 0..4 {
                let dispatcher = &dispatcher;
                scope.spawn(move || {
                    for i in 0..5 {
                        dispatcher.send(format!("m{sender}-{i}"), i % 3).unwrap();
                        assert_eq!(dispatcher.state(), DispatcherState::Polling);
                    }
                });
            }
        });
        dispatcher.start().unwrap();

        let mut got = collect(&rx, 20);
        got.sort();
        got.dedup();
        assert_eq!(got.len(), 20);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        dispatcher.stop();
        dispatcher.join();
        pool.shutdown(true);

        let receivers = receivers.lock();
        assert_eq!(receivers.len(), 20);
        let (loop_thread, name) = &receivers[0];
        assert_eq!(name.as_deref(), Some("dispatcher-thread 1"));
        assert!(receivers.iter().all(|(id, _)| id == loop_thread));
    }

    #[test]
    fn panicking_event_hook_keeps_loop_alive() {
        let mailbox = Arc::new(PriorityMailbox::new());
        let pool = Arc::new(Pool::new(1).unwrap());
        let (handler, rx) = recording_handler();
        let hook = |kind: EventKind, _: &DispatcherId, message: &Message| {
            if kind == EventKind::Received && message.content() == "boom" {
                panic!("event hook failure");
            }
        };
        let dispatcher = Dispatcher::with_events("thread 5", mailbox, Arc::clone(&pool), handler, hook);

        dispatcher.send("boom", 0).unwrap();
        dispatcher.send("after", 1).unwrap();

        let mut got = collect(&rx, 2);
        got.sort();
        assert_eq!(got, ["after", "boom"]);
        assert_eq!(dispatcher.state(), DispatcherState::Polling);

        dispatcher.send("later", 2).unwrap();
        assert_eq!(collect(&rx, 1), ["later"]);

        dispatcher.stop();
        dispatcher.join();
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        pool.shutdown(true);
    }

    #[test]
    fn stop_is_idempotent() {
        let mailbox = Arc::new(PriorityMailbox::new());
        let pool = Arc::new(Pool::new(1).unwrap());
        let (handler, _rx) = recording_handler();
        let dispatcher = Dispatcher::new("thread 2", Arc::clone(&mailbox), Arc::clone(&pool), handler);

        dispatcher.start().unwrap();
        dispatcher.stop();
        dispatcher.stop();
        dispatcher.join();
        dispatcher.stop();
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);

        assert!(matches!(dispatcher.start(), Err(DispatchError::Stopped { .. })));
        dispatcher.send("orphan", 0).unwrap();
        assert_eq!(mailbox.len(), 1);
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        pool.shutdown(true);
    }

    #[test]
    fn stop_before_start() {
        let pool = Arc::new(Pool::new(1).unwrap());
        let dispatcher = Dispatcher::new(
            "idle",
            Arc::new(PriorityMailbox::new()),
            Arc::clone(&pool),
            |_: &DispatcherId, _: &Message| -> Result<(), BoxError> { Ok(()) },
        );
        dispatcher.stop();
        dispatcher.join();
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        pool.shutdown(true);
    }

    #[test]
    fn failing_handler_does_not_stop_processing() {
        let mailbox = Arc::new(PriorityMailbox::new());
        let pool = Arc::new(Builder::new().num_threads(1).build().unwrap());
        let (tx, rx) = channel();
        let tx = Mutex::new(tx);
        let handler = move |_: &DispatcherId, message: &Message| -> Result<(), BoxError> {
            match message.content() {
                "error" => Err("handler error".into()),
                "panic" => panic!("handler panic"),
                other => {
                    tx.lock().send(other.to_string())?;
                    Ok(())
                }
            }
        };
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorder = {
            let events = Arc::clone(&events);
            move |kind: EventKind, _: &DispatcherId, message: &Message| {
                events.lock().push((kind, message.content().to_string()));
            }
        };
        let dispatcher = Dispatcher::with_events("thread 3", mailbox, Arc::clone(&pool), handler, recorder);

        dispatcher.send("error", 0).unwrap();
        dispatcher.send("panic", 1).unwrap();
        dispatcher.send("ok", 2).unwrap();

        assert_eq!(collect(&rx, 1), ["ok"]);
        dispatcher.stop();
        dispatcher.join();
        pool.shutdown(true);

        let events = events.lock();
        assert!(events.contains(&(EventKind::Failed, "error".to_string())));
        assert!(events.contains(&(EventKind::Processed, "ok".to_string())));
        assert_eq!(pool.stats().failed, 2);
    }

    #[test]
    fn dispatchers_share_mailbox_without_loss() {
        let mailbox = Arc::new(PriorityMailbox::new());
        let pool = Arc::new(Pool::new(3).unwrap());
        let (handler, rx) = recording_handler();
        let handler = Arc::new(handler);

        let dispatchers: Vec<_> = (0..3)
            .map(|i| {
                let handler = Arc::clone(&handler);
                Dispatcher::new(
                    format!("thread {i}"),
                    Arc::clone(&mailbox),
                    Arc::clone(&pool),
                    move |id: &DispatcherId, message: &Message| handler.process(id, message),
                )
            })
            .collect();

        for i in 0..30 {
            dispatchers[i % 3].send(format!("Message {i}"), (i % 3) as Priority).unwrap();
        }

        let mut got = collect(&rx, 30);
        got.sort();
        got.dedup();
        assert_eq!(got.len(), 30);

        for dispatcher in &dispatchers {
            dispatcher.stop();
        }
        for dispatcher in &dispatchers {
            dispatcher.join();
            assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        }
        pool.shutdown(true);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn loop_exits_when_pool_shuts_down() {
        let mailbox = Arc::new(PriorityMailbox::new());
        let pool = Arc::new(Pool::new(1).unwrap());
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorder = {
            let events = Arc::clone(&events);
            move |kind: EventKind, _: &DispatcherId, _: &Message| events.lock().push(kind)
        };
        let dispatcher = Dispatcher::with_events(
            "thread 4",
            mailbox,
            Arc::clone(&pool),
            |_: &DispatcherId, _: &Message| -> Result<(), BoxError> { Ok(()) },
            recorder,
        );

        dispatcher.start().unwrap();
        pool.shutdown(true);
        dispatcher.send("too late", 0).unwrap();
        dispatcher.join();

        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        assert_eq!(
            *events.lock(),
            [EventKind::Sent, EventKind::Received, EventKind::Dropped]
        );
    }
}
