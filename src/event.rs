//! Progress notifications emitted by dispatchers.

use core::fmt;
use std::sync::Arc;

use crate::message::Message;

/// Identity of a [`Dispatcher`](crate::dispatcher::Dispatcher).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DispatcherId(Arc<str>);

impl DispatcherId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DispatcherId {
    fn from(id: &str) -> Self {
        Self(Arc::from(id))
    }
}

impl From<String> for DispatcherId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl fmt::Display for DispatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DispatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DispatcherId({:?})", &*self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Enqueued into the mailbox by `send`.
    Sent,
    /// Taken from the mailbox by the receive loop.
    Received,
    /// Handler started on a pool thread.
    Processing,
    /// Handler returned successfully.
    Processed,
    /// Handler returned an error.
    Failed,
    /// The pool refused the processing work; the message is gone.
    Dropped,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sent => "sent",
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
            Self::Dropped => "dropped",
        };
        f.write_str(name)
    }
}

/// Subscriber for dispatcher progress.
///
/// Called synchronously on whichever thread produced the event: the sender,
/// the receive loop or a pool thread. Keep it cheap. A panic inside the hook
/// is logged and swallowed; the dispatcher keeps running.
pub trait EventHook: Send + Sync {
    fn on_event(&self, kind: EventKind, dispatcher: &DispatcherId, message: &Message);
}

impl<F> EventHook for F
where
    F: Fn(EventKind, &DispatcherId, &Message) + Send + Sync,
{
    fn on_event(&self, kind: EventKind, dispatcher: &DispatcherId, message: &Message) {
        self(kind, dispatcher, message)
    }
}

/// Writes every event through the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogEvents;

impl EventHook for LogEvents {
    fn on_event(&self, kind: EventKind, dispatcher: &DispatcherId, message: &Message) {
        match kind {
            EventKind::Failed | EventKind::Dropped => log::warn!(
                "{dispatcher} {kind} message: {} (priority {})",
                message.content(),
                message.priority()
            ),
            EventKind::Processed => log::debug!("{dispatcher} {kind} message: {}", message.content()),
            _ => log::info!("{dispatcher} {kind} message: {}", message.content()),
        }
    }
}
