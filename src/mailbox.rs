//! A shared, thread-safe priority queue of [`Message`]s.
//!
//! Messages dequeue by ascending priority. Messages with equal priority
//! dequeue in the order they were enqueued.

use std::{
    collections::BinaryHeap,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{
    cancel::CancellationToken,
    message::{Envelope, Message},
};

#[derive(Debug, Default)]
struct Queue {
    heap: BinaryHeap<Envelope>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct PriorityMailbox {
    queue: Mutex<Queue>,
    available: Condvar,
}

impl PriorityMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `message` and wake one blocked consumer.
    pub fn enqueue(&self, message: Message) {
        let mut queue = self.queue.lock();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        log::trace!("enqueue #{seq} {message:?}");
        queue.heap.push(Envelope { seq, message });
        drop(queue);
        self.available.notify_one();
    }

    /// Remove the most urgent message, or `None` if nothing is pending.
    pub fn dequeue(&self) -> Option<Message> {
        self.queue.lock().heap.pop().map(|e| e.message)
    }

    pub fn peek(&self) -> Option<Message> {
        self.queue.lock().heap.peek().map(|e| e.message.clone())
    }

    /// A snapshot only; another thread may change it right after.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().heap.len()
    }

    /// Block until a message is available or `token` is cancelled.
    ///
    /// Returns `None` only on cancellation. Pending messages are left in
    /// place for other consumers once the token is cancelled.
    pub fn dequeue_wait(&self, token: &CancellationToken) -> Option<Message> {
        let mut queue = self.queue.lock();
        loop {
            if token.is_cancelled() {
                return None;
            }
            if let Some(envelope) = queue.heap.pop() {
                return Some(envelope.message);
            }
            self.available.wait(&mut queue);
        }
    }

    /// Block for at most `timeout` waiting for a message.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        loop {
            if let Some(envelope) = queue.heap.pop() {
                return Some(envelope.message);
            }
            // Another consumer may win the message that woke us; keep waiting.
            if self.available.wait_until(&mut queue, deadline).timed_out() {
                return queue.heap.pop().map(|e| e.message);
            }
        }
    }

    /// Wake every blocked consumer so it re-checks its cancellation token.
    pub fn wake_all(&self) {
        // Taking the lock orders this wake after any in-progress token check.
        let _queue = self.queue.lock();
        self.available.notify_all();
    }
}
