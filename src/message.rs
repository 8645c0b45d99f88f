use core::fmt;
use std::cmp::Ordering;

/// Message priority. Lower values are more urgent.
pub type Priority = i64;

/// An immutable payload travelling through a [`PriorityMailbox`].
///
/// [`PriorityMailbox`]: crate::mailbox::PriorityMailbox
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    content: String,
    priority: Priority,
}

impl Message {
    pub fn new(content: impl Into<String>, priority: Priority) -> Self {
        Self {
            content: content.into(),
            priority,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({:?}, p={})", self.content, self.priority)
    }
}

/// A [`Message`] stamped with its enqueue sequence number.
///
/// Ordered so that a max-heap pops the lowest priority first and, among
/// equal priorities, the lowest sequence.
pub(crate) struct Envelope {
    pub(crate) seq: u64,
    pub(crate) message: Message,
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {:?}", self.seq, self.message)
    }
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Envelope {}

impl PartialOrd for Envelope {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Envelope {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed on both keys: BinaryHeap is a max-heap.
        other
            .message
            .priority
            .cmp(&self.message.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;

    fn envelope(seq: u64, priority: Priority) -> Envelope {
        Envelope {
            seq,
            message: Message::new(format!("m{seq}"), priority),
        }
    }

    #[test]
    fn lower_priority_sorts_greater() {
        assert!(envelope(0, 0) > envelope(1, 5));
        assert!(envelope(7, -3) > envelope(0, 0));
    }

    #[test]
    fn earlier_sequence_wins_ties() {
        assert!(envelope(1, 2) > envelope(2, 2));
        assert_eq!(envelope(4, 1), envelope(4, 1));
    }

    #[test]
    fn heap_pops_in_priority_then_fifo_order() {
        let mut heap: BinaryHeap<_> = [(0, 3), (1, 1), (2, 3), (3, 1)]
            .into_iter()
            .map(|(seq, p)| envelope(seq, p))
            .collect();

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.seq)).collect();
        assert_eq!(order, vec![1, 3, 0, 2]);
    }
}
