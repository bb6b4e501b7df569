//! The priority-ordered container of pending messages.
//!
//! Producers (`put`) may run from any task, including callback tasks; the
//! dispatch reactor is the single consumer. The queue imposes no upper
//! bound; backpressure, if any, is a policy decision of the hub facade.

use crate::message::Message;
use std::sync::Mutex;
use tokio::sync::Notify;

/// An unbounded priority queue with a stable FIFO tie-break.
#[derive(Default)]
pub struct PriorityQueue {
    items: Mutex<Vec<Message>>,
    available: Notify,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts in ascending-priority order. A new item lands after every
    /// queued item of equal or lower priority, so equal priorities dequeue
    /// in arrival order.
    pub fn put(&self, message: Message) {
        let mut items = self.lock();
        let at = items.partition_point(|queued| queued.priority <= message.priority);
        items.insert(at, message);
        drop(items);
        self.available.notify_one();
    }

    /// Like [`put`](Self::put), but refuses the insert when an identical
    /// `(priority, key, payload, handle)` tuple is already queued.
    /// Returns whether the message was enqueued.
    pub fn put_unique(&self, message: Message) -> bool {
        let mut items = self.lock();
        if items.iter().any(|queued| queued.is_duplicate_of(&message)) {
            return false;
        }
        let at = items.partition_point(|queued| queued.priority <= message.priority);
        items.insert(at, message);
        drop(items);
        self.available.notify_one();
        true
    }

    /// Suspends until an item is available, then removes and returns the
    /// single lowest-priority item. Single-consumer.
    pub async fn get(&self) -> Message {
        loop {
            if let Some(message) = self.try_get() {
                return message;
            }
            self.available.notified().await;
        }
    }

    /// Removes and returns the head without suspending.
    pub fn try_get(&self) -> Option<Message> {
        let mut items = self.lock();
        if items.is_empty() {
            None
        } else {
            Some(items.remove(0))
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
