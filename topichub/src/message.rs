//! The message envelope and the synchronization handle used by
//! request/response-style publishes.

use crate::common::TopicKey;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// The opaque payload carried by a message. The hub never interprets it; it
/// only compares payloads when duplicate suppression is requested.
pub type Payload = serde_json::Value;

/// A pending message. Created on `publish`, consumed exactly once by the
/// dispatch reactor, never mutated after enqueue.
#[derive(Debug, Clone)]
pub struct Message {
    /// Lower values are dispatched first.
    pub priority: i32,
    /// Topic identifier, matched against subscriber patterns.
    pub key: TopicKey,
    pub payload: Payload,
    /// Present for request/response-style publishes.
    pub handle: Option<Arc<SyncHandle>>,
}

impl Message {
    pub fn new(
        priority: i32,
        key: impl Into<TopicKey>,
        payload: Payload,
        handle: Option<Arc<SyncHandle>>,
    ) -> Self {
        Self {
            priority,
            key: key.into(),
            payload,
            handle,
        }
    }

    /// True when two messages form the identical `(priority, key, payload,
    /// handle)` tuple. Handles compare by identity: two publishes are only
    /// duplicates when they share the same handle (or neither has one).
    pub fn is_duplicate_of(&self, other: &Message) -> bool {
        self.priority == other.priority
            && self.key == other.key
            && self.payload == other.payload
            && match (&self.handle, &other.handle) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

/// A single-assignment, future-like handle used to return a result to a
/// caller that published with `publish_and_wait`.
///
/// The reactor resolves the handle once every callback task of the dispatch
/// has completed, with the most recent callback result. `None` means the
/// message was never delivered: either no subscription matched, or the
/// message was dropped before dispatch.
pub struct SyncHandle {
    tx: Mutex<Option<oneshot::Sender<Option<Payload>>>>,
}

impl SyncHandle {
    /// Creates a handle and the receiver the publishing caller waits on.
    pub fn channel() -> (Arc<Self>, oneshot::Receiver<Option<Payload>>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Resolves the handle. Only the first call has any effect.
    pub fn resolve(&self, value: Option<Payload>) {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = sender {
            // The caller may have given up waiting; that is fine.
            tx.send(value).ok();
        }
    }
}

impl fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_requires_the_full_tuple() {
        let a = Message::new(1, "/a", json!({"n": 1}), None);
        let b = Message::new(1, "/a", json!({"n": 1}), None);
        let c = Message::new(2, "/a", json!({"n": 1}), None);
        let d = Message::new(1, "/a", json!({"n": 2}), None);

        assert!(a.is_duplicate_of(&b));
        assert!(!a.is_duplicate_of(&c));
        assert!(!a.is_duplicate_of(&d));
    }

    #[test]
    fn handles_compare_by_identity() {
        let (shared, _rx) = SyncHandle::channel();
        let (other, _rx2) = SyncHandle::channel();

        let a = Message::new(1, "/a", json!(null), Some(shared.clone()));
        let b = Message::new(1, "/a", json!(null), Some(shared));
        let c = Message::new(1, "/a", json!(null), Some(other));
        let d = Message::new(1, "/a", json!(null), None);

        assert!(a.is_duplicate_of(&b));
        assert!(!a.is_duplicate_of(&c));
        assert!(!a.is_duplicate_of(&d));
    }

    #[tokio::test]
    async fn handle_resolves_once() {
        let (handle, rx) = SyncHandle::channel();
        handle.resolve(Some(json!(14)));
        handle.resolve(Some(json!(99))); // ignored
        assert_eq!(rx.await.unwrap(), Some(json!(14)));
    }
}
