//! The reentrancy guard: the set of topics currently being dispatched.
//!
//! The reactor locks a key after it finds matching subscriptions and unlocks
//! it only once every spawned callback task for that dispatch has completed.
//! While locked, publishes for that exact key are dropped, which is what
//! keeps a timer's re-publish from piling up behind its own slow callback.
//!
//! The guard is a set of keys, not a counter. Same-key messages that were
//! already queued together all dispatch, and the first dispatch to complete
//! unlocks the key for everyone.

use crate::common::TopicKey;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
pub struct ReentrancyGuard {
    locked: Mutex<HashSet<TopicKey>>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn lock_key(&self, key: &TopicKey) {
        self.lock().insert(key.clone());
    }

    pub fn unlock_key(&self, key: &str) {
        self.lock().remove(key);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<TopicKey>> {
        self.locked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn lock_and_unlock_round_trip() {
        let guard = ReentrancyGuard::new();
        let key: TopicKey = Arc::from("/sensor/temp");

        assert!(!guard.is_locked("/sensor/temp"));
        guard.lock_key(&key);
        assert!(guard.is_locked("/sensor/temp"));
        assert!(!guard.is_locked("/sensor/other"));
        guard.unlock_key("/sensor/temp");
        assert!(!guard.is_locked("/sensor/temp"));
    }
}
