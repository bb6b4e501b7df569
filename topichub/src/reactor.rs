//! The dispatch reactor: the control loop that pulls from the priority
//! queue, matches subscriptions, launches callback tasks, and manages the
//! reentrancy guard.

use crate::guard::ReentrancyGuard;
use crate::message::Message;
use crate::queue::PriorityQueue;
use crate::registry::SubscriptionRegistry;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, trace};

/// The reactor's lifecycle.
///
/// `Running` consumes the queue; `Draining` (entered on shutdown) keeps
/// consuming until the queue is observed empty, then the loop exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorState {
    Idle,
    Running,
    Draining,
    Stopped,
}

pub(crate) struct DispatchReactor {
    queue: Arc<PriorityQueue>,
    registry: Arc<RwLock<SubscriptionRegistry>>,
    guard: Arc<ReentrancyGuard>,
    state: Arc<Mutex<ReactorState>>,
}

impl DispatchReactor {
    pub(crate) fn new(
        queue: Arc<PriorityQueue>,
        registry: Arc<RwLock<SubscriptionRegistry>>,
        guard: Arc<ReentrancyGuard>,
        state: Arc<Mutex<ReactorState>>,
    ) -> Self {
        Self {
            queue,
            registry,
            guard,
            state,
        }
    }

    pub(crate) async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        self.set_state(ReactorState::Running);
        debug!("dispatch reactor started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    self.set_state(ReactorState::Draining);
                    debug!("dispatch reactor draining");
                    while let Some(message) = self.queue.try_get() {
                        self.dispatch(message).await;
                    }
                    break;
                }
                message = self.queue.get() => {
                    self.dispatch(message).await;
                }
            }
        }

        self.set_state(ReactorState::Stopped);
        debug!("dispatch reactor exited");
    }

    /// Delivers one message: locks its key and spawns one task per matching
    /// callback, in registration order. A supervisor task waits for all of
    /// them, then unlocks the key and resolves the handle (if any) with the
    /// most recent callback result. The reactor loop itself never blocks on
    /// subscriber code.
    async fn dispatch(&self, message: Message) {
        let matched = self.registry.read().await.matchers_for(&message.key);
        let callback_total: usize = matched.iter().map(|(_, callbacks)| callbacks.len()).sum();

        if callback_total == 0 {
            trace!(key = %message.key, "no subscription matches");
            if let Some(handle) = message.handle {
                // Nobody is listening; never leave the caller blocked.
                handle.resolve(None);
            }
            return;
        }

        self.guard.lock_key(&message.key);

        let guard = self.guard.clone();
        let Message {
            key,
            payload,
            handle,
            ..
        } = message;

        tokio::spawn(async move {
            let mut tasks = JoinSet::new();
            for (pattern, callbacks) in matched {
                trace!(key = %key, %pattern, callbacks = callbacks.len(), "dispatching");
                for callback in callbacks {
                    tasks.spawn(callback(key.clone(), payload.clone()));
                }
            }

            // Completion order across callbacks is unspecified; a failing
            // callback neither aborts its siblings nor the reactor, and it
            // still counts toward completion.
            let mut result = None;
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(Some(value))) => result = Some(value),
                    Ok(Ok(None)) => {}
                    Ok(Err(err)) => {
                        error!(key = %key, error = %err, "subscriber callback failed");
                    }
                    Err(join_err) => {
                        error!(key = %key, error = %join_err, "subscriber callback task panicked");
                    }
                }
            }

            guard.unlock_key(&key);
            if let Some(handle) = handle {
                handle.resolve(result);
            }
        });
    }

    fn set_state(&self, next: ReactorState) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
    }
}
