//! The hub facade and its lifecycle, plus the per-realm hub registry.
//!
//! A [`Hub`] is a handle to one running pub/sub instance: cloning it is
//! cheap and every clone addresses the same queue, registry, and guard.
//! [`HubRegistry`] maps realm names to hub instances so repeated requests
//! for the same realm return the same hub.

use crate::common::{DEFAULT_PRIORITY, TOPIC_SYSTEM_START, TOPIC_SYSTEM_STOP};
use crate::config::HubConfig;
use crate::error::HubError;
use crate::guard::ReentrancyGuard;
use crate::message::{Message, Payload, SyncHandle};
use crate::queue::PriorityQueue;
use crate::reactor::{DispatchReactor, ReactorState};
use crate::registry::{Callback, Owner, SubscribeOptions, SubscriptionRegistry};
use crate::timer::TimerScheduler;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of a hub instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Uninitialized,
    Running,
    Stopping,
    Stopped,
}

/// The two long-lived loops spawned by `start`, with their shutdown signal.
struct RunningLoops {
    shutdown_tx: broadcast::Sender<()>,
    reactor: JoinHandle<()>,
    scheduler: JoinHandle<()>,
}

/// An in-process publish/subscribe event hub.
///
/// The hub hosts exactly two long-lived loops once started: the dispatch
/// reactor and the timer scheduler. Everything else is short-lived callback
/// tasks spawned per dispatched message.
#[derive(Clone)]
pub struct Hub {
    config: Arc<HubConfig>,
    queue: Arc<PriorityQueue>,
    registry: Arc<RwLock<SubscriptionRegistry>>,
    guard: Arc<ReentrancyGuard>,
    reactor_state: Arc<Mutex<ReactorState>>,
    lifecycle: Arc<Mutex<HubState>>,
    loops: Arc<Mutex<Option<RunningLoops>>>,
}

impl Hub {
    /// Creates a hub in the `Uninitialized` state. Usually obtained through
    /// a [`HubRegistry`] rather than directly.
    pub fn new(config: HubConfig) -> Self {
        Self {
            config: Arc::new(config),
            queue: Arc::new(PriorityQueue::new()),
            registry: Arc::new(RwLock::new(SubscriptionRegistry::new())),
            guard: Arc::new(ReentrancyGuard::new()),
            reactor_state: Arc::new(Mutex::new(ReactorState::Idle)),
            lifecycle: Arc::new(Mutex::new(HubState::Uninitialized)),
            loops: Arc::new(Mutex::new(None)),
        }
    }

    pub fn realm(&self) -> &str {
        &self.config.realm
    }

    pub fn state(&self) -> HubState {
        *lock_unpoisoned(&self.lifecycle)
    }

    pub fn reactor_state(&self) -> ReactorState {
        *lock_unpoisoned(&self.reactor_state)
    }

    /// Number of messages waiting in the priority queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Enqueues a message, returning whether it was accepted.
    ///
    /// A publish is dropped silently (debug trace only, `false` returned)
    /// when the key's dispatch is still in flight, or when `allow_duplicate`
    /// is false and an identical `(priority, key, payload, handle)` tuple is
    /// already queued. Drops are policy, not failures.
    pub fn publish(
        &self,
        key: &str,
        payload: Payload,
        priority: i32,
        allow_duplicate: bool,
        handle: Option<Arc<SyncHandle>>,
    ) -> bool {
        if self.guard.is_locked(key) {
            debug!(key, "publish dropped: dispatch for key still in flight");
            if let Some(handle) = handle {
                // Never strand a waiting caller on a dropped message.
                handle.resolve(None);
            }
            return false;
        }

        let message = Message::new(priority, key, payload, handle);
        if allow_duplicate {
            self.queue.put(message);
            true
        } else {
            let enqueued = self.queue.put_unique(message);
            if !enqueued {
                debug!(key, "publish dropped: identical message already queued");
            }
            enqueued
        }
    }

    /// Publishes with a fresh synchronization handle and suspends until the
    /// dispatch completes.
    ///
    /// Resolves to the most recent callback result, or `None` when no
    /// subscription matched or the message was dropped before dispatch.
    pub async fn publish_and_wait(
        &self,
        key: &str,
        payload: Payload,
        priority: i32,
        allow_duplicate: bool,
    ) -> Option<Payload> {
        let (handle, rx) = SyncHandle::channel();
        self.publish(key, payload, priority, allow_duplicate, Some(handle));
        rx.await.unwrap_or(None)
    }

    /// Registers `callback` under `pattern`. Patterns are validated eagerly;
    /// subscribing a `timer://<host>/each/<N>` pattern arms its timer entry,
    /// and the unimplemented `timer://…/at/…` form fails loudly.
    ///
    /// Returns the number of callbacks now registered for the pattern, `0`
    /// when the options made the call a no-op.
    pub async fn subscribe(
        &self,
        pattern: &str,
        callback: Callback,
        opts: SubscribeOptions,
    ) -> Result<usize, HubError> {
        self.registry
            .write()
            .await
            .subscribe(pattern, callback, &opts)
    }

    /// Removes callbacks from every registered pattern whose source matches
    /// `filter` (itself a pattern; `None` means `.*`, matching all). See
    /// [`SubscriptionRegistry::unsubscribe`].
    pub async fn unsubscribe(
        &self,
        filter: Option<&str>,
        callback: Option<&Callback>,
    ) -> Result<usize, HubError> {
        self.registry.write().await.unsubscribe(filter, callback)
    }

    /// Removes every callback tagged with `owner`, across all patterns.
    pub async fn detach(&self, owner: &Owner) -> usize {
        self.registry.write().await.detach(owner)
    }

    /// Launches the dispatch reactor and timer scheduler on `runtime`, then
    /// publishes [`TOPIC_SYSTEM_START`] (payload: current time) so
    /// subscribers can observe hub readiness.
    pub fn start(&self, runtime: &tokio::runtime::Handle) -> Result<(), HubError> {
        {
            let mut loops = lock_unpoisoned(&self.loops);
            if loops.is_some() {
                return Err(HubError::AlreadyRunning {
                    realm: self.realm().to_string(),
                });
            }

            let (shutdown_tx, _) = broadcast::channel(1);

            let reactor = DispatchReactor::new(
                self.queue.clone(),
                self.registry.clone(),
                self.guard.clone(),
                self.reactor_state.clone(),
            );
            let reactor_task = runtime.spawn(reactor.run(shutdown_tx.subscribe()));

            let scheduler = TimerScheduler::new(self.clone(), self.config.timer_tick());
            let scheduler_task = runtime.spawn(scheduler.run(shutdown_tx.subscribe()));

            *loops = Some(RunningLoops {
                shutdown_tx,
                reactor: reactor_task,
                scheduler: scheduler_task,
            });
        }
        self.set_lifecycle(HubState::Running);
        info!(realm = %self.realm(), "hub started");

        self.publish(
            TOPIC_SYSTEM_START,
            json!(chrono::Utc::now().to_rfc3339()),
            DEFAULT_PRIORITY,
            true,
            None,
        );
        Ok(())
    }

    /// Stops the hub: drains the queue, publishes [`TOPIC_SYSTEM_STOP`],
    /// signals the loops to exit, waits up to the configured grace period,
    /// force-cancels stragglers, and clears the subscription registry.
    ///
    /// Best-effort by design: per-dispatch callback tasks the hub does not
    /// own may still be completing when this returns.
    pub async fn stop(&self) -> Result<(), HubError> {
        // Check and claim under one lock acquisition: of two concurrent
        // stop() callers, exactly one proceeds, the other gets NotRunning.
        let Some(loops) = lock_unpoisoned(&self.loops).take() else {
            return Err(HubError::NotRunning {
                realm: self.realm().to_string(),
            });
        };
        self.set_lifecycle(HubState::Stopping);
        info!(realm = %self.realm(), "hub stopping, draining queue");

        while !self.queue.is_empty() {
            tokio::time::sleep(self.config.drain_poll()).await;
        }

        // Let blocked subscriber logic observe the shutdown and exit.
        self.publish(
            TOPIC_SYSTEM_STOP,
            json!(chrono::Utc::now().to_rfc3339()),
            DEFAULT_PRIORITY,
            true,
            None,
        );

        loops.shutdown_tx.send(()).ok();

        let deadline = tokio::time::Instant::now() + self.config.stop_grace();
        loop {
            if loops.reactor.is_finished() && loops.scheduler.is_finished() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                for (name, task) in [
                    ("dispatch-reactor", &loops.reactor),
                    ("timer-scheduler", &loops.scheduler),
                ] {
                    if !task.is_finished() {
                        warn!(
                            realm = %self.realm(),
                            task = name,
                            "task did not exit within the grace period, force-cancelling"
                        );
                        task.abort();
                    }
                }
                break;
            }
            tokio::time::sleep(self.config.drain_poll()).await;
        }

        self.registry.write().await.clear();
        *lock_unpoisoned(&self.reactor_state) = ReactorState::Stopped;
        self.set_lifecycle(HubState::Stopped);
        info!(realm = %self.realm(), "hub stopped");
        Ok(())
    }

    /// Advances every timer countdown by one tick; called by the scheduler.
    pub(crate) async fn tick_timers(&self) -> Vec<String> {
        self.registry.write().await.timers_mut().tick()
    }

    fn set_lifecycle(&self, next: HubState) {
        *lock_unpoisoned(&self.lifecycle) = next;
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A process-wide mapping of `realm -> Hub`.
///
/// At most one live hub exists per distinct realm within a registry;
/// repeated construction requests for the same realm return the existing
/// instance (the configuration of the first request wins). This is an
/// explicit object with documented init/teardown, not a module-level
/// global.
#[derive(Default)]
pub struct HubRegistry {
    hubs: Mutex<HashMap<String, Hub>>,
}

impl HubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the hub for `realm`, creating it with default timings on
    /// first request.
    pub fn hub(&self, realm: &str) -> Hub {
        self.hub_with_config(HubConfig::for_realm(realm))
    }

    /// Returns the hub for `config.realm`, creating it from `config` on
    /// first request. A later call with a different configuration for the
    /// same realm still returns the original instance.
    pub fn hub_with_config(&self, config: HubConfig) -> Hub {
        let mut hubs = lock_unpoisoned(&self.hubs);
        hubs.entry(config.realm.clone())
            .or_insert_with(|| Hub::new(config))
            .clone()
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.hubs).len()
    }

    pub fn is_empty(&self) -> bool {
        lock_unpoisoned(&self.hubs).is_empty()
    }

    /// Stops every running hub and forgets all instances.
    pub async fn close(&self) {
        let hubs: Vec<Hub> = lock_unpoisoned(&self.hubs)
            .drain()
            .map(|(_, hub)| hub)
            .collect();
        for hub in hubs {
            if hub.state() == HubState::Running {
                if let Err(err) = hub.stop().await {
                    warn!(realm = %hub.realm(), error = %err, "failed to stop hub during close");
                }
            }
        }
    }
}
