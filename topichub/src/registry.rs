//! The subscription registry: pattern -> callback-list mapping with
//! compiled matchers, plus ownership of the timer countdown table.
//!
//! The registry preserves registration order: `matchers_for` returns
//! matching patterns in the order they were first subscribed, and callbacks
//! within a pattern in the order they were added.

use crate::error::HubError;
use crate::message::Payload;
use crate::pattern::{parse_timer, Matcher, RegexMatcher, TimerSpec};
use crate::timer::TimerTable;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The future returned by a callback invocation.
pub type CallbackFuture = Pin<Box<dyn Future<Output = anyhow::Result<Option<Payload>>> + Send>>;

/// A subscriber callback. Invoked with `(key, payload)`; returning
/// `Ok(Some(value))` resolves a pending `publish_and_wait` handle with that
/// value. Identity (for duplicate detection and targeted unsubscribes) is
/// `Arc` pointer equality, so hold on to the clone you subscribed with.
pub type Callback = Arc<dyn Fn(crate::common::TopicKey, Payload) -> CallbackFuture + Send + Sync>;

/// An opaque ownership token. Callbacks subscribed with an owner can be
/// removed en masse with `detach`, without the owner remembering which
/// patterns it registered.
pub type Owner = Arc<dyn Any + Send + Sync>;

/// Wraps a synchronous closure as a [`Callback`]. The spawned task completes
/// as soon as the closure returns; the reactor needs no special-casing.
pub fn callback_fn<F>(f: F) -> Callback
where
    F: Fn(crate::common::TopicKey, Payload) -> anyhow::Result<Option<Payload>>
        + Send
        + Sync
        + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |key, payload| -> CallbackFuture {
        let f = f.clone();
        // Deferred into the task so slow synchronous subscribers cannot
        // stall the reactor loop.
        Box::pin(async move { f(key, payload) })
    })
}

/// Wraps an async closure as a [`Callback`].
pub fn callback_async<F, Fut>(f: F) -> Callback
where
    F: Fn(crate::common::TopicKey, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Payload>>> + Send + 'static,
{
    Arc::new(move |key, payload| -> CallbackFuture { Box::pin(f(key, payload)) })
}

/// Options accepted by `subscribe`.
#[derive(Default, Clone)]
pub struct SubscribeOptions {
    /// Permit re-adding a callback that is already registered for the
    /// pattern. Off by default: re-adding is a no-op.
    pub allow_duplicate_callback: bool,
    /// Make the whole call a no-op when the pattern already has at least
    /// one callback.
    pub single_callback_only: bool,
    /// Tag the callback so a later `detach` can remove it.
    pub owner: Option<Owner>,
}

struct RegisteredCallback {
    callback: Callback,
    owner: Option<Owner>,
}

struct Subscription {
    source: String,
    matcher: Box<dyn Matcher>,
    callbacks: Vec<RegisteredCallback>,
}

/// Pattern registrations plus the timer table, in registration order.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: Vec<Subscription>,
    timers: TimerTable,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `pattern`.
    ///
    /// Patterns are validated (and any `timer://` form parsed) eagerly, so
    /// malformed input fails here rather than at match time. Returns the
    /// number of callbacks now registered for the pattern, or `0` when the
    /// call was a no-op per the options.
    pub fn subscribe(
        &mut self,
        pattern: &str,
        callback: Callback,
        opts: &SubscribeOptions,
    ) -> Result<usize, HubError> {
        let timer = parse_timer(pattern)?;

        let registered = RegisteredCallback {
            callback,
            owner: opts.owner.clone(),
        };

        let count = match self
            .subscriptions
            .iter_mut()
            .find(|sub| sub.source == pattern)
        {
            Some(sub) => {
                if opts.single_callback_only && !sub.callbacks.is_empty() {
                    return Ok(0);
                }
                if !opts.allow_duplicate_callback
                    && sub
                        .callbacks
                        .iter()
                        .any(|existing| Arc::ptr_eq(&existing.callback, &registered.callback))
                {
                    return Ok(0);
                }
                sub.callbacks.push(registered);
                sub.callbacks.len()
            }
            None => {
                let matcher = Box::new(RegexMatcher::compile(pattern)?);
                self.subscriptions.push(Subscription {
                    source: pattern.to_string(),
                    matcher,
                    callbacks: vec![registered],
                });
                1
            }
        };

        if let Some(TimerSpec::Each(interval)) = timer {
            self.timers.arm(pattern, interval);
        }
        Ok(count)
    }

    /// Removes callbacks across every registered pattern whose *source
    /// string* matches `filter` (itself compiled as a pattern; defaults to
    /// `.*`, matching all).
    ///
    /// With a callback, only that callback is removed; without one, the
    /// matched patterns' callback lists are cleared entirely. Patterns left
    /// without callbacks are dropped, along with their timer entries.
    /// Returns the number of callbacks removed.
    pub fn unsubscribe(
        &mut self,
        filter: Option<&str>,
        callback: Option<&Callback>,
    ) -> Result<usize, HubError> {
        let filter = RegexMatcher::compile(filter.unwrap_or(".*"))?;

        let mut removed = 0;
        for sub in self
            .subscriptions
            .iter_mut()
            .filter(|sub| filter.is_match(&sub.source))
        {
            match callback {
                Some(target) => {
                    let before = sub.callbacks.len();
                    sub.callbacks
                        .retain(|registered| !Arc::ptr_eq(&registered.callback, target));
                    removed += before - sub.callbacks.len();
                }
                None => {
                    removed += sub.callbacks.len();
                    sub.callbacks.clear();
                }
            }
        }
        self.prune_empty();
        Ok(removed)
    }

    /// Removes every callback tagged with `owner`, across all patterns.
    /// Callbacks of other owners (or with no owner) are untouched.
    /// Returns the number of callbacks removed.
    pub fn detach(&mut self, owner: &Owner) -> usize {
        let mut removed = 0;
        for sub in self.subscriptions.iter_mut() {
            let before = sub.callbacks.len();
            sub.callbacks.retain(|registered| {
                !registered
                    .owner
                    .as_ref()
                    .is_some_and(|tag| Arc::ptr_eq(tag, owner))
            });
            removed += before - sub.callbacks.len();
        }
        self.prune_empty();
        removed
    }

    /// Returns `(pattern source, callbacks)` for every registered pattern
    /// whose matcher matches `key`, in registration order.
    pub fn matchers_for(&self, key: &str) -> Vec<(String, Vec<Callback>)> {
        self.subscriptions
            .iter()
            .filter(|sub| sub.matcher.is_match(key))
            .map(|sub| {
                (
                    sub.source.clone(),
                    sub.callbacks
                        .iter()
                        .map(|registered| registered.callback.clone())
                        .collect(),
                )
            })
            .collect()
    }

    pub fn pattern_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn timers_mut(&mut self) -> &mut TimerTable {
        &mut self.timers
    }

    /// Drops everything: called by the hub facade once it has stopped.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.timers.clear();
    }

    fn prune_empty(&mut self) {
        let timers = &mut self.timers;
        self.subscriptions.retain(|sub| {
            if sub.callbacks.is_empty() {
                timers.disarm(&sub.source);
                false
            } else {
                true
            }
        });
    }
}
