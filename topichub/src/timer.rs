//! The timer scheduler: an interval countdown table plus the loop that
//! synthesizes periodic publishes from it.
//!
//! One entry exists per `timer://<host>/each/<N>` subscription. The loop
//! runs once per configured tick, decrements every countdown, and publishes
//! the pattern string (empty payload) for each entry that expires. The
//! per-tick sleep subtracts the time spent working so the schedule does not
//! drift.

use crate::common::DEFAULT_PRIORITY;
use crate::hub::Hub;
use crate::message::Payload;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Countdown state for one timer pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEntry {
    /// Ticks remaining until the next publish.
    pub countdown: i64,
    /// Ticks between publishes.
    pub interval: i64,
}

/// The countdown table, keyed by the timer pattern's source string.
///
/// Owned by the subscription registry: entries are armed when a timer
/// pattern is subscribed and disarmed when it is fully unsubscribed.
#[derive(Default)]
pub struct TimerTable {
    entries: HashMap<String, TimerEntry>,
}

impl TimerTable {
    /// Creates or resets the entry for `pattern`. The interval is
    /// non-negative, enforced when the pattern is parsed.
    pub fn arm(&mut self, pattern: &str, interval: i64) {
        self.entries.insert(
            pattern.to_string(),
            TimerEntry {
                countdown: 0,
                interval,
            },
        );
    }

    pub fn disarm(&mut self, pattern: &str) {
        self.entries.remove(pattern);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Advances every countdown by one tick. Entries that drop below zero
    /// are reset to their interval and their patterns returned as due.
    pub fn tick(&mut self) -> Vec<String> {
        let mut due = Vec::new();
        for (pattern, entry) in self.entries.iter_mut() {
            entry.countdown -= 1;
            if entry.countdown < 0 {
                entry.countdown = entry.interval;
                due.push(pattern.clone());
            }
        }
        due
    }
}

/// The loop that drives the countdown table. Runs concurrently with, and
/// independently of, the dispatch reactor.
pub(crate) struct TimerScheduler {
    hub: Hub,
    tick: Duration,
}

impl TimerScheduler {
    pub(crate) fn new(hub: Hub, tick: Duration) -> Self {
        Self { hub, tick }
    }

    pub(crate) async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        debug!(tick = ?self.tick, "timer scheduler started");
        loop {
            let started = Instant::now();

            let due = self.hub.tick_timers().await;
            for pattern in due {
                trace!(%pattern, "timer expired, publishing");
                // The pattern string is its own topic key; the timer's regex
                // matches it, so subscribers of the timer receive the tick.
                self.hub
                    .publish(&pattern, Payload::Null, DEFAULT_PRIORITY, true, None);
            }

            // Sleep only for what is left of the tick, so work done above
            // does not accumulate into schedule drift.
            let rest = self.tick.saturating_sub(started.elapsed());
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(rest) => {}
            }
        }
        debug!("timer scheduler exited");
    }
}
