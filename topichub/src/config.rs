//! Defines the configuration structure for the hub.
//!
//! `HubConfig` is designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`. Durations are expressed in
//! milliseconds so the timer tick and shutdown grace period can be shrunk
//! for tests or tuned per deployment.

use serde::Deserialize;
use std::time::Duration;

/// The top-level configuration for a [`Hub`](crate::hub::Hub).
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Namespace this hub instance belongs to. At most one live hub exists
    /// per realm within a [`HubRegistry`](crate::hub::HubRegistry).
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Wall-clock tick of the timer scheduler, in milliseconds.
    /// Timer patterns count intervals in ticks.
    #[serde(default = "default_timer_tick_ms")]
    pub timer_tick_ms: u64,

    /// How long `stop()` waits for the reactor and scheduler to exit on
    /// their own before force-cancelling them, in milliseconds.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Sleep between polls while `stop()` drains the queue and waits for
    /// the loops to finish, in milliseconds.
    #[serde(default = "default_drain_poll_ms")]
    pub drain_poll_ms: u64,
}

impl HubConfig {
    /// Creates a configuration with default timings for the given realm.
    pub fn for_realm(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            ..Self::default()
        }
    }

    pub fn timer_tick(&self) -> Duration {
        Duration::from_millis(self.timer_tick_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn drain_poll(&self) -> Duration {
        Duration::from_millis(self.drain_poll_ms)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            realm: default_realm(),
            timer_tick_ms: default_timer_tick_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            drain_poll_ms: default_drain_poll_ms(),
        }
    }
}

// --- Default value functions for serde ---

fn default_realm() -> String {
    "default".to_string()
}

fn default_timer_tick_ms() -> u64 {
    1_000
}

fn default_stop_grace_ms() -> u64 {
    10_000
}

fn default_drain_poll_ms() -> u64 {
    100
}
