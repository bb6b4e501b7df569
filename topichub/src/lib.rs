//! # Topichub
//!
//! An in-process, priority-ordered publish/subscribe event hub for Rust.
//!
//! Topichub provides a single-process message coordinator: publishers drop
//! messages onto a priority queue, subscribers register regex patterns over
//! topic keys, and a dispatch reactor delivers each message to every matching
//! callback as its own concurrent task.
//!
//! ## Core Concepts
//!
//! - **Hub**: the facade. `publish`, `publish_and_wait`, `subscribe`,
//!   `unsubscribe`, `detach`, `start`, `stop`. Cloning a `Hub` yields another
//!   handle to the same running instance.
//! - **Priority Queue**: pending messages ordered by ascending priority with
//!   a stable FIFO tie-break for equal priorities.
//! - **Subscription Registry**: pattern -> callback-list mapping with
//!   eagerly compiled matchers, consulted in registration order.
//! - **Timer Scheduler**: subscribing a `timer://<host>/each/<N>` pattern
//!   makes the hub publish that pattern string to itself every `N` ticks.
//! - **Reentrancy Guard**: while the callbacks for a topic are still running,
//!   new publishes for that exact topic are dropped, so a timer's own
//!   re-publish cannot pile up behind a slow handler.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use topichub::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create a hub registry and grab the hub for a realm.
//!     let registry = HubRegistry::new();
//!     let hub = registry.hub("demo");
//!
//!     // 2. Subscribe a callback before starting the hub.
//!     hub.subscribe(
//!         "^/greetings$",
//!         callback_fn(|key, payload| {
//!             println!("{key} -> {payload}");
//!             Ok(None)
//!         }),
//!         SubscribeOptions::default(),
//!     )
//!     .await?;
//!
//!     // 3. Start the hub on the current runtime.
//!     hub.start(&tokio::runtime::Handle::current())?;
//!
//!     // 4. Publish and shut down.
//!     hub.publish("/greetings", json!("hello"), DEFAULT_PRIORITY, true, None);
//!     hub.stop().await?;
//!     registry.close().await;
//!     Ok(())
//! }
//! ```

pub const HUB_NAME: &str = "Topichub";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod config;
pub mod error;
pub mod guard;
pub mod hub;
pub mod message;
pub mod pattern;
pub mod queue;
pub mod reactor;
pub mod registry;
pub mod timer;

/// A prelude module for easy importing of the most common Topichub types.
pub mod prelude {
    pub use crate::common::{TopicKey, DEFAULT_PRIORITY, TOPIC_SYSTEM_START, TOPIC_SYSTEM_STOP};
    pub use crate::config::HubConfig;
    pub use crate::error::HubError;
    pub use crate::hub::{Hub, HubRegistry, HubState};
    pub use crate::message::{Message, Payload, SyncHandle};
    pub use crate::registry::{callback_async, callback_fn, Callback, Owner, SubscribeOptions};
}
