//! Contains common, primitive types shared across the hub.
//!
//! Topic keys are reference-counted strings because a single key is cloned
//! into every callback task of a dispatch; payloads are `serde_json::Value`
//! so the hub can compare them for duplicate suppression without caring what
//! they mean.

use std::sync::Arc;

/// A topic key. Cheap to clone, compared by content.
pub type TopicKey = Arc<str>;

/// Priority assigned to publishes that do not specify one. Lower values are
/// dispatched first.
pub const DEFAULT_PRIORITY: i32 = 1;

/// Well-known topic published once the hub has started. Payload is the
/// current time as an RFC 3339 string.
pub const TOPIC_SYSTEM_START: &str = "/system/start";

/// Well-known topic published while the hub is shutting down, so blocked
/// subscriber logic can observe shutdown and exit.
pub const TOPIC_SYSTEM_STOP: &str = "/system/stop";
