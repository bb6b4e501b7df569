//! Error types surfaced by the hub's public API.

use thiserror::Error;

/// Errors returned by [`Hub`](crate::hub::Hub) operations.
///
/// Dropped messages (reentrancy lock, duplicate suppression) are not errors
/// and never appear here; they are traced at debug level only.
#[derive(Debug, Error)]
pub enum HubError {
    /// The subscription pattern failed to compile. Patterns are validated
    /// eagerly at `subscribe`, never lazily at match time.
    #[error("invalid subscription pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The `timer://<host>/at/<timestamp>` form is recognized but its
    /// scheduling behavior is not implemented.
    #[error("timer form not implemented: {0}")]
    NotImplemented(String),

    /// `start` was called on a hub that is already running.
    #[error("hub {realm:?} is already running")]
    AlreadyRunning { realm: String },

    /// `stop` was called on a hub that is not running.
    #[error("hub {realm:?} is not running")]
    NotRunning { realm: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_realm() {
        let err = HubError::AlreadyRunning {
            realm: "trading".into(),
        };
        assert_eq!(err.to_string(), "hub \"trading\" is already running");

        let err = HubError::NotRunning {
            realm: "trading".into(),
        };
        assert_eq!(err.to_string(), "hub \"trading\" is not running");
    }

    #[test]
    fn display_carries_the_offending_pattern() {
        let err = HubError::InvalidPattern {
            pattern: "[".into(),
            reason: "unclosed character class".into(),
        };
        assert!(err.to_string().contains("\"[\""));

        let err = HubError::NotImplemented("timer://x/at/2030-01-01".into());
        assert!(err.to_string().contains("timer://x/at/2030-01-01"));
    }
}
