//! Pattern matching over topic keys, and the reserved `timer://` URI scheme.
//!
//! Subscriptions do not hard-code a single pattern library: the registry
//! works against the [`Matcher`] trait, with a regex-backed implementation
//! as the concrete default. Patterns are compiled eagerly so malformed ones
//! fail at `subscribe` instead of at match time.

use crate::error::HubError;
use regex::Regex;

/// Decides whether a subscription applies to a topic key.
pub trait Matcher: Send + Sync {
    fn is_match(&self, key: &str) -> bool;
}

/// The default matcher: a compiled regular expression over the topic key.
#[derive(Debug)]
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    /// Compiles `source`, rejecting malformed patterns eagerly.
    pub fn compile(source: &str) -> Result<Self, HubError> {
        let regex = Regex::new(source).map_err(|err| HubError::InvalidPattern {
            pattern: source.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self { regex })
    }
}

impl Matcher for RegexMatcher {
    fn is_match(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

/// A recognized timer pattern. Only the periodic form is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSpec {
    /// `timer://<host>/each/<N>`: publish the pattern string every `N` ticks.
    /// The interval is non-negative and fits the countdown arithmetic.
    Each(i64),
}

/// Inspects a subscription pattern for the reserved `timer://` scheme.
///
/// Returns `Ok(None)` for ordinary patterns. The `timer://<host>/at/<ts>`
/// form is recognized syntactically but must fail loudly, never silently
/// no-op.
pub fn parse_timer(pattern: &str) -> Result<Option<TimerSpec>, HubError> {
    let Some(rest) = pattern.strip_prefix("timer://") else {
        return Ok(None);
    };

    let invalid = |reason: &str| HubError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = rest.splitn(3, '/');
    let _host = segments.next().unwrap_or_default();
    let verb = segments.next().ok_or_else(|| invalid("missing timer verb"))?;
    let arg = segments
        .next()
        .ok_or_else(|| invalid("missing timer argument"))?;

    match verb {
        "each" => {
            let interval: i64 = arg
                .parse()
                .map_err(|_| invalid("interval is not an integer in range"))?;
            if interval < 0 {
                return Err(invalid("interval must be non-negative"));
            }
            Ok(Some(TimerSpec::Each(interval)))
        }
        "at" => Err(HubError::NotImplemented(pattern.to_string())),
        _ => Err(invalid("unknown timer verb")),
    }
}
