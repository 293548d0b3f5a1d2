//! Error types for the event store.

use thiserror::Error;

use crate::types::EventId;

/// Result type alias for event store operations.
pub type EventResult<T> = Result<T, EventError>;

/// Errors that can occur when opening or finishing events.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    /// A running event already holds the target.
    #[error("event locked: {kind} running on {target} ({holder})")]
    Locked {
        target: String,
        kind: String,
        holder: EventId,
    },

    /// Too many events of this kind started within the throttling window.
    #[error("event throttled, limit for {kind} on {scope} is {max} every {window_secs}s")]
    Throttled {
        kind: String,
        /// `any node`, or `node "<address>"` for per-target limits.
        scope: String,
        max: usize,
        window_secs: u64,
    },

    #[error("event not found: {0}")]
    NotFound(EventId),

    #[error("event already finished: {0}")]
    AlreadyFinished(EventId),

    #[error("event store error: {0}")]
    Backend(String),
}

impl EventError {
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttled_message() {
        let err = EventError::Throttled {
            kind: "healer".into(),
            scope: "any node".into(),
            max: 3,
            window_secs: 300,
        };
        assert_eq!(
            err.to_string(),
            "event throttled, limit for healer on any node is 3 every 300s"
        );
        assert!(err.is_throttled());
        assert!(!err.is_locked());
    }
}
