//! Error types for the node healer.

use std::fmt;

use thiserror::Error;

use nodemedic_event::EventError;
use nodemedic_provision::ProvisionError;
use nodemedic_state::StateError;

/// Result type alias for healer operations.
pub type HealerResult<T> = Result<T, HealerError>;

/// Boxed cause of a failed replacement step.
pub type StepCause = Box<dyn std::error::Error + Send + Sync>;

/// Replacement steps whose failure aborts a heal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealStep {
    CreateMachine,
    DisableOldNode,
    RegisterNewNode,
}

impl fmt::Display for HealStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateMachine => f.write_str("error creating new machine"),
            Self::DisableOldNode => f.write_str("error unregistering old node"),
            Self::RegisterNewNode => f.write_str("error registering new node"),
        }
    }
}

/// Errors that can occur in the node healer.
#[derive(Debug, Error)]
pub enum HealerError {
    #[error("node not found for addrs {0:?}")]
    NodeNotFound(Vec<String>),

    #[error("ambiguous nodes for addrs, received: {received:?}, found: {found:?}")]
    Ambiguous {
        received: Vec<String>,
        found: Vec<String>,
    },

    #[error("Error trying to insert node healing event for node {address:?}, healing aborted: {source}")]
    EventOpen {
        address: String,
        #[source]
        source: EventError,
    },

    #[error("unable to check if node {address:?} still exists: {source}")]
    NodeLookup {
        address: String,
        #[source]
        source: ProvisionError,
    },

    #[error("unable to check if node {address:?} should be healed: {source}")]
    Eligibility {
        address: String,
        #[source]
        source: StateError,
    },

    #[error("Can't auto-heal after {failures} failures for node {host}: {step}: {source}")]
    Heal {
        step: HealStep,
        failures: u32,
        host: String,
        #[source]
        source: StepCause,
    },

    #[error("provisioner {0:?} is not registered or does not manage nodes")]
    UnknownProvisioner(String),

    #[error("unable to retrieve nodes: {0}")]
    ListNodes(#[source] ProvisionError),

    #[error("unknown healer config field: {0}")]
    UnknownConfigField(String),

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("healer is shut down")]
    ShutDown,

    #[error("healing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

impl HealerError {
    /// True for errors raised because another attempt already holds the node.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::EventOpen { source, .. } if source.is_locked())
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::EventOpen { source, .. } if source.is_throttled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodemedic_provision::IaasError;

    #[test]
    fn heal_error_names_step_and_failures() {
        let err = HealerError::Heal {
            step: HealStep::CreateMachine,
            failures: 2,
            host: "addr1".into(),
            source: Box::new(IaasError::Backend("quota exceeded".into())),
        };
        assert_eq!(
            err.to_string(),
            "Can't auto-heal after 2 failures for node addr1: error creating new machine: quota exceeded"
        );
    }

    #[test]
    fn throttled_event_error_is_wrapped() {
        let err = HealerError::EventOpen {
            address: "http://addr1:1".into(),
            source: EventError::Throttled {
                kind: "healer".into(),
                scope: "any node".into(),
                max: 3,
                window_secs: 300,
            },
        };
        assert!(err.is_throttled());
        assert!(!err.is_locked());
        assert!(err
            .to_string()
            .ends_with("event throttled, limit for healer on any node is 3 every 300s"));
    }
}
