//! Error types for provisioner and IaaS collaborators.

use thiserror::Error;

/// Result type alias for provisioner operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Result type alias for IaaS operations.
pub type IaasResult<T> = Result<T, IaasError>;

/// Errors returned by node provisioners.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("node not found")]
    NodeNotFound,

    #[error("node already exists: {0}")]
    NodeAlreadyExists(String),

    #[error("{0}")]
    Backend(String),
}

/// Errors returned by IaaS collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IaasError {
    #[error("machine not found")]
    MachineNotFound,

    #[error("unknown iaas: {0:?}")]
    UnknownIaas(String),

    #[error("{0}")]
    Backend(String),
}
