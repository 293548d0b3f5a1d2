//! nodemedic-provision: interfaces to the systems that own nodes and machines.
//!
//! The healer never talks to a concrete cluster backend. Instead it consumes
//! narrow capability traits:
//!
//! ```text
//! ProvisionerRegistry
//!   └── Provisioner (name)
//!         └── as_node_provisioner() → Option<NodeProvisioner>
//!               └── list/get/add/update/remove nodes → Node
//!                                                     └── health_checker() → Option<NodeHealthChecker>
//! Iaas
//!   └── create/find/destroy → Machine
//! ```
//!
//! Backends implement only the capabilities they support; callers discover
//! them through the `Option`-returning accessors.

pub mod error;
pub mod iaas;
pub mod node;
pub mod provisioner;
pub mod registry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{IaasError, IaasResult, ProvisionError, ProvisionResult};
pub use iaas::{Iaas, Machine};
pub use node::*;
pub use provisioner::*;
pub use registry::ProvisionerRegistry;
