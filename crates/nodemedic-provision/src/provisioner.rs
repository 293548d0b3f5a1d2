//! Provisioner capability traits and their option types.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProvisionResult;
use crate::node::{Metadata, Node, NodeStatus};

/// A cluster backend registered with the platform.
///
/// Only the name is mandatory; further capabilities are exposed through
/// accessors that return `None` when the backend lacks them.
pub trait Provisioner: Send + Sync {
    fn name(&self) -> &str;

    /// Node lifecycle capability.
    fn as_node_provisioner(self: Arc<Self>) -> Option<Arc<dyn NodeProvisioner>> {
        None
    }
}

/// Restricts a node listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    /// Only nodes in these pools. Empty means all pools.
    pub pools: Vec<String>,
    /// Only nodes with these addresses. Empty means all addresses.
    pub addresses: Vec<String>,
}

impl NodeFilter {
    pub fn matches(&self, node: &dyn Node) -> bool {
        (self.pools.is_empty() || self.pools.iter().any(|p| p == node.pool()))
            && (self.addresses.is_empty() || self.addresses.iter().any(|a| a == node.address()))
    }
}

/// Parameters for registering a new node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddNodeOptions {
    pub address: String,
    pub iaas_id: String,
    pub pool: String,
    pub metadata: Metadata,
    /// How long to wait for the node to become ready.
    pub wait_timeout: Duration,
}

/// Parameters for changing a registered node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNodeOptions {
    pub address: String,
    /// New status, if it should change.
    pub status: Option<NodeStatus>,
    /// Replacement metadata, if it should change.
    pub metadata: Option<Metadata>,
}

impl UpdateNodeOptions {
    pub fn enable(address: &str) -> Self {
        Self {
            address: address.to_string(),
            status: Some(NodeStatus::Enabled),
            metadata: None,
        }
    }

    pub fn disable(address: &str) -> Self {
        Self {
            address: address.to_string(),
            status: Some(NodeStatus::Disabled),
            metadata: None,
        }
    }
}

/// Parameters for removing a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveNodeOptions {
    pub address: String,
    /// Move the node's workload elsewhere before removing it.
    pub rebalance: bool,
}

/// Node lifecycle operations of a provisioner.
#[async_trait]
pub trait NodeProvisioner: Send + Sync {
    async fn list_nodes(&self, filter: Option<&NodeFilter>) -> ProvisionResult<Vec<Arc<dyn Node>>>;

    /// Fails with [`ProvisionError::NodeNotFound`](crate::ProvisionError::NodeNotFound)
    /// if no node is registered at `address`.
    async fn get_node(&self, address: &str) -> ProvisionResult<Arc<dyn Node>>;

    async fn add_node(&self, opts: AddNodeOptions) -> ProvisionResult<()>;

    async fn update_node(&self, opts: UpdateNodeOptions) -> ProvisionResult<()>;

    /// Remove a node. Rebalance progress is written to `log`.
    async fn remove_node(
        &self,
        opts: RemoveNodeOptions,
        log: &mut (dyn Write + Send),
    ) -> ProvisionResult<()>;
}
