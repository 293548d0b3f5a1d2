//! Node handles and their serializable snapshot.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Free-form node metadata (pool, IaaS kind, machine parameters, ...).
pub type Metadata = BTreeMap<String, String>;

/// Metadata key naming the IaaS that created the node's machine.
pub const IAAS_METADATA_KEY: &str = "iaas";

/// Metadata key carrying the pool name.
pub const POOL_METADATA_KEY: &str = "pool";

/// Whether a node receives new workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Enabled,
    Disabled,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => f.write_str("enabled"),
            Self::Disabled => f.write_str("disabled"),
        }
    }
}

/// An addressable host owned by a provisioner.
///
/// The healer only holds transient references to nodes; all mutation goes
/// through the owning [`NodeProvisioner`](crate::NodeProvisioner).
pub trait Node: Send + Sync + fmt::Debug {
    /// Address the node is registered under (e.g. `http://10.0.0.1:2375`).
    fn address(&self) -> &str;

    fn pool(&self) -> &str;

    /// Id of the machine backing this node, empty if unknown.
    fn iaas_id(&self) -> &str;

    fn status(&self) -> NodeStatus;

    fn metadata(&self) -> &Metadata;

    /// Name of the owning provisioner in the [`ProvisionerRegistry`](crate::ProvisionerRegistry).
    fn provisioner_name(&self) -> &str;

    /// Health-check capability, for nodes monitored by a failure-counting checker.
    fn health_checker(&self) -> Option<&dyn NodeHealthChecker> {
        None
    }

    /// IaaS kind recorded in metadata, if the node is associated with one.
    fn iaas_kind(&self) -> Option<&str> {
        self.metadata().get(IAAS_METADATA_KEY).map(String::as_str)
    }
}

/// Failure accounting maintained by an external health checker.
pub trait NodeHealthChecker: Send + Sync {
    /// Number of consecutive failed checks.
    fn failure_count(&self) -> u32;

    /// Whether the node was ever reached successfully.
    fn has_success(&self) -> bool;

    fn reset_failures(&self);
}

/// Serializable snapshot of a node, used in events and heal results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeSpec {
    pub address: String,
    pub pool: String,
    pub iaas_id: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub metadata: Metadata,
    pub provisioner: String,
}

impl NodeSpec {
    /// Capture the current state of a node handle.
    pub fn from_node(node: &dyn Node) -> Self {
        Self {
            address: node.address().to_string(),
            pool: node.pool().to_string(),
            iaas_id: node.iaas_id().to_string(),
            status: node.status(),
            metadata: node.metadata().clone(),
            provisioner: node.provisioner_name().to_string(),
        }
    }
}

/// Extract the host part of a node address.
///
/// `http://10.0.0.1:2375/` → `10.0.0.1`; bare hosts are returned unchanged.
pub fn url_to_host(address: &str) -> &str {
    let rest = match address.find("://") {
        Some(idx) => &address[idx + 3..],
        None => address,
    };
    let rest = rest.split('/').next().unwrap_or(rest);
    let rest = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
    if let Some(stripped) = rest.strip_prefix('[') {
        // IPv6 literal.
        return stripped.split(']').next().unwrap_or(stripped);
    }
    match rest.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => rest,
    }
}
