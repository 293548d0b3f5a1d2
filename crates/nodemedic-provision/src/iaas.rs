//! IaaS collaborator: creates and destroys the machines behind nodes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IaasResult;
use crate::node::Metadata;

/// A raw machine provisioned by an IaaS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Machine {
    pub id: String,
    /// IaaS kind that owns the machine.
    pub iaas: String,
    /// Host name or IP, without scheme or port.
    pub address: String,
    pub protocol: String,
    pub port: u16,
    /// Parameters the machine was created with.
    #[serde(default)]
    pub creation_params: Metadata,
}

impl Machine {
    /// Address under which the machine registers as a node.
    pub fn format_node_address(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.address, self.port)
    }
}

/// Machine lifecycle operations.
///
/// A single implementation may front several IaaS kinds; it fails with
/// [`IaasError::UnknownIaas`](crate::IaasError::UnknownIaas) for kinds it
/// does not serve.
#[async_trait]
pub trait Iaas: Send + Sync {
    async fn create_machine(&self, kind: &str, params: &Metadata) -> IaasResult<Machine>;

    /// Locate a machine by id, or by host when `id` is empty.
    async fn find_machine(&self, id: &str, host: &str) -> IaasResult<Machine>;

    async fn destroy_machine(&self, machine: &Machine) -> IaasResult<()>;
}
