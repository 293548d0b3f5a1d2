//! Explicitly constructed provisioner registry.
//!
//! The process entry point builds one registry and threads it (cheaply
//! cloned) through every component that needs to reach a provisioner.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::ProvisionResult;
use crate::node::Node;
use crate::provisioner::{NodeProvisioner, Provisioner};

/// Named set of provisioners.
#[derive(Clone, Default)]
pub struct ProvisionerRegistry {
    provisioners: BTreeMap<String, Arc<dyn Provisioner>>,
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provisioner under its own name, replacing any previous one.
    pub fn register(&mut self, provisioner: Arc<dyn Provisioner>) {
        let name = provisioner.name().to_string();
        debug!(%name, "provisioner registered");
        self.provisioners.insert(name, provisioner);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.register(provisioner);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provisioner>> {
        self.provisioners.get(name).cloned()
    }

    /// The node capability of a named provisioner, if it has one.
    pub fn node_provisioner(&self, name: &str) -> Option<Arc<dyn NodeProvisioner>> {
        self.get(name).and_then(|p| p.as_node_provisioner())
    }

    /// Every registered provisioner that manages nodes.
    pub fn node_provisioners(&self) -> Vec<Arc<dyn NodeProvisioner>> {
        self.provisioners
            .values()
            .filter_map(|p| Arc::clone(p).as_node_provisioner())
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.provisioners.keys().map(String::as_str).collect()
    }

    /// List the nodes of every node provisioner.
    ///
    /// Fails on the first provisioner that cannot list its nodes.
    pub async fn all_nodes(&self) -> ProvisionResult<Vec<Arc<dyn Node>>> {
        let mut nodes = Vec::new();
        for provisioner in self.node_provisioners() {
            nodes.extend(provisioner.list_nodes(None).await?);
        }
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProvisionError;
    use crate::testing::{FakeNode, FakeProvisioner};

    struct Bare;

    impl Provisioner for Bare {
        fn name(&self) -> &str {
            "bare"
        }
    }

    #[tokio::test]
    async fn lists_nodes_of_node_provisioners_only() {
        let p1 = FakeProvisioner::new("p1");
        p1.insert_node(FakeNode::new("http://addr1:1", "pool1"));
        let p2 = FakeProvisioner::new("p2");
        p2.insert_node(FakeNode::new("http://addr2:2", "pool2"));
        p2.insert_node(FakeNode::new("http://addr3:3", "pool2"));

        let registry = ProvisionerRegistry::new()
            .with(p1)
            .with(p2)
            .with(Arc::new(Bare));

        assert_eq!(registry.names(), vec!["bare", "p1", "p2"]);
        assert_eq!(registry.node_provisioners().len(), 2);
        assert!(registry.node_provisioner("bare").is_none());
        assert!(registry.node_provisioner("p1").is_some());

        let mut addrs: Vec<_> = registry
            .all_nodes()
            .await
            .unwrap()
            .iter()
            .map(|n| n.address().to_string())
            .collect();
        addrs.sort();
        assert_eq!(addrs, vec!["http://addr1:1", "http://addr2:2", "http://addr3:3"]);
    }

    #[tokio::test]
    async fn listing_failure_is_propagated() {
        let p1 = FakeProvisioner::new("p1");
        p1.prepare_failure("list_nodes", ProvisionError::Backend("boom".into()));
        let registry = ProvisionerRegistry::new().with(p1);

        let err = registry.all_nodes().await.unwrap_err();
        assert_eq!(err, ProvisionError::Backend("boom".into()));
    }
}
