//! In-memory provisioner and IaaS fakes.
//!
//! Enabled with the `testing` feature so that dependent crates can drive
//! the healer end to end without a real backend.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{IaasError, IaasResult, ProvisionError, ProvisionResult};
use crate::iaas::{Iaas, Machine};
use crate::node::{Metadata, Node, NodeHealthChecker, NodeStatus, POOL_METADATA_KEY};
use crate::provisioner::*;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Node ──────────────────────────────────────────────────────────

/// A node with in-process failure accounting.
#[derive(Debug)]
pub struct FakeNode {
    address: String,
    pool: String,
    iaas_id: String,
    metadata: Metadata,
    provisioner: String,
    disabled: AtomicBool,
    failures: AtomicU32,
    has_success: AtomicBool,
}

impl FakeNode {
    pub fn new(address: &str, pool: &str) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(POOL_METADATA_KEY.to_string(), pool.to_string());
        Self {
            address: address.to_string(),
            pool: pool.to_string(),
            iaas_id: String::new(),
            metadata,
            provisioner: String::new(),
            disabled: AtomicBool::new(false),
            failures: AtomicU32::new(0),
            has_success: AtomicBool::new(false),
        }
    }

    pub fn with_iaas_id(mut self, id: &str) -> Self {
        self.iaas_id = id.to_string();
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn without_metadata(mut self, key: &str) -> Self {
        self.metadata.remove(key);
        self
    }

    /// Set the failure accounting reported by the node's health checker.
    pub fn set_health(&self, failures: u32, has_success: bool) {
        self.failures.store(failures, Ordering::SeqCst);
        self.has_success.store(has_success, Ordering::SeqCst);
    }

    fn from_add(opts: AddNodeOptions, provisioner: &str) -> Self {
        Self {
            address: opts.address,
            pool: opts.pool,
            iaas_id: opts.iaas_id,
            metadata: opts.metadata,
            provisioner: provisioner.to_string(),
            disabled: AtomicBool::new(false),
            failures: AtomicU32::new(0),
            has_success: AtomicBool::new(false),
        }
    }

    fn with_new_metadata(&self, metadata: Metadata) -> Self {
        Self {
            address: self.address.clone(),
            pool: self.pool.clone(),
            iaas_id: self.iaas_id.clone(),
            metadata,
            provisioner: self.provisioner.clone(),
            disabled: AtomicBool::new(self.disabled.load(Ordering::SeqCst)),
            failures: AtomicU32::new(self.failures.load(Ordering::SeqCst)),
            has_success: AtomicBool::new(self.has_success.load(Ordering::SeqCst)),
        }
    }
}

impl Node for FakeNode {
    fn address(&self) -> &str {
        &self.address
    }

    fn pool(&self) -> &str {
        &self.pool
    }

    fn iaas_id(&self) -> &str {
        &self.iaas_id
    }

    fn status(&self) -> NodeStatus {
        if self.disabled.load(Ordering::SeqCst) {
            NodeStatus::Disabled
        } else {
            NodeStatus::Enabled
        }
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn provisioner_name(&self) -> &str {
        &self.provisioner
    }

    fn health_checker(&self) -> Option<&dyn NodeHealthChecker> {
        Some(self)
    }
}

impl NodeHealthChecker for FakeNode {
    fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    fn has_success(&self) -> bool {
        self.has_success.load(Ordering::SeqCst)
    }

    fn reset_failures(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }
}

// ── Provisioner ───────────────────────────────────────────────────

/// Node provisioner keeping its nodes in memory.
///
/// Failures can be injected per method with [`prepare_failure`](Self::prepare_failure);
/// each prepared error is returned once, in order.
pub struct FakeProvisioner {
    name: String,
    nodes: Mutex<BTreeMap<String, Arc<FakeNode>>>,
    failures: Mutex<HashMap<String, VecDeque<ProvisionError>>>,
    removals: Mutex<Vec<RemoveNodeOptions>>,
}

impl FakeProvisioner {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            nodes: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(HashMap::new()),
            removals: Mutex::new(Vec::new()),
        })
    }

    /// Register a node directly, bypassing `add_node`. Returns the stored handle.
    pub fn insert_node(&self, mut node: FakeNode) -> Arc<FakeNode> {
        node.provisioner = self.name.clone();
        let node = Arc::new(node);
        lock(&self.nodes).insert(node.address.clone(), Arc::clone(&node));
        node
    }

    /// Make the next call of `method` fail with `err`.
    pub fn prepare_failure(&self, method: &str, err: ProvisionError) {
        lock(&self.failures)
            .entry(method.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn fake_node(&self, address: &str) -> Option<Arc<FakeNode>> {
        lock(&self.nodes).get(address).cloned()
    }

    /// Addresses of all registered nodes, sorted.
    pub fn addresses(&self) -> Vec<String> {
        lock(&self.nodes).keys().cloned().collect()
    }

    /// Every `remove_node` call received, including failed ones.
    pub fn removals(&self) -> Vec<RemoveNodeOptions> {
        lock(&self.removals).clone()
    }

    fn take_failure(&self, method: &str) -> ProvisionResult<()> {
        match lock(&self.failures).get_mut(method).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Provisioner for FakeProvisioner {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_node_provisioner(self: Arc<Self>) -> Option<Arc<dyn NodeProvisioner>> {
        Some(self)
    }
}

#[async_trait]
impl NodeProvisioner for FakeProvisioner {
    async fn list_nodes(&self, filter: Option<&NodeFilter>) -> ProvisionResult<Vec<Arc<dyn Node>>> {
        self.take_failure("list_nodes")?;
        let nodes = lock(&self.nodes);
        Ok(nodes
            .values()
            .filter(|n| filter.is_none_or(|f| f.matches(n.as_ref())))
            .map(|n| Arc::clone(n) as Arc<dyn Node>)
            .collect())
    }

    async fn get_node(&self, address: &str) -> ProvisionResult<Arc<dyn Node>> {
        self.take_failure("get_node")?;
        lock(&self.nodes)
            .get(address)
            .map(|n| Arc::clone(n) as Arc<dyn Node>)
            .ok_or(ProvisionError::NodeNotFound)
    }

    async fn add_node(&self, opts: AddNodeOptions) -> ProvisionResult<()> {
        self.take_failure("add_node")?;
        let mut nodes = lock(&self.nodes);
        if nodes.contains_key(&opts.address) {
            return Err(ProvisionError::NodeAlreadyExists(opts.address));
        }
        debug!(provisioner = %self.name, address = %opts.address, "fake node added");
        let node = FakeNode::from_add(opts, &self.name);
        nodes.insert(node.address.clone(), Arc::new(node));
        Ok(())
    }

    async fn update_node(&self, opts: UpdateNodeOptions) -> ProvisionResult<()> {
        self.take_failure("update_node")?;
        let mut nodes = lock(&self.nodes);
        let node = nodes
            .get(&opts.address)
            .cloned()
            .ok_or(ProvisionError::NodeNotFound)?;
        if let Some(status) = opts.status {
            node.disabled
                .store(status == NodeStatus::Disabled, Ordering::SeqCst);
        }
        if let Some(metadata) = opts.metadata {
            nodes.insert(opts.address.clone(), Arc::new(node.with_new_metadata(metadata)));
        }
        Ok(())
    }

    async fn remove_node(
        &self,
        opts: RemoveNodeOptions,
        log: &mut (dyn Write + Send),
    ) -> ProvisionResult<()> {
        lock(&self.removals).push(opts.clone());
        self.take_failure("remove_node")?;
        if opts.rebalance {
            writeln!(log, "rebalancing units from {}", opts.address)
                .map_err(|e| ProvisionError::Backend(e.to_string()))?;
        }
        match lock(&self.nodes).remove(&opts.address) {
            Some(_) => Ok(()),
            None => Err(ProvisionError::NodeNotFound),
        }
    }
}

// ── IaaS ──────────────────────────────────────────────────────────

/// IaaS handing out sequential machine ids (`m-1`, `m-2`, ...).
pub struct FakeIaas {
    kind: String,
    protocol: String,
    port: u16,
    next_id: AtomicU64,
    machines: Mutex<BTreeMap<String, Machine>>,
    next_hosts: Mutex<VecDeque<String>>,
    create_errors: Mutex<VecDeque<IaasError>>,
    destroy_errors: Mutex<VecDeque<IaasError>>,
    find_errors: Mutex<VecDeque<IaasError>>,
}

impl FakeIaas {
    pub fn new(kind: &str) -> Arc<Self> {
        Self::with_node_format(kind, "http", 2375)
    }

    /// Like [`new`](Self::new), with the protocol and port of created node addresses.
    pub fn with_node_format(kind: &str, protocol: &str, port: u16) -> Arc<Self> {
        Arc::new(Self {
            kind: kind.to_string(),
            protocol: protocol.to_string(),
            port,
            next_id: AtomicU64::new(1),
            machines: Mutex::new(BTreeMap::new()),
            next_hosts: Mutex::new(VecDeque::new()),
            create_errors: Mutex::new(VecDeque::new()),
            destroy_errors: Mutex::new(VecDeque::new()),
            find_errors: Mutex::new(VecDeque::new()),
        })
    }

    /// Host handed to the next created machine. Defaults to `host-<n>`.
    pub fn push_next_host(&self, host: &str) {
        lock(&self.next_hosts).push_back(host.to_string());
    }

    /// Register an existing machine, as if created earlier.
    pub fn add_machine(&self, id: &str, host: &str) -> Machine {
        let machine = Machine {
            id: id.to_string(),
            iaas: self.kind.clone(),
            address: host.to_string(),
            protocol: self.protocol.clone(),
            port: self.port,
            creation_params: Metadata::new(),
        };
        lock(&self.machines).insert(machine.id.clone(), machine.clone());
        machine
    }

    pub fn fail_next_create(&self, err: IaasError) {
        lock(&self.create_errors).push_back(err);
    }

    pub fn fail_next_destroy(&self, err: IaasError) {
        lock(&self.destroy_errors).push_back(err);
    }

    pub fn fail_next_find(&self, err: IaasError) {
        lock(&self.find_errors).push_back(err);
    }

    /// Live machines, ordered by id.
    pub fn machines(&self) -> Vec<Machine> {
        lock(&self.machines).values().cloned().collect()
    }
}

#[async_trait]
impl Iaas for FakeIaas {
    async fn create_machine(&self, kind: &str, params: &Metadata) -> IaasResult<Machine> {
        if kind != self.kind {
            return Err(IaasError::UnknownIaas(kind.to_string()));
        }
        if let Some(err) = lock(&self.create_errors).pop_front() {
            return Err(err);
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let host = lock(&self.next_hosts)
            .pop_front()
            .unwrap_or_else(|| format!("host-{n}"));
        let machine = Machine {
            id: format!("m-{n}"),
            iaas: self.kind.clone(),
            address: host,
            protocol: self.protocol.clone(),
            port: self.port,
            creation_params: params.clone(),
        };
        lock(&self.machines).insert(machine.id.clone(), machine.clone());
        debug!(id = %machine.id, host = %machine.address, "fake machine created");
        Ok(machine)
    }

    async fn find_machine(&self, id: &str, host: &str) -> IaasResult<Machine> {
        if let Some(err) = lock(&self.find_errors).pop_front() {
            return Err(err);
        }
        let machines = lock(&self.machines);
        let found = if id.is_empty() {
            machines.values().find(|m| m.address == host)
        } else {
            machines.get(id)
        };
        found.cloned().ok_or(IaasError::MachineNotFound)
    }

    async fn destroy_machine(&self, machine: &Machine) -> IaasResult<()> {
        if let Some(err) = lock(&self.destroy_errors).pop_front() {
            return Err(err);
        }
        match lock(&self.machines).remove(&machine.id) {
            Some(_) => Ok(()),
            None => Err(IaasError::MachineNotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_rejects_duplicate_address() {
        let p = FakeProvisioner::new("fake");
        let opts = AddNodeOptions {
            address: "http://addr1:1".into(),
            iaas_id: "m-1".into(),
            pool: "pool1".into(),
            metadata: Metadata::new(),
            wait_timeout: std::time::Duration::from_secs(1),
        };
        p.add_node(opts.clone()).await.unwrap();
        let err = p.add_node(opts).await.unwrap_err();
        assert_eq!(err, ProvisionError::NodeAlreadyExists("http://addr1:1".into()));

        let node = p.get_node("http://addr1:1").await.unwrap();
        assert_eq!(node.provisioner_name(), "fake");
        assert_eq!(node.iaas_id(), "m-1");
    }

    #[tokio::test]
    async fn prepared_failures_are_consumed_once() {
        let p = FakeProvisioner::new("fake");
        p.insert_node(FakeNode::new("http://addr1:1", "pool1"));
        p.prepare_failure("update_node", ProvisionError::Backend("nope".into()));

        let err = p
            .update_node(UpdateNodeOptions::disable("http://addr1:1"))
            .await
            .unwrap_err();
        assert_eq!(err, ProvisionError::Backend("nope".into()));

        p.update_node(UpdateNodeOptions::disable("http://addr1:1"))
            .await
            .unwrap();
        let node = p.get_node("http://addr1:1").await.unwrap();
        assert_eq!(node.status(), NodeStatus::Disabled);
    }

    #[tokio::test]
    async fn rebalance_writes_to_log() {
        let p = FakeProvisioner::new("fake");
        p.insert_node(FakeNode::new("http://addr1:1", "pool1"));
        let mut log = Vec::new();

        p.remove_node(
            RemoveNodeOptions {
                address: "http://addr1:1".into(),
                rebalance: true,
            },
            &mut log,
        )
        .await
        .unwrap();

        assert!(String::from_utf8(log).unwrap().contains("http://addr1:1"));
        assert!(p.addresses().is_empty());
        assert_eq!(p.removals().len(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_pool() {
        let p = FakeProvisioner::new("fake");
        p.insert_node(FakeNode::new("http://addr1:1", "pool1"));
        p.insert_node(FakeNode::new("http://addr2:2", "pool2"));

        let filter = NodeFilter {
            pools: vec!["pool2".into()],
            ..Default::default()
        };
        let nodes = p.list_nodes(Some(&filter)).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].address(), "http://addr2:2");
    }

    #[tokio::test]
    async fn iaas_find_by_id_then_host() {
        let iaas = FakeIaas::new("fake-iaas");
        iaas.add_machine("old-1", "addr1");
        iaas.push_next_host("addr2");
        let created = iaas.create_machine("fake-iaas", &Metadata::new()).await.unwrap();
        assert_eq!(created.id, "m-1");
        assert_eq!(created.format_node_address(), "http://addr2:2375");

        assert_eq!(iaas.find_machine("old-1", "").await.unwrap().address, "addr1");
        assert_eq!(iaas.find_machine("", "addr2").await.unwrap().id, "m-1");
        assert_eq!(
            iaas.find_machine("missing", "addr1").await.unwrap_err(),
            IaasError::MachineNotFound
        );

        iaas.destroy_machine(&created).await.unwrap();
        assert_eq!(iaas.machines().len(), 1);
        assert_eq!(
            iaas.create_machine("other", &Metadata::new()).await.unwrap_err(),
            IaasError::UnknownIaas("other".into())
        );
    }
}
