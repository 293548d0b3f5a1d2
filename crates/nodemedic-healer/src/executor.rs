//! Node replacement protocol.
//!
//! A heal attempt for node N runs under a healing event that locks N's
//! address:
//!
//! ```text
//! open event ──► N still registered? ──► still eligible? (skipped when manual)
//!     │
//!     ▼
//! create machine ──► disable N ──► add new node ──► remove N (rebalance)
//!                                                 └► destroy N's machine
//! ```
//!
//! Failing to create, disable or register aborts the attempt after undoing
//! the earlier steps. Failures while removing N or destroying its machine
//! only degrade the result: the replacement is already serving.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use nodemedic_event::{Allowed, EventId, EventOpts, EventOutcome, Target};
use nodemedic_provision::{
    AddNodeOptions, IaasError, Machine, Node, NodeProvisioner, NodeSpec, NodeStatus,
    POOL_METADATA_KEY, ProvisionError, RemoveNodeOptions, UpdateNodeOptions, url_to_host,
};
use nodemedic_state::NodeChecks;

use crate::HEALER_EVENT_KIND;
use crate::error::{HealStep, HealerError, HealerResult, StepCause};
use crate::healer::HealerContext;
use crate::policy::HealingPolicy;
use crate::tracker::NodeStatusTracker;

/// Permission needed to read healing events of a pool.
const POOL_READ_EVENTS: &str = "pool.read.events";

/// Why and how a heal was requested.
#[derive(Debug, Clone, Default)]
pub struct HealAttempt {
    pub reason: String,
    /// Most recent check batch, attached to the event for diagnostics.
    pub last_check: Option<NodeChecks>,
    /// Manual heals skip the eligibility re-check.
    pub manual: bool,
}

impl HealAttempt {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Default::default()
        }
    }

    pub fn with_last_check(mut self, last_check: Option<NodeChecks>) -> Self {
        self.last_check = last_check;
        self
    }

    pub fn manual(mut self) -> Self {
        self.manual = true;
        self
    }
}

/// Start payload of a healing event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealingEventData {
    pub node: NodeSpec,
    pub reason: String,
    pub last_check: Option<NodeChecks>,
}

/// Outcome of a completed replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct HealedNode {
    /// The node registered in place of the failing one.
    pub node: NodeSpec,
    /// Logged failures of the retire steps (remove, destroy).
    pub secondary_errors: Vec<String>,
}

/// Runs heal attempts. The only component that mutates nodes and machines.
pub struct HealingExecutor {
    ctx: HealerContext,
    policy: Arc<HealingPolicy>,
    tracker: NodeStatusTracker,
    wait_new_machine: Duration,
}

impl HealingExecutor {
    pub fn new(
        ctx: HealerContext,
        policy: Arc<HealingPolicy>,
        tracker: NodeStatusTracker,
        wait_new_machine: Duration,
    ) -> Self {
        Self {
            ctx,
            policy,
            tracker,
            wait_new_machine,
        }
    }

    /// Attempt to heal a node under its healing event.
    ///
    /// Returns `Ok(None)` when nothing was done: the node has no IaaS, another
    /// attempt holds it, it is gone, or it no longer qualifies.
    pub async fn try_healing_node(
        &self,
        node: Arc<dyn Node>,
        attempt: HealAttempt,
    ) -> HealerResult<Option<HealedNode>> {
        let address = node.address().to_string();
        if node.iaas_kind().is_none() {
            debug!(%address, reason = %attempt.reason, "node has no IaaS information, skipping healing");
            return Ok(None);
        }

        let event_id = match self.open_event(node.as_ref(), &attempt).await {
            Ok(id) => id,
            Err(e) if e.is_locked() => {
                debug!(%address, "healing already in progress");
                return Ok(None);
            }
            Err(source) => return Err(HealerError::EventOpen { address, source }),
        };

        let result = self.validate_and_heal(&node, &attempt).await;
        self.finish_event(event_id, &address, &result).await;
        result
    }

    async fn open_event(
        &self,
        node: &dyn Node,
        attempt: &HealAttempt,
    ) -> Result<EventId, nodemedic_event::EventError> {
        let data = HealingEventData {
            node: NodeSpec::from_node(node),
            reason: attempt.reason.clone(),
            last_check: attempt.last_check.clone(),
        };
        let custom_data = serde_json::to_value(&data)
            .map_err(|e| nodemedic_event::EventError::Backend(e.to_string()))?;
        self.ctx
            .events
            .new_internal(EventOpts {
                target: Target::node(node.address()),
                extra_targets: vec![Target::pool(node.pool())],
                kind: HEALER_EVENT_KIND.to_string(),
                custom_data,
                allowed: Some(Allowed {
                    permission: POOL_READ_EVENTS.to_string(),
                    context: Target::pool(node.pool()),
                }),
            })
            .await
    }

    async fn finish_event(
        &self,
        id: EventId,
        address: &str,
        result: &HealerResult<Option<HealedNode>>,
    ) {
        let finished = match result {
            Ok(None) => self.ctx.events.abort(id).await,
            Ok(Some(healed)) => {
                let error = (!healed.secondary_errors.is_empty())
                    .then(|| healed.secondary_errors.join("; "));
                let custom_data = serde_json::to_value(&healed.node).ok();
                let outcome = EventOutcome {
                    error,
                    custom_data,
                    extra_targets: vec![Target::node(healed.node.address.clone())],
                };
                self.ctx.events.done(id, outcome).await
            }
            Err(e) => {
                let outcome = EventOutcome {
                    error: Some(e.to_string()),
                    ..Default::default()
                };
                self.ctx.events.done(id, outcome).await
            }
        };
        if let Err(e) = finished {
            error!(%address, %id, error = %e, "failed to update healing event");
        }
    }

    async fn validate_and_heal(
        &self,
        node: &Arc<dyn Node>,
        attempt: &HealAttempt,
    ) -> HealerResult<Option<HealedNode>> {
        let address = node.address();
        let provisioner = self
            .ctx
            .registry
            .node_provisioner(node.provisioner_name())
            .ok_or_else(|| HealerError::UnknownProvisioner(node.provisioner_name().to_string()))?;

        match provisioner.get_node(address).await {
            Ok(_) => {}
            Err(ProvisionError::NodeNotFound) => {
                debug!(%address, "node no longer registered, skipping healing");
                return Ok(None);
            }
            Err(source) => {
                return Err(HealerError::NodeLookup {
                    address: address.to_string(),
                    source,
                });
            }
        }

        if !attempt.manual {
            let eligible = self
                .policy
                .should_heal_node(node.as_ref())
                .map_err(|source| HealerError::Eligibility {
                    address: address.to_string(),
                    source,
                })?;
            if !eligible {
                debug!(%address, "node no longer qualifies for healing");
                return Ok(None);
            }
        }

        error!(%address, reason = %attempt.reason, "initiating healing process for node");
        self.heal_node(node, provisioner).await.map(Some)
    }

    /// Replace `node` with a freshly provisioned one.
    pub async fn heal_node(
        &self,
        node: &Arc<dyn Node>,
        provisioner: Arc<dyn NodeProvisioner>,
    ) -> HealerResult<HealedNode> {
        let failing_addr = node.address().to_string();
        let failing_host = url_to_host(&failing_addr).to_string();
        // Never hand the live metadata to collaborators.
        let mut metadata = node.metadata().clone();
        metadata.insert(POOL_METADATA_KEY.to_string(), node.pool().to_string());
        let failures = node.health_checker().map_or(0, |hc| hc.failure_count());
        let step_error = |step: HealStep, source: StepCause| HealerError::Heal {
            step,
            failures,
            host: failing_host.clone(),
            source,
        };

        let kind = node.iaas_kind().unwrap_or_default().to_string();
        let machine = match self.ctx.iaas.create_machine(&kind, &metadata).await {
            Ok(m) => m,
            Err(e) => {
                reset_failures(node.as_ref());
                return Err(step_error(HealStep::CreateMachine, e.into()));
            }
        };

        if let Err(e) = provisioner
            .update_node(UpdateNodeOptions::disable(&failing_addr))
            .await
        {
            self.destroy_best_effort(&machine).await;
            return Err(step_error(HealStep::DisableOldNode, e.into()));
        }

        let new_addr = machine.format_node_address();
        let mut secondary_errors = Vec::new();
        let remove_before = new_addr == failing_addr;
        let mut early_removal = None;
        if remove_before {
            // The replacement reuses the address: the old node must be gone
            // before the new one can be registered.
            let removed = remove_node_try_rebalance(provisioner.as_ref(), &failing_addr, &new_addr).await;
            if let Err(e) = &removed {
                secondary_errors.push(e.clone());
            }
            early_removal = Some(removed);
        }

        debug!(%new_addr, "new machine created during healing, waiting for node to start");
        let add = AddNodeOptions {
            address: new_addr.clone(),
            iaas_id: machine.id.clone(),
            pool: node.pool().to_string(),
            metadata: metadata.clone(),
            wait_timeout: self.wait_new_machine,
        };
        if let Err(e) = provisioner.add_node(add).await {
            reset_failures(node.as_ref());
            if !matches!(early_removal, Some(Ok(()))) {
                if let Err(re) = provisioner
                    .update_node(UpdateNodeOptions::enable(&failing_addr))
                    .await
                {
                    warn!(address = %failing_addr, error = %re, "failed to re-enable node after healing failure");
                }
            }
            let cause: StepCause = match early_removal {
                None => e.into(),
                Some(Ok(())) => {
                    error!(
                        address = %failing_addr,
                        error = %e,
                        "old node was removed but its replacement failed to register"
                    );
                    format!("{e} (old node {failing_addr} was already removed)").into()
                }
                Some(Err(removal)) => {
                    error!(
                        address = %failing_addr,
                        error = %e,
                        removal_error = %removal,
                        "replacement failed to register after removing the old node failed"
                    );
                    format!("{e} (removing old node {failing_addr} had failed: {removal})").into()
                }
            };
            self.destroy_best_effort(&machine).await;
            return Err(step_error(HealStep::RegisterNewNode, cause));
        }

        let mut spec = NodeSpec::from_node(node.as_ref());
        spec.address = new_addr.clone();
        spec.iaas_id = machine.id.clone();
        spec.metadata = metadata;
        spec.status = NodeStatus::Enabled;

        if !remove_before {
            if let Err(e) = remove_node_try_rebalance(provisioner.as_ref(), &failing_addr, &new_addr).await {
                secondary_errors.push(e);
            }
        }

        if let Err(e) = self.tracker.remove_node(&failing_addr) {
            error!(address = %failing_addr, error = %e, "unable to remove node status from healer");
        }

        if let Some(e) = self.destroy_failing_machine(node.as_ref(), &failing_host, &machine).await {
            error!(address = %failing_addr, error = %e, "failing machine not destroyed");
            secondary_errors.push(e);
        }

        info!(old = %failing_host, new = %machine.address, "done auto-healing node");
        Ok(HealedNode {
            node: spec,
            secondary_errors,
        })
    }

    /// Destroy the machine behind the failing node. Returns an error message
    /// for failures other than the machine being already gone.
    async fn destroy_failing_machine(
        &self,
        node: &dyn Node,
        failing_host: &str,
        new_machine: &Machine,
    ) -> Option<String> {
        let failing = match self.ctx.iaas.find_machine(node.iaas_id(), failing_host).await {
            Ok(m) => m,
            Err(IaasError::MachineNotFound) => return None,
            Err(e) => return Some(format!("Unable to find failing machine {failing_host} in IaaS: {e}")),
        };
        if failing.id == new_machine.id {
            return None;
        }
        match self.ctx.iaas.destroy_machine(&failing).await {
            Ok(()) | Err(IaasError::MachineNotFound) => None,
            Err(e) => Some(format!("Unable to destroy machine {failing_host} from IaaS: {e}")),
        }
    }

    async fn destroy_best_effort(&self, machine: &Machine) {
        if let Err(e) = self.ctx.iaas.destroy_machine(machine).await {
            warn!(machine = %machine.id, error = %e, "failed to destroy new machine after healing failure");
        }
    }
}

fn reset_failures(node: &dyn Node) {
    if let Some(hc) = node.health_checker() {
        hc.reset_failures();
    }
}

/// Remove a node, moving its workload first when possible.
///
/// If the rebalancing removal fails, its log is reported and a plain removal
/// is attempted. A node that is already gone counts as removed.
async fn remove_node_try_rebalance(
    provisioner: &dyn NodeProvisioner,
    address: &str,
    new_address: &str,
) -> Result<(), String> {
    let mut log = Vec::new();
    let rebalanced = provisioner
        .remove_node(
            RemoveNodeOptions {
                address: address.to_string(),
                rebalance: true,
            },
            &mut log,
        )
        .await;
    match rebalanced {
        Ok(()) | Err(ProvisionError::NodeNotFound) => return Ok(()),
        Err(e) => {
            error!(
                from = %address,
                to = %new_address,
                error = %e,
                log = %String::from_utf8_lossy(&log),
                "unable to move units, skipping units healing"
            );
        }
    }

    let mut log = Vec::new();
    match provisioner
        .remove_node(
            RemoveNodeOptions {
                address: address.to_string(),
                rebalance: false,
            },
            &mut log,
        )
        .await
    {
        Ok(()) | Err(ProvisionError::NodeNotFound) => Ok(()),
        Err(e) => {
            let msg = format!("Unable to remove node {address} from provisioner: {e}");
            error!(%address, error = %e, "unable to remove node from provisioner");
            Err(msg)
        }
    }
}
