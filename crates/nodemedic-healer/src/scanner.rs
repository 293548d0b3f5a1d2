//! Active healing: periodic fleet-wide scan.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use nodemedic_provision::ProvisionerRegistry;
use nodemedic_state::NodeHealthRecord;

use crate::executor::{HealAttempt, HealingExecutor};
use crate::policy::HealingPolicy;

/// Spawn the scan loop. The first tick runs right away, then one every
/// `interval` until `shutdown` flips to true or its sender is dropped. A
/// running tick is never cut short.
pub(crate) fn spawn_scanner(
    policy: Arc<HealingPolicy>,
    executor: Arc<HealingExecutor>,
    registry: ProvisionerRegistry,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?interval, "active healing started");
        loop {
            run_active_healing(&policy, &executor, &registry).await;
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    debug!("active healing shutting down");
                    break;
                }
            }
        }
    })
}

/// One scan: heal every qualifying node, one at a time.
pub async fn run_active_healing(
    policy: &HealingPolicy,
    executor: &HealingExecutor,
    registry: &ProvisionerRegistry,
) {
    let candidates = match policy.find_nodes_for_healing(registry).await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "[node healer active] unable to find nodes for healing");
            return;
        }
    };

    for record in &candidates.records {
        let Some(node) = candidates.nodes.get(&record.address) else {
            debug!(address = %record.address, "candidate is not a registered node");
            continue;
        };
        let attempt = HealAttempt::new(healing_reason(record, Utc::now()))
            .with_last_check(record.last_check().cloned());
        if let Err(e) = executor.try_healing_node(Arc::clone(node), attempt).await {
            error!(address = %record.address, error = %e, "[node healer active] healing failed");
        }
    }
}

/// Reason like `last update 65.2s ago, last success 180.1s ago`.
pub fn healing_reason(record: &NodeHealthRecord, now: DateTime<Utc>) -> String {
    let since = |t: DateTime<Utc>| (now - t).to_std().unwrap_or_default();
    let since_success = record.last_success.map(since).unwrap_or_default();
    format!(
        "last update {:?} ago, last success {:?} ago",
        since(record.last_update),
        since_success
    )
}
