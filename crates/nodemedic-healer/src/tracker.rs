//! Health signal tracking: bounded per-node check history.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::debug;

use nodemedic_provision::ProvisionerRegistry;
use nodemedic_state::{NodeCheckResult, NodeChecks, NodeHealthRecord, StateStore};

use crate::error::{HealerError, HealerResult};

/// Records check batches reported by external health checkers.
#[derive(Clone)]
pub struct NodeStatusTracker {
    state: StateStore,
    registry: ProvisionerRegistry,
}

impl NodeStatusTracker {
    pub fn new(state: StateStore, registry: ProvisionerRegistry) -> Self {
        Self { state, registry }
    }

    /// Append a check batch to the record of the node reporting it.
    ///
    /// A reporter may know the node under several addresses; exactly one of
    /// them must identify a node.
    pub async fn update_node_data(
        &self,
        addresses: &[String],
        checks: Vec<NodeCheckResult>,
    ) -> HealerResult<NodeHealthRecord> {
        let address = self.resolve_address(addresses).await?;
        let batch = NodeChecks {
            time: Utc::now(),
            checks,
        };
        let successful = batch.is_successful();
        let record = self.state.push_node_checks(&address, batch)?;
        debug!(%address, successful, "node data updated");
        Ok(record)
    }

    /// The stored record for a node.
    pub fn node_status(&self, address: &str) -> HealerResult<NodeHealthRecord> {
        self.state
            .get_node_status(address)?
            .ok_or_else(|| HealerError::NodeNotFound(vec![address.to_string()]))
    }

    /// Forget a node. Removing an unknown node is not an error.
    pub fn remove_node(&self, address: &str) -> HealerResult<()> {
        self.state.delete_node_status(address)?;
        Ok(())
    }

    async fn resolve_address(&self, addresses: &[String]) -> HealerResult<String> {
        let candidates: BTreeSet<&String> = addresses.iter().collect();
        match candidates.len() {
            0 => return Err(HealerError::NodeNotFound(Vec::new())),
            1 => return Ok(addresses[0].clone()),
            _ => {}
        }

        let registered: Vec<String> = self
            .registry
            .all_nodes()
            .await
            .map_err(HealerError::ListNodes)?
            .iter()
            .map(|n| n.address().to_string())
            .filter(|a| candidates.contains(a))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !registered.is_empty() {
            return single(addresses, registered);
        }

        let recorded: Vec<String> = self
            .state
            .find_node_statuses(addresses)?
            .into_iter()
            .map(|r| r.address)
            .collect();
        single(addresses, recorded)
    }
}

fn single(received: &[String], mut found: Vec<String>) -> HealerResult<String> {
    match found.len() {
        0 => Err(HealerError::NodeNotFound(received.to_vec())),
        1 => Ok(found.remove(0)),
        _ => Err(HealerError::Ambiguous {
            received: received.to_vec(),
            found,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodemedic_provision::testing::{FakeNode, FakeProvisioner};
    use nodemedic_state::MAX_CHECK_HISTORY;

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn tracker_with(nodes: &[&str]) -> NodeStatusTracker {
        let p = FakeProvisioner::new("fake");
        for addr in nodes {
            p.insert_node(FakeNode::new(addr, "pool1"));
        }
        NodeStatusTracker::new(
            StateStore::open_in_memory().unwrap(),
            ProvisionerRegistry::new().with(p),
        )
    }

    #[tokio::test]
    async fn single_address_creates_record() {
        let tracker = tracker_with(&[]);
        let record = tracker
            .update_node_data(
                &addrs(&["http://addr1:1"]),
                vec![NodeCheckResult::new("ok1", true), NodeCheckResult::new("ok2", true)],
            )
            .await
            .unwrap();

        assert_eq!(record.address, "http://addr1:1");
        assert_eq!(record.last_success, Some(record.last_update));
        assert_eq!(record.checks[0].checks.len(), 2);
        assert_eq!(tracker.node_status("http://addr1:1").unwrap(), record);
    }

    #[tokio::test]
    async fn failed_check_keeps_last_success() {
        let tracker = tracker_with(&[]);
        let a = addrs(&["http://addr1:1"]);
        let first = tracker
            .update_node_data(&a, vec![NodeCheckResult::new("ok", true)])
            .await
            .unwrap();
        let second = tracker
            .update_node_data(
                &a,
                vec![NodeCheckResult::new("ok", true), NodeCheckResult::new("bad", false)],
            )
            .await
            .unwrap();

        assert_eq!(second.last_success, first.last_success);
        assert!(second.last_update >= first.last_update);
        assert_eq!(second.checks.len(), 2);
    }

    #[tokio::test]
    async fn history_never_exceeds_ten() {
        let tracker = tracker_with(&[]);
        let a = addrs(&["http://addr1:1"]);
        for i in 0..15 {
            let record = tracker
                .update_node_data(&a, vec![NodeCheckResult::new(format!("check-{i}"), true)])
                .await
                .unwrap();
            assert_eq!(record.checks.len(), (i + 1).min(MAX_CHECK_HISTORY));
        }
        let record = tracker.node_status("http://addr1:1").unwrap();
        assert_eq!(record.checks.last().unwrap().checks[0].name, "check-14");
        assert_eq!(record.checks[0].checks[0].name, "check-5");
    }

    #[tokio::test]
    async fn resolves_through_registered_nodes() {
        let tracker = tracker_with(&["http://addr2:2"]);
        let record = tracker
            .update_node_data(
                &addrs(&["http://addr1:1", "http://addr2:2", "http://addr3:3"]),
                vec![NodeCheckResult::new("ok", true)],
            )
            .await
            .unwrap();
        assert_eq!(record.address, "http://addr2:2");
    }

    #[tokio::test]
    async fn falls_back_to_existing_records() {
        let tracker = tracker_with(&[]);
        tracker
            .update_node_data(&addrs(&["http://addr3:3"]), vec![])
            .await
            .unwrap();

        let record = tracker
            .update_node_data(&addrs(&["http://addr1:1", "http://addr3:3"]), vec![])
            .await
            .unwrap();
        assert_eq!(record.address, "http://addr3:3");
        assert_eq!(record.checks.len(), 2);
    }

    #[tokio::test]
    async fn unresolvable_addresses_fail() {
        let tracker = tracker_with(&["http://addr1:1", "http://addr2:2"]);

        let err = tracker
            .update_node_data(&addrs(&["http://x:1", "http://y:2"]), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, HealerError::NodeNotFound(_)));

        let err = tracker
            .update_node_data(&addrs(&["http://addr1:1", "http://addr2:2"]), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, HealerError::Ambiguous { .. }));

        let err = tracker.update_node_data(&[], vec![]).await.unwrap_err();
        assert!(matches!(err, HealerError::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let tracker = tracker_with(&[]);
        tracker
            .update_node_data(&addrs(&["http://addr1:1"]), vec![])
            .await
            .unwrap();

        tracker.remove_node("http://addr1:1").unwrap();
        tracker.remove_node("http://addr1:1").unwrap();
        assert!(matches!(
            tracker.node_status("http://addr1:1").unwrap_err(),
            HealerError::NodeNotFound(_)
        ));
    }
}
