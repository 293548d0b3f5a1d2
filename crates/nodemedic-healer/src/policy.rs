//! Healing policy: decides which nodes qualify for replacement.
//!
//! A pool's effective [`HealerConfig`] yields up to two time-window
//! predicates over a node's health record:
//!
//! - no success since `now - max_time_since_success`
//! - no update since `now - max_unresponsive_time`
//!
//! A predicate is only used once the policy has been running for twice its
//! window, so nodes are never flagged before they could have reported.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use nodemedic_provision::{Node, ProvisionerRegistry};
use nodemedic_state::{DEFAULT_SCOPE, HealerConfig, NodeHealthRecord, StateResult, StateStore};

use crate::error::{HealerError, HealerResult};

/// Cutoffs a health record is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealingQuery {
    /// Match records whose last success is older than this.
    pub success_before: Option<DateTime<Utc>>,
    /// Match records whose last update is older than this.
    pub update_before: Option<DateTime<Utc>>,
}

impl HealingQuery {
    pub fn matches(&self, record: &NodeHealthRecord) -> bool {
        let Some(last_success) = record.last_success else {
            return false;
        };
        self.success_before.is_some_and(|t| last_success < t)
            || self.update_before.is_some_and(|t| record.last_update < t)
    }
}

/// Records selected for healing, plus the live nodes they refer to.
#[derive(Debug, Default)]
pub struct HealingCandidates {
    pub records: Vec<NodeHealthRecord>,
    pub nodes: HashMap<String, Arc<dyn Node>>,
}

pub struct HealingPolicy {
    state: StateStore,
    started: DateTime<Utc>,
    rotation: AtomicU64,
}

impl HealingPolicy {
    pub fn new(state: StateStore) -> Self {
        Self::with_started_at(state, Utc::now())
    }

    /// Policy that behaves as if it had been running since `started`.
    pub fn with_started_at(state: StateStore, started: DateTime<Utc>) -> Self {
        Self {
            state,
            started,
            rotation: AtomicU64::new(0),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started
    }

    /// Build the query for a config, or `None` if it matches nothing.
    pub fn query_for_config(&self, config: &HealerConfig, now: DateTime<Utc>) -> Option<HealingQuery> {
        if !config.is_enabled() {
            return None;
        }
        let query = HealingQuery {
            success_before: self.cutoff(config.success_window(), now),
            update_before: self.cutoff(config.unresponsive_window(), now),
        };
        (query.success_before.is_some() || query.update_before.is_some()).then_some(query)
    }

    fn cutoff(&self, window: Option<Duration>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let window = TimeDelta::from_std(window?).ok()?;
        let cutoff = now.checked_sub_signed(window)?;
        let observed_until = self.started.checked_add_signed(window)?;
        (observed_until < cutoff).then_some(cutoff)
    }

    /// Whether a single node currently qualifies for healing.
    pub fn should_heal_node(&self, node: &dyn Node) -> StateResult<bool> {
        let config = self.state.load_healer_config(node.pool())?;
        let Some(query) = self.query_for_config(&config, Utc::now()) else {
            return Ok(false);
        };
        Ok(self
            .state
            .get_node_status(node.address())?
            .is_some_and(|record| query.matches(&record)))
    }

    /// Every registered node that qualifies for healing under its pool's config.
    ///
    /// Pools with a stored config use it; all other pools use the default
    /// scope. The result is rotated on every call so that a node that keeps
    /// failing to heal does not always go first.
    pub async fn find_nodes_for_healing(
        &self,
        registry: &ProvisionerRegistry,
    ) -> HealerResult<HealingCandidates> {
        let all_nodes = registry.all_nodes().await.map_err(HealerError::ListNodes)?;
        let mut by_pool: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut nodes = HashMap::new();
        for node in all_nodes {
            by_pool
                .entry(node.pool().to_string())
                .or_default()
                .push(node.address().to_string());
            nodes.insert(node.address().to_string(), node);
        }

        let mut configs = self.state.load_all_healer_configs()?;
        let default = configs.remove(DEFAULT_SCOPE).unwrap_or_default();
        let now = Utc::now();
        let mut records = Vec::new();

        for (pool, config) in &configs {
            let addresses = by_pool.remove(pool).unwrap_or_default();
            if let Some(query) = self.query_for_config(config, now) {
                records.extend(self.matching_records(&addresses, &query)?);
            }
        }
        if let Some(query) = self.query_for_config(&default, now) {
            let remaining: Vec<String> = by_pool.into_values().flatten().collect();
            records.extend(self.matching_records(&remaining, &query)?);
        }

        records.sort_by(|a, b| a.address.cmp(&b.address));
        if !records.is_empty() {
            let pivot = (self.rotation.fetch_add(1, Ordering::Relaxed) + 1) % records.len() as u64;
            records.rotate_left(pivot as usize);
        }
        debug!(candidates = records.len(), nodes = nodes.len(), "nodes for healing found");
        Ok(HealingCandidates { records, nodes })
    }

    fn matching_records(
        &self,
        addresses: &[String],
        query: &HealingQuery,
    ) -> HealerResult<Vec<NodeHealthRecord>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .state
            .find_node_statuses(addresses)?
            .into_iter()
            .filter(|r| query.matches(r))
            .collect())
    }
}
