//! NodeHealer: the process-wide healing service.
//!
//! Built once by the process entry point from an explicit [`HealerContext`].
//! Construction starts the active scanner; [`NodeHealer::shutdown`] stops it
//! and waits for every in-flight heal.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use nodemedic_event::EventStore;
use nodemedic_provision::{Iaas, Node, ProvisionerRegistry};
use nodemedic_state::{HealerConfig, HealerConfigEntry, NodeCheckResult, NodeHealthRecord, StateStore};

use crate::config;
use crate::error::{HealerError, HealerResult};
use crate::executor::{HealAttempt, HealedNode, HealingExecutor};
use crate::policy::HealingPolicy;
use crate::scanner::spawn_scanner;
use crate::settings::HealerSettings;
use crate::tracker::NodeStatusTracker;

/// Collaborators shared by every healer component.
#[derive(Clone)]
pub struct HealerContext {
    pub state: StateStore,
    pub registry: ProvisionerRegistry,
    pub iaas: Arc<dyn Iaas>,
    pub events: Arc<dyn EventStore>,
}

pub struct NodeHealer {
    pub(crate) ctx: HealerContext,
    pub(crate) settings: HealerSettings,
    tracker: NodeStatusTracker,
    policy: Arc<HealingPolicy>,
    pub(crate) executor: Arc<HealingExecutor>,
    /// Reactive and manual heals in flight.
    pub(crate) tasks: TaskTracker,
    shutdown_tx: watch::Sender<bool>,
    scanner: Mutex<Option<JoinHandle<()>>>,
}

impl NodeHealer {
    /// Create the healer and, unless turned off, start active healing with an
    /// immediate first scan. Must be called within a tokio runtime.
    pub fn new(ctx: HealerContext, settings: HealerSettings) -> Self {
        Self::with_start_time(ctx, settings, Utc::now())
    }

    /// Like [`new`](Self::new), with the policy's observation start set to `started`.
    pub fn with_start_time(ctx: HealerContext, settings: HealerSettings, started: DateTime<Utc>) -> Self {
        let tracker = NodeStatusTracker::new(ctx.state.clone(), ctx.registry.clone());
        let policy = Arc::new(HealingPolicy::with_started_at(ctx.state.clone(), started));
        let executor = Arc::new(HealingExecutor::new(
            ctx.clone(),
            Arc::clone(&policy),
            tracker.clone(),
            settings.wait_new_machine,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scanner = settings.active_healing.then(|| {
            spawn_scanner(
                Arc::clone(&policy),
                Arc::clone(&executor),
                ctx.registry.clone(),
                settings.active_interval,
                shutdown_rx,
            )
        });

        info!(
            failures_before_healing = settings.failures_before_healing,
            disabled_time = ?settings.disabled_time,
            wait_new_machine = ?settings.wait_new_machine,
            active_healing = settings.active_healing,
            "node healer started"
        );

        Self {
            ctx,
            settings,
            tracker,
            policy,
            executor,
            tasks: TaskTracker::new(),
            shutdown_tx,
            scanner: Mutex::new(scanner),
        }
    }

    pub fn settings(&self) -> &HealerSettings {
        &self.settings
    }

    pub fn policy(&self) -> &HealingPolicy {
        &self.policy
    }

    pub fn executor(&self) -> &HealingExecutor {
        &self.executor
    }

    // ── Health signals ─────────────────────────────────────────────

    pub async fn update_node_data(
        &self,
        addresses: &[String],
        checks: Vec<NodeCheckResult>,
    ) -> HealerResult<NodeHealthRecord> {
        self.tracker.update_node_data(addresses, checks).await
    }

    pub fn node_status(&self, address: &str) -> HealerResult<NodeHealthRecord> {
        self.tracker.node_status(address)
    }

    pub fn remove_node(&self, address: &str) -> HealerResult<()> {
        self.tracker.remove_node(address)
    }

    // ── Config ─────────────────────────────────────────────────────

    pub fn update_config(&self, pool: &str, entry: &HealerConfigEntry) -> HealerResult<HealerConfigEntry> {
        config::update_config(&self.ctx.state, pool, entry)
    }

    pub fn remove_config(&self, pool: &str, field: Option<&str>) -> HealerResult<()> {
        config::remove_config(&self.ctx.state, pool, field)
    }

    pub fn get_config(&self) -> HealerResult<BTreeMap<String, HealerConfig>> {
        config::get_config(&self.ctx.state)
    }

    // ── Healing ────────────────────────────────────────────────────

    /// Heal a node now, without re-checking whether it qualifies.
    ///
    /// Locking and throttling still apply. The attempt runs on its own task:
    /// dropping the returned future does not stop it, and its event is
    /// always finished.
    pub async fn heal_node_now(&self, node: Arc<dyn Node>, reason: &str) -> HealerResult<Option<HealedNode>> {
        if self.tasks.is_closed() {
            return Err(HealerError::ShutDown);
        }
        let attempt = HealAttempt::new(reason).manual();
        let executor = Arc::clone(&self.executor);
        self.tasks
            .spawn(async move { executor.try_healing_node(node, attempt).await })
            .await?
    }

    /// Stop active healing after its current scan, then wait for in-flight heals.
    pub async fn shutdown(&self) -> HealerResult<()> {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.scanner.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "active healing task failed");
            }
        }
        self.tasks.close();
        self.tasks.wait().await;
        info!("node healer stopped");
        Ok(())
    }
}
