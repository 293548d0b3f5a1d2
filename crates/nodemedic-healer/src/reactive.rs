//! Reactive healing, driven by health checkers reporting failures.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use nodemedic_provision::Node;

use crate::executor::{HealAttempt, HealingExecutor};
use crate::healer::NodeHealer;

impl NodeHealer {
    /// Called by a health checker after a failed check of `node`.
    ///
    /// Heals the node once it has failed `failures_before_healing` times in a
    /// row, unless it was never reachable. Always returns the configured
    /// cooldown before the checker should call again.
    ///
    /// The heal runs on a tracked task. A caller that gives up waiting (a
    /// timeout, a dropped future) does not interrupt it.
    pub async fn handle_error(&self, node: Arc<dyn Node>) -> Duration {
        let cooldown = self.settings.disabled_time;
        if self.tasks.is_closed() {
            debug!(address = %node.address(), "node healer is shut down, ignoring failure");
            return cooldown;
        }
        let executor = Arc::clone(&self.executor);
        let threshold = self.settings.failures_before_healing;
        let task = self
            .tasks
            .spawn(async move { react_to_failure(&executor, node, threshold).await });
        if let Err(e) = task.await {
            error!(error = %e, "[node healer handle error] healing task failed");
        }
        cooldown
    }
}

async fn react_to_failure(executor: &HealingExecutor, node: Arc<dyn Node>, threshold: u32) {
    let address = node.address().to_string();
    let Some(checker) = node.health_checker() else {
        debug!(%address, "node has no health checker, healing won't run on it");
        return;
    };
    let failures = checker.failure_count();
    if failures < threshold {
        debug!(%address, failures, "waiting for more failures before healing");
        return;
    }
    if !checker.has_success() {
        debug!(%address, "node was never successfully reached, healing won't run on it");
        return;
    }

    let attempt = HealAttempt::new(format!("{failures} consecutive failures"));
    if let Err(e) = executor.try_healing_node(node, attempt).await {
        error!(%address, error = %e, "[node healer handle error] healing failed");
    }
}
