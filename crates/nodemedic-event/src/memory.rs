//! In-process event store.
//!
//! All operations take a single async mutex, which makes the
//! throttle-check + lock-check + insert sequence of `new_internal` atomic.
//! Finished events are pruned on insert once they are older than both the
//! retention period and every throttling window.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{EventError, EventResult};
use crate::store::EventStore;
use crate::types::*;

#[derive(Default)]
struct Inner {
    events: Vec<EventRecord>,
    next_id: u64,
}

/// How long finished events stay queryable by default.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Event store keeping recent events in memory.
pub struct MemoryEventStore {
    inner: Mutex<Inner>,
    throttling: Vec<ThrottlingSpec>,
    retention: Duration,
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            throttling: Vec::new(),
            retention: DEFAULT_RETENTION,
        }
    }
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a throttling rule.
    pub fn with_throttling(mut self, spec: ThrottlingSpec) -> Self {
        self.throttling.push(spec);
        self
    }

    /// Keep finished events for `retention`. Throttling windows longer than
    /// this still keep the events they count.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    fn prune(&self, inner: &mut Inner, now: DateTime<Utc>) {
        let keep_for = self
            .throttling
            .iter()
            .map(|s| s.window)
            .fold(self.retention, Duration::max);
        let Some(cutoff) = TimeDelta::from_std(keep_for)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
        else {
            return;
        };
        let before = inner.events.len();
        inner
            .events
            .retain(|e| e.finished_at.is_none_or(|finished| finished > cutoff));
        let pruned = before - inner.events.len();
        if pruned > 0 {
            debug!(pruned, "finished events pruned");
        }
    }

    /// Snapshot of every event, in creation order.
    pub async fn events(&self) -> Vec<EventRecord> {
        self.inner.lock().await.events.clone()
    }

    /// Events of a kind, in creation order.
    pub async fn events_of_kind(&self, kind: &str) -> Vec<EventRecord> {
        self.inner
            .lock()
            .await
            .events
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    fn check_throttling(&self, inner: &Inner, opts: &EventOpts, now: DateTime<Utc>) -> EventResult<()> {
        for spec in self.throttling.iter().filter(|s| s.applies_to(opts)) {
            let window = TimeDelta::from_std(spec.window).unwrap_or(TimeDelta::MAX);
            let since = now
                .checked_sub_signed(window)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            let count = inner
                .events
                .iter()
                .filter(|e| spec.counts(e, &opts.target, since))
                .count();
            if count >= spec.max {
                return Err(EventError::Throttled {
                    kind: spec.kind.clone(),
                    scope: spec.scope(&opts.target),
                    max: spec.max,
                    window_secs: spec.window.as_secs(),
                });
            }
        }
        Ok(())
    }

    fn running_mut(inner: &mut Inner, id: EventId) -> EventResult<&mut EventRecord> {
        let record = inner
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(EventError::NotFound(id))?;
        if !record.status.is_running() {
            return Err(EventError::AlreadyFinished(id));
        }
        Ok(record)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn new_internal(&self, opts: EventOpts) -> EventResult<EventId> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        self.prune(&mut inner, now);
        self.check_throttling(&inner, &opts, now)?;

        if let Some(holder) = inner
            .events
            .iter()
            .find(|e| e.status.is_running() && e.target == opts.target)
        {
            return Err(EventError::Locked {
                target: opts.target.to_string(),
                kind: holder.kind.clone(),
                holder: holder.id,
            });
        }

        inner.next_id += 1;
        let id = EventId(inner.next_id);
        debug!(%id, target = %opts.target, kind = %opts.kind, "event opened");
        inner.events.push(EventRecord {
            id,
            target: opts.target,
            extra_targets: opts.extra_targets,
            kind: opts.kind,
            start_custom_data: opts.custom_data,
            end_custom_data: None,
            allowed: opts.allowed,
            status: EventStatus::Running,
            started_at: now,
            finished_at: None,
        });
        Ok(id)
    }

    async fn abort(&self, id: EventId) -> EventResult<()> {
        let mut inner = self.inner.lock().await;
        let record = Self::running_mut(&mut inner, id)?;
        record.status = EventStatus::Aborted;
        record.finished_at = Some(Utc::now());
        debug!(%id, "event aborted");
        Ok(())
    }

    async fn done(&self, id: EventId, outcome: EventOutcome) -> EventResult<()> {
        let mut inner = self.inner.lock().await;
        let record = Self::running_mut(&mut inner, id)?;
        record.extra_targets.extend(outcome.extra_targets);
        record.end_custom_data = outcome.custom_data;
        record.status = EventStatus::Done {
            error: outcome.error,
        };
        record.finished_at = Some(Utc::now());
        debug!(%id, "event done");
        Ok(())
    }

    async fn get(&self, id: EventId) -> EventResult<EventRecord> {
        self.inner
            .lock()
            .await
            .events
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(EventError::NotFound(id))
    }
}
