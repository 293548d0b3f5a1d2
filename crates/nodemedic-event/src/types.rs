//! Event records and the options used to open them.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of entity an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Node,
    Pool,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => f.write_str("node"),
            Self::Pool => f.write_str("pool"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub target_type: TargetType,
    pub value: String,
}

impl Target {
    pub fn node(address: impl Into<String>) -> Self {
        Self {
            target_type: TargetType::Node,
            value: address.into(),
        }
    }

    pub fn pool(name: impl Into<String>) -> Self {
        Self {
            target_type: TargetType::Pool,
            value: name.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.target_type, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

/// Permission required to read an event, scoped to a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowed {
    pub permission: String,
    pub context: Target,
}

/// Options for opening an internal (system-initiated) event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventOpts {
    /// The locked target.
    pub target: Target,
    /// Additional targets the event is indexed under; never locked.
    #[serde(default)]
    pub extra_targets: Vec<Target>,
    pub kind: String,
    #[serde(default)]
    pub custom_data: serde_json::Value,
    pub allowed: Option<Allowed>,
}

/// How an event ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventOutcome {
    pub error: Option<String>,
    pub custom_data: Option<serde_json::Value>,
    /// Targets appended to the event's extra targets.
    #[serde(default)]
    pub extra_targets: Vec<Target>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EventStatus {
    Running,
    Done { error: Option<String> },
    Aborted,
}

impl EventStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub target: Target,
    pub extra_targets: Vec<Target>,
    pub kind: String,
    pub start_custom_data: serde_json::Value,
    pub end_custom_data: Option<serde_json::Value>,
    pub allowed: Option<Allowed>,
    pub status: EventStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Limit on the number of events of one kind within a rolling window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottlingSpec {
    pub target_type: TargetType,
    pub kind: String,
    pub max: usize,
    pub window: Duration,
    /// Count events for every target of the type together, instead of per target.
    pub all_targets: bool,
}

impl ThrottlingSpec {
    /// Whether this rule governs events opened with `opts`.
    pub fn applies_to(&self, opts: &EventOpts) -> bool {
        self.kind == opts.kind && self.target_type == opts.target.target_type
    }

    /// Whether a past event counts toward this rule's limit for `target`.
    pub fn counts(&self, record: &EventRecord, target: &Target, since: DateTime<Utc>) -> bool {
        record.kind == self.kind
            && record.target.target_type == self.target_type
            && (self.all_targets || record.target.value == target.value)
            && record.status != EventStatus::Aborted
            && record.started_at > since
    }

    /// Human readable scope used in throttling errors.
    pub fn scope(&self, target: &Target) -> String {
        if self.all_targets {
            format!("any {}", self.target_type)
        } else {
            format!("{} {:?}", self.target_type, target.value)
        }
    }
}
