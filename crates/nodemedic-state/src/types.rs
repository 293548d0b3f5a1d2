//! Domain types for the nodemedic state store.
//!
//! These types represent the persisted health history of nodes and the
//! per-pool healer configuration. All types are serializable to/from JSON
//! for storage in redb tables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of check batches kept per node.
pub const MAX_CHECK_HISTORY: usize = 10;

// ── Health history ────────────────────────────────────────────────

/// Outcome of one named probe, as reported by an external health checker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeCheckResult {
    pub name: String,
    pub successful: bool,
}

impl NodeCheckResult {
    pub fn new(name: impl Into<String>, successful: bool) -> Self {
        Self {
            name: name.into(),
            successful,
        }
    }
}

/// One batch of probe outcomes received at the same instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeChecks {
    pub time: DateTime<Utc>,
    pub checks: Vec<NodeCheckResult>,
}

impl NodeChecks {
    /// A batch is successful only if every check in it succeeded.
    ///
    /// An empty batch counts as successful.
    pub fn is_successful(&self) -> bool {
        self.checks.iter().all(|c| c.successful)
    }
}

/// Persisted health history for a single node, keyed by its address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeHealthRecord {
    pub address: String,
    /// Most recent check batches, oldest first. Never longer than
    /// [`MAX_CHECK_HISTORY`].
    #[serde(default)]
    pub checks: Vec<NodeChecks>,
    /// Time of the last batch in which every check succeeded.
    pub last_success: Option<DateTime<Utc>>,
    /// Time of the last batch received, successful or not.
    pub last_update: DateTime<Utc>,
}

impl NodeHealthRecord {
    /// Create an empty record for a node seen for the first time.
    pub fn new(address: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            checks: Vec::new(),
            last_success: None,
            last_update: now,
        }
    }

    /// Record a new batch, evicting the oldest ones beyond the history bound.
    pub fn push_checks(&mut self, batch: NodeChecks) {
        self.last_update = batch.time;
        if batch.is_successful() {
            self.last_success = Some(batch.time);
        }
        self.checks.push(batch);
        if self.checks.len() > MAX_CHECK_HISTORY {
            let excess = self.checks.len() - MAX_CHECK_HISTORY;
            self.checks.drain(..excess);
        }
    }

    /// The most recent check batch, if any.
    pub fn last_check(&self) -> Option<&NodeChecks> {
        self.checks.last()
    }

    /// Whether this node has ever reported a fully successful batch.
    pub fn has_success(&self) -> bool {
        self.last_success.is_some()
    }
}

// ── Healer config ─────────────────────────────────────────────────

/// A stored, possibly partial, healer config for one scope.
///
/// Absent fields fall back to the default scope on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealerConfigEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Seconds without a successful check before a node is healed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_since_success: Option<u64>,
    /// Seconds without any check before a node is healed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unresponsive_time: Option<u64>,
}

impl HealerConfigEntry {
    /// Overlay every field set in `other` onto `self`.
    pub fn merge(&mut self, other: &HealerConfigEntry) {
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
        if other.max_time_since_success.is_some() {
            self.max_time_since_success = other.max_time_since_success;
        }
        if other.max_unresponsive_time.is_some() {
            self.max_unresponsive_time = other.max_unresponsive_time;
        }
    }

    /// Clear a single field.
    pub fn clear(&mut self, field: HealerConfigField) {
        match field {
            HealerConfigField::Enabled => self.enabled = None,
            HealerConfigField::MaxTimeSinceSuccess => self.max_time_since_success = None,
            HealerConfigField::MaxUnresponsiveTime => self.max_unresponsive_time = None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_none()
            && self.max_time_since_success.is_none()
            && self.max_unresponsive_time.is_none()
    }
}

/// Effective healer config for a pool, with per-field provenance.
///
/// An `*_inherited` flag is true when the pool's own entry did not set the
/// field and the value (possibly `None`) came from the default scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealerConfig {
    pub enabled: Option<bool>,
    pub max_time_since_success: Option<u64>,
    pub max_unresponsive_time: Option<u64>,
    #[serde(default)]
    pub enabled_inherited: bool,
    #[serde(default)]
    pub max_time_since_success_inherited: bool,
    #[serde(default)]
    pub max_unresponsive_time_inherited: bool,
}

impl HealerConfig {
    /// Build an effective config from a default entry and an optional pool entry.
    pub fn resolve(default: &HealerConfigEntry, pool: Option<&HealerConfigEntry>) -> Self {
        let Some(pool) = pool else {
            return Self {
                enabled: default.enabled,
                max_time_since_success: default.max_time_since_success,
                max_unresponsive_time: default.max_unresponsive_time,
                enabled_inherited: true,
                max_time_since_success_inherited: true,
                max_unresponsive_time_inherited: true,
            };
        };
        Self {
            enabled: pool.enabled.or(default.enabled),
            max_time_since_success: pool
                .max_time_since_success
                .or(default.max_time_since_success),
            max_unresponsive_time: pool.max_unresponsive_time.or(default.max_unresponsive_time),
            enabled_inherited: pool.enabled.is_none(),
            max_time_since_success_inherited: pool.max_time_since_success.is_none(),
            max_unresponsive_time_inherited: pool.max_unresponsive_time.is_none(),
        }
    }

    /// The default scope itself: nothing is inherited.
    pub fn from_default(default: &HealerConfigEntry) -> Self {
        Self {
            enabled: default.enabled,
            max_time_since_success: default.max_time_since_success,
            max_unresponsive_time: default.max_unresponsive_time,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    /// Success window, if configured with a positive value.
    pub fn success_window(&self) -> Option<Duration> {
        self.max_time_since_success
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    /// Unresponsive window, if configured with a positive value.
    pub fn unresponsive_window(&self) -> Option<Duration> {
        self.max_unresponsive_time
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

/// Addressable fields of a healer config entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealerConfigField {
    Enabled,
    MaxTimeSinceSuccess,
    MaxUnresponsiveTime,
}

impl fmt::Display for HealerConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Enabled => "enabled",
            Self::MaxTimeSinceSuccess => "max_time_since_success",
            Self::MaxUnresponsiveTime => "max_unresponsive_time",
        };
        f.write_str(name)
    }
}

impl FromStr for HealerConfigField {
    type Err = String;

    /// Accepts `max_time_since_success`, `MaxTimeSinceSuccess`, `max-time-since-success`, etc.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "enabled" => Ok(Self::Enabled),
            "maxtimesincesuccess" => Ok(Self::MaxTimeSinceSuccess),
            "maxunresponsivetime" => Ok(Self::MaxUnresponsiveTime),
            _ => Err(format!("unknown healer config field: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(at: DateTime<Utc>, results: &[bool]) -> NodeChecks {
        NodeChecks {
            time: at,
            checks: results
                .iter()
                .enumerate()
                .map(|(i, ok)| NodeCheckResult::new(format!("check-{i}"), *ok))
                .collect(),
        }
    }

    #[test]
    fn any_failure_marks_batch_unsuccessful() {
        let now = Utc::now();
        assert!(batch(now, &[true, true]).is_successful());
        assert!(!batch(now, &[true, false, true]).is_successful());
        assert!(batch(now, &[]).is_successful());
    }

    #[test]
    fn push_checks_updates_timestamps() {
        let t0 = Utc::now();
        let mut record = NodeHealthRecord::new("http://addr1:1", t0);
        assert!(!record.has_success());

        let t1 = t0 + chrono::Duration::seconds(1);
        record.push_checks(batch(t1, &[false]));
        assert_eq!(record.last_update, t1);
        assert_eq!(record.last_success, None);

        let t2 = t1 + chrono::Duration::seconds(1);
        record.push_checks(batch(t2, &[true]));
        assert_eq!(record.last_update, t2);
        assert_eq!(record.last_success, Some(t2));
    }

    #[test]
    fn history_is_bounded_most_recent_last() {
        let t0 = Utc::now();
        let mut record = NodeHealthRecord::new("http://addr1:1", t0);
        for i in 0..25 {
            record.push_checks(batch(t0 + chrono::Duration::seconds(i), &[true]));
            assert!(record.checks.len() <= MAX_CHECK_HISTORY);
        }
        assert_eq!(record.checks.len(), MAX_CHECK_HISTORY);
        assert_eq!(
            record.last_check().unwrap().time,
            t0 + chrono::Duration::seconds(24)
        );
        assert_eq!(record.checks[0].time, t0 + chrono::Duration::seconds(15));
    }

    #[test]
    fn resolve_without_pool_entry_inherits_everything() {
        let default = HealerConfigEntry {
            enabled: Some(true),
            max_unresponsive_time: Some(1),
            ..Default::default()
        };
        let cfg = HealerConfig::resolve(&default, None);
        assert_eq!(
            cfg,
            HealerConfig {
                enabled: Some(true),
                max_time_since_success: None,
                max_unresponsive_time: Some(1),
                enabled_inherited: true,
                max_time_since_success_inherited: true,
                max_unresponsive_time_inherited: true,
            }
        );
    }

    #[test]
    fn resolve_marks_explicit_fields() {
        let default = HealerConfigEntry {
            enabled: Some(true),
            max_unresponsive_time: Some(1),
            ..Default::default()
        };
        let pool = HealerConfigEntry {
            max_time_since_success: Some(2),
            max_unresponsive_time: Some(9),
            ..Default::default()
        };
        let cfg = HealerConfig::resolve(&default, Some(&pool));
        assert_eq!(cfg.enabled, Some(true));
        assert_eq!(cfg.max_time_since_success, Some(2));
        assert_eq!(cfg.max_unresponsive_time, Some(9));
        assert!(cfg.enabled_inherited);
        assert!(!cfg.max_time_since_success_inherited);
        assert!(!cfg.max_unresponsive_time_inherited);
    }

    #[test]
    fn zero_windows_are_disabled() {
        let cfg = HealerConfig {
            enabled: Some(true),
            max_time_since_success: Some(0),
            max_unresponsive_time: Some(30),
            ..Default::default()
        };
        assert_eq!(cfg.success_window(), None);
        assert_eq!(cfg.unresponsive_window(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn config_field_parsing() {
        assert_eq!("enabled".parse(), Ok(HealerConfigField::Enabled));
        assert_eq!(
            "MaxTimeSinceSuccess".parse(),
            Ok(HealerConfigField::MaxTimeSinceSuccess)
        );
        assert_eq!(
            "max_unresponsive_time".parse(),
            Ok(HealerConfigField::MaxUnresponsiveTime)
        );
        assert!("bogus".parse::<HealerConfigField>().is_err());
    }
}
