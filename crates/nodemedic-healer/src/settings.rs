//! Healer runtime settings, read from the `[healer]` table of a TOML file.
//!
//! ```toml
//! [healer]
//! failures_before_healing = 5
//! disabled_time = "30s"
//! wait_new_machine = "5m"
//! active_interval = "30s"
//! active_healing = true
//!
//! [healer.throttling]
//! max = 3
//! window = "5m"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nodemedic_event::{TargetType, ThrottlingSpec};

use crate::HEALER_EVENT_KIND;
use crate::error::{HealerError, HealerResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    pub healer: Option<HealerSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealerSection {
    pub failures_before_healing: Option<u32>,
    pub disabled_time: Option<String>,
    pub wait_new_machine: Option<String>,
    pub active_interval: Option<String>,
    pub active_healing: Option<bool>,
    pub throttling: Option<ThrottlingSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottlingSection {
    pub max: Option<usize>,
    pub window: Option<String>,
}

/// Resolved healer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealerSettings {
    /// Consecutive failures before a reactive heal is attempted.
    pub failures_before_healing: u32,
    /// Cooldown returned to health checkers by the reactive trigger.
    pub disabled_time: Duration,
    /// How long to wait for a replacement node to become ready.
    pub wait_new_machine: Duration,
    /// Period of the active scanner.
    pub active_interval: Duration,
    /// Run the active scanner. When false only reactive and manual heals happen.
    pub active_healing: bool,
    pub throttle_max: usize,
    pub throttle_window: Duration,
}

impl Default for HealerSettings {
    fn default() -> Self {
        Self {
            failures_before_healing: 5,
            disabled_time: Duration::from_secs(30),
            wait_new_machine: Duration::from_secs(5 * 60),
            active_interval: Duration::from_secs(30),
            active_healing: true,
            throttle_max: 3,
            throttle_window: Duration::from_secs(5 * 60),
        }
    }
}

impl HealerSettings {
    pub fn from_file(path: &Path) -> HealerResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HealerError::Settings(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse settings, filling unset fields with defaults.
    pub fn from_toml_str(content: &str) -> HealerResult<Self> {
        let file: SettingsFile =
            toml::from_str(content).map_err(|e| HealerError::Settings(e.to_string()))?;
        Self::from_section(file.healer.unwrap_or_default())
    }

    pub fn from_section(section: HealerSection) -> HealerResult<Self> {
        let defaults = Self::default();
        let throttling = section.throttling.unwrap_or_default();
        let settings = Self {
            failures_before_healing: section
                .failures_before_healing
                .unwrap_or(defaults.failures_before_healing),
            disabled_time: duration_or("disabled_time", section.disabled_time, defaults.disabled_time)?,
            wait_new_machine: duration_or(
                "wait_new_machine",
                section.wait_new_machine,
                defaults.wait_new_machine,
            )?,
            active_interval: duration_or(
                "active_interval",
                section.active_interval,
                defaults.active_interval,
            )?,
            active_healing: section.active_healing.unwrap_or(defaults.active_healing),
            throttle_max: throttling.max.unwrap_or(defaults.throttle_max),
            throttle_window: duration_or("throttling.window", throttling.window, defaults.throttle_window)?,
        };
        if settings.active_interval.is_zero() {
            return Err(HealerError::Settings("active_interval must be positive".into()));
        }
        Ok(settings)
    }

    /// Throttling rule for healing events: at most `throttle_max` per
    /// `throttle_window`, counted across every node.
    pub fn throttling_spec(&self) -> ThrottlingSpec {
        ThrottlingSpec {
            target_type: TargetType::Node,
            kind: HEALER_EVENT_KIND.to_string(),
            max: self.throttle_max,
            window: self.throttle_window,
            all_targets: true,
        }
    }
}

fn duration_or(field: &str, value: Option<String>, default: Duration) -> HealerResult<Duration> {
    match value {
        None => Ok(default),
        Some(s) => parse_duration(&s)
            .ok_or_else(|| HealerError::Settings(format!("{field}: invalid duration {s:?}"))),
    }
}

/// Parse a duration string like "5s", "500ms", "2m", "1h".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok()?.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let settings = HealerSettings::from_toml_str("").unwrap();
        assert_eq!(settings, HealerSettings::default());
        assert_eq!(settings.failures_before_healing, 5);
        assert_eq!(settings.wait_new_machine, Duration::from_secs(300));
    }

    #[test]
    fn parse_full_section() {
        let toml_str = r#"
[healer]
failures_before_healing = 1
disabled_time = "500ms"
wait_new_machine = "2m"
active_interval = "10s"

[healer.throttling]
max = 7
window = "1h"
"#;
        let settings = HealerSettings::from_toml_str(toml_str).unwrap();
        assert_eq!(settings.failures_before_healing, 1);
        assert_eq!(settings.disabled_time, Duration::from_millis(500));
        assert_eq!(settings.wait_new_machine, Duration::from_secs(120));
        assert_eq!(settings.active_interval, Duration::from_secs(10));
        assert_eq!(settings.throttle_max, 7);
        assert_eq!(settings.throttle_window, Duration::from_secs(3600));

        let spec = settings.throttling_spec();
        assert_eq!(spec.kind, "healer");
        assert!(spec.all_targets);
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let err = HealerSettings::from_toml_str("[healer]\ndisabled_time = \"soon\"").unwrap_err();
        assert!(err.to_string().contains("disabled_time"));

        let err = HealerSettings::from_toml_str("[healer]\nactive_interval = \"0s\"").unwrap_err();
        assert!(err.to_string().contains("active_interval"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodemedic.toml");
        std::fs::write(&path, "[healer]\nfailures_before_healing = 2\n").unwrap();

        let settings = HealerSettings::from_file(&path).unwrap();
        assert_eq!(settings.failures_before_healing, 2);
        assert!(HealerSettings::from_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("abc"), None);
    }

    #[test]
    fn oversized_durations_are_rejected() {
        assert_eq!(parse_duration("18446744073709551615m"), None);
        assert_eq!(parse_duration("18446744073709551615h"), None);
        assert_eq!(parse_duration("5124095576030432h"), None);
        assert!(parse_duration("5124095576030431h").is_some());

        let err =
            HealerSettings::from_toml_str("[healer]\nwait_new_machine = \"18446744073709551615h\"")
                .unwrap_err();
        assert!(err.to_string().contains("wait_new_machine"));
    }

    #[test]
    fn active_healing_can_be_turned_off() {
        assert!(HealerSettings::default().active_healing);
        let settings = HealerSettings::from_toml_str("[healer]\nactive_healing = false").unwrap();
        assert!(!settings.active_healing);
    }
}
