use std::path::Path;

use nodemedic_healer::config;
use nodemedic_state::HealerConfigEntry;
use tracing::info;

use super::open_store;

pub fn show(data_dir: &Path) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let all = config::get_config(&store)?;
    println!("{}", serde_json::to_string_pretty(&all)?);
    Ok(())
}

pub fn set(data_dir: &Path, pool: &str, entry: HealerConfigEntry) -> anyhow::Result<()> {
    if entry.is_empty() {
        anyhow::bail!("nothing to set: pass --enabled, --max-time-since-success or --max-unresponsive-time");
    }
    let store = open_store(data_dir)?;
    let merged = config::update_config(&store, pool, &entry)?;
    info!(scope = %describe(pool, None), "healer config set");
    println!("{}", serde_json::to_string_pretty(&merged)?);
    Ok(())
}

pub fn unset(data_dir: &Path, pool: &str, field: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    config::remove_config(&store, pool, field)?;
    info!(removed = %describe(pool, field), "healer config unset");
    println!("✓ Removed {}", describe(pool, field));
    Ok(())
}

fn describe(pool: &str, field: Option<&str>) -> String {
    let scope = if pool.is_empty() {
        "default config".to_string()
    } else {
        format!("config of pool {pool:?}")
    };
    match field.filter(|f| !f.is_empty()) {
        Some(f) => format!("{f} from {scope}"),
        None => scope,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_unset_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        set(
            dir.path(),
            "pool1",
            HealerConfigEntry {
                enabled: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        let store = open_store(dir.path()).unwrap();
        let all = config::get_config(&store).unwrap();
        assert_eq!(all["pool1"].enabled, Some(true));
        drop(store);

        unset(dir.path(), "pool1", Some("enabled")).unwrap();
        let store = open_store(dir.path()).unwrap();
        let all = config::get_config(&store).unwrap();
        assert_eq!(all["pool1"].enabled, None);
        assert!(all["pool1"].enabled_inherited);
    }

    #[test]
    fn set_requires_a_field() {
        let dir = tempfile::tempdir().unwrap();
        assert!(set(dir.path(), "pool1", HealerConfigEntry::default()).is_err());
    }

    #[test]
    fn unknown_field_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = unset(dir.path(), "pool1", Some("bogus")).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn describes_scope() {
        assert_eq!(describe("", None), "default config");
        assert_eq!(describe("p", Some("enabled")), "enabled from config of pool \"p\"");
    }
}
