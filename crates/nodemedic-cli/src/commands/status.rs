use std::path::Path;

use anyhow::Context;

use super::open_store;

pub fn show(data_dir: &Path, address: &str) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let record = store
        .get_node_status(address)?
        .with_context(|| format!("no health data for node {address}"))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub fn list(data_dir: &Path) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    let records = store.list_node_statuses()?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

pub fn remove(data_dir: &Path, address: &str) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    if store.delete_node_status(address)? {
        println!("✓ Removed health data for {address}");
    } else {
        println!("No health data for {address}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nodemedic_state::NodeHealthRecord;

    #[test]
    fn show_missing_node_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = show(dir.path(), "http://addr1:2375").unwrap_err();
        assert!(err.to_string().contains("no health data"));
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(dir.path()).unwrap();
            store
                .put_node_status(&NodeHealthRecord::new("http://addr1:2375", Utc::now()))
                .unwrap();
        }
        show(dir.path(), "http://addr1:2375").unwrap();
        list(dir.path()).unwrap();
        remove(dir.path(), "http://addr1:2375").unwrap();
        remove(dir.path(), "http://addr1:2375").unwrap();
        assert!(show(dir.path(), "http://addr1:2375").is_err());
    }
}
