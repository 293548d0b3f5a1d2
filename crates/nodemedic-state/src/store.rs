//! StateStore: redb-backed persistence for the node healer.
//!
//! Provides typed operations over node health records. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).
//!
//! Healer config operations live in [`crate::scoped`].

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

pub(crate) use map_err;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    pub(crate) db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODE_STATUS).map_err(map_err!(Table))?;
        txn.open_table(HEALER_CONFIG).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Node status ────────────────────────────────────────────────

    /// Upsert the record for `address` and append a check batch.
    ///
    /// Runs in a single write transaction: the record is created on first
    /// use, `last_update`/`last_success` are refreshed from the batch, and
    /// the history is trimmed to [`MAX_CHECK_HISTORY`] entries.
    pub fn push_node_checks(
        &self,
        address: &str,
        batch: NodeChecks,
    ) -> StateResult<NodeHealthRecord> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record;
        {
            let mut table = txn.open_table(NODE_STATUS).map_err(map_err!(Table))?;
            let existing: Option<NodeHealthRecord> = {
                let guard = table.get(address).map_err(map_err!(Read))?;
                match guard {
                    Some(guard) => Some(
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                    ),
                    None => None,
                }
            };
            let mut current =
                existing.unwrap_or_else(|| NodeHealthRecord::new(address, batch.time));
            current.push_checks(batch);
            let value = serde_json::to_vec(&current).map_err(map_err!(Serialize))?;
            table
                .insert(address, value.as_slice())
                .map_err(map_err!(Write))?;
            record = current;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%address, checks = record.checks.len(), "node checks stored");
        Ok(record)
    }

    /// Insert or replace a full health record.
    pub fn put_node_status(&self, record: &NodeHealthRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODE_STATUS).map_err(map_err!(Table))?;
            table
                .insert(record.address.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get the health record for a node address.
    pub fn get_node_status(&self, address: &str) -> StateResult<Option<NodeHealthRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODE_STATUS).map_err(map_err!(Table))?;
        match table.get(address).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: NodeHealthRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Get the records that exist for any of the given addresses.
    ///
    /// Duplicate addresses yield a single record.
    pub fn find_node_statuses(&self, addresses: &[String]) -> StateResult<Vec<NodeHealthRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODE_STATUS).map_err(map_err!(Table))?;
        let mut results: Vec<NodeHealthRecord> = Vec::new();
        for address in addresses {
            if results.iter().any(|r| &r.address == address) {
                continue;
            }
            if let Some(guard) = table.get(address.as_str()).map_err(map_err!(Read))? {
                let record: NodeHealthRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    /// List every stored health record.
    pub fn list_node_statuses(&self) -> StateResult<Vec<NodeHealthRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODE_STATUS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: NodeHealthRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Delete the record for a node address. Returns true if it existed.
    pub fn delete_node_status(&self, address: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(NODE_STATUS).map_err(map_err!(Table))?;
            existed = table.remove(address).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%address, existed, "node status deleted");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn batch(at: DateTime<Utc>, name: &str, ok: bool) -> NodeChecks {
        NodeChecks {
            time: at,
            checks: vec![NodeCheckResult::new(name, ok)],
        }
    }

    #[test]
    fn push_creates_record_on_first_update() {
        let store = StateStore::open_in_memory().unwrap();
        let now = Utc::now();

        let record = store
            .push_node_checks("http://addr1:1", batch(now, "ok", true))
            .unwrap();

        assert_eq!(record.address, "http://addr1:1");
        assert_eq!(record.last_update, now);
        assert_eq!(record.last_success, Some(now));
        assert_eq!(record.checks.len(), 1);
        assert_eq!(store.get_node_status("http://addr1:1").unwrap(), Some(record));
    }

    #[test]
    fn failed_batch_keeps_previous_success() {
        let store = StateStore::open_in_memory().unwrap();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(5);

        store
            .push_node_checks("http://addr1:1", batch(t0, "ok", true))
            .unwrap();
        let record = store
            .push_node_checks("http://addr1:1", batch(t1, "bad", false))
            .unwrap();

        assert_eq!(record.last_update, t1);
        assert_eq!(record.last_success, Some(t0));
    }

    #[test]
    fn push_keeps_only_last_ten_batches() {
        let store = StateStore::open_in_memory().unwrap();
        let t0 = Utc::now();

        for i in 0..20 {
            store
                .push_node_checks(
                    "http://addr1:1",
                    batch(t0 + chrono::Duration::seconds(i), &format!("ok-{i}"), true),
                )
                .unwrap();
        }

        let record = store.get_node_status("http://addr1:1").unwrap().unwrap();
        assert_eq!(record.checks.len(), MAX_CHECK_HISTORY);
        let names: Vec<_> = record
            .checks
            .iter()
            .map(|b| b.checks[0].name.clone())
            .collect();
        let expected: Vec<_> = (10..20).map(|i| format!("ok-{i}")).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn find_returns_only_existing_records() {
        let store = StateStore::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .push_node_checks("http://addr1:1", batch(now, "ok", true))
            .unwrap();

        let found = store
            .find_node_statuses(&[
                "http://addr1:1".to_string(),
                "http://addr2:2".to_string(),
                "http://addr1:1".to_string(),
            ])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, "http://addr1:1");
    }

    #[test]
    fn delete_is_idempotent() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .push_node_checks("http://addr1:1", batch(Utc::now(), "ok", true))
            .unwrap();

        assert!(store.delete_node_status("http://addr1:1").unwrap());
        assert!(!store.delete_node_status("http://addr1:1").unwrap());
        assert!(store.get_node_status("http://addr1:1").unwrap().is_none());
    }

    #[test]
    fn put_replaces_record() {
        let store = StateStore::open_in_memory().unwrap();
        let now = Utc::now();
        let mut record = NodeHealthRecord::new("http://addr1:1", now);
        store.put_node_status(&record).unwrap();

        record.last_success = Some(now);
        store.put_node_status(&record).unwrap();

        let all = store.list_node_statuses().unwrap();
        assert_eq!(all, vec![record]);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store
                .push_node_checks("http://addr1:1", batch(Utc::now(), "ok", true))
                .unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let record = store.get_node_status("http://addr1:1").unwrap();
        assert!(record.is_some());
        assert_eq!(record.unwrap().checks.len(), 1);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_node_statuses().unwrap().is_empty());
        assert!(store.get_node_status("nope").unwrap().is_none());
        assert!(store.find_node_statuses(&["nope".to_string()]).unwrap().is_empty());
        assert!(!store.delete_node_status("nope").unwrap());
    }
}
