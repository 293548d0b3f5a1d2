//! Scope-inheritable healer configuration.
//!
//! Each pool may store a partial [`HealerConfigEntry`]; the empty pool name
//! holds the default scope. Loading a pool merges its entry over the default
//! and tags every field with its provenance.

use std::collections::BTreeMap;

use redb::{ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::store::{StateStore, map_err};
use crate::tables::HEALER_CONFIG;
use crate::types::*;

/// Pool name of the default scope.
pub const DEFAULT_SCOPE: &str = "";

impl StateStore {
    /// Read the raw entry stored for a scope, without inheritance.
    pub fn get_healer_config_entry(&self, pool: &str) -> StateResult<Option<HealerConfigEntry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HEALER_CONFIG).map_err(map_err!(Table))?;
        match table.get(pool).map_err(map_err!(Read))? {
            Some(guard) => {
                let entry: HealerConfigEntry =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Load the effective config for a pool, falling back to the default scope.
    pub fn load_healer_config(&self, pool: &str) -> StateResult<HealerConfig> {
        let default = self
            .get_healer_config_entry(DEFAULT_SCOPE)?
            .unwrap_or_default();
        if pool == DEFAULT_SCOPE {
            return Ok(HealerConfig::from_default(&default));
        }
        let entry = self.get_healer_config_entry(pool)?;
        Ok(HealerConfig::resolve(&default, entry.as_ref()))
    }

    /// Load every stored scope, merged over the default.
    ///
    /// The default scope is always present in the result under
    /// [`DEFAULT_SCOPE`], even when nothing was stored for it.
    pub fn load_all_healer_configs(&self) -> StateResult<BTreeMap<String, HealerConfig>> {
        let entries = self.list_healer_config_entries()?;
        let default = entries.get(DEFAULT_SCOPE).cloned().unwrap_or_default();
        let mut all = BTreeMap::new();
        all.insert(DEFAULT_SCOPE.to_string(), HealerConfig::from_default(&default));
        for (pool, entry) in &entries {
            if pool == DEFAULT_SCOPE {
                continue;
            }
            all.insert(pool.clone(), HealerConfig::resolve(&default, Some(entry)));
        }
        Ok(all)
    }

    /// Merge the set fields of `partial` into the stored entry for `pool`.
    ///
    /// Unset fields in `partial` leave the stored values untouched.
    pub fn save_healer_config_merge(
        &self,
        pool: &str,
        partial: &HealerConfigEntry,
    ) -> StateResult<HealerConfigEntry> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let merged;
        {
            let mut table = txn.open_table(HEALER_CONFIG).map_err(map_err!(Table))?;
            let mut current: HealerConfigEntry = {
                let guard = table.get(pool).map_err(map_err!(Read))?;
                match guard {
                    Some(guard) => serde_json::from_slice(guard.value())
                        .map_err(map_err!(Deserialize))?,
                    None => HealerConfigEntry::default(),
                }
            };
            current.merge(partial);
            let value = serde_json::to_vec(&current).map_err(map_err!(Serialize))?;
            table.insert(pool, value.as_slice()).map_err(map_err!(Write))?;
            merged = current;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%pool, "healer config merged");
        Ok(merged)
    }

    /// Remove the whole entry for a scope. Returns true if it existed.
    pub fn remove_healer_config(&self, pool: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(HEALER_CONFIG).map_err(map_err!(Table))?;
            existed = table.remove(pool).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%pool, existed, "healer config removed");
        Ok(existed)
    }

    /// Clear one field of a scope's entry so it falls back to the default.
    ///
    /// A missing entry is not an error.
    pub fn remove_healer_config_field(
        &self,
        pool: &str,
        field: HealerConfigField,
    ) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(HEALER_CONFIG).map_err(map_err!(Table))?;
            let current: Option<HealerConfigEntry> = {
                let guard = table.get(pool).map_err(map_err!(Read))?;
                match guard {
                    Some(guard) => Some(
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                    ),
                    None => None,
                }
            };
            if let Some(mut entry) = current {
                entry.clear(field);
                let value = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
                table.insert(pool, value.as_slice()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%pool, %field, "healer config field removed");
        Ok(())
    }

    fn list_healer_config_entries(&self) -> StateResult<BTreeMap<String, HealerConfigEntry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HEALER_CONFIG).map_err(map_err!(Table))?;
        let mut entries = BTreeMap::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let parsed: HealerConfigEntry =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            entries.insert(key.value().to_string(), parsed);
        }
        Ok(entries)
    }
}
