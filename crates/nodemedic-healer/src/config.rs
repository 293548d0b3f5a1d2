//! Per-pool healer config entry points.

use std::collections::BTreeMap;

use tracing::info;

use nodemedic_state::{HealerConfig, HealerConfigEntry, HealerConfigField, StateStore};

use crate::error::{HealerError, HealerResult};

/// Merge the fields set in `entry` into the config of `pool`.
///
/// Use [`DEFAULT_SCOPE`](nodemedic_state::DEFAULT_SCOPE) for the default config.
pub fn update_config(
    state: &StateStore,
    pool: &str,
    entry: &HealerConfigEntry,
) -> HealerResult<HealerConfigEntry> {
    let merged = state.save_healer_config_merge(pool, entry)?;
    info!(%pool, "healer config updated");
    Ok(merged)
}

/// Remove a pool's config, or only one of its fields when `field` is given.
pub fn remove_config(state: &StateStore, pool: &str, field: Option<&str>) -> HealerResult<()> {
    match field.filter(|f| !f.is_empty()) {
        None => {
            state.remove_healer_config(pool)?;
            info!(%pool, "healer config removed");
        }
        Some(name) => {
            let field: HealerConfigField = name
                .parse()
                .map_err(|_| HealerError::UnknownConfigField(name.to_string()))?;
            state.remove_healer_config_field(pool, field)?;
            info!(%pool, %field, "healer config field removed");
        }
    }
    Ok(())
}

/// Effective config of every stored scope, with provenance flags.
pub fn get_config(state: &StateStore) -> HealerResult<BTreeMap<String, HealerConfig>> {
    Ok(state.load_all_healer_configs()?)
}
