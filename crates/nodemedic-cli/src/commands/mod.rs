pub mod config;
pub mod settings;
pub mod status;

use std::path::Path;

use anyhow::Context;
use nodemedic_state::StateStore;
use tracing::debug;

const STATE_FILE: &str = "nodemedic.redb";

/// Open the state file under `data_dir`, creating the directory if needed.
pub fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let path = data_dir.join(STATE_FILE);
    debug!(path = %path.display(), "opening state file");
    StateStore::open(&path).with_context(|| format!("opening state file {}", path.display()))
}
