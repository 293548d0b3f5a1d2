//! redb table definitions for the nodemedic state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Node health records keyed by node address.
pub const NODE_STATUS: TableDefinition<&str, &[u8]> = TableDefinition::new("node_status");

/// Healer config entries keyed by pool name (`""` is the default scope).
pub const HEALER_CONFIG: TableDefinition<&str, &[u8]> = TableDefinition::new("healer_config");
