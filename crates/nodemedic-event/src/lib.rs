//! nodemedic-event: audit events that double as per-target locks.
//!
//! An event is opened against a target (a node address, a pool, ...) and
//! stays *running* until it is marked done or aborted. While an event is
//! running for a target, opening another one for the same target fails
//! with [`EventError::Locked`]; callers use this as a cross-task mutex.
//!
//! Event kinds may be throttled: a [`ThrottlingSpec`] bounds how many
//! events of a kind may start within a rolling window.
//!
//! ```text
//! EventStore
//!   ├── new_internal(opts) → EventId   [Throttled | Locked]
//!   ├── abort(id)
//!   └── done(id, outcome)
//! ```

pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{EventError, EventResult};
pub use memory::{DEFAULT_RETENTION, MemoryEventStore};
pub use store::EventStore;
pub use types::*;
