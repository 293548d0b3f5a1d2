//! nodemedic-state: embedded state store for the node healer.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for node health records and the scope-inheritable healer
//! configuration.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Health records are keyed by node address; healer config entries are keyed
//! by pool name, with the empty string holding the default scope.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod scoped;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use scoped::DEFAULT_SCOPE;
pub use store::StateStore;
pub use types::*;
