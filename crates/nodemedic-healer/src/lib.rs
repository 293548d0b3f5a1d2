//! nodemedic-healer: detects unhealthy nodes and replaces them.
//!
//! Health checkers feed check batches into the tracker and report repeated
//! failures to the reactive trigger. Independently, the active scanner
//! re-evaluates the whole fleet on a timer. Both paths end in the executor,
//! which replaces a node under a healing event that locks its address.
//!
//! # Architecture
//!
//! ```text
//! NodeHealer
//!   ├── NodeStatusTracker   (bounded check history per node)
//!   ├── HealingPolicy       (per-pool windows, fleet query)
//!   ├── HealingExecutor     (create → disable → add → remove → destroy)
//!   ├── handle_error()      (reactive trigger)
//!   └── scanner task        (active healing every `active_interval`)
//! ```
//!
//! All collaborators come in through [`HealerContext`]; nothing is global.

pub mod config;
pub mod error;
pub mod executor;
pub mod healer;
pub mod policy;
pub mod reactive;
pub mod scanner;
pub mod settings;
pub mod tracker;

/// Event kind of healing events.
pub const HEALER_EVENT_KIND: &str = "healer";

pub use error::{HealStep, HealerError, HealerResult};
pub use executor::{HealAttempt, HealedNode, HealingEventData, HealingExecutor};
pub use healer::{HealerContext, NodeHealer};
pub use policy::{HealingCandidates, HealingPolicy, HealingQuery};
pub use settings::{HealerSettings, parse_duration};
pub use tracker::NodeStatusTracker;
