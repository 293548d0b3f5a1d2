use async_trait::async_trait;

use crate::error::EventResult;
use crate::types::{EventId, EventOpts, EventOutcome, EventRecord};

/// Event store used as audit log and lock service.
///
/// `new_internal` must be atomic: two concurrent calls for the same target
/// never both succeed while the first event is running.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Open a running event. Fails with `Throttled` or `Locked`.
    async fn new_internal(&self, opts: EventOpts) -> EventResult<EventId>;

    /// End an event that turned out to be a no-op, releasing its target.
    async fn abort(&self, id: EventId) -> EventResult<()>;

    /// End an event with a result, releasing its target.
    async fn done(&self, id: EventId, outcome: EventOutcome) -> EventResult<()>;

    async fn get(&self, id: EventId) -> EventResult<EventRecord>;
}
