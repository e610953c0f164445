use async_trait::async_trait;
use logbatch_types::LogEvent;
use std::sync::Arc;

/// Called by a batcher after a flush leaves it with nothing pending
///
/// Invoked with none of the batcher's locks held, so it may query the
/// batcher again.
pub type IdleHook = Arc<dyn Fn() + Send + Sync>;

/// Common surface of every batching strategy
///
/// Observers hand events to a batcher and forget about them. The batcher
/// decides when accumulated events are delivered to its sink.
#[async_trait]
pub trait Batcher: Send + Sync {
    /// Accept an event, timestamped by the batcher's clock
    fn accept(&self, event: LogEvent);

    /// Events accumulated and not yet handed to the sink
    fn pending_events(&self) -> usize;

    /// True when nothing is waiting to be delivered
    fn is_idle(&self) -> bool;

    /// Deliver whatever is pending right now
    ///
    /// Returns the number of events handed to the sink.
    async fn flush(&self) -> usize;
}
