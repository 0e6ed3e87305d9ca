use crate::EventBatch;
use async_trait::async_trait;

/// Push-style consumer of committed event batches (visualizers, external
/// buses). Sinks observe whole transactions, never partial patches.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_batch(&self, batch: &EventBatch);
}
