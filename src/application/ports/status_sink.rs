use async_trait::async_trait;

use crate::domain::status::SyncStatusEvent;

/// The UI collaborator. The engine only emits state transitions; rendering a
/// status indicator is the consumer's concern.
#[async_trait]
pub trait SyncStatusSink: Send + Sync {
    async fn emit(&self, event: SyncStatusEvent);
}

/// Sink that drops every event, for consumers that do not render status.
pub struct NullStatusSink;

#[async_trait]
impl SyncStatusSink for NullStatusSink {
    async fn emit(&self, _event: SyncStatusEvent) {}
}
