use async_trait::async_trait;
use tracing::{info, warn};

use crate::application::ports::status_sink::SyncStatusSink;
use crate::domain::status::SyncStatusEvent;

/// Default sink for headless consumers: status transitions go to the log.
pub struct LogStatusSink;

#[async_trait]
impl SyncStatusSink for LogStatusSink {
    async fn emit(&self, event: SyncStatusEvent) {
        match event {
            SyncStatusEvent::Offline => info!("sync status: offline"),
            SyncStatusEvent::Syncing => info!("sync status: syncing"),
            SyncStatusEvent::Synced { processed } => {
                info!(processed, "sync status: synced");
            }
            SyncStatusEvent::Error { processed, failed } => {
                warn!(processed, failed, "sync status: error");
            }
        }
    }
}
