use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::application::ports::remote_api::RemoteApi;
use crate::application::ports::status_sink::SyncStatusSink;
use crate::application::services::connectivity::ConnectivityMonitor;
use crate::application::services::entity_cache::EntityCache;
use crate::domain::action::{now_millis, ActionCommand, ActionStatus, QueuedAction};
use crate::domain::status::{DrainOutcome, SyncStatusEvent};
use crate::infrastructure::store::{collections, LocalStore};
use crate::shared::error::Result;

const LAST_SYNC_KEY: &str = "last_sync_at";

/// Durable outbox for mutating operations. Every write intent is persisted
/// before any delivery attempt, survives restarts, and leaves the queue only
/// by successful delivery, terminal failure plus explicit purge, or operator
/// purge.
pub struct ActionQueue {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteApi>,
    cache: Arc<EntityCache>,
    monitor: Arc<ConnectivityMonitor>,
    sink: Arc<dyn SyncStatusSink>,
    draining: AtomicBool,
    max_retries: u32,
    retry_delay_ms: i64,
}

impl ActionQueue {
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteApi>,
        cache: Arc<EntityCache>,
        monitor: Arc<ConnectivityMonitor>,
        sink: Arc<dyn SyncStatusSink>,
        max_retries: u32,
        retry_delay_ms: i64,
    ) -> Self {
        Self {
            store,
            remote,
            cache,
            monitor,
            sink,
            draining: AtomicBool::new(false),
            max_retries,
            retry_delay_ms,
        }
    }

    /// Persists one command and, when currently online, kicks off a drain in
    /// the background. The returned id is the queue entry, not a server id.
    pub async fn enqueue(self: &Arc<Self>, command: ActionCommand, priority: i64) -> Result<String> {
        let action = QueuedAction::new(command, priority);
        let id = action.id.clone();

        self.store
            .put(collections::ACTION_QUEUE, &serde_json::to_value(&action)?)
            .await?;
        info!(action = %id, kind = %action.kind(), priority, "action enqueued");

        if self.monitor.is_online().await {
            let queue = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = queue.drain().await {
                    error!(error = %e, "drain after enqueue failed");
                }
            });
        }

        Ok(id)
    }

    /// Runs one drain pass unless another is already in progress. At most one
    /// pass runs at a time; concurrent triggers collapse into the running one.
    pub async fn drain(&self) -> Result<DrainOutcome> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("drain already in progress, skipping");
            return Ok(DrainOutcome {
                skipped: true,
                ..DrainOutcome::default()
            });
        }

        let outcome = self.drain_pass().await;
        self.draining.store(false, Ordering::Release);
        outcome
    }

    async fn drain_pass(&self) -> Result<DrainOutcome> {
        let mut outcome = DrainOutcome::default();
        let (mut eligible, unreadable) = self.load_eligible().await?;
        outcome.storage_errors += unreadable;
        if eligible.is_empty() {
            return Ok(outcome);
        }

        // Priority first, then arrival order within a priority.
        eligible.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.enqueued_at.cmp(&b.enqueued_at))
        });

        self.sink.emit(SyncStatusEvent::Syncing).await;

        for mut action in eligible {
            match self
                .remote
                .submit(action.kind(), action.command.payload_value())
                .await
            {
                Ok(response) if response.success => {
                    // Delete first; a crash between delete and cache apply
                    // only loses a cache refresh, never replays a delivery.
                    if let Err(e) = self
                        .store
                        .delete(collections::ACTION_QUEUE, &action.id)
                        .await
                    {
                        warn!(action = %action.id, error = %e, "delivered but could not dequeue");
                        outcome.storage_errors += 1;
                        continue;
                    }
                    if let Err(e) = self.cache.apply_remote_result(&action, &response).await {
                        warn!(action = %action.id, error = %e, "cache update after delivery failed");
                        outcome.storage_errors += 1;
                    }
                    outcome.processed += 1;
                }
                Ok(response) => {
                    let reason = response
                        .message
                        .unwrap_or_else(|| "rejected by remote".to_string());
                    self.note_failure(&mut action, reason, &mut outcome).await;
                }
                Err(e) if e.is_retryable() => {
                    // Every eligible action gets its attempt; when the
                    // connection is gone the rest fail fast and the bounded
                    // retry budget caps the cost.
                    self.note_failure(&mut action, e.to_string(), &mut outcome)
                        .await;
                }
                Err(e) => {
                    // Local fault (serialization, storage). The action keeps
                    // its retry budget and stays queued as-is.
                    warn!(action = %action.id, error = %e, "skipping action on local error");
                    outcome.storage_errors += 1;
                }
            }
        }

        // The pass ran to completion; stamp it even if nothing got through.
        if let Err(e) = self.record_last_sync(now_millis()).await {
            warn!(error = %e, "could not persist last sync time");
            outcome.storage_errors += 1;
        }

        if outcome.failed == 0 {
            self.sink
                .emit(SyncStatusEvent::Synced {
                    processed: outcome.processed,
                })
                .await;
        } else {
            self.sink
                .emit(SyncStatusEvent::Error {
                    processed: outcome.processed,
                    failed: outcome.failed,
                })
                .await;
        }

        info!(
            processed = outcome.processed,
            failed = outcome.failed,
            storage_errors = outcome.storage_errors,
            "drain pass finished"
        );
        Ok(outcome)
    }

    /// Applies one failed attempt to the pass outcome. A storage failure
    /// while persisting the bookkeeping affects that item only.
    async fn note_failure(
        &self,
        action: &mut QueuedAction,
        reason: String,
        outcome: &mut DrainOutcome,
    ) {
        match self.record_attempt_failure(action, reason).await {
            Ok(true) => outcome.failed += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(action = %action.id, error = %e, "could not persist retry bookkeeping");
                outcome.storage_errors += 1;
            }
        }
    }

    /// Records one failed attempt and persists the action. Returns true when
    /// the action just went terminal.
    async fn record_attempt_failure(
        &self,
        action: &mut QueuedAction,
        reason: String,
    ) -> Result<bool> {
        let terminal = action.record_failure(reason, now_millis(), self.max_retries);
        if terminal {
            warn!(
                action = %action.id,
                kind = %action.kind(),
                error = action.last_error.as_deref().unwrap_or(""),
                "action failed permanently"
            );
        }
        self.store
            .put(collections::ACTION_QUEUE, &serde_json::to_value(&*action)?)
            .await?;
        Ok(terminal)
    }

    async fn load_eligible(&self) -> Result<(Vec<QueuedAction>, u32)> {
        let mut eligible = Vec::new();
        let mut unreadable = 0;
        for raw in self.store.get_all(collections::ACTION_QUEUE).await? {
            match serde_json::from_value::<QueuedAction>(raw) {
                Ok(action) if action.is_eligible() => eligible.push(action),
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "unreadable queue entry left in place");
                    unreadable += 1;
                }
            }
        }
        Ok((eligible, unreadable))
    }

    /// Promotes Retrying actions whose delay has elapsed back to Pending.
    /// Returns how many were promoted.
    pub async fn retry_sweep(&self) -> Result<u32> {
        let now = now_millis();
        let mut promoted = 0;
        for raw in self
            .store
            .find_by_index(
                collections::ACTION_QUEUE,
                "status",
                ActionStatus::Retrying.as_str(),
            )
            .await?
        {
            let mut action: QueuedAction = match serde_json::from_value(raw) {
                Ok(action) => action,
                Err(e) => {
                    warn!(error = %e, "unreadable queue entry left in place");
                    continue;
                }
            };
            if action.promote_if_due(now, self.retry_delay_ms) {
                self.store
                    .put(collections::ACTION_QUEUE, &serde_json::to_value(&action)?)
                    .await?;
                promoted += 1;
            }
        }
        if promoted > 0 {
            debug!(promoted, "retry sweep promoted actions");
        }
        Ok(promoted)
    }

    /// Terminally failed actions, for operator review.
    pub async fn failed_actions(&self) -> Result<Vec<QueuedAction>> {
        let raws = self
            .store
            .find_by_index(
                collections::ACTION_QUEUE,
                "status",
                ActionStatus::Failed.as_str(),
            )
            .await?;
        let mut actions = Vec::with_capacity(raws.len());
        for raw in raws {
            actions.push(serde_json::from_value(raw)?);
        }
        Ok(actions)
    }

    /// Drops terminally failed actions. Explicit operator decision only.
    pub async fn purge_failed(&self) -> Result<u64> {
        let mut purged = 0;
        for action in self.failed_actions().await? {
            if self
                .store
                .delete(collections::ACTION_QUEUE, &action.id)
                .await?
            {
                purged += 1;
            }
        }
        if purged > 0 {
            info!(purged, "purged failed actions");
        }
        Ok(purged)
    }

    /// Actions still awaiting delivery (Pending or Retrying).
    pub async fn pending_count(&self) -> Result<u64> {
        let pending = self
            .store
            .count_by_index(
                collections::ACTION_QUEUE,
                "status",
                ActionStatus::Pending.as_str(),
            )
            .await?;
        let retrying = self
            .store
            .count_by_index(
                collections::ACTION_QUEUE,
                "status",
                ActionStatus::Retrying.as_str(),
            )
            .await?;
        Ok(pending + retrying)
    }

    pub async fn failed_count(&self) -> Result<u64> {
        self.store
            .count_by_index(
                collections::ACTION_QUEUE,
                "status",
                ActionStatus::Failed.as_str(),
            )
            .await
    }

    pub async fn last_sync_at(&self) -> Result<Option<i64>> {
        let record = self.store.get(collections::SETTINGS, LAST_SYNC_KEY).await?;
        Ok(record
            .as_ref()
            .and_then(|r| r.get("value"))
            .and_then(Value::as_i64))
    }

    async fn record_last_sync(&self, at: i64) -> Result<()> {
        self.store
            .put(
                collections::SETTINGS,
                &json!({"key": LAST_SYNC_KEY, "value": at}),
            )
            .await?;
        Ok(())
    }
}
