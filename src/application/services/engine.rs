use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::ports::remote_api::RemoteApi;
use crate::application::ports::status_sink::SyncStatusSink;
use crate::application::services::action_queue::ActionQueue;
use crate::application::services::connectivity::ConnectivityMonitor;
use crate::application::services::entity_cache::EntityCache;
use crate::application::services::form_drafts::FormDraftManager;
use crate::domain::connectivity::ConnectivityEvent;
use crate::domain::status::{SyncStats, SyncStatusEvent};
use crate::infrastructure::database::{Database, DbPool};
use crate::infrastructure::store::LocalStore;
use crate::shared::config::AppConfig;
use crate::shared::error::Result;

/// Visit codes cached this long ago are dropped by the maintenance tick.
const CODE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3600);

/// Composition root: owns the store and every service, and runs the three
/// background loops (reachability probe, periodic drain, retry sweep) plus
/// the connectivity subscription that triggers a drain on reconnect.
pub struct SyncEngine {
    config: AppConfig,
    store: Arc<LocalStore>,
    monitor: Arc<ConnectivityMonitor>,
    queue: Arc<ActionQueue>,
    cache: Arc<EntityCache>,
    drafts: Arc<FormDraftManager>,
    sink: Arc<dyn SyncStatusSink>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    pub async fn new(
        config: AppConfig,
        remote: Arc<dyn RemoteApi>,
        sink: Arc<dyn SyncStatusSink>,
    ) -> Result<Self> {
        let pool = Database::initialize(&config.database.url, config.database.max_connections)
            .await?;
        Ok(Self::from_pool(config, pool, remote, sink))
    }

    /// Wires the services onto an already migrated pool.
    pub fn from_pool(
        config: AppConfig,
        pool: DbPool,
        remote: Arc<dyn RemoteApi>,
        sink: Arc<dyn SyncStatusSink>,
    ) -> Self {
        let store = Arc::new(LocalStore::new(pool));
        let cache = Arc::new(EntityCache::new(
            Arc::clone(&store),
            config.sync.search_limit,
        ));
        let monitor = Arc::new(ConnectivityMonitor::new(
            Arc::clone(&remote),
            config.sync.history_limit,
        ));
        let queue = Arc::new(ActionQueue::new(
            Arc::clone(&store),
            remote,
            Arc::clone(&cache),
            Arc::clone(&monitor),
            Arc::clone(&sink),
            config.sync.max_retries,
            (config.sync.retry_delay_secs * 1000) as i64,
        ));
        let drafts = Arc::new(FormDraftManager::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&monitor),
            Duration::from_secs(config.drafts.debounce_secs),
            Duration::from_secs(config.drafts.restore_window_secs),
        ));

        Self {
            config,
            store,
            monitor,
            queue,
            cache,
            drafts,
            sink,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the background loops. Idempotent only in the sense that calling
    /// it twice doubles the loops; call it once.
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;

        tasks.push(
            self.monitor
                .spawn_probe_loop(Duration::from_secs(self.config.sync.probe_interval_secs)),
        );

        // Safety net drain: catches anything the event-driven triggers missed.
        let engine = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(engine.config.sync.drain_interval_secs));
            ticker.tick().await; // immediate first tick is not a drain trigger
            loop {
                ticker.tick().await;
                if engine.monitor.is_online().await {
                    if let Err(e) = engine.queue.drain().await {
                        error!(error = %e, "periodic drain failed");
                    }
                }
                if let Err(e) = engine.cache.prune_stale_codes(CODE_MAX_AGE.as_millis() as i64).await
                {
                    error!(error = %e, "stale code prune failed");
                }
            }
        }));

        let engine = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(
                engine.config.sync.retry_sweep_interval_secs,
            ));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match engine.queue.retry_sweep().await {
                    Ok(promoted) if promoted > 0 && engine.monitor.is_online().await => {
                        if let Err(e) = engine.queue.drain().await {
                            error!(error = %e, "drain after retry sweep failed");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "retry sweep failed"),
                }
            }
        }));

        let engine = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let mut events = engine.monitor.subscribe();
            loop {
                match events.recv().await {
                    Ok(ConnectivityEvent::Online) => {
                        info!("back online, draining queue");
                        if let Err(e) = engine.queue.drain().await {
                            error!(error = %e, "drain on reconnect failed");
                        }
                    }
                    Ok(ConnectivityEvent::Offline) => {
                        engine.sink.emit(SyncStatusEvent::Offline).await;
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }));

        info!("sync engine started");
    }

    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("sync engine stopped");
    }

    pub async fn stats(&self) -> Result<SyncStats> {
        let (cached_visitors, cached_vehicles, cached_codes) = self.cache.counts().await?;
        Ok(SyncStats {
            is_online: self.monitor.is_online().await,
            pending_actions: self.queue.pending_count().await?,
            failed_actions: self.queue.failed_count().await?,
            cached_visitors,
            cached_vehicles,
            cached_codes,
            last_sync_at: self.queue.last_sync_at().await?,
            storage_bytes: self.store.estimate_usage().await?,
        })
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn queue(&self) -> &Arc<ActionQueue> {
        &self.queue
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub fn drafts(&self) -> &Arc<FormDraftManager> {
        &self.drafts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::remote_api::RemoteResponse;
    use crate::application::ports::status_sink::NullStatusSink;
    use crate::domain::action::{ActionCommand, ActionKind};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ToggleRemote {
        online: AtomicBool,
    }

    #[async_trait]
    impl RemoteApi for ToggleRemote {
        async fn submit(&self, _kind: ActionKind, _payload: Value) -> Result<RemoteResponse> {
            if self.online.load(Ordering::Acquire) {
                Ok(RemoteResponse::from_value(json!({"success": true})))
            } else {
                Err(crate::shared::error::AppError::Network("unreachable".into()))
            }
        }

        async fn probe(&self) -> bool {
            self.online.load(Ordering::Acquire)
        }
    }

    async fn setup_engine() -> (Arc<SyncEngine>, Arc<ToggleRemote>) {
        let remote = Arc::new(ToggleRemote {
            online: AtomicBool::new(false),
        });
        let pool = Database::initialize_in_memory().await.unwrap();
        let engine = Arc::new(SyncEngine::from_pool(
            AppConfig::default(),
            pool,
            Arc::clone(&remote) as Arc<dyn RemoteApi>,
            Arc::new(NullStatusSink),
        ));
        (engine, remote)
    }

    #[tokio::test]
    async fn reconnect_event_drains_the_queue() {
        let (engine, remote) = setup_engine().await;
        engine.start().await;

        engine
            .queue()
            .enqueue(
                ActionCommand::new(ActionKind::Checkin, json!({"visitor_id": "v1"})).unwrap(),
                5,
            )
            .await
            .unwrap();
        assert_eq!(engine.stats().await.unwrap().pending_actions, 1);

        remote.online.store(true, Ordering::Release);
        engine.monitor().probe_once().await;
        // Give the subscription task a chance to run its drain.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stats = engine.stats().await.unwrap();
        assert!(stats.is_online);
        assert_eq!(stats.pending_actions, 0);
        assert!(stats.last_sync_at.is_some());

        engine.stop().await;
    }

    #[tokio::test]
    async fn stats_reflect_queue_and_cache_contents() {
        let (engine, _) = setup_engine().await;

        engine
            .cache()
            .upsert("visitors", json!({"id": "v1", "name": "Ada"}))
            .await
            .unwrap();
        engine
            .queue()
            .enqueue(
                ActionCommand::new(ActionKind::Checkout, json!({"visit_id": "x"})).unwrap(),
                1,
            )
            .await
            .unwrap();

        let stats = engine.stats().await.unwrap();
        assert!(!stats.is_online);
        assert_eq!(stats.pending_actions, 1);
        assert_eq!(stats.failed_actions, 0);
        assert_eq!(stats.cached_visitors, 1);
        assert!(stats.storage_bytes > 0);
        assert_eq!(stats.last_sync_at, None);
    }
}
