use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::application::services::action_queue::ActionQueue;
use crate::application::services::connectivity::ConnectivityMonitor;
use crate::domain::action::{now_millis, ActionCommand};
use crate::domain::draft::{FormDraft, FormRegistration};
use crate::infrastructure::store::{collections, LocalStore};
use crate::shared::error::{AppError, Result};

struct PendingDraft {
    fields: Map<String, Value>,
    touched: Instant,
    flusher_running: bool,
}

/// Autosaves in-progress form state and turns completed forms into queued
/// commands. Changes are buffered in memory and written once the form has
/// been quiet for the debounce period; a draft on disk means the operator
/// typed something and never submitted.
pub struct FormDraftManager {
    store: Arc<LocalStore>,
    queue: Arc<ActionQueue>,
    monitor: Arc<ConnectivityMonitor>,
    registry: tokio::sync::RwLock<HashMap<String, FormRegistration>>,
    pending: tokio::sync::Mutex<HashMap<String, PendingDraft>>,
    debounce: Duration,
    restore_window_ms: i64,
}

impl FormDraftManager {
    pub fn new(
        store: Arc<LocalStore>,
        queue: Arc<ActionQueue>,
        monitor: Arc<ConnectivityMonitor>,
        debounce: Duration,
        restore_window: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            monitor,
            registry: tokio::sync::RwLock::new(HashMap::new()),
            pending: tokio::sync::Mutex::new(HashMap::new()),
            debounce,
            restore_window_ms: restore_window.as_millis() as i64,
        }
    }

    /// Declares how a form's fields become a queue command on submission.
    pub async fn register_form(&self, registration: FormRegistration) {
        debug!(form = %registration.form_id, kind = %registration.kind, "form registered");
        self.registry
            .write()
            .await
            .insert(registration.form_id.clone(), registration);
    }

    /// Buffers a field-level change. The draft hits disk only after the form
    /// has been quiet for the debounce period, so rapid typing costs one
    /// write, not one per keystroke.
    pub async fn record_change(self: &Arc<Self>, form_id: &str, fields: Value) -> Result<()> {
        let fields = match fields {
            Value::Object(map) => map,
            other => {
                return Err(AppError::Validation(format!(
                    "form fields must be a JSON object, got {other}"
                )));
            }
        };

        let spawn_flusher = {
            let mut pending = self.pending.lock().await;
            let entry = pending.entry(form_id.to_string()).or_insert_with(|| PendingDraft {
                fields: Map::new(),
                touched: Instant::now(),
                flusher_running: false,
            });
            for (field, value) in fields {
                entry.fields.insert(field, value);
            }
            entry.touched = Instant::now();
            let spawn = !entry.flusher_running;
            entry.flusher_running = true;
            spawn
        };

        if spawn_flusher {
            let manager = Arc::clone(self);
            let form_id = form_id.to_string();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(manager.debounce).await;
                    match manager.flush_if_idle(&form_id).await {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(form = %form_id, error = %e, "draft autosave failed");
                            break;
                        }
                    }
                }
            });
        }

        Ok(())
    }

    /// Persists the buffered draft if the quiet period has elapsed. Returns
    /// true when the buffer for this form is gone (flushed or empty).
    pub async fn flush_if_idle(&self, form_id: &str) -> Result<bool> {
        let fields = {
            let mut pending = self.pending.lock().await;
            let quiet = match pending.get(form_id) {
                None => return Ok(true),
                Some(entry) => entry.touched.elapsed() >= self.debounce,
            };
            if !quiet {
                return Ok(false);
            }
            pending.remove(form_id).map(|e| e.fields)
        };

        if let Some(fields) = fields {
            let draft = FormDraft {
                form_id: form_id.to_string(),
                fields,
                saved_at: now_millis(),
            };
            self.store
                .put(collections::FORM_DRAFTS, &serde_json::to_value(&draft)?)
                .await?;
            debug!(form = %form_id, "draft autosaved");
        }
        Ok(true)
    }

    /// Returns the saved draft when it is recent enough to offer back to the
    /// operator. A stale draft is not deleted, only withheld.
    pub async fn restore(&self, form_id: &str) -> Result<Option<FormDraft>> {
        let Some(raw) = self.store.get(collections::FORM_DRAFTS, form_id).await? else {
            return Ok(None);
        };
        let draft: FormDraft = serde_json::from_value(raw)?;
        if now_millis() - draft.saved_at > self.restore_window_ms {
            return Ok(None);
        }
        Ok(Some(draft))
    }

    /// Drops the draft and any buffered changes. Operator chose to start over.
    pub async fn discard(&self, form_id: &str) -> Result<bool> {
        self.pending.lock().await.remove(form_id);
        self.store.delete(collections::FORM_DRAFTS, form_id).await
    }

    /// Submits a completed form: its fields become one queued command at the
    /// registered priority. The draft is deleted only once the command is
    /// safely persisted in the queue; any failure leaves the draft in place.
    pub async fn submit(&self, form_id: &str, fields: Value) -> Result<String> {
        let registration = {
            let registry = self.registry.read().await;
            registry
                .get(form_id)
                .cloned()
                .ok_or_else(|| AppError::Validation(format!("unregistered form: {form_id}")))?
        };

        if !registration.offline_capable && !self.monitor.is_online().await {
            return Err(AppError::Network(format!(
                "form `{form_id}` cannot be submitted offline"
            )));
        }

        let command = ActionCommand::new(registration.kind, fields)?;
        let action_id = self.queue.enqueue(command, registration.priority).await?;

        self.pending.lock().await.remove(form_id);
        if let Err(e) = self.store.delete(collections::FORM_DRAFTS, form_id).await {
            // The command is queued; a leftover draft is the lesser problem.
            warn!(form = %form_id, error = %e, "draft cleanup after submit failed");
        }

        info!(form = %form_id, action = %action_id, "form submitted to queue");
        Ok(action_id)
    }

    pub async fn draft_count(&self) -> Result<u64> {
        self.store.count(collections::FORM_DRAFTS).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::remote_api::{RemoteApi, RemoteResponse};
    use crate::application::ports::status_sink::NullStatusSink;
    use crate::application::services::entity_cache::EntityCache;
    use crate::domain::action::ActionKind;
    use crate::infrastructure::database::Database;
    use async_trait::async_trait;
    use serde_json::json;

    struct OfflineRemote;

    #[async_trait]
    impl RemoteApi for OfflineRemote {
        async fn submit(&self, _kind: ActionKind, _payload: Value) -> Result<RemoteResponse> {
            Err(AppError::Network("unreachable".into()))
        }

        async fn probe(&self) -> bool {
            false
        }
    }

    async fn setup(debounce: Duration) -> (Arc<FormDraftManager>, Arc<LocalStore>) {
        let pool = Database::initialize_in_memory().await.unwrap();
        let store = Arc::new(LocalStore::new(pool));
        let remote: Arc<dyn RemoteApi> = Arc::new(OfflineRemote);
        let cache = Arc::new(EntityCache::new(Arc::clone(&store), 25));
        let monitor = Arc::new(ConnectivityMonitor::new(Arc::clone(&remote), 10));
        let queue = Arc::new(ActionQueue::new(
            Arc::clone(&store),
            remote,
            cache,
            Arc::clone(&monitor),
            Arc::new(NullStatusSink),
            3,
            5_000,
        ));
        let manager = Arc::new(FormDraftManager::new(
            Arc::clone(&store),
            queue,
            monitor,
            debounce,
            Duration::from_secs(3600),
        ));
        (manager, store)
    }

    #[tokio::test]
    async fn changes_flush_after_quiet_period_as_one_write() {
        let (manager, store) = setup(Duration::from_millis(20)).await;

        manager
            .record_change("checkin", json!({"visitor_id": "v1"}))
            .await
            .unwrap();
        manager
            .record_change("checkin", json!({"gate": "north"}))
            .await
            .unwrap();

        // Still inside the quiet period.
        assert!(!manager.flush_if_idle("checkin").await.unwrap());
        assert!(store
            .get(collections::FORM_DRAFTS, "checkin")
            .await
            .unwrap()
            .is_none());

        tokio::time::sleep(Duration::from_millis(60)).await;

        let draft: FormDraft = serde_json::from_value(
            store
                .get(collections::FORM_DRAFTS, "checkin")
                .await
                .unwrap()
                .expect("background flusher persisted the draft"),
        )
        .unwrap();
        assert_eq!(draft.fields["visitor_id"], "v1");
        assert_eq!(draft.fields["gate"], "north");
        assert_eq!(manager.draft_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn restore_honors_the_freshness_window() {
        let (manager, store) = setup(Duration::from_millis(10)).await;

        let stale = FormDraft {
            form_id: "visitor_form".into(),
            fields: json!({"name": "Old"}).as_object().unwrap().clone(),
            saved_at: now_millis() - 61 * 60 * 1000,
        };
        store
            .put(collections::FORM_DRAFTS, &serde_json::to_value(&stale).unwrap())
            .await
            .unwrap();

        assert!(manager.restore("visitor_form").await.unwrap().is_none());
        // Withheld, not deleted.
        assert!(store
            .get(collections::FORM_DRAFTS, "visitor_form")
            .await
            .unwrap()
            .is_some());

        let fresh = FormDraft {
            saved_at: now_millis() - 10 * 60 * 1000,
            ..stale
        };
        store
            .put(collections::FORM_DRAFTS, &serde_json::to_value(&fresh).unwrap())
            .await
            .unwrap();

        let restored = manager.restore("visitor_form").await.unwrap().unwrap();
        assert_eq!(restored.fields["name"], "Old");
    }

    #[tokio::test]
    async fn submit_queues_the_command_and_deletes_the_draft() {
        let (manager, store) = setup(Duration::from_millis(10)).await;
        manager
            .register_form(FormRegistration {
                form_id: "checkin".into(),
                kind: ActionKind::Checkin,
                priority: 5,
                offline_capable: true,
            })
            .await;

        store
            .put(
                collections::FORM_DRAFTS,
                &serde_json::to_value(&FormDraft {
                    form_id: "checkin".into(),
                    fields: Map::new(),
                    saved_at: now_millis(),
                })
                .unwrap(),
            )
            .await
            .unwrap();

        manager
            .submit("checkin", json!({"visitor_id": "v1"}))
            .await
            .unwrap();

        assert!(store
            .get(collections::FORM_DRAFTS, "checkin")
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.count(collections::ACTION_QUEUE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_submit_preserves_the_draft() {
        let (manager, store) = setup(Duration::from_millis(10)).await;
        manager
            .register_form(FormRegistration {
                form_id: "checkin".into(),
                kind: ActionKind::Checkin,
                priority: 5,
                offline_capable: true,
            })
            .await;
        manager
            .register_form(FormRegistration {
                form_id: "badge_print".into(),
                kind: ActionKind::Checkout,
                priority: 1,
                offline_capable: false,
            })
            .await;

        let draft = FormDraft {
            form_id: "checkin".into(),
            fields: json!({"gate": "north"}).as_object().unwrap().clone(),
            saved_at: now_millis(),
        };
        store
            .put(collections::FORM_DRAFTS, &serde_json::to_value(&draft).unwrap())
            .await
            .unwrap();

        // Required field missing: validation fails before anything is queued.
        let err = manager.submit("checkin", json!({"gate": "north"})).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store
            .get(collections::FORM_DRAFTS, "checkin")
            .await
            .unwrap()
            .is_some());
        assert_eq!(store.count(collections::ACTION_QUEUE).await.unwrap(), 0);

        // A form not marked offline-capable is refused while offline.
        let err = manager
            .submit("badge_print", json!({"visit_id": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Network(_)));

        let err = manager.submit("unknown", json!({})).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
