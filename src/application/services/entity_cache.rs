use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::application::ports::remote_api::RemoteResponse;
use crate::domain::action::{now_millis, ActionKind, QueuedAction};
use crate::infrastructure::store::{collections, LocalStore};
use crate::shared::error::{AppError, Result};

fn key_field(collection: &str) -> &'static str {
    if collection == collections::CACHED_CODES {
        "code"
    } else {
        "id"
    }
}

fn search_fields(collection: &str) -> &'static [&'static str] {
    match collection {
        collections::VISITORS => &["name", "phone", "email", "company"],
        collections::VEHICLES => &["plate", "make", "model"],
        _ => &[],
    }
}

/// Read-through cache of visitor/vehicle records (and visit codes) backed by
/// LocalStore. A read optimization, never a source of truth: bulk refresh is
/// clear + insert, and every write is idempotent by primary key.
pub struct EntityCache {
    store: Arc<LocalStore>,
    search_limit: usize,
}

impl EntityCache {
    pub fn new(store: Arc<LocalStore>, search_limit: usize) -> Self {
        Self {
            store,
            search_limit,
        }
    }

    /// Idempotent upsert by the domain primary identifier. Replaying an
    /// identical entity is a no-op: the stored record (including its
    /// `cached_at` stamp) does not change.
    pub async fn upsert(&self, collection: &str, entity: Value) -> Result<String> {
        let mut map = match entity {
            Value::Object(map) => map,
            other => {
                return Err(AppError::Validation(format!(
                    "cached entity must be a JSON object, got {other}"
                )));
            }
        };

        let key = match map.get(key_field(collection)) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(AppError::Validation(format!(
                    "cached entity for `{collection}` is missing `{}`",
                    key_field(collection)
                )));
            }
        };

        if let Some(existing) = self.store.get(collection, &key).await? {
            if Self::same_content(&existing, &map) {
                return Ok(key);
            }
        }

        map.insert("cached_at".to_string(), Value::from(now_millis()));
        self.store.put(collection, &Value::Object(map)).await?;
        Ok(key)
    }

    fn same_content(existing: &Value, incoming: &Map<String, Value>) -> bool {
        let Some(existing) = existing.as_object() else {
            return false;
        };
        let strip = |m: &Map<String, Value>| {
            let mut m = m.clone();
            m.remove("cached_at");
            m
        };
        strip(existing) == strip(incoming)
    }

    /// Case-insensitive substring search over the local copy only. Used for
    /// offline lookups at the gate; the result is bounded.
    pub async fn search(&self, collection: &str, term: &str) -> Result<Vec<Value>> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let fields = search_fields(collection);
        let mut matches = Vec::new();
        for record in self.store.get_all(collection).await? {
            let hit = fields.iter().any(|field| {
                record
                    .get(*field)
                    .and_then(Value::as_str)
                    .map(|v| v.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            });
            if hit {
                matches.push(record);
                if matches.len() >= self.search_limit {
                    break;
                }
            }
        }
        Ok(matches)
    }

    /// Bulk refresh from a successful fetch: clear + insert.
    pub async fn replace_all(&self, collection: &str, entities: Vec<Value>) -> Result<usize> {
        self.store.clear(collection).await?;
        let mut stored = 0;
        for entity in entities {
            self.upsert(collection, entity).await?;
            stored += 1;
        }
        Ok(stored)
    }

    /// Folds a successful queue replay back into the cache. For create kinds
    /// the server-assigned identifier supersedes the client-side provisional
    /// record; the provisional copy must not survive alongside it.
    pub async fn apply_remote_result(
        &self,
        action: &QueuedAction,
        response: &RemoteResponse,
    ) -> Result<()> {
        let kind = action.kind();

        if let Some(collection) = kind.entity_collection() {
            let mut entity = action.command.payload().clone();
            // Server fields are authoritative over what the client sent.
            for (field, value) in &response.body {
                entity.insert(field.clone(), value.clone());
            }
            entity.remove("local_id");

            let server_id = response.server_id(kind);
            if let Some(id) = &server_id {
                entity.insert("id".to_string(), Value::String(id.clone()));
            }

            if entity.get("id").is_none() {
                warn!(kind = %kind, action = %action.id, "replay result carries no identifier, skipping cache update");
                return Ok(());
            }

            if let Some(provisional) = action.command.provisional_id() {
                let replaced = server_id.as_deref() != Some(provisional);
                if replaced {
                    self.store.delete(collection, provisional).await?;
                }
            }

            self.upsert(collection, Value::Object(entity)).await?;
        } else if kind == ActionKind::PreRegistration {
            let code = response
                .field("visit_code")
                .or_else(|| response.field("code"))
                .and_then(Value::as_str);
            if let Some(code) = code {
                self.cache_code(code, action.command.payload_value()).await?;
            }
        }

        Ok(())
    }

    /// Stores a visit code for offline gate lookup.
    pub async fn cache_code(&self, code: &str, details: Value) -> Result<()> {
        let mut record = match details {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        record.insert("code".to_string(), Value::String(code.to_string()));
        record.insert("cached_at".to_string(), Value::from(now_millis()));
        self.store
            .put(collections::CACHED_CODES, &Value::Object(record))
            .await?;
        Ok(())
    }

    pub async fn lookup_code(&self, code: &str) -> Result<Option<Value>> {
        self.store.get(collections::CACHED_CODES, code).await
    }

    /// Drops cached codes older than `max_age_ms`. Returns how many went.
    pub async fn prune_stale_codes(&self, max_age_ms: i64) -> Result<u64> {
        let cutoff = now_millis() - max_age_ms;
        let stale = self
            .store
            .find_in_range(collections::CACHED_CODES, "cached_at", None, Some(cutoff))
            .await?;

        let mut removed = 0;
        for record in stale {
            if let Some(code) = record.get("code").and_then(Value::as_str) {
                if self.store.delete(collections::CACHED_CODES, code).await? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    pub async fn counts(&self) -> Result<(u64, u64, u64)> {
        Ok((
            self.store.count(collections::VISITORS).await?,
            self.store.count(collections::VEHICLES).await?,
            self.store.count(collections::CACHED_CODES).await?,
        ))
    }
}
