use serde_json::Value;
use sqlx::Row;

use crate::infrastructure::database::DbPool;
use crate::shared::error::{AppError, Result};

/// Collection names. Each collection has exactly one owning component;
/// single-owner-per-collection stands in for locking.
pub mod collections {
    pub const VISITORS: &str = "visitors";
    pub const VEHICLES: &str = "vehicles";
    pub const VISITS: &str = "visits";
    pub const ACTION_QUEUE: &str = "action_queue";
    pub const SETTINGS: &str = "settings";
    pub const FORM_DRAFTS: &str = "form_drafts";
    pub const CACHED_CODES: &str = "cached_codes";
}

#[derive(Debug, Clone, Copy)]
pub struct CollectionSpec {
    pub name: &'static str,
    pub key_field: &'static str,
}

const SPECS: [CollectionSpec; 7] = [
    CollectionSpec {
        name: collections::VISITORS,
        key_field: "id",
    },
    CollectionSpec {
        name: collections::VEHICLES,
        key_field: "id",
    },
    CollectionSpec {
        name: collections::VISITS,
        key_field: "id",
    },
    CollectionSpec {
        name: collections::ACTION_QUEUE,
        key_field: "id",
    },
    CollectionSpec {
        name: collections::SETTINGS,
        key_field: "key",
    },
    CollectionSpec {
        name: collections::FORM_DRAFTS,
        key_field: "form_id",
    },
    CollectionSpec {
        name: collections::CACHED_CODES,
        key_field: "code",
    },
];

/// Durable keyed-JSON store over SQLite. Every operation is atomic with
/// respect to its own collection; nothing in the engine needs a
/// cross-collection transaction because queue removal and cache upserts are
/// each independently idempotent.
#[derive(Clone)]
pub struct LocalStore {
    pool: DbPool,
}

impl LocalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn spec(collection: &str) -> Result<&'static CollectionSpec> {
        SPECS
            .iter()
            .find(|s| s.name == collection)
            .ok_or_else(|| AppError::Validation(format!("unknown collection: {collection}")))
    }

    fn checked_field(field: &str) -> Result<&str> {
        if !field.is_empty()
            && field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            Ok(field)
        } else {
            Err(AppError::Validation(format!("invalid index field: {field}")))
        }
    }

    fn key_of(spec: &CollectionSpec, value: &Value) -> Result<String> {
        match value.get(spec.key_field) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(AppError::Validation(format!(
                "record for `{}` is missing its key field `{}`",
                spec.name, spec.key_field
            ))),
        }
    }

    pub async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let spec = Self::spec(collection)?;
        let query = format!("SELECT value FROM {} WHERE key = ?1", spec.name);
        let row = sqlx::query(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("value")?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    /// Upsert by the collection's declared key field.
    pub async fn put(&self, collection: &str, value: &Value) -> Result<String> {
        let spec = Self::spec(collection)?;
        let key = Self::key_of(spec, value)?;
        let raw = serde_json::to_string(value)?;

        let query = format!(
            r#"
            INSERT INTO {} (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            spec.name
        );
        sqlx::query(&query)
            .bind(&key)
            .bind(&raw)
            .execute(&self.pool)
            .await?;

        Ok(key)
    }

    pub async fn delete(&self, collection: &str, key: &str) -> Result<bool> {
        let spec = Self::spec(collection)?;
        let query = format!("DELETE FROM {} WHERE key = ?1", spec.name);
        let result = sqlx::query(&query).bind(key).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// All records in insertion order.
    pub async fn get_all(&self, collection: &str) -> Result<Vec<Value>> {
        let spec = Self::spec(collection)?;
        let query = format!("SELECT value FROM {} ORDER BY rowid ASC", spec.name);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get("value")?;
            values.push(serde_json::from_str(&raw)?);
        }
        Ok(values)
    }

    /// Secondary lookup by an indexed string field.
    pub async fn find_by_index(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Value>> {
        let spec = Self::spec(collection)?;
        let field = Self::checked_field(field)?;
        let query = format!(
            "SELECT value FROM {} WHERE json_extract(value, '$.{}') = ?1 ORDER BY rowid ASC",
            spec.name, field
        );
        let rows = sqlx::query(&query).bind(value).fetch_all(&self.pool).await?;

        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get("value")?;
            values.push(serde_json::from_str(&raw)?);
        }
        Ok(values)
    }

    /// Secondary lookup by an indexed numeric field, with optional bounds
    /// (inclusive).
    pub async fn find_in_range(
        &self,
        collection: &str,
        field: &str,
        min: Option<i64>,
        max: Option<i64>,
    ) -> Result<Vec<Value>> {
        let spec = Self::spec(collection)?;
        let field = Self::checked_field(field)?;

        let mut query = format!(
            "SELECT value FROM {} WHERE json_extract(value, '$.{}') IS NOT NULL",
            spec.name, field
        );
        if min.is_some() {
            query.push_str(&format!(
                " AND CAST(json_extract(value, '$.{field}') AS INTEGER) >= ?1"
            ));
        }
        if max.is_some() {
            let placeholder = if min.is_some() { "?2" } else { "?1" };
            query.push_str(&format!(
                " AND CAST(json_extract(value, '$.{field}') AS INTEGER) <= {placeholder}"
            ));
        }
        query.push_str(" ORDER BY rowid ASC");

        let mut q = sqlx::query(&query);
        if let Some(min) = min {
            q = q.bind(min);
        }
        if let Some(max) = max {
            q = q.bind(max);
        }
        let rows = q.fetch_all(&self.pool).await?;

        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get("value")?;
            values.push(serde_json::from_str(&raw)?);
        }
        Ok(values)
    }

    pub async fn count(&self, collection: &str) -> Result<u64> {
        let spec = Self::spec(collection)?;
        let query = format!("SELECT COUNT(*) as count FROM {}", spec.name);
        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    pub async fn count_by_index(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<u64> {
        let spec = Self::spec(collection)?;
        let field = Self::checked_field(field)?;
        let query = format!(
            "SELECT COUNT(*) as count FROM {} WHERE json_extract(value, '$.{}') = ?1",
            spec.name, field
        );
        let row = sqlx::query(&query).bind(value).fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    pub async fn clear(&self, collection: &str) -> Result<()> {
        let spec = Self::spec(collection)?;
        let query = format!("DELETE FROM {}", spec.name);
        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    /// Rough local storage footprint across every collection, in bytes.
    pub async fn estimate_usage(&self) -> Result<u64> {
        let mut total: i64 = 0;
        for spec in &SPECS {
            let query = format!(
                "SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) as bytes FROM {}",
                spec.name
            );
            let row = sqlx::query(&query).fetch_one(&self.pool).await?;
            let bytes: i64 = row.try_get("bytes")?;
            total += bytes;
        }
        Ok(total.max(0) as u64)
    }
}
