use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::info;

use crate::shared::error::Result;

pub type DbPool = Pool<Sqlite>;

pub struct Database;

impl Database {
    pub async fn initialize(database_url: &str, max_connections: u32) -> Result<DbPool> {
        // sqlite://path/file.db?mode=rwc needs the parent directory to exist
        if let Some(path) = database_url
            .strip_prefix("sqlite://")
            .map(|rest| rest.split('?').next().unwrap_or(rest))
        {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| crate::shared::error::AppError::Storage(e.to_string()))?;
                }
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("database connected: {}", database_url);

        Self::run_migrations(&pool).await?;

        Ok(pool)
    }

    pub async fn initialize_in_memory() -> Result<DbPool> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::run_migrations(&pool).await?;
        Ok(pool)
    }

    async fn run_migrations(pool: &DbPool) -> Result<()> {
        sqlx::migrate!("./migrations").run(pool).await?;
        info!("database migrations completed");
        Ok(())
    }
}
