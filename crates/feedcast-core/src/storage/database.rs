use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;

use crate::config::AppConfig;
use crate::Result;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (creating if needed) the database file and ensure the schema
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let db_path = config.database_path();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite:{}", db_path.display());

        tracing::info!("Connecting to database: {}", db_path.display());

        // PRAGMAs are set per-connection so every pooled connection agrees
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.initialize().await?;

        Ok(db)
    }

    /// Create an in-memory database for testing
    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.initialize().await?;

        Ok(db)
    }

    /// Create the schema if it does not exist yet. Safe to call on every start.
    pub async fn initialize(&self) -> Result<()> {
        tracing::debug!("Ensuring database schema...");

        sqlx::query(MIGRATION_001_ITEMS)
            .execute(&self.pool)
            .await?;

        sqlx::query(MIGRATION_002_DELIVERIES)
            .execute(&self.pool)
            .await?;

        sqlx::query(MIGRATION_INDEXES)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

const MIGRATION_001_ITEMS: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id TEXT NOT NULL UNIQUE,
    published_at DATETIME,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    preview_url TEXT,
    link TEXT,
    dispatched INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

const MIGRATION_002_DELIVERIES: &str = r#"
CREATE TABLE IF NOT EXISTS deliveries (
    external_id TEXT NOT NULL REFERENCES items(external_id) ON DELETE CASCADE,
    channel TEXT NOT NULL,
    delivered_at DATETIME NOT NULL,
    PRIMARY KEY (external_id, channel)
)
"#;

const MIGRATION_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_items_published_at ON items(published_at DESC);
CREATE INDEX IF NOT EXISTS idx_items_dispatched ON items(dispatched)
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let db = Database::new_in_memory().await.unwrap();
        db.initialize().await.unwrap();
        db.initialize().await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_new_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.general.data_dir = dir.path().join("data");

        let db = Database::new(&config).await.unwrap();
        assert!(config.database_path().exists());
        drop(db);

        // Opening again runs the same schema setup without error
        Database::new(&config).await.unwrap();
    }
}
