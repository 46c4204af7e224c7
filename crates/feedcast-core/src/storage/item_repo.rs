use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::retry::{is_unique_violation, with_retry};
use super::{Database, DedupStore};
use crate::feed::Item;
use crate::{Error, Result};

/// SQLite-backed registry of ingested items
#[derive(Clone)]
pub struct ItemRepository {
    db: Database,
}

#[derive(FromRow)]
struct ItemRow {
    external_id: String,
    published_at: Option<DateTime<Utc>>,
    title: String,
    description: String,
    preview_url: Option<String>,
    link: Option<String>,
    dispatched: i32,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            external_id: row.external_id,
            title: row.title,
            description: row.description,
            preview_url: row.preview_url,
            link: row.link,
            published_at: row.published_at,
            dispatched: row.dispatched != 0,
        }
    }
}

impl ItemRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Find a single item by its feed identifier
    pub async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Item>> {
        let row: Option<ItemRow> = sqlx::query_as(
            r#"
            SELECT external_id, published_at, title, description, preview_url, link, dispatched
            FROM items
            WHERE external_id = ?
            "#,
        )
        .bind(external_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(Item::from))
    }

    /// Total number of stored items
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    /// Channels that have accepted the given item
    pub async fn delivered_channels(&self, external_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT channel FROM deliveries WHERE external_id = ? ORDER BY channel",
        )
        .bind(external_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(|(channel,)| channel).collect())
    }
}

#[async_trait]
impl DedupStore for ItemRepository {
    async fn initialize(&self) -> Result<()> {
        self.db.initialize().await
    }

    async fn find_existing(&self, ids: &[String]) -> Result<Vec<Item>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
        let query = format!(
            "SELECT external_id, published_at, title, description, preview_url, link, dispatched \
             FROM items WHERE external_id IN ({})",
            placeholders.join(", ")
        );

        let rows: Vec<ItemRow> = with_retry(|| {
            let mut query_builder = sqlx::query_as::<_, ItemRow>(&query);
            for id in ids {
                query_builder = query_builder.bind(id);
            }
            query_builder.fetch_all(self.db.pool())
        })
        .await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn insert(&self, item: &Item) -> Result<i64> {
        let now = Utc::now();

        let result = with_retry(|| {
            sqlx::query(
                r#"
                INSERT INTO items
                (external_id, published_at, title, description, preview_url, link, dispatched, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.external_id)
            .bind(item.published_at)
            .bind(&item.title)
            .bind(&item.description)
            .bind(&item.preview_url)
            .bind(&item.link)
            .bind(item.dispatched)
            .bind(now)
            .execute(self.db.pool())
        })
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => {
                Err(Error::DuplicateKey(item.external_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn mark_delivered(&self, external_id: &str, channel: &str) -> Result<()> {
        let now = Utc::now();

        with_retry(|| {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO deliveries (external_id, channel, delivered_at)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(external_id)
            .bind(channel)
            .bind(now)
            .execute(self.db.pool())
        })
        .await?;

        Ok(())
    }

    async fn mark_dispatched(&self, external_id: &str) -> Result<()> {
        with_retry(|| {
            sqlx::query("UPDATE items SET dispatched = 1 WHERE external_id = ?")
                .bind(external_id)
                .execute(self.db.pool())
        })
        .await?;

        Ok(())
    }
}
