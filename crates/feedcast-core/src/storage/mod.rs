mod database;
mod item_repo;
#[cfg(test)]
pub(crate) mod memory;
pub mod retry;

use async_trait::async_trait;

pub use database::Database;
pub use item_repo::ItemRepository;

use crate::feed::Item;
use crate::Result;

/// Persisted registry of previously ingested items.
///
/// Every membership check goes to the backing store; there is no cache.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Ensure the schema exists. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// The subset of `ids` already stored, with their stored fields
    async fn find_existing(&self, ids: &[String]) -> Result<Vec<Item>>;

    /// Append one record. Fails with `Error::DuplicateKey` if the
    /// `external_id` is already present.
    async fn insert(&self, item: &Item) -> Result<i64>;

    /// Record that `channel` accepted the item
    async fn mark_delivered(&self, external_id: &str, channel: &str) -> Result<()>;

    /// Record that every registered channel accepted the item
    async fn mark_dispatched(&self, external_id: &str) -> Result<()>;
}
