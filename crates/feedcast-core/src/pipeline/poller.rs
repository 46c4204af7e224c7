use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::feed::{FeedSource, Item};
use crate::storage::DedupStore;
use crate::{Error, Result};

/// Fetches the feed, drops already-seen items, persists the new ones and
/// emits them as a batch.
#[derive(Clone)]
pub struct FeedPoller {
    source: Arc<dyn FeedSource>,
    store: Arc<dyn DedupStore>,
}

impl FeedPoller {
    pub fn new(source: Arc<dyn FeedSource>, store: Arc<dyn DedupStore>) -> Self {
        Self { source, store }
    }

    /// Run one poll cycle and return the newly stored items, oldest first.
    ///
    /// A fetch or existence-check failure aborts the cycle before anything
    /// is written. A failed insert only drops that one item.
    pub async fn poll_once(&self) -> Result<Vec<Item>> {
        let entries = self.source.fetch().await?;
        let fetched = entries.len();

        // Last occurrence of an id within one fetch wins
        let mut candidates: HashMap<String, Item> = HashMap::new();
        for item in entries.into_iter().filter_map(Item::from_raw) {
            candidates.insert(item.external_id.clone(), item);
        }

        if candidates.is_empty() {
            tracing::debug!(fetched, "Feed returned no usable entries");
            return Ok(Vec::new());
        }

        let ids: Vec<String> = candidates.keys().cloned().collect();
        for existing in self.store.find_existing(&ids).await? {
            candidates.remove(&existing.external_id);
        }

        let mut fresh: Vec<Item> = candidates.into_values().collect();
        fresh.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });

        let mut batch = Vec::with_capacity(fresh.len());
        for item in fresh {
            match self.store.insert(&item).await {
                Ok(_) => batch.push(item),
                Err(e) if e.is_duplicate_key() => {
                    tracing::debug!(external_id = %item.external_id, "Item stored concurrently, skipping");
                }
                Err(e) => {
                    tracing::warn!(external_id = %item.external_id, error = %e, "Failed to store item, dropping it");
                }
            }
        }

        tracing::info!(fetched, new_items = batch.len(), "Poll cycle complete");
        Ok(batch)
    }

    /// Poll forever, emitting one batch per cycle and sleeping `interval`
    /// between cycles. Only returns on failure.
    pub async fn run(&self, interval: Duration, emit: mpsc::Sender<Vec<Item>>) -> Result<()> {
        tracing::info!(interval_secs = interval.as_secs(), "Feed poller started");

        loop {
            let batch = self.poll_once().await?;

            emit.send(batch)
                .await
                .map_err(|_| Error::ChannelClosed("dispatcher stopped receiving batches".to_string()))?;

            tokio::time::sleep(interval).await;
        }
    }
}
