use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use super::supervisor::wait_for_shutdown;
use crate::channels::PublishChannel;
use crate::feed::Item;
use crate::storage::DedupStore;
use crate::Result;

const DEFAULT_PACING: Duration = Duration::from_secs(5);
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);

/// Outcome of dispatching one batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Successful (item, channel) deliveries
    pub delivered: usize,
    /// (item, channel) pairs skipped after exhausting retries
    pub failed: usize,
}

/// Publishes each batch item to every channel, in order, with a fixed pause
/// between consecutive items.
pub struct Dispatcher {
    channels: Vec<Arc<dyn PublishChannel>>,
    store: Option<Arc<dyn DedupStore>>,
    pacing: Duration,
    max_attempts: u32,
    retry_base: Duration,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn PublishChannel>>) -> Self {
        Self {
            channels,
            store: None,
            pacing: DEFAULT_PACING,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base: DEFAULT_RETRY_BASE,
        }
    }

    /// Record per-channel deliveries in `store`
    pub fn with_store(mut self, store: Arc<dyn DedupStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Consume batches until the sender side closes or shutdown is signalled.
    /// A batch in progress is finished before shutdown is observed.
    pub async fn run(
        &self,
        mut batches: mpsc::Receiver<Vec<Item>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        tracing::info!(channels = ?self.channel_names(), "Dispatcher started");

        loop {
            let batch = tokio::select! {
                batch = batches.recv() => batch,
                _ = wait_for_shutdown(&mut shutdown) => {
                    tracing::info!("Dispatcher stopping");
                    return Ok(());
                }
            };

            let Some(batch) = batch else {
                tracing::info!("Batch source closed, dispatcher stopping");
                return Ok(());
            };

            if batch.is_empty() {
                continue;
            }

            let report = self.dispatch_batch(batch).await;
            tracing::info!(
                delivered = report.delivered,
                failed = report.failed,
                "Batch dispatched"
            );
        }
    }

    /// Deliver every item of `batch` to every channel. Failures are logged and
    /// skipped; they never stop the rest of the batch.
    pub async fn dispatch_batch(&self, batch: Vec<Item>) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (index, item) in batch.iter().enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let mut all_delivered = true;
            for channel in &self.channels {
                if self.publish_with_retry(channel.as_ref(), item).await {
                    report.delivered += 1;
                    self.record_delivery(item, channel.name()).await;
                } else {
                    report.failed += 1;
                    all_delivered = false;
                }
            }

            if all_delivered {
                if let Some(store) = &self.store {
                    if let Err(e) = store.mark_dispatched(&item.external_id).await {
                        tracing::warn!(external_id = %item.external_id, error = %e, "Failed to mark item dispatched");
                    }
                }
            }
        }

        report
    }

    async fn publish_with_retry(&self, channel: &dyn PublishChannel, item: &Item) -> bool {
        let mut delay = self.retry_base;

        for attempt in 1..=self.max_attempts {
            match channel.publish(item).await {
                Ok(()) => return true,
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        channel = channel.name(),
                        external_id = %item.external_id,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Publish failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    tracing::error!(
                        channel = channel.name(),
                        external_id = %item.external_id,
                        error = %e,
                        "Publish failed after {} attempts, skipping",
                        self.max_attempts
                    );
                }
            }
        }

        false
    }

    async fn record_delivery(&self, item: &Item, channel: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.mark_delivered(&item.external_id, channel).await {
                tracing::warn!(external_id = %item.external_id, channel, error = %e, "Failed to record delivery");
            }
        }
    }
}
