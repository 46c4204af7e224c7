use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use feedcast_core::{
    channels::Channels,
    feed::{FeedFetcher, FeedSource},
    pipeline::{Dispatcher, FeedPoller},
    storage::{Database, ItemRepository},
    AppConfig,
};

pub async fn run(config: &AppConfig, dispatch: bool) -> Result<()> {
    config.validate()?;

    let db = Database::new(config).await?;
    let store = Arc::new(ItemRepository::new(db));
    let fetcher = FeedFetcher::new(&config.feed)?;
    println!("Polling {}...\n", fetcher.url());

    let source: Arc<dyn FeedSource> = Arc::new(fetcher);
    let poller = FeedPoller::new(source, store.clone());
    let batch = poller.poll_once().await?;

    if batch.is_empty() {
        println!("No new items.");
        return Ok(());
    }

    println!("New items ({}):\n", batch.len());
    for item in &batch {
        let published = item
            .published_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown date".to_string());
        println!("  {} - {}", item.external_id, item.title);
        println!("    Published: {}", published);
        if let Some(link) = &item.link {
            println!("    Link: {}", link);
        }
    }

    if dispatch {
        let channels = Channels::from_config(config)?;
        let dispatcher = Dispatcher::new(channels.publishers())
            .with_store(store)
            .with_pacing(Duration::from_secs(config.dispatch.pacing_secs))
            .with_max_attempts(config.dispatch.max_attempts);

        println!("\nDispatching to {}...", dispatcher.channel_names().join(", "));
        let report = dispatcher.dispatch_batch(batch).await;
        println!(
            "Dispatch complete. {} delivered, {} failed.",
            report.delivered, report.failed
        );
    }

    Ok(())
}
