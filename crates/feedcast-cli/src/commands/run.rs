use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::info;

use feedcast_core::{
    channels::Channels,
    feed::{FeedFetcher, FeedSource},
    pipeline::{Dispatcher, FeedPoller, Supervisor},
    scheduler::{CustomPostJob, Scheduler},
    storage::{Database, ItemRepository},
    AppConfig,
};

/// Start every long-running task and dispatch in the foreground until Ctrl+C
pub async fn run(config: AppConfig) -> Result<()> {
    // Configuration problems are fatal before anything starts
    let schedule = config.validate()?;

    let db = Database::new(&config).await?;
    let store = Arc::new(ItemRepository::new(db));
    let channels = Channels::from_config(&config)?;
    let fetcher = FeedFetcher::new(&config.feed)?;
    let feed_url = fetcher.url().to_string();
    let source: Arc<dyn FeedSource> = Arc::new(fetcher);
    let poller = FeedPoller::new(source, store.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let supervisor = Supervisor::new(
        Duration::from_secs(config.supervisor.cooldown_secs),
        shutdown_rx.clone(),
    );
    let mut tasks = Vec::new();

    // Capacity 1: the poller waits until the dispatcher takes the previous batch
    let (batch_tx, batch_rx) = mpsc::channel(1);
    let interval = Duration::from_secs(config.feed.poll_interval_secs);
    tasks.push(supervisor.supervise("feed-poller", move || {
        let poller = poller.clone();
        let batch_tx = batch_tx.clone();
        async move { poller.run(interval, batch_tx).await }
    }));

    for channel in channels.publishers() {
        if !channel.is_bidirectional() {
            continue;
        }
        let name = format!("{}-listener", channel.name());
        tasks.push(supervisor.supervise(name, move || {
            let channel = channel.clone();
            async move { channel.listen().await }
        }));
    }

    if let (Some(spec), Some(vk)) = (schedule, channels.vkontakte.clone()) {
        let job = Arc::new(CustomPostJob::new(vk, &config.custom_post));
        let scheduler = Scheduler::new(spec, job);
        let scheduler_shutdown = shutdown_rx.clone();
        info!(schedule = %spec, "Custom post scheduled");
        tasks.push(supervisor.supervise("scheduler", move || {
            let scheduler = scheduler.clone();
            let shutdown = scheduler_shutdown.clone();
            async move { scheduler.run(shutdown).await }
        }));
    }

    let dispatcher = Dispatcher::new(channels.publishers())
        .with_store(store)
        .with_pacing(Duration::from_secs(config.dispatch.pacing_secs))
        .with_max_attempts(config.dispatch.max_attempts);

    println!(
        "feedcast running: {} -> {}. Press Ctrl+C to stop.",
        feed_url,
        dispatcher.channel_names().join(", ")
    );

    dispatcher.run(batch_rx, shutdown_rx).await?;

    for task in tasks {
        let _ = task.await;
    }

    println!("feedcast stopped.");
    Ok(())
}
