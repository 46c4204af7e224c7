use anyhow::Result;
use chrono::Utc;

use feedcast_core::AppConfig;

pub fn run(config: &AppConfig) -> Result<()> {
    let schedule = config.validate()?;

    println!("Configuration OK.\n");
    println!("  Feed: {}", config.feed.source_url().unwrap_or_default());
    println!("  Poll interval: {} seconds", config.feed.poll_interval_secs);
    println!("  Database: {}", config.database_path().display());

    if let Some(tg) = config.telegram() {
        println!("  Telegram: {}", tg.channel_id);
    }
    if let Some(vk) = config.vkontakte() {
        println!("  VK: community {}", vk.group_id);
    }

    match schedule {
        Some(spec) => {
            let next = spec.next_fire_after(Utc::now());
            println!("  Custom post: {}", spec);
            println!(
                "    Next run: {}",
                next.with_timezone(&spec.timezone).format("%Y-%m-%d %H:%M %Z")
            );
        }
        None => println!("  Custom post: not scheduled"),
    }

    Ok(())
}
