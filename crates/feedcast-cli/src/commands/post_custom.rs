use std::sync::Arc;

use anyhow::{bail, Result};

use feedcast_core::{
    channels::VkontakteChannel,
    scheduler::{CustomPostJob, ScheduledJob},
    AppConfig,
};

pub async fn run(config: &AppConfig) -> Result<()> {
    config.validate()?;

    let Some(vk_config) = config.vkontakte() else {
        bail!("post-custom needs a [vkontakte] section with a token");
    };
    if config.custom_post.is_empty() {
        bail!("nothing to post: set custom_post.message or custom_post.files");
    }

    let vk = Arc::new(VkontakteChannel::new(vk_config)?);
    let job = CustomPostJob::new(vk, &config.custom_post);

    println!("Publishing custom post to VK community {}...", vk_config.group_id);
    job.run().await?;
    println!("Done.");

    Ok(())
}
