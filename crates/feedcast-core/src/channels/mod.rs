mod telegram;
mod vkontakte;

use std::sync::Arc;

use async_trait::async_trait;

pub use telegram::TelegramChannel;
pub use vkontakte::VkontakteChannel;

use crate::config::AppConfig;
use crate::feed::Item;
use crate::Result;

/// A downstream destination that can publish an item.
///
/// Bidirectional channels also keep a live session open through `listen`.
#[async_trait]
pub trait PublishChannel: Send + Sync {
    /// Stable channel identifier (e.g. `telegram`, `vkontakte`)
    fn name(&self) -> &str;

    async fn publish(&self, item: &Item) -> Result<()>;

    fn is_bidirectional(&self) -> bool {
        false
    }

    /// Hold the inbound session open. Only returns on failure.
    async fn listen(&self) -> Result<()> {
        Ok(())
    }
}

/// The channels enabled by configuration
#[derive(Clone, Default)]
pub struct Channels {
    pub telegram: Option<Arc<TelegramChannel>>,
    pub vkontakte: Option<Arc<VkontakteChannel>>,
}

impl Channels {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let telegram = config
            .telegram()
            .map(TelegramChannel::new)
            .transpose()?
            .map(Arc::new);
        let vkontakte = config
            .vkontakte()
            .map(VkontakteChannel::new)
            .transpose()?
            .map(Arc::new);

        Ok(Self { telegram, vkontakte })
    }

    /// Channels in registration order: Telegram first, then VK
    pub fn publishers(&self) -> Vec<Arc<dyn PublishChannel>> {
        let mut publishers: Vec<Arc<dyn PublishChannel>> = Vec::new();
        if let Some(tg) = &self.telegram {
            publishers.push(tg.clone());
        }
        if let Some(vk) = &self.vkontakte {
            publishers.push(vk.clone());
        }
        publishers
    }
}

/// Join the non-empty parts of a post, one per line
pub(crate) fn compose_lines(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_lines_skips_blanks() {
        assert_eq!(compose_lines(&["Title", "", "  body "]), "Title\nbody");
    }

    #[test]
    fn test_publishers_in_registration_order() {
        let config = AppConfig::from_toml(
            r#"
[feed]
channel_id = "UC1"

[vkontakte]
token = "vk"
group_id = 1

[telegram]
token = "tg"
channel_id = "@c"
"#,
        )
        .unwrap();

        let channels = Channels::from_config(&config).unwrap();
        let names: Vec<String> = channels
            .publishers()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["telegram", "vkontakte"]);
    }
}
