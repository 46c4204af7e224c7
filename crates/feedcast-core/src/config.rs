use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::scheduler::ScheduleSpec;

const YOUTUBE_FEED_URL: &str = "https://www.youtube.com/feeds/videos.xml";
const TELEGRAM_TOKEN_ENV: &str = "FEEDCAST_TELEGRAM_TOKEN";
const VK_TOKEN_ENV: &str = "FEEDCAST_VK_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub vkontakte: Option<VkontakteConfig>,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    #[serde(default)]
    pub custom_post: CustomPostConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// YouTube channel whose uploads feed is polled
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Any RSS/Atom URL (takes precedence over `channel_id`)
    #[serde(default)]
    pub url: Option<String>,
    /// Seconds to sleep between poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// HTTP proxy URL for feed fetching (e.g., "http://127.0.0.1:7890" or "socks5://127.0.0.1:1080")
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel_id: None,
            url: None,
            poll_interval_secs: default_poll_interval(),
            request_timeout_secs: default_timeout(),
            proxy_url: None,
        }
    }
}

impl FeedConfig {
    /// Resolve the configured source into the URL that gets fetched
    pub fn source_url(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Some(url.trim().to_string());
        }
        self.channel_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| format!("{}?channel_id={}", YOUTUBE_FEED_URL, id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Delay between consecutive items of one batch
    #[serde(default = "default_pacing")]
    pub pacing_secs: u64,
    /// Send attempts per item and channel before the send is skipped
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pacing_secs: default_pacing(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Wait before a failed task is relaunched
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    /// Target channel, e.g. "@my_channel" or a numeric chat id
    #[serde(default)]
    pub channel_id: String,
    /// First line of every post
    #[serde(default)]
    pub post_title: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VkontakteConfig {
    #[serde(default)]
    pub token: String,
    /// Community id (positive); posts go to the wall of `-group_id`
    #[serde(default)]
    pub group_id: i64,
    /// First line of every post
    #[serde(default)]
    pub post_title: String,
    #[serde(default = "default_vk_api")]
    pub api_base: String,
    #[serde(default = "default_vk_version")]
    pub api_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// "day"/"daily" or "week"/"weekly"
    pub every: String,
    /// Day of week 1-7 (Monday = 1), required for weekly schedules
    #[serde(default)]
    pub day: Option<u32>,
    /// Local time of day, "HH:MM"
    pub time: String,
    /// IANA timezone the time of day is anchored to
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomPostConfig {
    #[serde(default)]
    pub message: Option<String>,
    /// Comma-separated list of image paths attached to the post
    #[serde(default)]
    pub files: Option<String>,
}

impl CustomPostConfig {
    /// Attachment paths, with blanks removed
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.files
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| expand_tilde(Path::new(p)))
            .collect()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.message().is_none() && self.file_paths().is_empty()
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feedcast")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval() -> u64 {
    300 // 5 minutes
}

fn default_timeout() -> u64 {
    30
}

fn default_pacing() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_cooldown() -> u64 {
    10
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

fn default_vk_api() -> String {
    "https://api.vk.com/method".to_string()
}

fn default_vk_version() -> String {
    "5.199".to_string()
}

fn default_timezone() -> String {
    "Europe/Moscow".to_string()
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from the given file, or the default location
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        if !config_path.exists() {
            return Err(crate::Error::Config(format!(
                "config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(&config_path)?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Tokens may come from the environment instead of the config file
    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(TELEGRAM_TOKEN_ENV) {
            self.telegram.get_or_insert_with(TelegramConfig::empty).token = token;
        }
        if let Ok(token) = std::env::var(VK_TOKEN_ENV) {
            self.vkontakte.get_or_insert_with(VkontakteConfig::empty).token = token;
        }
    }

    /// Check everything that must hold before any task is started.
    /// Returns the parsed schedule, if one is configured.
    pub fn validate(&self) -> crate::Result<Option<ScheduleSpec>> {
        if self.feed.source_url().is_none() {
            return Err(crate::Error::Config(
                "either feed.url or feed.channel_id must be set".to_string(),
            ));
        }
        if self.feed.poll_interval_secs == 0 {
            return Err(crate::Error::Config(
                "feed.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.dispatch.max_attempts == 0 {
            return Err(crate::Error::Config(
                "dispatch.max_attempts must be at least 1".to_string(),
            ));
        }

        let telegram = self.telegram();
        let vkontakte = self.vkontakte();
        if telegram.is_none() && vkontakte.is_none() {
            return Err(crate::Error::Config(
                "no publishing channel configured ([telegram] or [vkontakte] with a token)"
                    .to_string(),
            ));
        }
        if let Some(tg) = telegram {
            if tg.channel_id.trim().is_empty() {
                return Err(crate::Error::Config(
                    "telegram.channel_id is required".to_string(),
                ));
            }
        }
        if let Some(vk) = vkontakte {
            if vk.group_id <= 0 {
                return Err(crate::Error::Config(
                    "vkontakte.group_id must be a positive community id".to_string(),
                ));
            }
        }

        let Some(schedule) = &self.schedule else {
            return Ok(None);
        };
        let spec = ScheduleSpec::from_config(schedule)?;

        if vkontakte.is_none() {
            return Err(crate::Error::Config(
                "[schedule] posts to VK and requires a [vkontakte] section".to_string(),
            ));
        }
        if self.custom_post.is_empty() {
            return Err(crate::Error::Config(
                "[schedule] needs custom_post.message or custom_post.files".to_string(),
            ));
        }
        for file in self.custom_post.file_paths() {
            if !file.is_file() {
                return Err(crate::Error::Config(format!(
                    "custom_post file not found: {}",
                    file.display()
                )));
            }
        }

        Ok(Some(spec))
    }

    /// Telegram settings, if the channel is enabled
    pub fn telegram(&self) -> Option<&TelegramConfig> {
        self.telegram.as_ref().filter(|t| !t.token.trim().is_empty())
    }

    /// VK settings, if the channel is enabled
    pub fn vkontakte(&self) -> Option<&VkontakteConfig> {
        self.vkontakte.as_ref().filter(|v| !v.token.trim().is_empty())
    }

    /// Get the configuration file path
    /// Always uses ~/.config/feedcast/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("feedcast")
            .join("config.toml")
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("feedcast.db")
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }
}

impl TelegramConfig {
    fn empty() -> Self {
        Self {
            token: String::new(),
            channel_id: String::new(),
            post_title: String::new(),
            api_base: default_telegram_api(),
        }
    }
}

impl VkontakteConfig {
    fn empty() -> Self {
        Self {
            token: String::new(),
            group_id: 0,
            post_title: String::new(),
            api_base: default_vk_api(),
            api_version: default_vk_version(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[feed]
channel_id = "UC123"

[telegram]
token = "tg-token"
channel_id = "@news"
post_title = "New video!"
"#;

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.feed.poll_interval_secs, 300);
        assert_eq!(config.dispatch.pacing_secs, 5);
        assert_eq!(config.supervisor.cooldown_secs, 10);
        assert_eq!(
            config.telegram.as_ref().unwrap().api_base,
            "https://api.telegram.org"
        );
        assert!(config.validate().unwrap().is_none());
    }

    #[test]
    fn test_source_url_from_channel_id() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(
            config.feed.source_url().unwrap(),
            "https://www.youtube.com/feeds/videos.xml?channel_id=UC123"
        );
    }

    #[test]
    fn test_explicit_url_wins() {
        let mut config = AppConfig::from_toml(MINIMAL).unwrap();
        config.feed.url = Some("https://example.com/feed.xml".to_string());
        assert_eq!(
            config.feed.source_url().unwrap(),
            "https://example.com/feed.xml"
        );
    }

    #[test]
    fn test_missing_feed_source_rejected() {
        let config = AppConfig::from_toml(
            r#"
[telegram]
token = "t"
channel_id = "@c"
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_no_channel_rejected() {
        let config = AppConfig::from_toml("[feed]\nchannel_id = \"UC1\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no publishing channel"));
    }

    #[test]
    fn test_invalid_weekday_is_config_error() {
        let toml = format!(
            "{MINIMAL}\n[vkontakte]\ntoken = \"vk\"\ngroup_id = 42\n\n[schedule]\nevery = \"week\"\nday = 8\ntime = \"09:00\"\n\n[custom_post]\nmessage = \"hello\"\n"
        );
        let config = AppConfig::from_toml(&toml).unwrap();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_schedule_requires_existing_files() {
        let toml = format!(
            "{MINIMAL}\n[vkontakte]\ntoken = \"vk\"\ngroup_id = 42\n\n[schedule]\nevery = \"day\"\ntime = \"09:00\"\n\n[custom_post]\nfiles = \"/definitely/not/here.png\"\n"
        );
        let config = AppConfig::from_toml(&toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_valid_schedule_parsed() {
        let mut image = tempfile::NamedTempFile::new().unwrap();
        image.write_all(b"png").unwrap();

        let toml = format!(
            "{MINIMAL}\n[vkontakte]\ntoken = \"vk\"\ngroup_id = 42\n\n[schedule]\nevery = \"week\"\nday = 3\ntime = \"09:00\"\n\n[custom_post]\nmessage = \"weekly digest\"\nfiles = \"{}\"\n",
            image.path().display()
        );
        let config = AppConfig::from_toml(&toml).unwrap();
        let spec = config.validate().unwrap().unwrap();
        assert_eq!(spec.to_string(), "weekly on Wed at 09:00 (Europe/Moscow)");
        assert_eq!(config.custom_post.file_paths().len(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.feed.channel_id.as_deref(), Some("UC123"));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }
}
