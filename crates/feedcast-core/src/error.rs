use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed fetch error: {0}")]
    FeedFetch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Item already stored: {0}")]
    DuplicateKey(String),

    #[error("Publish to {channel} failed: {message}")]
    Publish { channel: String, message: String },

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a publish error for the named channel
    pub fn publish(channel: &str, message: impl Into<String>) -> Self {
        Error::Publish {
            channel: channel.to_string(),
            message: message.into(),
        }
    }

    /// Duplicate keys are expected when reconciling races and never fatal
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Error::DuplicateKey(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
