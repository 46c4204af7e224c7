use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{compose_lines, PublishChannel};
use crate::config::TelegramConfig;
use crate::feed::Item;
use crate::{Error, Result};

const CHANNEL_NAME: &str = "telegram";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const LONG_POLL_TIMEOUT_SECS: u64 = 60;
/// Bot API limit on `sendMessage` text
const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
}

/// Telegram Bot API client posting into a channel
pub struct TelegramChannel {
    client: Client,
    api_base: String,
    token: String,
    channel_id: String,
    post_title: String,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            channel_id: config.channel_id.clone(),
            post_title: config.post_title.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Post text: title line, link, item title, description.
    /// The description is shortened so the whole text fits one message.
    pub fn format_message(&self, item: &Item) -> String {
        let head = compose_lines(&[&self.post_title, item.link_or_id(), &item.title]);
        let used = head.chars().count() + usize::from(!head.is_empty());
        let description = truncate_chars(
            item.description.trim(),
            MAX_MESSAGE_CHARS.saturating_sub(used),
        );
        compose_lines(&[&head, &description])
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T> {
        let response: TelegramResponse<T> = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(Error::publish(
                CHANNEL_NAME,
                format!(
                    "{} failed: {}",
                    method,
                    response.description.unwrap_or_else(|| "unknown error".to_string())
                ),
            ));
        }

        response
            .result
            .ok_or_else(|| Error::publish(CHANNEL_NAME, format!("{} returned no result", method)))
    }
}

/// Cut `text` to at most `max` chars, marking the cut with an ellipsis
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }

    let cut = text
        .char_indices()
        .nth(max - 1)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    format!("{}…", text[..cut].trim_end())
}

#[async_trait]
impl PublishChannel for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn publish(&self, item: &Item) -> Result<()> {
        let body = json!({
            "chat_id": self.channel_id,
            "text": self.format_message(item),
        });

        let _: serde_json::Value = self
            .call("sendMessage", &body, Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .await?;

        tracing::info!(external_id = %item.external_id, "Posted to Telegram");
        Ok(())
    }

    fn is_bidirectional(&self) -> bool {
        true
    }

    /// Long-poll `getUpdates` so the bot session stays live. Updates are
    /// acknowledged and otherwise ignored.
    async fn listen(&self) -> Result<()> {
        tracing::info!("Telegram long polling started");
        let mut offset: i64 = 0;

        loop {
            let body = json!({
                "offset": offset,
                "timeout": LONG_POLL_TIMEOUT_SECS,
            });
            let updates: Vec<Update> = self
                .call(
                    "getUpdates",
                    &body,
                    Duration::from_secs(LONG_POLL_TIMEOUT_SECS + REQUEST_TIMEOUT_SECS),
                )
                .await?;

            if let Some(last) = updates.iter().map(|u| u.update_id).max() {
                tracing::debug!(count = updates.len(), "Telegram updates received");
                offset = last + 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(api_base: &str) -> TelegramChannel {
        TelegramChannel::new(&TelegramConfig {
            token: "TOKEN".to_string(),
            channel_id: "@news".to_string(),
            post_title: "New video!".to_string(),
            api_base: api_base.to_string(),
        })
        .unwrap()
    }

    fn item() -> Item {
        Item {
            external_id: "vid1".to_string(),
            title: "Episode 1".to_string(),
            description: "About things".to_string(),
            preview_url: None,
            link: Some("https://youtu.be/vid1".to_string()),
            published_at: None,
            dispatched: false,
        }
    }

    #[test]
    fn test_format_message() {
        let tg = channel("https://api.telegram.org");
        assert_eq!(
            tg.format_message(&item()),
            "New video!\nhttps://youtu.be/vid1\nEpisode 1\nAbout things"
        );
    }

    #[test]
    fn test_long_description_fits_message_limit() {
        let tg = channel("https://api.telegram.org");
        let mut long = item();
        long.description = "é".repeat(5000);

        let text = tg.format_message(&long);
        assert_eq!(text.chars().count(), MAX_MESSAGE_CHARS);
        assert!(text.starts_with("New video!\nhttps://youtu.be/vid1\nEpisode 1\néé"));
        assert!(text.ends_with("é…"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 4), "abc…");
        assert_eq!(truncate_chars("ab  cdef", 4), "ab…");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[tokio::test]
    async fn test_publish_sends_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": "@news" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": true, "result": { "message_id": 1 } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        channel(&server.uri()).publish(&item()).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({ "ok": false, "description": "Bad Request: chat not found" }),
            ))
            .mount(&server)
            .await;

        let err = channel(&server.uri()).publish(&item()).await.unwrap_err();
        assert!(matches!(err, Error::Publish { .. }));
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn test_listen_returns_on_api_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                json!({ "ok": false, "description": "Unauthorized" }),
            ))
            .mount(&server)
            .await;

        let result = channel(&server.uri()).listen().await;
        assert!(result.is_err());
    }
}
