use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{compose_lines, PublishChannel};
use crate::config::VkontakteConfig;
use crate::feed::Item;
use crate::{Error, Result};

const CHANNEL_NAME: &str = "vkontakte";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const LONG_POLL_WAIT_SECS: u64 = 25;

#[derive(Deserialize)]
struct VkResponse<T> {
    response: Option<T>,
    error: Option<VkError>,
}

#[derive(Deserialize)]
struct VkError {
    error_code: i64,
    error_msg: String,
}

#[derive(Deserialize)]
struct WallPostResponse {
    post_id: i64,
}

#[derive(Deserialize)]
struct UploadServer {
    upload_url: String,
}

#[derive(Deserialize)]
struct UploadedPhoto {
    server: i64,
    photo: String,
    hash: String,
}

#[derive(Deserialize)]
struct SavedPhoto {
    id: i64,
    owner_id: i64,
}

#[derive(Deserialize)]
struct LongPollServer {
    key: String,
    server: String,
    ts: Value,
}

#[derive(Deserialize)]
struct LongPollEvents {
    ts: Option<Value>,
    #[serde(default)]
    updates: Vec<Value>,
    failed: Option<i64>,
}

/// VK API client posting to a community wall
pub struct VkontakteChannel {
    client: Client,
    api_base: String,
    token: String,
    group_id: i64,
    post_title: String,
    api_version: String,
}

/// `ts` comes back as a string or a number depending on the endpoint
fn ts_to_string(ts: &Value) -> String {
    match ts {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl VkontakteChannel {
    pub fn new(config: &VkontakteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            group_id: config.group_id,
            post_title: config.post_title.clone(),
            api_version: config.api_version.clone(),
        })
    }

    /// Wall owner id: communities are addressed with a negative id
    fn owner_id(&self) -> i64 {
        -self.group_id
    }

    /// Post text: title line, item title, description (the link goes in attachments)
    pub fn format_message(&self, item: &Item) -> String {
        compose_lines(&[&self.post_title, &item.title, &item.description])
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, String)]) -> Result<T> {
        let mut form: Vec<(&str, String)> = params.to_vec();
        form.push(("access_token", self.token.clone()));
        form.push(("v", self.api_version.clone()));

        let response: VkResponse<T> = self
            .client
            .post(format!("{}/{}", self.api_base, method))
            .form(&form)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(Error::publish(
                CHANNEL_NAME,
                format!("{} failed ({}): {}", method, error.error_code, error.error_msg),
            ));
        }

        response
            .response
            .ok_or_else(|| Error::publish(CHANNEL_NAME, format!("{} returned no response", method)))
    }

    async fn wall_post(&self, message: Option<&str>, attachments: &[String]) -> Result<i64> {
        let mut params = vec![
            ("owner_id", self.owner_id().to_string()),
            ("from_group", "1".to_string()),
        ];
        if let Some(message) = message {
            params.push(("message", message.to_string()));
        }
        if !attachments.is_empty() {
            params.push(("attachments", attachments.join(",")));
        }

        let posted: WallPostResponse = self.call("wall.post", &params).await?;
        Ok(posted.post_id)
    }

    /// Upload an image to the community wall album, returning its attachment id
    async fn upload_wall_photo(&self, file: &Path) -> Result<String> {
        let server: UploadServer = self
            .call(
                "photos.getWallUploadServer",
                &[("group_id", self.group_id.to_string())],
            )
            .await?;

        let bytes = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo.jpg".to_string());
        let form = Form::new().part("photo", Part::bytes(bytes).file_name(file_name));

        let uploaded: UploadedPhoto = self
            .client
            .post(&server.upload_url)
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;

        let saved: Vec<SavedPhoto> = self
            .call(
                "photos.saveWallPhoto",
                &[
                    ("group_id", self.group_id.to_string()),
                    ("server", uploaded.server.to_string()),
                    ("photo", uploaded.photo),
                    ("hash", uploaded.hash),
                ],
            )
            .await?;

        let photo = saved.first().ok_or_else(|| {
            Error::publish(CHANNEL_NAME, format!("photo {} was not saved", file.display()))
        })?;
        Ok(format!("photo{}_{}", photo.owner_id, photo.id))
    }

    /// Publish a free-form post with optional image attachments
    pub async fn post_custom(&self, message: Option<&str>, files: &[PathBuf]) -> Result<i64> {
        let mut attachments = Vec::with_capacity(files.len());
        for file in files {
            attachments.push(self.upload_wall_photo(file).await?);
            tracing::debug!(file = %file.display(), "Uploaded photo to VK");
        }

        let post_id = self.wall_post(message, &attachments).await?;
        tracing::info!(post_id, attachments = attachments.len(), "Custom post published to VK");
        Ok(post_id)
    }

    async fn long_poll_server(&self) -> Result<LongPollServer> {
        self.call(
            "groups.getLongPollServer",
            &[("group_id", self.group_id.to_string())],
        )
        .await
    }
}

#[async_trait]
impl PublishChannel for VkontakteChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn publish(&self, item: &Item) -> Result<()> {
        let message = self.format_message(item);
        let attachments = vec![item.link_or_id().to_string()];
        let post_id = self.wall_post(Some(&message), &attachments).await?;

        tracing::info!(external_id = %item.external_id, post_id, "Posted to VK");
        Ok(())
    }

    fn is_bidirectional(&self) -> bool {
        true
    }

    /// Bots Long Poll session. Events are consumed and ignored.
    async fn listen(&self) -> Result<()> {
        let mut session = self.long_poll_server().await?;
        let mut ts = ts_to_string(&session.ts);
        tracing::info!("VK long polling started");

        loop {
            let events: LongPollEvents = self
                .client
                .get(&session.server)
                .timeout(Duration::from_secs(LONG_POLL_WAIT_SECS + REQUEST_TIMEOUT_SECS))
                .query(&[
                    ("act", "a_check".to_string()),
                    ("key", session.key.clone()),
                    ("ts", ts.clone()),
                    ("wait", LONG_POLL_WAIT_SECS.to_string()),
                ])
                .send()
                .await?
                .json()
                .await?;

            match events.failed {
                None => {
                    if !events.updates.is_empty() {
                        tracing::debug!(count = events.updates.len(), "VK events received");
                    }
                    if let Some(next) = events.ts {
                        ts = ts_to_string(&next);
                    }
                }
                // History is stale: continue from the ts the server hands back
                Some(1) => {
                    if let Some(next) = events.ts {
                        ts = ts_to_string(&next);
                    }
                }
                // Key expired or information lost: acquire a new session
                Some(2) | Some(3) => {
                    tracing::debug!("VK long poll session expired, reconnecting");
                    session = self.long_poll_server().await?;
                    ts = ts_to_string(&session.ts);
                }
                Some(code) => {
                    return Err(Error::ChannelClosed(format!(
                        "VK long poll failed with code {}",
                        code
                    )));
                }
            }
        }
    }
}
