use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::ScheduledJob;
use crate::channels::VkontakteChannel;
use crate::config::CustomPostConfig;
use crate::Result;

/// Publishes the configured custom post (message and images) to the VK wall
pub struct CustomPostJob {
    vk: Arc<VkontakteChannel>,
    message: Option<String>,
    files: Vec<PathBuf>,
}

impl CustomPostJob {
    pub fn new(vk: Arc<VkontakteChannel>, config: &CustomPostConfig) -> Self {
        Self {
            vk,
            message: config.message().map(str::to_string),
            files: config.file_paths(),
        }
    }
}

#[async_trait]
impl ScheduledJob for CustomPostJob {
    fn name(&self) -> &str {
        "custom-post"
    }

    async fn run(&self) -> Result<()> {
        let post_id = self
            .vk
            .post_custom(self.message.as_deref(), &self.files)
            .await?;
        tracing::info!(post_id, "Scheduled custom post published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VkontakteConfig;
    use crate::Error;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn vk(api_base: &str) -> Arc<VkontakteChannel> {
        Arc::new(
            VkontakteChannel::new(&VkontakteConfig {
                token: "vk-token".to_string(),
                group_id: 42,
                post_title: String::new(),
                api_base: api_base.to_string(),
                api_version: "5.199".to_string(),
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_message_only_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wall.post"))
            .and(body_string_contains("message=Friday+digest"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "response": { "post_id": 3 } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let job = CustomPostJob::new(
            vk(&server.uri()),
            &CustomPostConfig {
                message: Some("Friday digest".to_string()),
                files: Some(" , ".to_string()),
            },
        );
        assert_eq!(job.name(), "custom-post");
        job.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_fails_run() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/photos.getWallUploadServer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": { "upload_url": format!("{}/upload", server.uri()) }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/wall.post"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "response": { "post_id": 3 } })),
            )
            .expect(0)
            .mount(&server)
            .await;

        let job = CustomPostJob::new(
            vk(&server.uri()),
            &CustomPostConfig {
                message: None,
                files: Some("/definitely/not/here.png".to_string()),
            },
        );
        let err = job.run().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
