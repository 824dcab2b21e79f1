//! Instagram publisher: hosted-image carousel via the Graph API.
//!
//! Instagram's API cannot accept raw image bytes; each card PNG is first
//! uploaded to an intermediate image host, then referenced by URL in a
//! carousel item container. Containers process asynchronously, so each one
//! is polled until it reports `FINISHED` before the carousel parent is
//! created and published.
//!
//! All Graph API traffic goes through the [`InstagramApi`] trait so the
//! container state machine can be driven by a scripted fake in tests.

use crate::caption::build_instagram_caption;
use crate::config::InstagramConfig;
use crate::errors::PublishError;
use crate::models::{CardImages, EnrichedArticle};
use crate::publish::Publisher;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const GRAPH_API_BASE: &str = "https://graph.instagram.com/v21.0";
const IMAGE_HOST_URL: &str = "https://api.imgbb.com/1/upload";
const GRAPH_TIMEOUT: Duration = Duration::from_secs(30);
const IMAGE_HOST_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound on container status polls before giving up on one container.
pub const MAX_CONTAINER_POLLS: usize = 12;
/// Delay between consecutive container status polls.
pub const CONTAINER_POLL_DELAY: Duration = Duration::from_secs(3);

/// Processing state reported by a media container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    Finished,
    InProgress,
    Error(String),
}

impl ContainerStatus {
    fn from_code(code: &str) -> Self {
        match code {
            "FINISHED" | "PUBLISHED" => ContainerStatus::Finished,
            "ERROR" | "EXPIRED" => ContainerStatus::Error(code.to_string()),
            _ => ContainerStatus::InProgress,
        }
    }
}

/// The Graph API surface the publisher needs, plus the image-host hop.
#[async_trait]
pub trait InstagramApi: Send + Sync {
    /// Upload raw PNG bytes to the intermediate host; returns a public URL.
    async fn host_image(&self, png: &[u8]) -> Result<String, PublishError>;

    /// Create one carousel item container for a hosted image URL.
    async fn create_item_container(&self, image_url: &str) -> Result<String, PublishError>;

    /// Read a container's processing status.
    async fn container_status(&self, container_id: &str) -> Result<ContainerStatus, PublishError>;

    /// Create the carousel parent container over finished children.
    async fn create_carousel_container(
        &self,
        children: &[String],
        caption: &str,
    ) -> Result<String, PublishError>;

    /// Publish a finished container; returns the media (post) identifier.
    async fn publish_container(&self, creation_id: &str) -> Result<String, PublishError>;
}

/// Poll one container until it reaches a terminal state.
///
/// `ERROR`/`EXPIRED` is fatal for the article on this platform; a container
/// still in progress after [`MAX_CONTAINER_POLLS`] polls times out.
async fn wait_for_container<A: InstagramApi + ?Sized>(
    api: &A,
    container_id: &str,
    poll_delay: Duration,
) -> Result<(), PublishError> {
    for attempt in 1..=MAX_CONTAINER_POLLS {
        tokio::time::sleep(poll_delay).await;
        match api.container_status(container_id).await? {
            ContainerStatus::Finished => {
                debug!(%container_id, attempt, "Container finished processing");
                return Ok(());
            }
            ContainerStatus::InProgress => {
                debug!(%container_id, attempt, "Container still processing");
            }
            ContainerStatus::Error(code) => {
                return Err(PublishError::Container {
                    id: container_id.to_string(),
                    detail: code,
                });
            }
        }
    }
    Err(PublishError::ContainerTimeout {
        id: container_id.to_string(),
        attempts: MAX_CONTAINER_POLLS,
    })
}

#[derive(Debug, Deserialize)]
struct ImageHostData {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ImageHostResponse {
    data: ImageHostData,
}

#[derive(Debug, Deserialize)]
struct ContainerResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status_code: String,
}

/// Live [`InstagramApi`] backed by reqwest against the Graph API and imgbb.
pub struct GraphClient {
    client: reqwest::Client,
    access_token: String,
    account_id: String,
    image_host_key: String,
}

impl GraphClient {
    pub fn new(client: reqwest::Client, config: &InstagramConfig) -> Self {
        Self {
            client,
            access_token: config.access_token.clone(),
            account_id: config.account_id.clone(),
            image_host_key: config.image_host_key.clone(),
        }
    }

    async fn post_media(
        &self,
        params: &[(&str, &str)],
    ) -> Result<ContainerResponse, PublishError> {
        let url = format!("{GRAPH_API_BASE}/{}/media", self.account_id);
        let response = self
            .client
            .post(&url)
            .timeout(GRAPH_TIMEOUT)
            .form(params)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected { status, body });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl InstagramApi for GraphClient {
    async fn host_image(&self, png: &[u8]) -> Result<String, PublishError> {
        let encoded = STANDARD.encode(png);
        let response = self
            .client
            .post(IMAGE_HOST_URL)
            .timeout(IMAGE_HOST_TIMEOUT)
            .form(&[("key", self.image_host_key.as_str()), ("image", &encoded)])
            .send()
            .await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::ImageHost(body));
        }
        let parsed: ImageHostResponse = response
            .json()
            .await
            .map_err(|e| PublishError::ImageHost(e.to_string()))?;
        Ok(parsed.data.url)
    }

    async fn create_item_container(&self, image_url: &str) -> Result<String, PublishError> {
        let response = self
            .post_media(&[
                ("image_url", image_url),
                ("is_carousel_item", "true"),
                ("access_token", &self.access_token),
            ])
            .await?;
        Ok(response.id)
    }

    async fn container_status(&self, container_id: &str) -> Result<ContainerStatus, PublishError> {
        let url = format!("{GRAPH_API_BASE}/{container_id}");
        let response = self
            .client
            .get(&url)
            .timeout(GRAPH_TIMEOUT)
            .query(&[
                ("fields", "status_code"),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Container {
                id: container_id.to_string(),
                detail: body,
            });
        }
        let parsed: StatusResponse = response.json().await?;
        Ok(ContainerStatus::from_code(&parsed.status_code))
    }

    async fn create_carousel_container(
        &self,
        children: &[String],
        caption: &str,
    ) -> Result<String, PublishError> {
        let children_csv = children.join(",");
        let response = self
            .post_media(&[
                ("media_type", "CAROUSEL"),
                ("children", &children_csv),
                ("caption", caption),
                ("access_token", &self.access_token),
            ])
            .await?;
        Ok(response.id)
    }

    async fn publish_container(&self, creation_id: &str) -> Result<String, PublishError> {
        let url = format!("{GRAPH_API_BASE}/{}/media_publish", self.account_id);
        let response = self
            .client
            .post(&url)
            .timeout(GRAPH_TIMEOUT)
            .form(&[
                ("creation_id", creation_id),
                ("access_token", &self.access_token),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected { status, body });
        }
        let parsed: ContainerResponse = response.json().await?;
        Ok(parsed.id)
    }
}

/// Publishes one article as a two-slide carousel (EN card, then AR card).
pub struct InstagramPublisher<A: InstagramApi> {
    api: A,
    poll_delay: Duration,
}

impl<A: InstagramApi> InstagramPublisher<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            poll_delay: CONTAINER_POLL_DELAY,
        }
    }

    #[cfg(test)]
    fn with_poll_delay(api: A, poll_delay: Duration) -> Self {
        Self { api, poll_delay }
    }
}

impl InstagramPublisher<GraphClient> {
    pub fn from_config(client: reqwest::Client, config: &InstagramConfig) -> Self {
        Self::new(GraphClient::new(client, config))
    }
}

#[async_trait]
impl<A: InstagramApi> Publisher for InstagramPublisher<A> {
    fn name(&self) -> &'static str {
        "instagram"
    }

    #[instrument(skip(self, item, images), fields(title = %item.article.title))]
    async fn publish(
        &self,
        item: &EnrichedArticle,
        images: &CardImages,
    ) -> Result<String, PublishError> {
        let (en_url, ar_url) = tokio::try_join!(
            self.api.host_image(&images.en_png),
            self.api.host_image(&images.ar_png),
        )?;
        debug!(%en_url, %ar_url, "Card images hosted");

        let mut children = Vec::with_capacity(2);
        for image_url in [&en_url, &ar_url] {
            let container_id = self.api.create_item_container(image_url).await?;
            if let Err(e) = wait_for_container(&self.api, &container_id, self.poll_delay).await {
                warn!(%container_id, error = %e, "Carousel item container failed");
                return Err(e);
            }
            children.push(container_id);
        }

        let caption = build_instagram_caption(&item.enriched);
        let carousel_id = self
            .api
            .create_carousel_container(&children, &caption)
            .await?;
        wait_for_container(&self.api, &carousel_id, self.poll_delay).await?;

        let post_id = self.api.publish_container(&carousel_id).await?;
        info!(%post_id, "Published Instagram carousel");
        Ok(post_id)
    }
}
