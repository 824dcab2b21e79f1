//! X (Twitter) publisher: chunked media upload plus tweet creation.
//!
//! Every media asset walks the INIT → APPEND → FINALIZE state machine; when
//! FINALIZE reports asynchronous processing, the uploader polls STATUS with
//! the provider-suggested delay until the asset is ready or the poll bound is
//! hit. Every request is re-signed because the OAuth nonce and timestamp
//! change per request.
//!
//! The HTTP transitions live behind [`MediaEndpoint`] so the state machine
//! itself is exercised in tests with a scripted endpoint.

use crate::caption::build_x_caption;
use crate::errors::PublishError;
use crate::models::{CardImages, EnrichedArticle};
use crate::publish::Publisher;
use crate::publish::oauth::{OAuth1Credentials, nonce, sign_request};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

const UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
const TWEET_URL: &str = "https://api.twitter.com/2/tweets";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// STATUS polls allowed before the upload is declared timed out.
const MAX_STATUS_POLLS: usize = 10;
/// Poll delay when the provider does not suggest one.
const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(5);

/// Lifecycle of one media asset within a single publish attempt.
///
/// Ephemeral; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPhase {
    Init,
    Appended,
    Finalized,
    Processing,
    Ready,
    Failed,
}

/// Asynchronous processing status reported by FINALIZE and STATUS.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingInfo {
    pub state: String,
    #[serde(default)]
    pub check_after_secs: Option<u64>,
}

/// The four signed transitions of the upload protocol.
#[async_trait]
pub trait MediaEndpoint: Send + Sync {
    /// Declare size and type; returns the new media id.
    async fn init(&self, total_bytes: usize) -> Result<String, PublishError>;

    /// Stream one binary segment.
    async fn append(
        &self,
        media_id: &str,
        segment_index: usize,
        payload: &[u8],
    ) -> Result<(), PublishError>;

    /// Close the upload; `Some` means server-side processing is pending.
    async fn finalize(&self, media_id: &str) -> Result<Option<ProcessingInfo>, PublishError>;

    /// Current processing status for a finalized upload.
    async fn status(&self, media_id: &str) -> Result<ProcessingInfo, PublishError>;
}

/// Run the full upload state machine for one image; returns the ready media id.
#[instrument(level = "info", skip_all, fields(bytes = payload.len()))]
pub async fn upload_media<E: MediaEndpoint>(
    endpoint: &E,
    payload: &[u8],
) -> Result<String, PublishError> {
    let media_id = endpoint.init(payload.len()).await?;
    let mut phase = MediaPhase::Init;
    debug!(%media_id, ?phase, "Media upload started");

    endpoint.append(&media_id, 0, payload).await?;
    phase = MediaPhase::Appended;
    debug!(%media_id, ?phase, "Segment appended");

    let processing = endpoint.finalize(&media_id).await?;
    phase = MediaPhase::Finalized;
    debug!(%media_id, ?phase, "Upload finalized");

    let Some(mut info) = processing else {
        // No processing_info means the asset is immediately usable.
        info!(%media_id, "Media ready without processing");
        return Ok(media_id);
    };

    phase = MediaPhase::Processing;
    debug!(%media_id, ?phase, "Awaiting server-side processing");
    let mut polls = 0usize;
    loop {
        match info.state.as_str() {
            "succeeded" => {
                phase = MediaPhase::Ready;
                info!(%media_id, ?phase, polls, "Media processing finished");
                return Ok(media_id);
            }
            "failed" => {
                phase = MediaPhase::Failed;
                debug!(%media_id, ?phase, "Media processing failed");
                return Err(PublishError::MediaUpload {
                    phase: "processing".to_string(),
                    detail: format!("media {media_id} processing failed"),
                });
            }
            _ => {
                if polls >= MAX_STATUS_POLLS {
                    return Err(PublishError::ProcessingTimeout {
                        media_id,
                        attempts: polls,
                    });
                }
                let delay = info
                    .check_after_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_POLL_DELAY);
                debug!(%media_id, state = %info.state, ?delay, polls, "Media still processing");
                sleep(delay).await;
                polls += 1;
                info = endpoint.status(&media_id).await?;
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    media_id_string: String,
    #[serde(default)]
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    processing_info: Option<ProcessingInfo>,
}

/// Production [`MediaEndpoint`] issuing OAuth1-signed requests.
pub struct SignedMediaEndpoint {
    client: reqwest::Client,
    credentials: OAuth1Credentials,
}

impl SignedMediaEndpoint {
    pub fn new(client: reqwest::Client, credentials: OAuth1Credentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    fn auth_header(&self, method: &str, url: &str, params: &[(&str, &str)]) -> String {
        sign_request(
            method,
            url,
            params,
            &self.credentials,
            &nonce(),
            Utc::now().timestamp() as u64,
        )
    }

    async fn upload_form(
        &self,
        step: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, PublishError> {
        let auth = self.auth_header("POST", UPLOAD_URL, params);
        let response = self
            .client
            .post(UPLOAD_URL)
            .timeout(HTTP_TIMEOUT)
            .header(reqwest::header::AUTHORIZATION, auth)
            .form(params)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::MediaUpload {
                phase: step.to_string(),
                detail: format!("{status}: {body}"),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl MediaEndpoint for SignedMediaEndpoint {
    async fn init(&self, total_bytes: usize) -> Result<String, PublishError> {
        let total = total_bytes.to_string();
        let params: [(&str, &str); 4] = [
            ("command", "INIT"),
            ("total_bytes", &total),
            ("media_type", "image/png"),
            ("media_category", "tweet_image"),
        ];
        let response = self.upload_form("init", &params).await?;
        let parsed: UploadResponse = response.json().await?;
        Ok(parsed.media_id_string)
    }

    async fn append(
        &self,
        media_id: &str,
        segment_index: usize,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        // Multipart body parameters are excluded from the OAuth signature.
        let auth = self.auth_header("POST", UPLOAD_URL, &[]);
        let part = reqwest::multipart::Part::bytes(payload.to_vec())
            .file_name("image.png")
            .mime_str("image/png")
            .map_err(|e| PublishError::MediaUpload {
                phase: "append".to_string(),
                detail: e.to_string(),
            })?;
        let form = reqwest::multipart::Form::new()
            .text("command", "APPEND")
            .text("media_id", media_id.to_string())
            .text("segment_index", segment_index.to_string())
            .part("media", part);

        let response = self
            .client
            .post(UPLOAD_URL)
            .timeout(HTTP_TIMEOUT)
            .header(reqwest::header::AUTHORIZATION, auth)
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::MediaUpload {
                phase: "append".to_string(),
                detail: format!("{status}: {body}"),
            });
        }
        Ok(())
    }

    async fn finalize(&self, media_id: &str) -> Result<Option<ProcessingInfo>, PublishError> {
        let params: [(&str, &str); 2] = [("command", "FINALIZE"), ("media_id", media_id)];
        let response = self.upload_form("finalize", &params).await?;
        let parsed: UploadResponse = response.json().await?;
        Ok(parsed.processing_info)
    }

    async fn status(&self, media_id: &str) -> Result<ProcessingInfo, PublishError> {
        let params: [(&str, &str); 2] = [("command", "STATUS"), ("media_id", media_id)];
        let auth = self.auth_header("GET", UPLOAD_URL, &params);
        let response = self
            .client
            .get(UPLOAD_URL)
            .timeout(HTTP_TIMEOUT)
            .header(reqwest::header::AUTHORIZATION, auth)
            .query(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::MediaUpload {
                phase: "status".to_string(),
                detail: format!("{status}: {body}"),
            });
        }
        let parsed: StatusResponse = response.json().await?;
        parsed
            .processing_info
            .ok_or_else(|| PublishError::MediaUpload {
                phase: "status".to_string(),
                detail: "STATUS response missing processing_info".to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

/// X publisher: uploads both language cards, then posts one tweet carrying both.
pub struct XPublisher<E> {
    endpoint: E,
    client: reqwest::Client,
    credentials: OAuth1Credentials,
}

impl XPublisher<SignedMediaEndpoint> {
    pub fn new(client: reqwest::Client, credentials: OAuth1Credentials) -> Self {
        Self {
            endpoint: SignedMediaEndpoint::new(client.clone(), credentials.clone()),
            client,
            credentials,
        }
    }
}

impl<E: MediaEndpoint> XPublisher<E> {
    async fn post_tweet(
        &self,
        caption: &str,
        media_ids: [String; 2],
    ) -> Result<String, PublishError> {
        // JSON bodies contribute no parameters to the signature base.
        let auth = sign_request(
            "POST",
            TWEET_URL,
            &[],
            &self.credentials,
            &nonce(),
            Utc::now().timestamp() as u64,
        );
        let body = serde_json::json!({
            "text": caption,
            "media": { "media_ids": media_ids }
        });

        let response = self
            .client
            .post(TWEET_URL)
            .timeout(HTTP_TIMEOUT)
            .header(reqwest::header::AUTHORIZATION, auth)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected { status, body });
        }
        let parsed: TweetResponse = response.json().await?;
        Ok(parsed.data.id)
    }
}

#[async_trait]
impl<E: MediaEndpoint> Publisher for XPublisher<E> {
    fn name(&self) -> &'static str {
        "x"
    }

    #[instrument(level = "info", skip_all, fields(title = %item.article.title))]
    async fn publish(
        &self,
        item: &EnrichedArticle,
        images: &CardImages,
    ) -> Result<String, PublishError> {
        // Both uploads are independent; run them concurrently and require
        // both to be ready before composing the tweet.
        let (en_media, ar_media) = tokio::try_join!(
            upload_media(&self.endpoint, &images.en_png),
            upload_media(&self.endpoint, &images.ar_png),
        )?;

        let caption = build_x_caption(&item.enriched);
        let tweet_id = self.post_tweet(&caption, [en_media, ar_media]).await?;
        info!(%tweet_id, "Posted to X");
        Ok(tweet_id)
    }
}
