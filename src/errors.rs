//! Error taxonomy for the pipeline.
//!
//! Failure is granular by design: per-source fetch errors, per-article
//! enrichment errors, and per-platform publish errors are all caught and
//! recorded without aborting the run. Only [`PipelineError`] propagates to
//! the top level and produces a non-zero exit.

use thiserror::Error;

/// Feed fetching failures.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A single source failed; it contributes zero articles.
    #[error("source {name} failed: {reason}")]
    Source { name: String, reason: String },

    /// Every configured source failed; the run cannot proceed.
    #[error("all RSS sources failed to return articles")]
    AllSourcesFailed,
}

/// Per-article enrichment failures.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// HTTP 429 from the provider; retried per policy before surfacing.
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: usize },

    /// The provider returned a response with no extractable text.
    #[error("empty response from model")]
    EmptyResponse,

    /// The model's output did not parse as the expected JSON schema.
    #[error("model returned invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Any non-429 provider or transport error; not retried.
    #[error("provider error: {0}")]
    Provider(String),
}

impl EnrichError {
    /// Only rate limiting is retryable; everything else aborts the article.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, EnrichError::RateLimited { .. })
    }
}

/// Per-article, per-platform publish failures.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A media INIT/APPEND/FINALIZE step failed.
    #[error("media upload failed during {phase}: {detail}")]
    MediaUpload { phase: String, detail: String },

    /// Media processing did not reach a terminal state within the poll bound.
    #[error("media {media_id} still processing after {attempts} status polls")]
    ProcessingTimeout { media_id: String, attempts: usize },

    /// The final post/publish call returned non-2xx; body retained for diagnostics.
    #[error("platform rejected post ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Intermediate image host upload failed.
    #[error("image host upload failed: {0}")]
    ImageHost(String),

    /// A container create/status step failed or reported ERROR.
    #[error("container {id} failed: {detail}")]
    Container { id: String, detail: String },

    /// A container did not reach FINISHED within the poll bound.
    #[error("container {id} timed out after {attempts} polls")]
    ContainerTimeout { id: String, attempts: usize },

    /// Transport-level failure talking to the platform.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Draft output or renderer I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PublishError {
    /// Short machine-readable label for the failing step, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::MediaUpload { .. } => "media_upload",
            PublishError::ProcessingTimeout { .. } => "media_processing_timeout",
            PublishError::Rejected { .. } => "publish_rejected",
            PublishError::ImageHost(_) => "image_host",
            PublishError::Container { .. } => "container",
            PublishError::ContainerTimeout { .. } => "container_timeout",
            PublishError::Http(_) => "http",
            PublishError::Io(_) => "io",
        }
    }
}

/// History persistence failures. Logged as warnings, never fatal to the run.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("remote history store unavailable: {0}")]
    Remote(String),

    #[error("local history cache failed: {0}")]
    Local(#[from] std::io::Error),

    #[error("history payload is not a valid entry list: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Fatal run-level failures; these surface as a non-zero process exit.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no articles fetched: {0}")]
    NoArticles(#[from] FetchError),

    #[error("no articles were successfully enriched")]
    NothingEnriched,

    /// Every article failed on every platform. Carries the per-article
    /// reports so the run summary can still be printed before exiting.
    #[error("no posts were successfully published or drafted")]
    NothingPublished { reports: Vec<crate::models::ArticleReport> },

    #[error("pipeline is already running")]
    AlreadyRunning,
}
