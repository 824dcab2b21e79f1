//! Posted-history persistence with a remote-primary, local-fallback model.
//!
//! The history is a JSON array of [`PostedEntry`] capped at [`MAX_HISTORY`]
//! entries by insertion order. `save` is append-then-cap and persists the
//! capped list as the new full state, i.e. a full overwrite rather than an
//! incremental append. Concurrent writers would race; the pipeline assumes a
//! single writer per run and guards overlapping runs with a reentrancy flag,
//! not a distributed lock.
//!
//! Three implementations of [`HistoryStore`]:
//! - [`LocalHistoryStore`]: JSON file on disk
//! - [`RemoteHistoryStore`]: object-store GET/PUT with a bearer token fetched
//!   from a metadata endpoint
//! - [`FallbackHistoryStore`]: composes the two; reads prefer remote, writes
//!   go to both and succeed as long as the local write lands

use crate::errors::HistoryError;
use crate::models::PostedEntry;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Maximum entries retained; oldest evicted first by append order.
pub const MAX_HISTORY: usize = 200;

/// Durable store of previously posted article identities.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the current history. A missing backing object yields an empty list.
    async fn load(&self) -> Result<Vec<PostedEntry>, HistoryError>;

    /// Append `new_entries` and persist the capped window as the full state.
    async fn save(&self, new_entries: &[PostedEntry]) -> Result<(), HistoryError>;
}

/// Append then keep only the most recent [`MAX_HISTORY`] by insertion order.
///
/// Eviction is FIFO-by-append, not by `posted_at`; entries saved out of
/// chronological order evict accordingly.
pub fn cap_history(mut existing: Vec<PostedEntry>, new_entries: &[PostedEntry]) -> Vec<PostedEntry> {
    existing.extend_from_slice(new_entries);
    let overflow = existing.len().saturating_sub(MAX_HISTORY);
    existing.drain(..overflow);
    existing
}

/// JSON file cache on local disk.
pub struct LocalHistoryStore {
    path: PathBuf,
}

impl LocalHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl HistoryStore for LocalHistoryStore {
    async fn load(&self) -> Result<Vec<PostedEntry>, HistoryError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, new_entries: &[PostedEntry]) -> Result<(), HistoryError> {
        let capped = cap_history(self.load().await.unwrap_or_default(), new_entries);
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec(&capped)?;
        tokio::fs::write(&self.path, json).await?;
        info!(path = %self.path.display(), entries = capped.len(), "Wrote local history");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Object-store backed history reachable via a metadata-derived bearer token.
pub struct RemoteHistoryStore {
    client: reqwest::Client,
    object_url: String,
    token_url: String,
}

const REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

impl RemoteHistoryStore {
    pub fn new(client: reqwest::Client, object_url: String, token_url: String) -> Self {
        Self {
            client,
            object_url,
            token_url,
        }
    }

    /// Fetch a short-lived bearer token from the instance metadata endpoint.
    async fn bearer_token(&self) -> Result<String, HistoryError> {
        let token: MetadataToken = self
            .client
            .get(&self.token_url)
            .header("Metadata-Flavor", "Google")
            .timeout(REMOTE_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| HistoryError::Remote(format!("token fetch: {e}")))?
            .json()
            .await
            .map_err(|e| HistoryError::Remote(format!("token parse: {e}")))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl HistoryStore for RemoteHistoryStore {
    async fn load(&self) -> Result<Vec<PostedEntry>, HistoryError> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .get(&self.object_url)
            .bearer_auth(&token)
            .timeout(REMOTE_TIMEOUT)
            .send()
            .await
            .map_err(|e| HistoryError::Remote(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = response
            .error_for_status()
            .map_err(|e| HistoryError::Remote(e.to_string()))?;
        let entries = response
            .json()
            .await
            .map_err(|e| HistoryError::Remote(format!("object parse: {e}")))?;
        Ok(entries)
    }

    async fn save(&self, new_entries: &[PostedEntry]) -> Result<(), HistoryError> {
        let capped = cap_history(self.load().await.unwrap_or_default(), new_entries);
        let token = self.bearer_token().await?;
        self.client
            .put(&self.object_url)
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(REMOTE_TIMEOUT)
            .json(&capped)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| HistoryError::Remote(e.to_string()))?;
        info!(entries = capped.len(), "Wrote remote history");
        Ok(())
    }
}

/// Remote-primary store with a local cache fallback.
pub struct FallbackHistoryStore<R, L> {
    remote: R,
    local: L,
}

impl<R: HistoryStore, L: HistoryStore> FallbackHistoryStore<R, L> {
    pub fn new(remote: R, local: L) -> Self {
        Self { remote, local }
    }
}

#[async_trait]
impl<R: HistoryStore, L: HistoryStore> HistoryStore for FallbackHistoryStore<R, L> {
    #[instrument(level = "info", skip_all)]
    async fn load(&self) -> Result<Vec<PostedEntry>, HistoryError> {
        match self.remote.load().await {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(error = %e, "Remote history unavailable; reading local cache");
                self.local.load().await
            }
        }
    }

    /// Write both stores. Overall success requires only the local write;
    /// a remote failure is logged as a warning.
    #[instrument(level = "info", skip_all)]
    async fn save(&self, new_entries: &[PostedEntry]) -> Result<(), HistoryError> {
        if let Err(e) = self.remote.save(new_entries).await {
            warn!(error = %e, "Remote history write failed; local cache still updated");
        }
        self.local.save(new_entries).await
    }
}
