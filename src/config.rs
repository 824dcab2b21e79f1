//! Typed application configuration loaded from a YAML file.
//!
//! All credentials and endpoints are injected here; the pipeline core never
//! reads the environment directly. Platform sections are optional so a run
//! can be configured as draft-only without any platform secrets present.

use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Gemini enrichment settings, including the credential pool used for
/// rotation on rate limiting.
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    /// API keys tried round-robin when the provider returns 429.
    pub api_keys: Vec<String>,
    /// Delay between article enrichment calls, in seconds.
    #[serde(default = "default_inter_call_delay")]
    pub inter_call_delay_secs: u64,
    /// Total attempts per article before giving up on rate limiting.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Base for the linear backoff between rate-limited attempts, in seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
}

fn default_inter_call_delay() -> u64 {
    30
}

fn default_max_attempts() -> usize {
    4
}

fn default_backoff_base() -> u64 {
    15
}

/// OAuth 1.0a credentials for the X API.
#[derive(Debug, Clone, Deserialize)]
pub struct XConfig {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

/// Instagram Graph API credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct InstagramConfig {
    pub access_token: String,
    pub account_id: String,
    /// API key for the intermediate public image host.
    pub image_host_key: String,
}

/// Remote history object store endpoints.
///
/// `object_url` is GET/PUT directly; the bearer token is fetched from
/// `token_url` (an instance metadata endpoint returning `{"access_token"}`).
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteHistoryConfig {
    pub object_url: String,
    pub token_url: String,
}

/// Posted-history persistence settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Local JSON cache, used as the fallback store.
    #[serde(default = "default_history_path")]
    pub local_path: String,
    /// Remote object store; omit to run local-only.
    #[serde(default)]
    pub remote: Option<RemoteHistoryConfig>,
}

fn default_history_path() -> String {
    "/tmp/tasi_pulse_history.json".to_string()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            local_path: default_history_path(),
            remote: None,
        }
    }
}

/// External card renderer invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct RendererConfig {
    /// Command run per article; receives enriched JSON on stdin and must
    /// print the EN and AR PNG paths, one per line.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub x: Option<XConfig>,
    #[serde(default)]
    pub instagram: Option<InstagramConfig>,
    #[serde(default)]
    pub history: HistoryConfig,
    pub renderer: RendererConfig,
    /// Where draft posts are written when draft publishing is enabled.
    #[serde(default = "default_drafts_dir")]
    pub drafts_dir: String,
    /// How many articles one run selects for enrichment.
    #[serde(default = "default_article_limit")]
    pub article_limit: usize,
}

fn default_drafts_dir() -> String {
    "/tmp/drafts".to_string()
}

fn default_article_limit() -> usize {
    3
}

impl AppConfig {
    /// Load and parse the YAML config file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_yaml::from_str(&raw)?;
        if config.gemini.api_keys.is_empty() {
            return Err("config: gemini.api_keys must not be empty".into());
        }
        info!(
            path = %path.display(),
            gemini_keys = config.gemini.api_keys.len(),
            x = config.x.is_some(),
            instagram = config.instagram.is_some(),
            remote_history = config.history.remote.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }
}
