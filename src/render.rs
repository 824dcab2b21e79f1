//! Card rendering via an external renderer process.
//!
//! Card layout (fonts, RTL shaping, chart styling) lives in a separate tool;
//! this module only defines the process contract: the enriched article is
//! written to the renderer's stdin as JSON, and the renderer prints two PNG
//! file paths on stdout, English card first, Arabic card second.

use crate::config::RendererConfig;
use crate::errors::PublishError;
use crate::models::{CardImages, EnrichedArticle};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Produces the bilingual card images for one enriched article.
#[async_trait]
pub trait CardRenderer: Send + Sync {
    async fn render(&self, item: &EnrichedArticle) -> Result<CardImages, PublishError>;
}

/// [`CardRenderer`] that shells out to a configured command.
pub struct CommandRenderer {
    command: String,
    args: Vec<String>,
}

impl CommandRenderer {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

fn renderer_error(detail: String) -> PublishError {
    PublishError::Io(std::io::Error::other(detail))
}

#[async_trait]
impl CardRenderer for CommandRenderer {
    #[instrument(skip(self, item), fields(title = %item.article.title))]
    async fn render(&self, item: &EnrichedArticle) -> Result<CardImages, PublishError> {
        let payload = serde_json::json!({
            "article": &item.article,
            "content": &item.enriched,
        });

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(payload.to_string().as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(renderer_error(format!(
                "renderer exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut paths = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
        let en_path = paths
            .next()
            .ok_or_else(|| renderer_error("renderer printed no card paths".to_string()))?;
        let ar_path = paths
            .next()
            .ok_or_else(|| renderer_error("renderer printed only one card path".to_string()))?;
        debug!(%en_path, %ar_path, "Renderer produced cards");

        let en_png = tokio::fs::read(en_path).await?;
        let ar_png = tokio::fs::read(ar_path).await?;
        Ok(CardImages { en_png, ar_png })
    }
}
