//! Draft publisher: writes cards and captions to local files.
//!
//! Used as the fallback destination when live platforms are disabled or
//! unavailable. A draft counts as a publish success for history purposes;
//! the operator posts the files manually.

use crate::caption::{build_instagram_caption, build_x_caption};
use crate::errors::PublishError;
use crate::models::{CardImages, EnrichedArticle};
use crate::publish::Publisher;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, instrument};

/// Writes each article's cards and captions to a drafts directory.
pub struct DraftPublisher {
    dir: PathBuf,
    counter: AtomicUsize,
}

impl DraftPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicUsize::new(0),
        }
    }

    /// Remove leftovers from the previous run and recreate the directory.
    /// Called once at run start, before any article is processed.
    pub async fn prepare(&self) -> Result<(), PublishError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    fn caption_file_body(item: &EnrichedArticle) -> String {
        let mut body = String::new();
        let _ = writeln!(body, "=== X ===");
        let _ = writeln!(body, "{}", build_x_caption(&item.enriched));
        let _ = writeln!(body);
        let _ = writeln!(body, "=== Instagram ===");
        let _ = writeln!(body, "{}", build_instagram_caption(&item.enriched));
        if !item.enriched.key_points_en.is_empty() {
            let _ = writeln!(body);
            let _ = writeln!(body, "Key points:");
            for point in &item.enriched.key_points_en {
                let _ = writeln!(body, "- {point}");
            }
        }
        let _ = writeln!(body);
        let _ = writeln!(body, "Source: {}", item.article.source);
        if item.article.has_url() {
            let _ = writeln!(body, "{}", item.article.url);
        }
        body
    }

    fn paths(&self, index: usize) -> (PathBuf, PathBuf, PathBuf) {
        (
            self.dir.join(format!("draft_{index}_EN.png")),
            self.dir.join(format!("draft_{index}_AR.png")),
            self.dir.join(format!("draft_{index}_caption.txt")),
        )
    }
}

#[async_trait]
impl Publisher for DraftPublisher {
    fn name(&self) -> &'static str {
        "draft"
    }

    #[instrument(skip(self, item, images), fields(title = %item.article.title))]
    async fn publish(
        &self,
        item: &EnrichedArticle,
        images: &CardImages,
    ) -> Result<String, PublishError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let (en_path, ar_path, caption_path) = self.paths(index);

        tokio::fs::write(&en_path, &images.en_png).await?;
        tokio::fs::write(&ar_path, &images.ar_png).await?;
        tokio::fs::write(&caption_path, Self::caption_file_body(item)).await?;

        info!(dir = %self.dir.display(), index, "Draft files written");
        Ok(format!("draft_{index}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Article, EnrichedContent};
    use chrono::Utc;

    fn sample_item() -> EnrichedArticle {
        EnrichedArticle {
            article: Article {
                id: "Argaam-0-1700000000000".to_string(),
                title: "SABIC Q2 results".to_string(),
                description: "desc".to_string(),
                source: "Argaam".to_string(),
                url: "https://example.com/sabic".to_string(),
                date: Utc::now(),
                category: "General".to_string(),
            },
            enriched: EnrichedContent {
                headline_en: "SABIC posts profit".to_string(),
                headline_ar: "سابك تحقق أرباحاً".to_string(),
                summary_en: "s".to_string(),
                summary_ar: "س".to_string(),
                key_points_en: vec!["Net profit up 12%".to_string()],
                key_points_ar: vec!["صافي الربح يرتفع".to_string()],
                caption_en: "SABIC profit up #TASI".to_string(),
                caption_ar: "أرباح سابك ترتفع".to_string(),
                figures: vec![],
            },
        }
    }

    fn temp_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "tasi_pulse_drafts_{label}_{}",
            std::process::id()
        ))
    }

    #[tokio::test]
    async fn test_writes_images_and_caption() {
        let dir = temp_dir("write");
        let publisher = DraftPublisher::new(&dir);
        publisher.prepare().await.unwrap();

        let images = CardImages {
            en_png: vec![0x89, 0x50],
            ar_png: vec![0x89, 0x51],
        };
        let id = publisher.publish(&sample_item(), &images).await.unwrap();
        assert_eq!(id, "draft_1");

        let en = tokio::fs::read(dir.join("draft_1_EN.png")).await.unwrap();
        assert_eq!(en, vec![0x89, 0x50]);
        let caption = tokio::fs::read_to_string(dir.join("draft_1_caption.txt"))
            .await
            .unwrap();
        assert!(caption.contains("SABIC profit up #TASI"));
        assert!(caption.contains("أرباح سابك ترتفع"));
        assert!(caption.contains("Net profit up 12%"));
        assert!(caption.contains("https://example.com/sabic"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_indices_increase_per_article() {
        let dir = temp_dir("indices");
        let publisher = DraftPublisher::new(&dir);
        publisher.prepare().await.unwrap();

        let images = CardImages {
            en_png: vec![1],
            ar_png: vec![2],
        };
        let item = sample_item();
        assert_eq!(publisher.publish(&item, &images).await.unwrap(), "draft_1");
        assert_eq!(publisher.publish(&item, &images).await.unwrap(), "draft_2");
        assert!(dir.join("draft_2_AR.png").exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_prepare_clears_previous_run() {
        let dir = temp_dir("clear");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("draft_9_EN.png"), b"old")
            .await
            .unwrap();

        let publisher = DraftPublisher::new(&dir);
        publisher.prepare().await.unwrap();
        assert!(!dir.join("draft_9_EN.png").exists());
        assert!(dir.exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[test]
    fn test_caption_body_omits_placeholder_url() {
        let mut item = sample_item();
        item.article.url = "#".to_string();
        let body = DraftPublisher::caption_file_body(&item);
        assert!(!body.contains('#') || !body.lines().any(|l| l.trim() == "#"));
        assert!(body.contains("Source: Argaam"));
    }
}
