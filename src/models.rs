//! Data models for fetched articles, enriched content, and publish results.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`Article`]: Normalized article record produced by the feed fetcher
//! - [`ScoredArticle`]: Article plus its importance score, recomputed per run
//! - [`PostedEntry`]: Durable record of a previously published article
//! - [`EnrichedContent`]: Bilingual content generated by the Gemini client
//! - [`PublishOutcome`] / [`ArticleReport`] / [`RunSummary`]: Per-article,
//!   per-platform results aggregated by the orchestrator
//!
//! The snake_case field names of [`EnrichedContent`] match the JSON schema
//! embedded in the enrichment prompt, so serde needs no renaming.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A normalized news article as fetched from an RSS source.
///
/// The `id` is derived from `(source, index, fetch timestamp)` and is not
/// stable across runs. Identity for dedup purposes is the `url` primarily,
/// with the normalized title as the fallback when a URL is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// Derived identifier, e.g. `"Argaam-3-1718000000000"`. Not stable across runs.
    pub id: String,
    /// The article headline, with any leading RTL mark stripped.
    pub title: String,
    /// HTML-stripped description, truncated to 1000 characters.
    pub description: String,
    /// Display name of the source feed (e.g. "Argaam", "Disclosures").
    pub source: String,
    /// The article link, or `"#"` when the feed omitted one.
    pub url: String,
    /// Publication date, defaulting to fetch time when the feed omitted it.
    pub date: DateTime<Utc>,
    /// Coarse category label; feeds currently only yield "General".
    pub category: String,
}

impl Article {
    /// Whether this article carries a usable link for dedup purposes.
    pub fn has_url(&self) -> bool {
        !self.url.is_empty() && self.url != "#"
    }
}

/// An article paired with its importance score.
///
/// Scores are recomputed every run and never persisted.
#[derive(Debug, Clone)]
pub struct ScoredArticle {
    pub article: Article,
    /// Importance score, floored at zero.
    pub score: f64,
}

/// A previously published article identity, as stored in the posted history.
///
/// Logically append-only; physically a capped sliding window owned by the
/// history store. Written only after a publish step is confirmed successful.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostedEntry {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    pub posted_at: DateTime<Utc>,
}

impl PostedEntry {
    /// Build an entry for an article that was just published.
    pub fn for_article(article: &Article, posted_at: DateTime<Utc>) -> Self {
        Self {
            title: article.title.clone(),
            url: article.has_url().then(|| article.url.clone()),
            posted_at,
        }
    }
}

/// Direction of a numerical figure extracted from an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

/// A single numerical figure (price, percentage, amount) with bilingual labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub key: String,
    pub value: String,
    pub label_en: String,
    pub label_ar: String,
    pub trend: Trend,
}

/// Bilingual content generated once per article by the enrichment client.
///
/// Treated as immutable input to rendering and publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedContent {
    pub headline_en: String,
    pub headline_ar: String,
    pub summary_en: String,
    pub summary_ar: String,
    pub key_points_en: Vec<String>,
    pub key_points_ar: Vec<String>,
    pub caption_en: String,
    pub caption_ar: String,
    #[serde(default)]
    pub figures: Vec<Figure>,
}

/// Maximum number of figures kept for rendering.
pub const MAX_FIGURES: usize = 3;

impl EnrichedContent {
    /// Drop figures beyond [`MAX_FIGURES`]; downstream card layouts only fit three.
    pub fn cap_figures(&mut self) {
        self.figures.truncate(MAX_FIGURES);
    }
}

/// An article together with its enrichment output.
#[derive(Debug, Clone)]
pub struct EnrichedArticle {
    pub article: Article,
    pub enriched: EnrichedContent,
}

/// Rendered card images for one article, one per language.
#[derive(Debug, Clone)]
pub struct CardImages {
    pub en_png: Vec<u8>,
    pub ar_png: Vec<u8>,
}

/// Result of one platform publish attempt for one article.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PublishOutcome {
    /// The platform accepted the post and returned its identifier.
    Posted { post_id: String },
    /// The publish attempt failed; `kind` names the failing step.
    Failed { kind: String, message: String },
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PublishOutcome::Posted { .. })
    }
}

/// Per-article outcome across all platforms attempted in one run.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleReport {
    pub title: String,
    pub source: String,
    /// Keyed by platform name ("x", "instagram", "draft"); ordered for stable output.
    pub platforms: BTreeMap<String, PublishOutcome>,
    /// Set when the article failed before reaching any publisher (e.g. rendering).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ArticleReport {
    pub fn new(article: &Article) -> Self {
        Self {
            title: article.title.clone(),
            source: article.source.clone(),
            platforms: BTreeMap::new(),
            error: None,
        }
    }

    /// Whether at least one platform accepted this article.
    pub fn any_success(&self) -> bool {
        self.platforms.values().any(|p| p.is_success())
    }
}

/// Structured summary of one full pipeline run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub articles_processed: usize,
    pub reports: Vec<ArticleReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_article() -> Article {
        Article {
            id: "Argaam-0-1700000000000".to_string(),
            title: "Aramco announces Q3 dividends".to_string(),
            description: "Test description".to_string(),
            source: "Argaam".to_string(),
            url: "https://example.com/a".to_string(),
            date: Utc::now(),
            category: "General".to_string(),
        }
    }

    #[test]
    fn test_has_url() {
        let mut a = sample_article();
        assert!(a.has_url());
        a.url = "#".to_string();
        assert!(!a.has_url());
        a.url = String::new();
        assert!(!a.has_url());
    }

    #[test]
    fn test_posted_entry_omits_placeholder_url() {
        let mut a = sample_article();
        a.url = "#".to_string();
        let entry = PostedEntry::for_article(&a, Utc::now());
        assert_eq!(entry.url, None);
        assert_eq!(entry.title, a.title);
    }

    #[test]
    fn test_enriched_content_deserializes_schema_json() {
        let json = r#"{
            "headline_en": "TASI rallies",
            "headline_ar": "تاسي يرتفع",
            "summary_en": "Summary.",
            "summary_ar": "ملخص.",
            "key_points_en": ["Point 1"],
            "key_points_ar": ["نقطة"],
            "caption_en": "Caption #TASI",
            "caption_ar": "تعليق",
            "figures": [
                {"key": "tasi", "value": "+0.5%", "label_en": "TASI", "label_ar": "تاسي", "trend": "up"}
            ]
        }"#;
        let enriched: EnrichedContent = serde_json::from_str(json).unwrap();
        assert_eq!(enriched.figures.len(), 1);
        assert_eq!(enriched.figures[0].trend, Trend::Up);
    }

    #[test]
    fn test_enriched_content_missing_figures_defaults_empty() {
        let json = r#"{
            "headline_en": "h", "headline_ar": "h", "summary_en": "s",
            "summary_ar": "s", "key_points_en": [], "key_points_ar": [],
            "caption_en": "c", "caption_ar": "c"
        }"#;
        let enriched: EnrichedContent = serde_json::from_str(json).unwrap();
        assert!(enriched.figures.is_empty());
    }

    #[test]
    fn test_cap_figures() {
        let fig = Figure {
            key: "k".into(),
            value: "v".into(),
            label_en: "l".into(),
            label_ar: "l".into(),
            trend: Trend::Neutral,
        };
        let mut enriched = EnrichedContent {
            headline_en: String::new(),
            headline_ar: String::new(),
            summary_en: String::new(),
            summary_ar: String::new(),
            key_points_en: vec![],
            key_points_ar: vec![],
            caption_en: String::new(),
            caption_ar: String::new(),
            figures: vec![fig.clone(), fig.clone(), fig.clone(), fig.clone(), fig],
        };
        enriched.cap_figures();
        assert_eq!(enriched.figures.len(), MAX_FIGURES);
    }

    #[test]
    fn test_report_any_success() {
        let a = sample_article();
        let mut report = ArticleReport::new(&a);
        assert!(!report.any_success());
        report.platforms.insert(
            "x".to_string(),
            PublishOutcome::Failed {
                kind: "media_upload".to_string(),
                message: "timeout".to_string(),
            },
        );
        assert!(!report.any_success());
        report.platforms.insert(
            "instagram".to_string(),
            PublishOutcome::Posted {
                post_id: "17900".to_string(),
            },
        );
        assert!(report.any_success());
    }
}
