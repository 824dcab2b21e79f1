//! Article selection: dedup, relevance filter, scoring, and history removal.
//!
//! The steps run in a fixed order so the outcome is reproducible:
//! 1. Deduplicate by URL (first occurrence wins)
//! 2. Keep disclosures and anything matching a financial keyword
//! 3. Score and stable-sort descending
//! 4. Drop articles already in the posted history
//! 5. Truncate to the requested limit
//!
//! An empty result is not an error here; the orchestrator treats it as
//! "no fresh articles" and ends the run gracefully.

use crate::models::{Article, PostedEntry, ScoredArticle};
use crate::scoring::{HIGH_IMPACT_KEYWORDS, MEDIUM_IMPACT_KEYWORDS, score_article};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

/// Normalize a title for the no-URL dedup fallback.
///
/// Case/whitespace normalization only; near-duplicates that differ in
/// punctuation are not caught.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

fn is_financially_relevant(article: &Article) -> bool {
    // Company disclosures are strictly financial by definition.
    if article.source == "Disclosures" {
        return true;
    }
    let text = format!("{} {}", article.title, article.description).to_lowercase();
    HIGH_IMPACT_KEYWORDS
        .iter()
        .chain(MEDIUM_IMPACT_KEYWORDS.iter())
        .any(|kw| text.contains(kw))
}

fn in_history(article: &Article, history: &[PostedEntry]) -> bool {
    let title = normalize_title(&article.title);
    history.iter().any(|entry| {
        match (&entry.url, article.has_url()) {
            (Some(url), true) => *url == article.url,
            // When either side lacks a URL, fall back to exact normalized-title match.
            _ => normalize_title(&entry.title) == title,
        }
    })
}

/// Select up to `limit` fresh, relevant articles ordered by importance.
pub fn select(
    articles: Vec<Article>,
    history: &[PostedEntry],
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<ScoredArticle> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let deduped: Vec<Article> = articles
        .into_iter()
        .filter(|a| !a.has_url() || seen_urls.insert(a.url.clone()))
        .collect();

    let relevant: Vec<Article> = deduped.into_iter().filter(is_financially_relevant).collect();

    let mut scored: Vec<ScoredArticle> = relevant
        .into_iter()
        .map(|article| {
            let score = score_article(&article, now);
            ScoredArticle { article, score }
        })
        .collect();
    // Stable sort keeps feed order for equal scores.
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let fresh: Vec<ScoredArticle> = scored
        .into_iter()
        .filter(|s| {
            let posted = in_history(&s.article, history);
            if posted {
                debug!(title = %s.article.title, "Skipping previously posted article");
            }
            !posted
        })
        .collect();

    let selected: Vec<ScoredArticle> = fresh.into_iter().take(limit).collect();
    for (i, s) in selected.iter().enumerate() {
        info!(rank = i + 1, score = s.score, title = %s.article.title, "Selected article");
    }
    selected
}
