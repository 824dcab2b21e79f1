//! The run orchestrator: fetch, select, enrich, render, publish, record.
//!
//! One `run` is one complete pass over the configured sources. Failure
//! handling is deliberately layered: a failed source costs its articles, a
//! failed enrichment costs its article, a failed platform costs one outcome
//! entry, and only run-level conditions (nothing fetched, nothing enriched,
//! nothing published) surface as [`PipelineError`].
//!
//! History is written once, at the end of the run, and only with entries for
//! articles that at least one platform accepted. An article that failed
//! everywhere stays out of history so the next run retries it.

use crate::enrich::{Enricher, GenerateContent};
use crate::errors::PipelineError;
use crate::feeds::{SOURCES, fetch_all};
use crate::history::HistoryStore;
use crate::models::{Article, ArticleReport, PostedEntry, PublishOutcome, RunSummary};
use crate::publish::Publisher;
use crate::render::CardRenderer;
use crate::selector::select;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// Pause between articles so the publish endpoints are not hammered.
const INTER_ARTICLE_DELAY: Duration = Duration::from_secs(5);

pub struct Pipeline<G: GenerateContent> {
    client: reqwest::Client,
    enricher: Enricher<G>,
    renderer: Box<dyn CardRenderer>,
    publishers: Vec<Box<dyn Publisher>>,
    history: Box<dyn HistoryStore>,
    article_limit: usize,
    inter_article_delay: Duration,
    running: AtomicBool,
}

/// Clears the running flag when a run exits by any path.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<G: GenerateContent> Pipeline<G> {
    pub fn new(
        client: reqwest::Client,
        enricher: Enricher<G>,
        renderer: Box<dyn CardRenderer>,
        publishers: Vec<Box<dyn Publisher>>,
        history: Box<dyn HistoryStore>,
        article_limit: usize,
    ) -> Self {
        Self {
            client,
            enricher,
            renderer,
            publishers,
            history,
            article_limit,
            inter_article_delay: INTER_ARTICLE_DELAY,
            running: AtomicBool::new(false),
        }
    }

    /// Execute one full run. Rejects overlap with an in-flight run.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        let articles = fetch_all(&self.client, SOURCES).await?;
        self.process(articles).await
    }

    /// Everything after fetching; split out so it can run on canned articles.
    async fn process(&self, articles: Vec<Article>) -> Result<RunSummary, PipelineError> {
        let started_at = Utc::now();
        let run_start = std::time::Instant::now();

        let history = match self.history.load().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "History unavailable; running without dedup against past posts");
                Vec::new()
            }
        };

        let selected = select(articles, &history, self.article_limit, started_at);
        if selected.is_empty() {
            info!("No fresh relevant articles this run");
            return Ok(RunSummary {
                started_at,
                duration_secs: run_start.elapsed().as_secs_f64(),
                articles_processed: 0,
                reports: Vec::new(),
            });
        }

        let to_enrich: Vec<Article> = selected.into_iter().map(|s| s.article).collect();
        let enriched = self.enricher.enrich_many(&to_enrich).await;
        if enriched.is_empty() {
            return Err(PipelineError::NothingEnriched);
        }

        let mut reports = Vec::with_capacity(enriched.len());
        let mut staged: Vec<PostedEntry> = Vec::new();

        for (i, item) in enriched.iter().enumerate() {
            let mut report = ArticleReport::new(&item.article);

            match self.renderer.render(item).await {
                Ok(images) => {
                    for publisher in &self.publishers {
                        let outcome = match publisher.publish(item, &images).await {
                            Ok(post_id) => {
                                info!(
                                    platform = publisher.name(),
                                    %post_id,
                                    title = %item.article.title,
                                    "Published"
                                );
                                PublishOutcome::Posted { post_id }
                            }
                            Err(e) => {
                                warn!(
                                    platform = publisher.name(),
                                    error = %e,
                                    title = %item.article.title,
                                    "Publish failed"
                                );
                                PublishOutcome::Failed {
                                    kind: e.kind().to_string(),
                                    message: e.to_string(),
                                }
                            }
                        };
                        report.platforms.insert(publisher.name().to_string(), outcome);
                    }
                }
                Err(e) => {
                    warn!(error = %e, title = %item.article.title, "Card rendering failed");
                    report.error = Some(e.to_string());
                }
            }

            if report.any_success() {
                staged.push(PostedEntry::for_article(&item.article, Utc::now()));
            }
            reports.push(report);

            if i + 1 < enriched.len() {
                sleep(self.inter_article_delay).await;
            }
        }

        if !staged.is_empty() {
            if let Err(e) = self.history.save(&staged).await {
                warn!(error = %e, "Failed to persist posted history");
            }
        }

        if reports.iter().all(|r| !r.any_success()) {
            return Err(PipelineError::NothingPublished { reports });
        }

        let summary = RunSummary {
            started_at,
            duration_secs: run_start.elapsed().as_secs_f64(),
            articles_processed: reports.len(),
            reports,
        };
        info!(
            articles = summary.articles_processed,
            posted = staged.len(),
            duration_secs = summary.duration_secs,
            "Run complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{EnrichError, HistoryError, PublishError};
    use crate::history::cap_history;
    use crate::models::{CardImages, EnrichedArticle};
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn article(title: &str, url: &str) -> Article {
        Article {
            id: format!("Argaam-0-{title}"),
            title: title.to_string(),
            description: "dividend profit".to_string(),
            source: "Argaam".to_string(),
            url: url.to_string(),
            date: Utc::now() - chrono::Duration::hours(3),
            category: "General".to_string(),
        }
    }

    struct AlwaysEnrich;

    #[async_trait]
    impl GenerateContent for AlwaysEnrich {
        async fn generate(&self, _prompt: &str, _key: &str) -> Result<String, EnrichError> {
            Ok(r#"{
                "headline_en": "h", "headline_ar": "h", "summary_en": "s",
                "summary_ar": "s", "key_points_en": [], "key_points_ar": [],
                "caption_en": "c", "caption_ar": "c", "figures": []
            }"#
            .to_string())
        }
    }

    struct NeverEnrich;

    #[async_trait]
    impl GenerateContent for NeverEnrich {
        async fn generate(&self, _prompt: &str, _key: &str) -> Result<String, EnrichError> {
            Err(EnrichError::Provider("500: down".to_string()))
        }
    }

    struct FixedRenderer;

    #[async_trait]
    impl CardRenderer for FixedRenderer {
        async fn render(&self, _item: &EnrichedArticle) -> Result<CardImages, PublishError> {
            Ok(CardImages {
                en_png: vec![1],
                ar_png: vec![2],
            })
        }
    }

    /// Fails for articles whose title contains the configured fragment.
    struct SelectiveFail {
        fail_fragment: &'static str,
    }

    #[async_trait]
    impl Publisher for SelectiveFail {
        fn name(&self) -> &'static str {
            "x"
        }

        async fn publish(
            &self,
            item: &EnrichedArticle,
            _images: &CardImages,
        ) -> Result<String, PublishError> {
            if item.article.title.contains(self.fail_fragment) {
                Err(PublishError::Rejected {
                    status: 403,
                    body: "nope".to_string(),
                })
            } else {
                Ok(format!("post-{}", item.article.title))
            }
        }
    }

    struct MemoryHistory {
        entries: Mutex<Vec<PostedEntry>>,
    }

    impl MemoryHistory {
        fn new() -> Self {
            Self {
                entries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HistoryStore for MemoryHistory {
        async fn load(&self) -> Result<Vec<PostedEntry>, HistoryError> {
            Ok(self.entries.lock().unwrap().clone())
        }

        async fn save(&self, new_entries: &[PostedEntry]) -> Result<(), HistoryError> {
            let mut entries = self.entries.lock().unwrap();
            *entries = cap_history(entries.clone(), new_entries);
            Ok(())
        }
    }

    fn pipeline<G: GenerateContent>(
        api: G,
        publishers: Vec<Box<dyn Publisher>>,
        history: Box<dyn HistoryStore>,
    ) -> Pipeline<G> {
        let mut p = Pipeline::new(
            reqwest::Client::new(),
            Enricher::new(
                api,
                vec!["key".to_string()],
                RetryPolicy::linear(4, Duration::ZERO),
                Duration::ZERO,
            ),
            Box::new(FixedRenderer),
            publishers,
            history,
            3,
        );
        p.inter_article_delay = Duration::ZERO;
        p
    }

    #[tokio::test]
    async fn test_overlapping_run_rejected() {
        let p = pipeline(
            AlwaysEnrich,
            vec![Box::new(SelectiveFail { fail_fragment: "" })],
            Box::new(MemoryHistory::new()),
        );
        p.running.store(true, Ordering::SeqCst);
        let err = p.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyRunning));
    }

    #[tokio::test]
    async fn test_no_fresh_articles_is_graceful() {
        let p = pipeline(
            AlwaysEnrich,
            vec![Box::new(SelectiveFail {
                fail_fragment: "never",
            })],
            Box::new(MemoryHistory::new()),
        );
        // Irrelevant article; the selector drops it.
        let mut weather = article("weather roundup", "https://a/1");
        weather.description = "sunny skies expected".to_string();
        let summary = p.process(vec![weather]).await.unwrap();
        assert_eq!(summary.articles_processed, 0);
        assert!(summary.reports.is_empty());
    }

    #[tokio::test]
    async fn test_total_enrichment_failure_is_fatal() {
        let p = pipeline(
            NeverEnrich,
            vec![Box::new(SelectiveFail {
                fail_fragment: "never",
            })],
            Box::new(MemoryHistory::new()),
        );
        let err = p
            .process(vec![article("Aramco dividend", "https://a/1")])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NothingEnriched));
    }

    #[tokio::test]
    async fn test_total_publish_failure_is_fatal() {
        let history = Box::new(MemoryHistory::new());
        let p = pipeline(
            AlwaysEnrich,
            vec![Box::new(SelectiveFail {
                fail_fragment: "dividend",
            })],
            history,
        );
        let err = p
            .process(vec![article("Aramco dividend", "https://a/1")])
            .await
            .unwrap_err();
        // The error still carries the per-article reports for the summary.
        match err {
            PipelineError::NothingPublished { reports } => {
                assert_eq!(reports.len(), 1);
                assert!(matches!(
                    reports[0].platforms.get("x"),
                    Some(PublishOutcome::Failed { .. })
                ));
            }
            other => panic!("expected NothingPublished, got {other:?}"),
        }
        // Nothing entered history.
        assert!(p.history.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_article_stays_out_of_history() {
        // Three enrichable articles; publishing fails only for the first.
        let p = pipeline(
            AlwaysEnrich,
            vec![Box::new(SelectiveFail {
                fail_fragment: "first",
            })],
            Box::new(MemoryHistory::new()),
        );
        let articles = vec![
            article("first dividend story", "https://a/1"),
            article("second earnings story", "https://a/2"),
            article("third merger story", "https://a/3"),
        ];
        let summary = p.process(articles).await.unwrap();

        assert_eq!(summary.articles_processed, 3);
        let failed = summary
            .reports
            .iter()
            .find(|r| r.title.contains("first"))
            .unwrap();
        assert!(!failed.any_success());
        assert!(matches!(
            failed.platforms.get("x"),
            Some(PublishOutcome::Failed { .. })
        ));

        let history = p.history.load().await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| !e.title.contains("first")));
        assert!(history.iter().any(|e| e.title.contains("second")));
        assert!(history.iter().any(|e| e.title.contains("third")));
    }

    #[tokio::test]
    async fn test_published_articles_skipped_next_run() {
        let p = pipeline(
            AlwaysEnrich,
            vec![Box::new(SelectiveFail {
                fail_fragment: "never",
            })],
            Box::new(MemoryHistory::new()),
        );
        let articles = vec![article("Aramco dividend", "https://a/1")];
        let first = p.process(articles.clone()).await.unwrap();
        assert_eq!(first.articles_processed, 1);

        // Same articles again: all in history now, so a graceful empty run.
        let second = p.process(articles).await.unwrap();
        assert_eq!(second.articles_processed, 0);
    }

    #[tokio::test]
    async fn test_reports_cover_all_platforms() {
        struct OkPublisher(&'static str);

        #[async_trait]
        impl Publisher for OkPublisher {
            fn name(&self) -> &'static str {
                self.0
            }
            async fn publish(
                &self,
                _item: &EnrichedArticle,
                _images: &CardImages,
            ) -> Result<String, PublishError> {
                Ok("id".to_string())
            }
        }

        let p = pipeline(
            AlwaysEnrich,
            vec![
                Box::new(OkPublisher("x")),
                Box::new(OkPublisher("instagram")),
                Box::new(OkPublisher("draft")),
            ],
            Box::new(MemoryHistory::new()),
        );
        let summary = p
            .process(vec![article("Aramco dividend", "https://a/1")])
            .await
            .unwrap();
        let report = &summary.reports[0];
        assert_eq!(report.platforms.len(), 3);
        assert!(report.any_success());
        // One history entry despite three platform successes.
        assert_eq!(p.history.load().await.unwrap().len(), 1);
    }
}
