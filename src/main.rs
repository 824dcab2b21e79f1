//! # TasiPulse
//!
//! An automated Saudi financial news pipeline that fetches articles from
//! Tadawul-focused RSS sources, scores them for market importance, enriches
//! the best ones into bilingual (English/Arabic) social content via Gemini,
//! renders card images, and publishes them to X and Instagram with a local
//! draft fallback.
//!
//! ## Usage
//!
//! ```sh
//! tasi_pulse --config /etc/tasi_pulse/config.yaml
//! ```
//!
//! ## Architecture
//!
//! One invocation is one run:
//! 1. **Fetch**: Pull and normalize all configured RSS feeds concurrently
//! 2. **Select**: Dedup, filter for financial relevance, score, drop
//!    previously posted articles, keep the top N
//! 3. **Enrich**: One Gemini call per article, sequential, with credential
//!    rotation on rate limiting
//! 4. **Publish**: Render bilingual cards and post to each enabled platform;
//!    write drafts when no platform is live
//! 5. **Record**: Append successfully posted articles to the capped history

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod caption;
mod cli;
mod config;
mod enrich;
mod errors;
mod feeds;
mod history;
mod models;
mod pipeline;
mod publish;
mod render;
mod retry;
mod scoring;
mod selector;

use cli::Cli;
use config::AppConfig;
use enrich::{Enricher, GeminiApi};
use errors::PipelineError;
use history::{FallbackHistoryStore, HistoryStore, LocalHistoryStore, RemoteHistoryStore};
use models::{ArticleReport, PublishOutcome};
use pipeline::Pipeline;
use publish::draft::DraftPublisher;
use publish::instagram::InstagramPublisher;
use publish::oauth::OAuth1Credentials;
use publish::x::XPublisher;
use publish::Publisher;
use render::CommandRenderer;
use retry::RetryPolicy;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("tasi_pulse starting up");

    let args = Cli::parse();
    let mut app_config = AppConfig::load(std::path::Path::new(&args.config))?;
    if let Some(limit) = args.limit {
        app_config.article_limit = limit;
    }

    let client = reqwest::Client::builder().build()?;

    // --- History store: remote-primary with local fallback when configured ---
    let history: Box<dyn HistoryStore> = match &app_config.history.remote {
        Some(remote) => Box::new(FallbackHistoryStore::new(
            RemoteHistoryStore::new(
                client.clone(),
                remote.object_url.clone(),
                remote.token_url.clone(),
            ),
            LocalHistoryStore::new(&app_config.history.local_path),
        )),
        None => Box::new(LocalHistoryStore::new(&app_config.history.local_path)),
    };

    // --- Platform publishers ---
    let mut publishers: Vec<Box<dyn Publisher>> = Vec::new();

    match (&app_config.x, args.no_x) {
        (Some(x), false) => {
            let credentials = OAuth1Credentials {
                api_key: x.api_key.clone(),
                api_secret: x.api_secret.clone(),
                access_token: x.access_token.clone(),
                access_token_secret: x.access_token_secret.clone(),
            };
            publishers.push(Box::new(XPublisher::new(client.clone(), credentials)));
            info!("X publishing enabled");
        }
        (Some(_), true) => info!("X publishing disabled by flag"),
        (None, _) => info!("X credentials not configured; skipping"),
    }

    match (&app_config.instagram, args.no_instagram) {
        (Some(instagram), false) => {
            publishers.push(Box::new(InstagramPublisher::from_config(
                client.clone(),
                instagram,
            )));
            info!("Instagram publishing enabled");
        }
        (Some(_), true) => info!("Instagram publishing disabled by flag"),
        (None, _) => info!("Instagram credentials not configured; skipping"),
    }

    // Drafts are opt-in, but forced on when no live platform is available so
    // a run always produces something an operator can post by hand.
    if args.drafts || publishers.is_empty() {
        if publishers.is_empty() {
            warn!("No live platforms enabled; falling back to draft output");
        }
        let draft = DraftPublisher::new(&app_config.drafts_dir);
        draft.prepare().await?;
        publishers.push(Box::new(draft));
        info!(dir = %app_config.drafts_dir, "Draft output enabled");
    }

    // --- Enrichment client ---
    let enricher = Enricher::new(
        GeminiApi::new(client.clone()),
        app_config.gemini.api_keys.clone(),
        RetryPolicy::linear(
            app_config.gemini.max_attempts,
            Duration::from_secs(app_config.gemini.backoff_base_secs),
        ),
        Duration::from_secs(app_config.gemini.inter_call_delay_secs),
    );

    let pipeline = Pipeline::new(
        client,
        enricher,
        Box::new(CommandRenderer::new(&app_config.renderer)),
        publishers,
        history,
        app_config.article_limit,
    );

    let summary = match pipeline.run().await {
        Ok(summary) => summary,
        Err(e) => {
            // Even a fully failed run reports what happened per article.
            if let PipelineError::NothingPublished { reports } = &e {
                log_reports(reports);
            }
            error!(error = %e, "Run failed");
            return Err(e.into());
        }
    };

    // ---- Run summary ----
    log_reports(&summary.reports);

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        articles_processed = summary.articles_processed,
        "Execution complete"
    );

    Ok(())
}

/// One log line per article/platform outcome, mirroring the run report.
fn log_reports(reports: &[ArticleReport]) {
    for report in reports {
        if let Some(err) = &report.error {
            warn!(title = %report.title, error = %err, "Article failed before publishing");
            continue;
        }
        for (platform, outcome) in &report.platforms {
            match outcome {
                PublishOutcome::Posted { post_id } => {
                    info!(title = %report.title, %platform, %post_id, "Posted");
                }
                PublishOutcome::Failed { kind, message } => {
                    warn!(title = %report.title, %platform, %kind, %message, "Failed");
                }
            }
        }
    }
}
