//! Gemini enrichment client with rate-limit rotation and backoff.
//!
//! One call per article, strictly sequential with an inter-call delay to
//! respect provider rate limits. The HTTP seam is the [`GenerateContent`]
//! trait so the retry and parsing logic is testable without a network.
//!
//! # Retry strategy
//!
//! Only HTTP 429 is retried. Each attempt rotates to the next credential in
//! the pool; once the pool wraps around, the linearly increasing backoff
//! between attempts does the waiting. Any other provider error aborts
//! enrichment for that article only; the caller skips it and continues.

use crate::errors::EnrichError;
use crate::models::{Article, EnrichedArticle, EnrichedContent};
use crate::retry::{RetryPolicy, retry_on};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument};

const GEMINI_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";
const GEMINI_TIMEOUT: Duration = Duration::from_secs(30);

/// One text-generation call against one credential.
#[async_trait]
pub trait GenerateContent: Send + Sync {
    /// Returns the model's raw text output for the prompt.
    async fn generate(&self, prompt: &str, api_key: &str) -> Result<String, EnrichError>;
}

/// The instructional prompt embedding the article, fixed except for its inputs.
pub fn build_prompt(article: &Article) -> String {
    format!(
        r#"You are a professional financial news editor for "TasiPulse", a Saudi market news outlet.

Task: Analyze the following news article and extract/generate content for a social media post.

Input Source: {source}
Input Title: {title}
Input Text: {description}

Requirements:
1. Translate the core message to Arabic (Saudi business dialect, proper RTL Arabic - NOT transliterated).
2. Provide a punchy Headline in both English and Arabic (max 80 chars each).
3. Provide a short 2-sentence summary in both languages.
4. Extract 3-4 key bullet points in both languages (concise, max 60 chars each).
5. Generate a social media caption with relevant Arabic/English hashtags (max 300 chars).
6. Extract any numerical figures (prices, %, billions, etc.) into a structured list. Max 3 figures. If no specific figures exist, return empty array.

IMPORTANT: Arabic text must be real Arabic script (عربي), not romanized transliteration.

Return ONLY valid JSON, no markdown, matching this exact schema:
{{
  "headline_en": "string",
  "headline_ar": "string",
  "summary_en": "string",
  "summary_ar": "string",
  "key_points_en": ["string", "string", "string"],
  "key_points_ar": ["string", "string", "string"],
  "caption_en": "string",
  "caption_ar": "string",
  "figures": [
    {{
      "key": "string",
      "value": "string",
      "label_en": "string",
      "label_ar": "string",
      "trend": "up|down|neutral"
    }}
  ]
}}"#,
        source = article.source,
        title = article.title,
        description = article.description,
    )
}

/// Strip markdown code fences the model sometimes wraps its JSON in.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Parse the model's text output into [`EnrichedContent`], capping figures.
pub fn parse_enriched(text: &str) -> Result<EnrichedContent, EnrichError> {
    let clean = strip_code_fences(text);
    if clean.is_empty() {
        return Err(EnrichError::EmptyResponse);
    }
    let mut enriched: EnrichedContent = serde_json::from_str(clean)?;
    enriched.cap_figures();
    Ok(enriched)
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

/// Production [`GenerateContent`] over the Gemini REST API.
pub struct GeminiApi {
    client: reqwest::Client,
}

impl GeminiApi {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GenerateContent for GeminiApi {
    async fn generate(&self, prompt: &str, api_key: &str) -> Result<String, EnrichError> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": 0.3,
                "maxOutputTokens": 1500
            }
        });

        let response = self
            .client
            .post(format!("{GEMINI_API_URL}?key={api_key}"))
            .timeout(GEMINI_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| EnrichError::Provider(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EnrichError::RateLimited { attempts: 1 });
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichError::Provider(format!("{status}: {body}")));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::Provider(e.to_string()))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .filter(|t| !t.is_empty())
            .ok_or(EnrichError::EmptyResponse)
    }
}

/// Article enrichment orchestration over any [`GenerateContent`] backend.
pub struct Enricher<G> {
    api: G,
    api_keys: Vec<String>,
    policy: RetryPolicy,
    inter_call_delay: Duration,
}

impl<G: GenerateContent> Enricher<G> {
    pub fn new(api: G, api_keys: Vec<String>, policy: RetryPolicy, inter_call_delay: Duration) -> Self {
        Self {
            api,
            api_keys,
            policy,
            inter_call_delay,
        }
    }

    /// Enrich a single article, rotating credentials on 429.
    #[instrument(level = "info", skip_all, fields(title = %article.title))]
    pub async fn enrich(&self, article: &Article) -> Result<EnrichedContent, EnrichError> {
        // An empty pool would make the rotation index a division by zero.
        if self.api_keys.is_empty() {
            return Err(EnrichError::Provider("no API keys configured".to_string()));
        }
        let prompt = build_prompt(article);
        let max_attempts = self.policy.max_attempts;

        let text = retry_on(
            self.policy,
            |attempt| {
                let key = &self.api_keys[(attempt - 1) % self.api_keys.len()];
                self.api.generate(&prompt, key)
            },
            EnrichError::is_rate_limit,
        )
        .await
        .map_err(|e| match e {
            EnrichError::RateLimited { .. } => EnrichError::RateLimited {
                attempts: max_attempts,
            },
            other => other,
        })?;

        parse_enriched(&text)
    }

    /// Enrich articles sequentially, skipping failures.
    ///
    /// The returned list may be shorter than the input; an empty result is
    /// the caller's fatal condition, not this method's.
    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    pub async fn enrich_many(&self, articles: &[Article]) -> Vec<EnrichedArticle> {
        let mut results = Vec::new();

        for (i, article) in articles.iter().enumerate() {
            match self.enrich(article).await {
                Ok(enriched) => {
                    info!(headline = %enriched.headline_en, "Enriched article");
                    results.push(EnrichedArticle {
                        article: article.clone(),
                        enriched,
                    });
                }
                Err(e) => {
                    error!(title = %article.title, error = %e, "Enrichment failed; skipping article");
                }
            }

            if i + 1 < articles.len() {
                sleep(self.inter_call_delay).await;
            }
        }

        info!(
            enriched = results.len(),
            total = articles.len(),
            "Enrichment pass complete"
        );
        results
    }
}
