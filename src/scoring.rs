//! Importance scoring for fetched articles.
//!
//! [`score_article`] is a pure function of the article's title, description,
//! source, and date, plus an injected "now" for the recency bands. Given
//! identical inputs and a frozen clock the score is identical, which is what
//! lets the selector's ordering be reproduced in tests.
//!
//! The weights encode editorial judgement about the Saudi market: a tier-1
//! entity mention is worth more than any single event keyword, concrete
//! numbers beat vague statements, and routine administrative notices are
//! pushed down.

use crate::models::Article;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// High-impact companies and entities, counted once per article.
pub static TIER1_COMPANIES: &[&str] = &[
    "aramco",
    "sabic",
    "stc",
    "al rajhi",
    "alrajhi",
    "samba",
    "snb",
    "riyad bank",
    "maaden",
    "acwa",
    "neom",
    "pif",
    "public investment fund",
    "vision 2030",
];

/// Market-moving event keywords, +15 each.
pub static HIGH_IMPACT_KEYWORDS: &[&str] = &[
    "ipo",
    "merger",
    "acquisition",
    "bankruptcy",
    "default",
    "dividend",
    "earnings",
    "profit",
    "loss",
    "revenue",
    "results",
    "interest rate",
    "inflation",
    "gdp",
    "oil price",
    "crude",
    "tasi",
    "tadawul",
    "suspend",
    "halt",
    "record high",
    "record low",
    "billion",
    "trillion",
    "quarterly",
    "annual report",
    "guidance",
    "sama",
    "cma",
    "ministry of finance",
    "vision 2030",
];

/// Generic market terms, +5 each.
pub static MEDIUM_IMPACT_KEYWORDS: &[&str] = &[
    "saudi",
    "riyal",
    "sar",
    "bank",
    "market",
    "shares",
    "stock",
    "investment",
    "financial",
    "million",
    "percent",
    "growth",
    "quarter",
    "contract",
    "partnership",
    "expansion",
    "launch",
];

/// Routine/administrative terms, -10 each.
pub static LOW_IMPACT_KEYWORDS: &[&str] = &[
    "appointment",
    "board member",
    "agm",
    "general assembly",
    "minor",
    "routine",
    "reminder",
    "clarification",
];

/// A number followed by a market unit; every match counts, not just distinct ones.
static FIGURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(\.\d+)?\s*(billion|million|trillion|%|percent|sar|riyal)").unwrap());

const TIER1_BONUS: f64 = 40.0;
const HIGH_IMPACT_BONUS: f64 = 15.0;
const MEDIUM_IMPACT_BONUS: f64 = 5.0;
const LOW_IMPACT_PENALTY: f64 = 10.0;
const FIGURE_BONUS: f64 = 8.0;
const ARGAAM_BONUS: f64 = 10.0;

/// Score an article's importance. Pure; floored at zero.
pub fn score_article(article: &Article, now: DateTime<Utc>) -> f64 {
    let text = format!("{} {}", article.title, article.description).to_lowercase();
    let mut score = 0.0;

    // Tier 1 mention is high value but counted once, however many names appear.
    if TIER1_COMPANIES.iter().any(|c| text.contains(c)) {
        score += TIER1_BONUS;
    }

    for kw in HIGH_IMPACT_KEYWORDS {
        if text.contains(kw) {
            score += HIGH_IMPACT_BONUS;
        }
    }

    for kw in MEDIUM_IMPACT_KEYWORDS {
        if text.contains(kw) {
            score += MEDIUM_IMPACT_BONUS;
        }
    }

    for kw in LOW_IMPACT_KEYWORDS {
        if text.contains(kw) {
            score -= LOW_IMPACT_PENALTY;
        }
    }

    score += FIGURE_RE.find_iter(&text).count() as f64 * FIGURE_BONUS;

    // Recency bands are mutually exclusive, evaluated freshest first.
    let age_hours = (now - article.date).num_milliseconds() as f64 / 3_600_000.0;
    if age_hours < 2.0 {
        score += 20.0;
    } else if age_hours < 6.0 {
        score += 10.0;
    } else if age_hours > 24.0 {
        score -= 15.0;
    }

    // Argaam main news is more curated than the disclosures feed.
    if article.source == "Argaam" {
        score += ARGAAM_BONUS;
    }

    score.max(0.0)
}
