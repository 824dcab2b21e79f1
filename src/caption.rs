//! Bilingual caption assembly under platform length ceilings.
//!
//! Pure and deterministic; no network calls. Lengths are counted in
//! characters, not bytes, since Arabic text is multi-byte throughout.

use crate::models::EnrichedContent;

/// Budget for an X post. The platform ceiling is 280; a small margin is kept.
pub const X_CAPTION_BUDGET: usize = 275;
/// Instagram caption ceiling.
pub const INSTAGRAM_CAPTION_LIMIT: usize = 2200;

const X_MAX_EN: usize = 130;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if char_len(s) <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

fn caption_parts(enriched: &EnrichedContent) -> (&str, &str) {
    let en = if enriched.caption_en.is_empty() {
        &enriched.headline_en
    } else {
        &enriched.caption_en
    };
    let ar = if enriched.caption_ar.is_empty() {
        &enriched.headline_ar
    } else {
        &enriched.caption_ar
    };
    (en, ar)
}

/// Build the bilingual caption for an X post.
///
/// Tries the full EN+AR concatenation first; if over budget, truncates the
/// English portion and retries; as a last resort falls back to truncated
/// English only.
pub fn build_x_caption(enriched: &EnrichedContent) -> String {
    let (en, ar) = caption_parts(enriched);

    let full = format!("{en}\n\n{ar}");
    if char_len(&full) <= X_CAPTION_BUDGET {
        return full;
    }

    let truncated_en = truncate_with_ellipsis(en, X_MAX_EN);
    let truncated = format!("{truncated_en}\n\n{ar}");
    if char_len(&truncated) <= X_CAPTION_BUDGET {
        return truncated;
    }

    truncate_with_ellipsis(en, X_CAPTION_BUDGET)
}

/// Build the bilingual caption for an Instagram post.
pub fn build_instagram_caption(enriched: &EnrichedContent) -> String {
    let (en, ar) = caption_parts(enriched);
    let full = format!("{en}\n\n{ar}");
    truncate_with_ellipsis(&full, INSTAGRAM_CAPTION_LIMIT)
}
