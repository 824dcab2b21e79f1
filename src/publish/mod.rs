//! Platform publishers.
//!
//! Each publisher takes an enriched article plus its rendered card images and
//! either returns a platform post identifier or a typed [`PublishError`].
//! Publishers are independent; the orchestrator records each outcome
//! separately and never lets one platform's failure abort another's attempt.

pub mod draft;
pub mod instagram;
pub mod oauth;
pub mod x;

use crate::errors::PublishError;
use crate::models::{CardImages, EnrichedArticle};
use async_trait::async_trait;

/// A destination for one article's bilingual card post.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Platform key used in run reports ("x", "instagram", "draft").
    fn name(&self) -> &'static str;

    /// Publish one article. Returns the platform post identifier.
    async fn publish(
        &self,
        item: &EnrichedArticle,
        images: &CardImages,
    ) -> Result<String, PublishError>;
}
