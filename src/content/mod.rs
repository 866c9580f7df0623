//! Content resolution seam.
//!
//! The router never renders anything. It only needs to know whether a
//! resource exists, what path serves it and what its canonical URL is.
//! `ContentResolver` is that contract; `catalog` backs it with the
//! per-tenant list from the bootstrap configuration.

pub mod catalog;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use catalog::CatalogResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Page,
    #[default]
    Post,
    #[serde(other)]
    Other,
}

/// A resolved content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentHandle {
    pub id: i64,
    pub slug: String,
    pub kind: ContentKind,
    /// Path on the upstream that renders the item.
    pub path: String,
    pub published: bool,
}

#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Any item with this id, published or not.
    async fn resolve_by_id(&self, id: i64) -> Option<ContentHandle>;

    /// Published public item with this slug; pages take precedence.
    async fn resolve_by_slug(&self, slug: &str) -> Option<ContentHandle>;

    /// What the site root shows.
    async fn homepage(&self) -> ContentHandle;

    /// Absolute canonical URL of `content`.
    fn permalink(&self, content: &ContentHandle) -> String;
}
