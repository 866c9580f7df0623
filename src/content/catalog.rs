//! Static content catalog loaded from tenant configuration.

use async_trait::async_trait;

use super::{ContentHandle, ContentKind, ContentResolver};
use crate::config::schema::{ContentEntryConfig, TenantConfig};

#[derive(Debug, Clone)]
struct CatalogEntry {
    handle: ContentHandle,
    public: bool,
}

/// In-memory resolver over a fixed list of content items.
#[derive(Debug, Clone)]
pub struct CatalogResolver {
    home_url: String,
    entries: Vec<CatalogEntry>,
    front_page_id: Option<i64>,
}

pub struct CatalogBuilder {
    inner: CatalogResolver,
}

impl CatalogBuilder {
    /// Add a public item served at `/{slug}/`.
    pub fn add(mut self, id: i64, slug: &str, kind: ContentKind, published: bool) -> Self {
        self.inner.entries.push(CatalogEntry {
            handle: ContentHandle {
                id,
                slug: slug.to_string(),
                kind,
                path: default_path(slug),
                published,
            },
            public: true,
        });
        self
    }

    pub fn entry(mut self, config: &ContentEntryConfig) -> Self {
        self.inner.entries.push(CatalogEntry {
            handle: ContentHandle {
                id: config.id,
                slug: config.slug.clone(),
                kind: config.kind,
                path: config.path.clone().unwrap_or_else(|| default_path(&config.slug)),
                published: config.published,
            },
            public: config.public,
        });
        self
    }

    pub fn front_page(mut self, id: Option<i64>) -> Self {
        self.inner.front_page_id = id;
        self
    }

    pub fn build(self) -> CatalogResolver {
        self.inner
    }
}

fn default_path(slug: &str) -> String {
    format!("/{}/", slug.trim_matches('/'))
}

impl CatalogResolver {
    pub fn builder(home_url: &str) -> CatalogBuilder {
        CatalogBuilder {
            inner: CatalogResolver {
                home_url: home_url.trim_end_matches('/').to_string(),
                entries: Vec::new(),
                front_page_id: None,
            },
        }
    }

    pub fn from_tenant(tenant: &TenantConfig) -> Self {
        tenant
            .content
            .iter()
            .fold(Self::builder(&tenant.site_url), |b, entry| b.entry(entry))
            .front_page(tenant.front_page_id)
            .build()
    }

    pub fn home_url(&self) -> &str {
        &self.home_url
    }

    fn find(&self, id: i64) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.handle.id == id)
    }
}

#[async_trait]
impl ContentResolver for CatalogResolver {
    async fn resolve_by_id(&self, id: i64) -> Option<ContentHandle> {
        self.find(id).map(|e| e.handle.clone())
    }

    async fn resolve_by_slug(&self, slug: &str) -> Option<ContentHandle> {
        let visible = |e: &&CatalogEntry| e.public && e.handle.published && e.handle.slug == slug;
        self.entries
            .iter()
            .filter(visible)
            .find(|e| e.handle.kind == ContentKind::Page)
            .or_else(|| self.entries.iter().find(visible))
            .map(|e| e.handle.clone())
    }

    async fn homepage(&self) -> ContentHandle {
        self.front_page_id
            .and_then(|id| self.find(id))
            .filter(|e| e.handle.published)
            .map(|e| ContentHandle {
                path: "/".to_string(),
                ..e.handle.clone()
            })
            .unwrap_or_else(|| ContentHandle {
                id: 0,
                slug: String::new(),
                kind: ContentKind::Page,
                path: "/".to_string(),
                published: true,
            })
    }

    fn permalink(&self, content: &ContentHandle) -> String {
        if content.id == 0 || Some(content.id) == self.front_page_id {
            return format!("{}/", self.home_url);
        }
        format!("{}{}", self.home_url, content.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> CatalogResolver {
        CatalogResolver::builder("https://example.com/")
            .add(1, "about", ContentKind::Post, true)
            .add(2, "about", ContentKind::Page, true)
            .add(3, "draft", ContentKind::Page, false)
            .entry(&ContentEntryConfig {
                id: 4,
                slug: "hidden".into(),
                kind: ContentKind::Other,
                published: true,
                public: false,
                path: None,
            })
            .entry(&ContentEntryConfig {
                id: 5,
                slug: "events".into(),
                kind: ContentKind::Other,
                published: true,
                public: true,
                path: Some("/event/events/".into()),
            })
            .front_page(Some(9))
            .build()
    }

    #[tokio::test]
    async fn test_slug_lookup_prefers_pages_and_skips_unpublished() {
        let c = catalog();
        assert_eq!(c.resolve_by_slug("about").await.unwrap().id, 2);
        assert!(c.resolve_by_slug("draft").await.is_none());
        assert!(c.resolve_by_slug("hidden").await.is_none());
        assert_eq!(c.resolve_by_slug("events").await.unwrap().path, "/event/events/");

        // Lookup by id ignores publication state.
        assert!(!c.resolve_by_id(3).await.unwrap().published);
    }

    #[tokio::test]
    async fn test_homepage_falls_back_to_root() {
        let c = catalog();
        let home = c.homepage().await;
        assert_eq!(home.id, 0);
        assert_eq!(home.path, "/");
        assert_eq!(c.permalink(&home), "https://example.com/");

        let c = CatalogResolver::builder("https://example.com")
            .add(9, "welcome", ContentKind::Page, true)
            .front_page(Some(9))
            .build();
        let home = c.homepage().await;
        assert_eq!(home.id, 9);
        assert_eq!(home.path, "/");
        assert_eq!(c.permalink(&home), "https://example.com/");
    }

    #[test]
    fn test_permalink() {
        let c = catalog();
        let page = c.find(2).unwrap().handle.clone();
        assert_eq!(c.permalink(&page), "https://example.com/about/");
    }
}
