//! Request-time decision engine.
//!
//! # Precedence
//! ```text
//! domain redirect rule            → Redirect   (key "@domain")
//! no routable subdomain           → PassThrough
//! active url/home mapping         → Redirect   (key = subdomain)
//! active resource mapping         → Serve
//! published content with the slug → Serve
//! nothing matched                 → Serve homepage, or Redirect to root
//! ```
//!
//! # Design Decisions
//! - Built per request from borrowed collaborators; no global instance
//! - The mapping store is queried at most once per request
//! - Every non-pass-through outcome is recorded exactly once, and recording
//!   failures never change the decision

use std::time::Instant;

use serde::Serialize;

use crate::content::{ContentHandle, ContentResolver};
use crate::observability::metrics;
use crate::routing::context::RequestContext;
use crate::routing::domain::{find_domain_redirect, plan_domain_redirect};
use crate::routing::host::{detect_subdomain, valid_domains};
use crate::settings::{RedirectCode, Settings, UnmappedBehavior};
use crate::store::{EventLog, Mapping, MappingLookup, MappingTarget, StatisticsEngine};

pub const HOME_REDIRECT_TARGET: &str = "/ (home redirect)";
pub const UNMAPPED_REDIRECT_TARGET: &str = "/ (unmapped redirect)";
pub const UNMAPPED_TARGET: &str = "/ (unmapped)";

/// Which branch of the state machine produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    PassThrough,
    DomainRedirect,
    MappingRedirect,
    UnmappedRedirect,
    ServeMapped,
    ServeSlug,
    ServeUnmapped,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::PassThrough => "pass_through",
            Outcome::DomainRedirect => "domain_redirect",
            Outcome::MappingRedirect => "mapping_redirect",
            Outcome::UnmappedRedirect => "unmapped_redirect",
            Outcome::ServeMapped => "serve_mapped",
            Outcome::ServeSlug => "serve_slug",
            Outcome::ServeUnmapped => "serve_unmapped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectDecision {
    pub location: String,
    pub status: RedirectCode,
    pub key: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeDecision {
    /// Upstream path to render in place of the requested one.
    pub path: String,
    pub canonical_url: String,
    pub key: String,
    pub content: ContentHandle,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    PassThrough,
    Redirect(RedirectDecision),
    Serve(ServeDecision),
}

impl Decision {
    pub fn outcome(&self) -> Outcome {
        match self {
            Decision::PassThrough => Outcome::PassThrough,
            Decision::Redirect(r) => r.outcome,
            Decision::Serve(s) => s.outcome,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Decision::PassThrough => None,
            Decision::Redirect(r) => Some(&r.key),
            Decision::Serve(s) => Some(&s.key),
        }
    }
}

/// Identity of the site being routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInfo {
    /// Absolute home URL without trailing slash.
    pub home_url: String,
    /// Serving domain, subdomains are detected relative to it.
    pub main_domain: String,
}

impl SiteInfo {
    pub fn root_url(&self) -> String {
        format!("{}/", self.home_url.trim_end_matches('/'))
    }
}

/// Best-effort statistic + log writer.
#[derive(Clone)]
pub struct Recorder {
    stats: StatisticsEngine,
    log: EventLog,
}

impl Recorder {
    pub fn new(stats: StatisticsEngine, log: EventLog) -> Self {
        Self { stats, log }
    }

    /// Count and log one decision. Failures are reported, never returned.
    pub async fn record(&self, settings: &Settings, key: &str, target: &str, ctx: &RequestContext) {
        if let Err(e) = self.stats.record(key, target).await {
            tracing::warn!(key = %key, error = %e, "Failed to record statistic");
            metrics::record_recording_failure("statistics");
        }
        if let Err(e) = self.log.log(settings, key, target, &ctx.source_url(), ctx).await {
            tracing::warn!(key = %key, error = %e, "Failed to write event log");
            metrics::record_recording_failure("log");
        }
    }
}

pub struct Pipeline<'a> {
    pub settings: &'a Settings,
    pub site: &'a SiteInfo,
    pub mappings: &'a dyn MappingLookup,
    pub content: &'a dyn ContentResolver,
    pub recorder: &'a Recorder,
}

impl Pipeline<'_> {
    /// Decide what to do with one request and record it.
    pub async fn run(&self, ctx: &RequestContext) -> Decision {
        let started = Instant::now();
        let decision = self.decide(ctx).await;

        tracing::debug!(
            host = %ctx.host,
            key = decision.key().unwrap_or("-"),
            outcome = decision.outcome().as_str(),
            "Routing decision"
        );
        metrics::record_decision(decision.outcome().as_str(), started);
        decision
    }

    async fn decide(&self, ctx: &RequestContext) -> Decision {
        if !self.settings.enabled {
            return Decision::PassThrough;
        }

        if let Some(rule) = find_domain_redirect(&self.settings.redirect_domains, &ctx.host) {
            let plan = plan_domain_redirect(rule, ctx);
            self.recorder.record(self.settings, &plan.key, &plan.description, ctx).await;
            return Decision::Redirect(RedirectDecision {
                location: plan.location,
                status: plan.status,
                key: plan.key,
                outcome: Outcome::DomainRedirect,
            });
        }

        let domains = valid_domains(&self.site.main_domain, &self.settings.aliased_domains);
        let Some(subdomain) = detect_subdomain(&ctx.host, &domains, &self.settings.excluded_subdomains) else {
            return Decision::PassThrough;
        };

        let mapping = match self.mappings.find_active(&subdomain).await {
            Ok(mapping) => mapping,
            Err(e) => {
                tracing::warn!(subdomain = %subdomain, error = %e, "Mapping lookup failed");
                None
            }
        };

        if let Some(redirect) = self.mapping_redirect(mapping.as_ref(), &subdomain, ctx).await {
            return Decision::Redirect(redirect);
        }

        if let Some((content, outcome)) = self.matched_content(mapping.as_ref(), &subdomain).await {
            self.recorder.record(self.settings, &subdomain, &content.path, ctx).await;
            return Decision::Serve(ServeDecision {
                path: content.path.clone(),
                canonical_url: self.content.permalink(&content),
                key: subdomain,
                content,
                outcome,
            });
        }

        self.unmapped(subdomain, ctx).await
    }

    async fn mapping_redirect(
        &self,
        mapping: Option<&Mapping>,
        subdomain: &str,
        ctx: &RequestContext,
    ) -> Option<RedirectDecision> {
        let mapping = mapping?;
        let (location, target) = match &mapping.target {
            MappingTarget::RedirectUrl { url } => (url.clone(), url.as_str()),
            MappingTarget::RedirectHome => (self.site.root_url(), HOME_REDIRECT_TARGET),
            MappingTarget::ServeResource { .. } | MappingTarget::Invalid { .. } => return None,
        };

        self.recorder.record(self.settings, subdomain, target, ctx).await;
        Some(RedirectDecision {
            location,
            status: mapping.status_code,
            key: subdomain.to_string(),
            outcome: Outcome::MappingRedirect,
        })
    }

    async fn matched_content(&self, mapping: Option<&Mapping>, subdomain: &str) -> Option<(ContentHandle, Outcome)> {
        if let Some(MappingTarget::ServeResource { resource_id }) = mapping.map(|m| &m.target) {
            match self.content.resolve_by_id(*resource_id).await {
                Some(content) if content.published => return Some((content, Outcome::ServeMapped)),
                _ => tracing::debug!(subdomain = %subdomain, resource_id, "Mapped resource unavailable"),
            }
        }

        self.content
            .resolve_by_slug(subdomain)
            .await
            .map(|content| (content, Outcome::ServeSlug))
    }

    async fn unmapped(&self, subdomain: String, ctx: &RequestContext) -> Decision {
        if self.settings.unmapped_behavior == UnmappedBehavior::Redirect {
            self.recorder.record(self.settings, &subdomain, UNMAPPED_REDIRECT_TARGET, ctx).await;
            return Decision::Redirect(RedirectDecision {
                location: self.site.root_url(),
                status: self.settings.unmapped_redirect_code,
                key: subdomain,
                outcome: Outcome::UnmappedRedirect,
            });
        }

        let home = self.content.homepage().await;
        self.recorder.record(self.settings, &subdomain, UNMAPPED_TARGET, ctx).await;
        Decision::Serve(ServeDecision {
            path: home.path.clone(),
            canonical_url: self.content.permalink(&home),
            key: subdomain,
            content: home,
            outcome: Outcome::ServeUnmapped,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::content::{CatalogResolver, ContentKind};
    use crate::settings::DomainRedirectRule;
    use crate::store::test_support::installed_pool;
    use crate::store::{KeyFilter, MappingInput, MappingStore, StoreError};

    struct Fixture {
        store: MappingStore,
        recorder: Recorder,
        stats: StatisticsEngine,
        log: EventLog,
        content: CatalogResolver,
        site: SiteInfo,
    }

    impl Fixture {
        async fn new() -> Self {
            let (pool, tables) = installed_pool().await;
            let stats = StatisticsEngine::new(pool.clone(), &tables);
            let log = EventLog::new(pool.clone(), &tables);
            Self {
                store: MappingStore::new(pool, &tables),
                recorder: Recorder::new(stats.clone(), log.clone()),
                stats,
                log,
                content: CatalogResolver::builder("https://example.com")
                    .add(42, "tickets-page", ContentKind::Page, true)
                    .add(43, "draft", ContentKind::Page, false)
                    .add(50, "events", ContentKind::Post, true)
                    .build(),
                site: SiteInfo {
                    home_url: "https://example.com".into(),
                    main_domain: "example.com".into(),
                },
            }
        }

        async fn run(&self, settings: &Settings, host: &str) -> Decision {
            self.run_with(settings, host, &self.store).await
        }

        async fn run_with(&self, settings: &Settings, host: &str, mappings: &dyn MappingLookup) -> Decision {
            let pipeline = Pipeline {
                settings,
                site: &self.site,
                mappings,
                content: &self.content,
                recorder: &self.recorder,
            };
            pipeline.run(&ctx(host, "/shop", Some("x=1"))).await
        }

        async fn map(&self, sub: &str, target: MappingTarget, code: i64) {
            let input = MappingInput {
                subdomain: sub.into(),
                target,
                status_code: Some(code),
                active: None,
            };
            self.store.add(&input, &self.content).await.unwrap();
        }

        async fn count(&self, key: &str) -> i64 {
            self.stats.get_by_key(key).await.unwrap().map(|r| r.redirect_count).unwrap_or(0)
        }
    }

    fn ctx(host: &str, path: &str, query: Option<&str>) -> RequestContext {
        RequestContext {
            scheme: "https".into(),
            host: host.into(),
            path: path.into(),
            query: query.map(String::from),
            client_ip: "192.168.1.100".into(),
            user_agent: "test".into(),
            referer: String::new(),
        }
    }

    fn logging() -> Settings {
        Settings {
            logging_enabled: true,
            ..Settings::default()
        }
    }

    /// Lookup that counts calls and always fails.
    #[derive(Default)]
    struct CountingLookup {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MappingLookup for CountingLookup {
        async fn find_active(&self, _subdomain: &str) -> Result<Option<Mapping>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Sql(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn test_domain_redirect_skips_mapping_store() {
        let f = Fixture::new().await;
        let mut settings = logging();
        settings.redirect_domains.push(DomainRedirectRule {
            from_domain: "cardandcraft.org".into(),
            target_url: "https://cardandcraft.com".into(),
            status_code: RedirectCode::MovedPermanently,
            keep_path: true,
            keep_query: false,
        });

        let lookup = CountingLookup::default();
        let decision = f.run_with(&settings, "cardandcraft.org", &lookup).await;
        let Decision::Redirect(r) = decision else { panic!("expected redirect") };
        assert_eq!(r.location, "https://cardandcraft.com/shop");
        assert_eq!(r.status, RedirectCode::MovedPermanently);
        assert_eq!(r.outcome, Outcome::DomainRedirect);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.count("@cardandcraft.org").await, 1);
        assert_eq!(f.log.total_count(&KeyFilter::domain_redirects()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_disabled_or_bare_host_passes_through() {
        let f = Fixture::new().await;
        let disabled = Settings { enabled: false, ..Settings::default() };
        assert_eq!(f.run(&disabled, "tickets.example.com").await, Decision::PassThrough);
        assert_eq!(f.run(&Settings::default(), "example.com").await, Decision::PassThrough);
        assert_eq!(f.run(&Settings::default(), "www.example.com").await, Decision::PassThrough);
        assert_eq!(f.run(&Settings::default(), "mail.example.com").await, Decision::PassThrough);
        assert_eq!(f.stats.total_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mapped_resource_is_served_with_canonical() {
        let f = Fixture::new().await;
        f.map("tickets", MappingTarget::ServeResource { resource_id: 42 }, 301).await;

        let decision = f.run(&logging(), "tickets.example.com").await;
        let Decision::Serve(s) = decision else { panic!("expected serve") };
        assert_eq!(s.content.id, 42);
        assert_eq!(s.path, "/tickets-page/");
        assert_eq!(s.canonical_url, "https://example.com/tickets-page/");
        assert_eq!(s.outcome, Outcome::ServeMapped);
        assert_eq!(f.count("tickets").await, 1);

        let entries = f.log.list(&Default::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target_path, "/tickets-page/");
        assert_eq!(entries[0].source_url, "https://tickets.example.com/shop?x=1");
    }

    #[tokio::test]
    async fn test_url_and_home_mappings_redirect() {
        let f = Fixture::new().await;
        f.map("go", MappingTarget::RedirectUrl { url: "https://partner.org/x".into() }, 307).await;
        f.map("home", MappingTarget::RedirectHome, 302).await;

        let Decision::Redirect(r) = f.run(&Settings::default(), "go.example.com").await else { panic!() };
        assert_eq!((r.location.as_str(), r.status.as_u16()), ("https://partner.org/x", 307));

        let Decision::Redirect(r) = f.run(&Settings::default(), "home.example.com").await else { panic!() };
        assert_eq!((r.location.as_str(), r.status.as_u16()), ("https://example.com/", 302));
        assert_eq!(
            f.stats.get_by_key("home").await.unwrap().unwrap().target_path,
            HOME_REDIRECT_TARGET
        );
    }

    #[tokio::test]
    async fn test_unpublished_mapping_falls_back_to_slug() {
        let f = Fixture::new().await;
        f.map("events", MappingTarget::ServeResource { resource_id: 43 }, 301).await;

        let Decision::Serve(s) = f.run(&Settings::default(), "events.example.com").await else { panic!() };
        assert_eq!(s.content.id, 50);
        assert_eq!(s.outcome, Outcome::ServeSlug);
    }

    #[tokio::test]
    async fn test_unmapped_show_serves_homepage() {
        let f = Fixture::new().await;
        let Decision::Serve(s) = f.run(&Settings::default(), "nothing.example.com").await else { panic!() };
        assert_eq!(s.path, "/");
        assert_eq!(s.canonical_url, "https://example.com/");
        assert_eq!(s.outcome, Outcome::ServeUnmapped);
        let rec = f.stats.get_by_key("nothing").await.unwrap().unwrap();
        assert_eq!((rec.redirect_count, rec.target_path.as_str()), (1, UNMAPPED_TARGET));
    }

    #[tokio::test]
    async fn test_unmapped_redirect_uses_configured_code() {
        let f = Fixture::new().await;
        let mut settings = Settings {
            unmapped_behavior: UnmappedBehavior::Redirect,
            ..Settings::default()
        };
        let Decision::Redirect(r) = f.run(&settings, "nothing.example.com").await else { panic!() };
        assert_eq!((r.location.as_str(), r.status.as_u16()), ("https://example.com/", 302));

        settings.unmapped_redirect_code = RedirectCode::PermanentRedirect;
        let Decision::Redirect(r) = f.run(&settings, "nothing.example.com").await else { panic!() };
        assert_eq!(r.status.as_u16(), 308);

        let rec = f.stats.get_by_key("nothing").await.unwrap().unwrap();
        assert_eq!((rec.redirect_count, rec.target_path.as_str()), (2, UNMAPPED_REDIRECT_TARGET));
    }

    #[tokio::test]
    async fn test_lookup_failure_falls_through_to_next_tier() {
        let f = Fixture::new().await;
        let lookup = CountingLookup::default();
        let decision = f.run_with(&Settings::default(), "events.example.com", &lookup).await;
        assert_eq!(decision.outcome(), Outcome::ServeSlug);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_alias_domains_route_like_the_main_domain() {
        let f = Fixture::new().await;
        let settings = Settings {
            aliased_domains: vec!["example.org".into()],
            ..Settings::default()
        };
        let decision = f.run(&settings, "events.example.org").await;
        assert_eq!(decision.outcome(), Outcome::ServeSlug);
        assert_eq!(f.run(&settings, "events.other.org").await, Decision::PassThrough);
    }
}
