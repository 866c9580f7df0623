//! Domain redirects that run before tenant resolution.
//!
//! Multi-tenant deployments may forward a whole domain that no tenant
//! serves. This handler reads the primary tenant's settings row directly
//! and writes through the same leaf functions the stores use, so it needs
//! nothing but the pool.

use std::time::Instant;

use serde::Deserialize;
use sqlx::SqlitePool;

use crate::observability::metrics;
use crate::routing::context::RequestContext;
use crate::routing::domain::{find_domain_redirect, plan_domain_redirect};
use crate::routing::pipeline::{Outcome, RedirectDecision};
use crate::settings::{DomainRedirectRule, SETTINGS_OPTION};
use crate::store::counter::increment_or_insert;
use crate::store::event_log::{insert_entry, LogDraft};
use crate::store::{now_ms, StoreError, Tables};

/// The slice of the settings blob this handler needs.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct EarlySettings {
    enabled: bool,
    logging_enabled: bool,
    redirect_domains: Vec<DomainRedirectRule>,
}

impl Default for EarlySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            logging_enabled: false,
            redirect_domains: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct EarlyDomainRedirect {
    pool: SqlitePool,
    tables: Tables,
}

impl EarlyDomainRedirect {
    /// Bind to the primary tenant's tables.
    pub fn new(pool: SqlitePool, primary: Tables) -> Self {
        Self { pool, tables: primary }
    }

    /// A redirect for `ctx` if one of the primary tenant's rules matches.
    ///
    /// Storage failures disable the handler for this request; the regular
    /// pipeline still runs afterwards.
    pub async fn check(&self, ctx: &RequestContext) -> Option<RedirectDecision> {
        let started = Instant::now();
        let settings = match self.load_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "Early redirect could not read settings");
                return None;
            }
        };
        if !settings.enabled {
            return None;
        }

        let rule = find_domain_redirect(&settings.redirect_domains, &ctx.host)?;
        let plan = plan_domain_redirect(rule, ctx);
        let now = now_ms();

        if let Err(e) = increment_or_insert(&self.pool, &self.tables.statistics, &plan.key, &plan.description, now).await {
            tracing::warn!(key = %plan.key, error = %e, "Failed to record statistic");
            metrics::record_recording_failure("statistics");
        }
        if settings.logging_enabled {
            let draft = LogDraft::from_context(&plan.key, &plan.description, &ctx.source_url(), ctx);
            if let Err(e) = insert_entry(&self.pool, &self.tables.logs, &draft, now).await {
                tracing::warn!(key = %plan.key, error = %e, "Failed to write event log");
                metrics::record_recording_failure("log");
            }
        }

        tracing::debug!(host = %ctx.host, key = %plan.key, outcome = "domain_redirect", "Early routing decision");
        metrics::record_decision(Outcome::DomainRedirect.as_str(), started);

        Some(RedirectDecision {
            location: plan.location,
            status: plan.status,
            key: plan.key,
            outcome: Outcome::DomainRedirect,
        })
    }

    async fn load_settings(&self) -> Result<EarlySettings, StoreError> {
        let raw: Option<String> = sqlx::query_scalar(&format!("SELECT value FROM {} WHERE name = ?", self.tables.options))
            .bind(SETTINGS_OPTION)
            .fetch_optional(&self.pool)
            .await?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(EarlySettings::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{RedirectCode, Settings};
    use crate::store::test_support::installed_pool;
    use crate::store::{EventLog, KeyFilter, StatisticsEngine};

    async fn save(pool: &SqlitePool, tables: &Tables, settings: &Settings) {
        sqlx::query(&format!("UPDATE {} SET value = ? WHERE name = ?", tables.options))
            .bind(serde_json::to_string(settings).unwrap())
            .bind(SETTINGS_OPTION)
            .execute(pool)
            .await
            .unwrap();
    }

    fn settings(enabled: bool) -> Settings {
        Settings {
            enabled,
            logging_enabled: true,
            redirect_domains: vec![DomainRedirectRule {
                from_domain: "old.org".into(),
                target_url: "https://new.org/".into(),
                status_code: RedirectCode::PermanentRedirect,
                keep_path: true,
                keep_query: true,
            }],
            ..Settings::default()
        }
    }

    fn ctx(host: &str) -> RequestContext {
        RequestContext {
            scheme: "http".into(),
            host: host.into(),
            path: "/a/b".into(),
            query: Some("q=1".into()),
            client_ip: "10.1.2.3".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_early_redirect_records_through_shared_leaves() {
        let (pool, tables) = installed_pool().await;
        save(&pool, &tables, &settings(true)).await;
        let early = EarlyDomainRedirect::new(pool.clone(), tables.clone());

        let r = early.check(&ctx("www.old.org")).await.unwrap();
        assert_eq!(r.location, "https://new.org/a/b?q=1");
        assert_eq!(r.status, RedirectCode::PermanentRedirect);
        early.check(&ctx("old.org:8080")).await.unwrap();

        let stats = StatisticsEngine::new(pool.clone(), &tables);
        let rec = stats.get_by_key("@old.org").await.unwrap().unwrap();
        assert_eq!(rec.redirect_count, 2);
        assert_eq!(rec.target_path, "→ https://new.org/");

        let log = EventLog::new(pool, &tables);
        assert_eq!(log.total_count(&KeyFilter::domain_redirects()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_early_redirect_respects_enabled_and_misses() {
        let (pool, tables) = installed_pool().await;
        let early = EarlyDomainRedirect::new(pool.clone(), tables.clone());
        assert!(early.check(&ctx("old.org")).await.is_none());

        save(&pool, &tables, &settings(false)).await;
        assert!(early.check(&ctx("old.org")).await.is_none());

        save(&pool, &tables, &settings(true)).await;
        assert!(early.check(&ctx("unrelated.org")).await.is_none());
    }
}
