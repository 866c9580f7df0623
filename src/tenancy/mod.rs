//! Tenants and their per-request context.
//!
//! # Responsibilities
//! - Bind each configured site to its table prefix and stores
//! - Map an incoming Host header to the tenant that serves it
//! - Iterate tenants for network-wide views and maintenance
//!
//! # Design Decisions
//! - There is no ambient "current tenant": callers hold a `&TenantContext`
//! - Unknown hosts fall back to the primary tenant (lowest id)
//! - The most specific host wins when tenants share a parent domain

use std::future::Future;
use std::sync::Arc;

use sqlx::SqlitePool;
use thiserror::Error;

use crate::config::schema::{NetworkConfig, TenantConfig};
use crate::content::CatalogResolver;
use crate::routing::host::{normalize_host, strip_www};
use crate::routing::{Decision, Pipeline, Recorder, RequestContext, SiteInfo};
use crate::settings::{SettingsCache, SettingsStore};
use crate::store::{schema, EventLog, MappingStore, StatisticsEngine, StoreError, Tables};

#[derive(Debug, Error)]
pub enum TenancyError {
    #[error("no tenants configured")]
    Empty,

    #[error("tenant {id}: site URL {url:?} has no host")]
    InvalidSiteUrl { id: u32, url: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Static identity of one tenant.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: u32,
    pub name: String,
    pub site: SiteInfo,
    /// `host:port` of the origin.
    pub upstream: String,
    /// Normalized hosts (site host first) owned by this tenant.
    pub hosts: Vec<String>,
}

impl Tenant {
    fn from_config(config: &TenantConfig) -> Result<Self, TenancyError> {
        let invalid = || TenancyError::InvalidSiteUrl {
            id: config.id,
            url: config.site_url.clone(),
        };
        let url = url::Url::parse(&config.site_url).map_err(|_| invalid())?;
        let site_host = url.host_str().ok_or_else(invalid)?;
        let main_domain = strip_www(site_host).to_ascii_lowercase();

        let mut hosts = vec![main_domain.clone()];
        for domain in &config.domains {
            let domain = normalize_host(domain);
            if !domain.is_empty() && !hosts.contains(&domain) {
                hosts.push(domain);
            }
        }

        Ok(Self {
            id: config.id,
            name: config.name.clone(),
            site: SiteInfo {
                home_url: config.site_url.trim_end_matches('/').to_string(),
                main_domain,
            },
            upstream: config.upstream.clone(),
            hosts,
        })
    }

    /// Length of the most specific owned host that covers `host`.
    fn host_match_len(&self, host: &str) -> Option<usize> {
        self.hosts
            .iter()
            .filter(|owned| host == owned.as_str() || host.ends_with(&format!(".{owned}")))
            .map(String::len)
            .max()
    }
}

/// A tenant with its stores bound to its table prefix.
pub struct TenantContext {
    pub tenant: Tenant,
    pub tables: Tables,
    pub settings: SettingsStore,
    pub mappings: MappingStore,
    pub stats: StatisticsEngine,
    pub log: EventLog,
    pub content: Arc<CatalogResolver>,
    recorder: Recorder,
}

impl TenantContext {
    pub fn new(pool: SqlitePool, config: &TenantConfig, cache: SettingsCache) -> Result<Self, TenancyError> {
        let tenant = Tenant::from_config(config)?;
        let tables = Tables::for_tenant(tenant.id);
        let stats = StatisticsEngine::new(pool.clone(), &tables);
        let log = EventLog::new(pool.clone(), &tables);

        Ok(Self {
            settings: SettingsStore::new(pool.clone(), &tables, tenant.id, cache),
            mappings: MappingStore::new(pool, &tables),
            recorder: Recorder::new(stats.clone(), log.clone()),
            stats,
            log,
            content: Arc::new(CatalogResolver::from_tenant(config)),
            tenant,
            tables,
        })
    }

    pub fn id(&self) -> u32 {
        self.tenant.id
    }

    /// Run the routing pipeline for one request against this tenant.
    pub async fn intercept(&self, ctx: &RequestContext) -> Decision {
        let settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(tenant = self.id(), error = %e, "Settings unavailable, passing request through");
                return Decision::PassThrough;
            }
        };

        let pipeline = Pipeline {
            settings: &settings,
            site: &self.tenant.site,
            mappings: &self.mappings,
            content: self.content.as_ref(),
            recorder: &self.recorder,
        };
        pipeline.run(ctx).await
    }
}

/// All tenants of the deployment, ordered by id.
pub struct TenantRegistry {
    pool: SqlitePool,
    tenants: Vec<TenantContext>,
}

impl TenantRegistry {
    pub fn from_config(pool: SqlitePool, network: &NetworkConfig, cache: SettingsCache) -> Result<Self, TenancyError> {
        let mut tenants = network
            .tenants
            .iter()
            .map(|t| TenantContext::new(pool.clone(), t, cache.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        if tenants.is_empty() {
            return Err(TenancyError::Empty);
        }
        tenants.sort_by_key(TenantContext::id);
        Ok(Self { pool, tenants })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create missing tables for every tenant.
    pub async fn install_all(&self) -> Result<(), StoreError> {
        for ctx in &self.tenants {
            schema::install(&self.pool, &ctx.tables).await?;
        }
        Ok(())
    }

    /// Drop every tenant's tables. Configuration is left untouched.
    pub async fn uninstall_all(&self) -> Result<(), StoreError> {
        for ctx in &self.tenants {
            schema::uninstall(&self.pool, &ctx.tables).await?;
            ctx.settings.forget();
        }
        Ok(())
    }

    /// The lowest-id tenant.
    pub fn primary(&self) -> &TenantContext {
        &self.tenants[0]
    }

    pub fn get(&self, id: u32) -> Option<&TenantContext> {
        self.tenants.iter().find(|t| t.id() == id)
    }

    pub fn tenants(&self) -> impl Iterator<Item = &TenantContext> {
        self.tenants.iter()
    }

    /// Tenant serving `host`; the primary tenant when none claims it.
    pub fn resolve_host(&self, host: &str) -> &TenantContext {
        let host = normalize_host(host);
        self.tenants
            .iter()
            .filter_map(|t| t.tenant.host_match_len(&host).map(|len| (len, t)))
            .max_by_key(|(len, t)| (*len, std::cmp::Reverse(t.id())))
            .map(|(_, t)| t)
            .unwrap_or_else(|| self.primary())
    }

    /// Visit every tenant in id order, collecting the callback results.
    pub async fn for_each_tenant<'a, F, Fut, T>(&'a self, mut f: F) -> Vec<T>
    where
        F: FnMut(&'a TenantContext) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut out = Vec::with_capacity(self.tenants.len());
        for ctx in &self.tenants {
            out.push(f(ctx).await);
        }
        out
    }
}
