use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::error::AdminError;
use crate::http::server::{AppState, Inner};
use crate::settings::{RedirectRuleInput, Settings, SettingsInput};
use crate::store::event_log::LogOrder;
use crate::store::mappings::MappingQuery;
use crate::store::{
    KeyFilter, LogEntry, LogQuery, Mapping, MappingInput, SortDir, StatisticRecord, StatsQuery, StatsSummary,
};
use crate::tenancy::TenantContext;

type AdminResult<T> = Result<T, AdminError>;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub tenants: usize,
    pub early_domain_redirects: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Created {
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Deleted {
    pub deleted: u64,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PruneRequest {
    /// Overrides the tenant's retention setting.
    pub days: Option<u32>,
}

/// Flat query string for log listing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogParams {
    /// `domain` or `subdomain`.
    pub kind: Option<String>,
    pub include_prefix: Option<String>,
    pub exclude_prefix: Option<String>,
    pub order_by: LogOrder,
    pub dir: SortDir,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl LogParams {
    fn into_query(self) -> AdminResult<LogQuery> {
        let mut filter = match self.kind.as_deref() {
            None | Some("") | Some("all") => KeyFilter::all(),
            Some("domain") => KeyFilter::domain_redirects(),
            Some("subdomain") => KeyFilter::subdomains(),
            Some(other) => return Err(AdminError::BadRequest(format!("unknown log kind {other:?}"))),
        };
        if self.include_prefix.is_some() {
            filter.include_prefix = self.include_prefix;
        }
        if self.exclude_prefix.is_some() {
            filter.exclude_prefix = self.exclude_prefix;
        }
        Ok(LogQuery {
            filter,
            order_by: self.order_by,
            dir: self.dir,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct TenantSummary {
    pub id: u32,
    pub name: String,
    pub main_domain: String,
    pub mappings: i64,
    pub active_mappings: i64,
    pub redirect_rules: usize,
    pub statistics: StatsSummary,
}

#[derive(Debug, Serialize)]
pub struct TenantMappings {
    pub tenant_id: u32,
    pub tenant_name: String,
    pub mappings: Vec<Mapping>,
}

#[derive(Debug, Serialize)]
pub struct StatisticsOverview {
    pub summary: StatsSummary,
    pub top: Vec<StatisticRecord>,
    pub recent: Vec<StatisticRecord>,
}

/// Redirect count of one key summed over every tenant.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkKeyCount {
    pub key: String,
    pub redirect_count: i64,
    /// Tenants contributing to the count, in id order.
    pub tenants: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TopParams {
    pub limit: u32,
}

impl Default for TopParams {
    fn default() -> Self {
        Self { limit: 10 }
    }
}

/// Merge each tenant's busiest keys by name and keep the `n` largest sums.
fn merge_top_keys(per_tenant: Vec<(u32, Vec<StatisticRecord>)>, n: usize) -> Vec<NetworkKeyCount> {
    let mut merged: BTreeMap<String, NetworkKeyCount> = BTreeMap::new();
    for (tenant_id, records) in per_tenant {
        for record in records {
            let entry = merged.entry(record.key.clone()).or_insert_with(|| NetworkKeyCount {
                key: record.key,
                redirect_count: 0,
                tenants: Vec::new(),
            });
            entry.redirect_count += record.redirect_count;
            entry.tenants.push(tenant_id);
        }
    }

    let mut top: Vec<NetworkKeyCount> = merged.into_values().collect();
    // Stable sort keeps ties in key order.
    top.sort_by(|a, b| b.redirect_count.cmp(&a.redirect_count));
    top.truncate(n);
    top
}

fn tenant(inner: &Inner, id: u32) -> AdminResult<&TenantContext> {
    inner
        .registry
        .get(id)
        .ok_or_else(|| AdminError::NotFound(format!("tenant {id}")))
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let inner = state.inner.load_full();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        tenants: inner.registry.tenants().count(),
        early_domain_redirects: inner.early.is_some(),
    })
}

async fn summarize(ctx: &TenantContext) -> AdminResult<TenantSummary> {
    Ok(TenantSummary {
        id: ctx.id(),
        name: ctx.tenant.name.clone(),
        main_domain: ctx.tenant.site.main_domain.clone(),
        mappings: ctx.mappings.total_count(false).await?,
        active_mappings: ctx.mappings.total_count(true).await?,
        redirect_rules: ctx.settings.load().await?.redirect_domains.len(),
        statistics: ctx.stats.summary().await?,
    })
}

pub async fn get_network(State(state): State<AppState>) -> AdminResult<Json<Vec<TenantSummary>>> {
    let inner = state.inner.load_full();
    let summaries = inner.registry.for_each_tenant(summarize).await;
    Ok(Json(summaries.into_iter().collect::<AdminResult<Vec<_>>>()?))
}

pub async fn get_network_mappings(State(state): State<AppState>) -> AdminResult<Json<Vec<TenantMappings>>> {
    let inner = state.inner.load_full();
    let query = MappingQuery {
        limit: Some(500),
        ..MappingQuery::default()
    };
    let all = inner
        .registry
        .for_each_tenant(|ctx| {
            let query = &query;
            async move {
                Ok::<_, AdminError>(TenantMappings {
                    tenant_id: ctx.id(),
                    tenant_name: ctx.tenant.name.clone(),
                    mappings: ctx.mappings.list(query).await?,
                })
            }
        })
        .await;
    Ok(Json(all.into_iter().collect::<AdminResult<Vec<_>>>()?))
}

pub async fn get_network_statistics(
    State(state): State<AppState>,
    Query(params): Query<TopParams>,
) -> AdminResult<Json<Vec<NetworkKeyCount>>> {
    let inner = state.inner.load_full();
    let limit = params.limit.clamp(1, 100);
    let per_tenant = inner
        .registry
        .for_each_tenant(|ctx| async move { Ok::<_, AdminError>((ctx.id(), ctx.stats.top_n(limit).await?)) })
        .await
        .into_iter()
        .collect::<AdminResult<Vec<_>>>()?;
    Ok(Json(merge_top_keys(per_tenant, limit as usize)))
}

// Mappings

pub async fn list_mappings(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Query(query): Query<MappingQuery>,
) -> AdminResult<Json<Page<Mapping>>> {
    let inner = state.inner.load_full();
    let ctx = tenant(&inner, id)?;
    Ok(Json(Page {
        items: ctx.mappings.list(&query).await?,
        total: ctx.mappings.total_count(query.active_only).await?,
    }))
}

pub async fn create_mapping(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(input): Json<MappingInput>,
) -> AdminResult<(StatusCode, Json<Created>)> {
    let inner = state.inner.load_full();
    let ctx = tenant(&inner, id)?;
    let mapping_id = ctx.mappings.add(&input, ctx.content.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(Created { id: mapping_id })))
}

pub async fn get_mapping(
    State(state): State<AppState>,
    Path((id, mapping_id)): Path<(u32, i64)>,
) -> AdminResult<Json<Mapping>> {
    let inner = state.inner.load_full();
    let ctx = tenant(&inner, id)?;
    ctx.mappings
        .get_by_id(mapping_id)
        .await?
        .map(Json)
        .ok_or_else(|| AdminError::NotFound(format!("mapping {mapping_id}")))
}

pub async fn update_mapping(
    State(state): State<AppState>,
    Path((id, mapping_id)): Path<(u32, i64)>,
    Json(input): Json<MappingInput>,
) -> AdminResult<Json<Mapping>> {
    let inner = state.inner.load_full();
    let ctx = tenant(&inner, id)?;
    ctx.mappings.update(mapping_id, &input, ctx.content.as_ref()).await?;
    get_mapping(State(state), Path((id, mapping_id))).await
}

pub async fn set_mapping_active(
    State(state): State<AppState>,
    Path((id, mapping_id)): Path<(u32, i64)>,
    Json(body): Json<ActiveRequest>,
) -> AdminResult<Json<Mapping>> {
    let inner = state.inner.load_full();
    let ctx = tenant(&inner, id)?;
    ctx.mappings.set_active(mapping_id, body.active).await?;
    get_mapping(State(state), Path((id, mapping_id))).await
}

pub async fn delete_mapping(
    State(state): State<AppState>,
    Path((id, mapping_id)): Path<(u32, i64)>,
) -> AdminResult<Json<Deleted>> {
    let inner = state.inner.load_full();
    let ctx = tenant(&inner, id)?;
    let removed = ctx.mappings.delete(mapping_id).await?;
    Ok(Json(Deleted { deleted: u64::from(removed) }))
}

// Settings

pub async fn get_settings(State(state): State<AppState>, Path(id): Path<u32>) -> AdminResult<Json<Settings>> {
    let inner = state.inner.load_full();
    let settings = tenant(&inner, id)?.settings.load().await?;
    Ok(Json(Arc::unwrap_or_clone(settings)))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(input): Json<SettingsInput>,
) -> AdminResult<Json<Settings>> {
    let inner = state.inner.load_full();
    Ok(Json(tenant(&inner, id)?.settings.update(&input).await?))
}

pub async fn add_redirect_domain(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(input): Json<RedirectRuleInput>,
) -> AdminResult<(StatusCode, Json<Settings>)> {
    let inner = state.inner.load_full();
    let ctx = tenant(&inner, id)?;
    ctx.settings.add_redirect_rule(&input).await?;
    let settings = ctx.settings.load().await?;
    Ok((StatusCode::CREATED, Json(Arc::unwrap_or_clone(settings))))
}

pub async fn remove_redirect_domain(
    State(state): State<AppState>,
    Path((id, index)): Path<(u32, usize)>,
) -> AdminResult<Json<Settings>> {
    let inner = state.inner.load_full();
    let ctx = tenant(&inner, id)?;
    let removed = ctx.settings.remove_redirect_rule(index).await?;
    tracing::info!(tenant = id, domain = %removed.from_domain, "Domain redirect removed");
    let settings = ctx.settings.load().await?;
    Ok(Json(Arc::unwrap_or_clone(settings)))
}

// Statistics

pub async fn list_statistics(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Query(query): Query<StatsQuery>,
) -> AdminResult<Json<Page<StatisticRecord>>> {
    let inner = state.inner.load_full();
    let ctx = tenant(&inner, id)?;
    Ok(Json(Page {
        items: ctx.stats.list(&query).await?,
        total: ctx.stats.total_count().await?,
    }))
}

pub async fn statistics_summary(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> AdminResult<Json<StatisticsOverview>> {
    let inner = state.inner.load_full();
    let ctx = tenant(&inner, id)?;
    Ok(Json(StatisticsOverview {
        summary: ctx.stats.summary().await?,
        top: ctx.stats.top_n(10).await?,
        recent: ctx.stats.most_recent_n(10).await?,
    }))
}

pub async fn reset_statistics(State(state): State<AppState>, Path(id): Path<u32>) -> AdminResult<Json<Deleted>> {
    let inner = state.inner.load_full();
    let deleted = tenant(&inner, id)?.stats.reset_all().await?;
    Ok(Json(Deleted { deleted }))
}

pub async fn reset_statistic(
    State(state): State<AppState>,
    Path((id, key)): Path<(u32, String)>,
) -> AdminResult<Json<Deleted>> {
    let inner = state.inner.load_full();
    let removed = tenant(&inner, id)?.stats.reset_one(&key).await?;
    Ok(Json(Deleted { deleted: u64::from(removed) }))
}

// Logs

pub async fn list_logs(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Query(params): Query<LogParams>,
) -> AdminResult<Json<Page<LogEntry>>> {
    let inner = state.inner.load_full();
    let ctx = tenant(&inner, id)?;
    let query = params.into_query()?;
    Ok(Json(Page {
        items: ctx.log.list(&query).await?,
        total: ctx.log.total_count(&query.filter).await?,
    }))
}

pub async fn get_log(
    State(state): State<AppState>,
    Path((id, log_id)): Path<(u32, i64)>,
) -> AdminResult<Json<LogEntry>> {
    let inner = state.inner.load_full();
    tenant(&inner, id)?
        .log
        .get_by_id(log_id)
        .await?
        .map(Json)
        .ok_or_else(|| AdminError::NotFound(format!("log entry {log_id}")))
}

pub async fn clear_logs(State(state): State<AppState>, Path(id): Path<u32>) -> AdminResult<Json<Deleted>> {
    let inner = state.inner.load_full();
    let deleted = tenant(&inner, id)?.log.clear_all().await?;
    Ok(Json(Deleted { deleted }))
}

pub async fn prune_logs(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    body: Option<Json<PruneRequest>>,
) -> AdminResult<Json<Deleted>> {
    let inner = state.inner.load_full();
    let ctx = tenant(&inner, id)?;
    let days = match body.and_then(|Json(b)| b.days) {
        Some(days) => days,
        None => ctx.settings.load().await?.log_retention_days,
    };
    let deleted = ctx.log.delete_older_than(days).await?;
    Ok(Json(Deleted { deleted }))
}
