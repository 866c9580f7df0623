//! Subdomain mapping store.
//!
//! # Responsibilities
//! - CRUD over the tenant's `{prefix}mappings` table
//! - Validate writes (subdomain charset, resolvable resource, absolute URL)
//! - Active-only lookup for the request pipeline
//!
//! # Design Decisions
//! - The mapping kind is a sum type; rows whose columns contradict their
//!   kind surface as `Invalid` to the admin (so they can be repaired) and
//!   are never returned by the active lookup
//! - Uniqueness is checked up front and enforced again by the UNIQUE index
//! - Deleting a missing row is not an error

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

use super::{from_ms, now_ms, page_limit, SortDir, StoreError, Tables};
use crate::content::ContentResolver;
use crate::routing::host::is_valid_label;
use crate::settings::RedirectCode;

const TYPE_RESOURCE: &str = "post";
const TYPE_URL: &str = "url";
const TYPE_HOME: &str = "home";

/// Where a mapped subdomain sends its traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingTarget {
    /// Serve this content item in place, keeping the subdomain URL.
    ServeResource { resource_id: i64 },
    /// Redirect to an absolute URL.
    RedirectUrl { url: String },
    /// Redirect to the site root.
    RedirectHome,
    /// Stored row whose columns contradict its type. Never accepted as input.
    #[serde(skip_deserializing)]
    Invalid { mapping_type: String },
}

impl MappingTarget {
    fn type_column(&self) -> &'static str {
        match self {
            MappingTarget::ServeResource { .. } => TYPE_RESOURCE,
            MappingTarget::RedirectUrl { .. } => TYPE_URL,
            MappingTarget::RedirectHome => TYPE_HOME,
            MappingTarget::Invalid { .. } => "invalid",
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, MappingTarget::Invalid { .. })
    }

    fn resource_column(&self) -> Option<i64> {
        match self {
            MappingTarget::ServeResource { resource_id } => Some(*resource_id),
            _ => None,
        }
    }

    fn url_column(&self) -> Option<&str> {
        match self {
            MappingTarget::RedirectUrl { url } => Some(url),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mapping {
    pub id: i64,
    pub subdomain: String,
    pub target: MappingTarget,
    pub status_code: RedirectCode,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct MappingRow {
    id: i64,
    subdomain: String,
    mapping_type: String,
    resource_id: Option<i64>,
    redirect_url: Option<String>,
    redirect_code: i64,
    is_active: bool,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl MappingRow {
    fn target(&self) -> Option<MappingTarget> {
        match self.mapping_type.as_str() {
            TYPE_RESOURCE => Some(MappingTarget::ServeResource {
                resource_id: self.resource_id.filter(|id| *id > 0)?,
            }),
            TYPE_URL => Some(MappingTarget::RedirectUrl {
                url: self.redirect_url.clone().filter(|u| !u.is_empty())?,
            }),
            TYPE_HOME => Some(MappingTarget::RedirectHome),
            _ => None,
        }
    }

    fn into_mapping(self) -> Mapping {
        let target = self.target().unwrap_or_else(|| MappingTarget::Invalid {
            mapping_type: self.mapping_type.clone(),
        });

        Mapping {
            id: self.id,
            subdomain: self.subdomain,
            target,
            status_code: RedirectCode::coerce(self.redirect_code, RedirectCode::MovedPermanently),
            active: self.is_active,
            created_at: from_ms(self.created_at_ms),
            updated_at: from_ms(self.updated_at_ms),
        }
    }
}

/// Admin-submitted mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingInput {
    pub subdomain: String,
    #[serde(flatten)]
    pub target: MappingTarget,
    #[serde(default)]
    pub status_code: Option<i64>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("invalid subdomain: {0:?}")]
    InvalidSubdomain(String),

    #[error("resource {0} does not exist")]
    UnresolvableResource(i64),

    #[error("redirect target must be an absolute http(s) URL: {0:?}")]
    InvalidUrl(String),

    #[error("unsupported mapping kind: {0:?}")]
    InvalidKind(String),

    #[error("subdomain {0:?} is already mapped")]
    Conflict(String),

    #[error("mapping {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for MappingError {
    fn from(err: sqlx::Error) -> Self {
        MappingError::Store(StoreError::Sql(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingOrder {
    #[default]
    Subdomain,
    ResourceId,
    Created,
    Updated,
}

impl MappingOrder {
    fn column(self) -> &'static str {
        match self {
            MappingOrder::Subdomain => "subdomain",
            MappingOrder::ResourceId => "resource_id",
            MappingOrder::Created => "created_at_ms",
            MappingOrder::Updated => "updated_at_ms",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingQuery {
    pub active_only: bool,
    pub order_by: MappingOrder,
    pub dir: Option<SortDir>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Read-side seam used by the request pipeline.
#[async_trait]
pub trait MappingLookup: Send + Sync {
    /// The active mapping for `subdomain`, if any.
    async fn find_active(&self, subdomain: &str) -> Result<Option<Mapping>, StoreError>;
}

/// Reduce admin input to a bare label: `"Tickets.Example.com"` → `"tickets"`.
pub fn normalize_subdomain(raw: &str) -> Result<String, MappingError> {
    let first = raw.trim().split('.').next().unwrap_or_default();
    let label: String = first
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();
    let label = label.trim_matches('-').to_string();

    if is_valid_label(&label) {
        Ok(label)
    } else {
        Err(MappingError::InvalidSubdomain(raw.to_string()))
    }
}

fn is_web_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

struct ValidMapping {
    subdomain: String,
    target: MappingTarget,
    code: RedirectCode,
}

#[derive(Clone)]
pub struct MappingStore {
    pool: SqlitePool,
    table: String,
}

impl MappingStore {
    pub fn new(pool: SqlitePool, tables: &Tables) -> Self {
        Self {
            pool,
            table: tables.mappings.clone(),
        }
    }

    /// Active mapping by subdomain label.
    pub async fn get_by_subdomain(&self, subdomain: &str) -> Result<Option<Mapping>, StoreError> {
        let row: Option<MappingRow> = sqlx::query_as(&format!(
            "SELECT * FROM {} WHERE subdomain = ? AND is_active = 1",
            self.table
        ))
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MappingRow::into_mapping).filter(|m| {
            if let MappingTarget::Invalid { mapping_type } = &m.target {
                tracing::warn!(id = m.id, mapping_type = %mapping_type, "Ignoring inconsistent mapping");
            }
            m.target.is_valid()
        }))
    }

    /// Mapping `id`, including inconsistent rows.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Mapping>, StoreError> {
        let row: Option<MappingRow> = sqlx::query_as(&format!("SELECT * FROM {} WHERE id = ?", self.table))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(MappingRow::into_mapping))
    }

    pub async fn list(&self, query: &MappingQuery) -> Result<Vec<Mapping>, StoreError> {
        let filter = if query.active_only { "WHERE is_active = 1" } else { "" };
        let sql = format!(
            "SELECT * FROM {} {filter} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
            self.table,
            query.order_by.column(),
            query.dir.unwrap_or(SortDir::Asc).as_sql(),
        );
        let rows: Vec<MappingRow> = sqlx::query_as(&sql)
            .bind(page_limit(query.limit, 50, 500))
            .bind(i64::from(query.offset))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(MappingRow::into_mapping).collect())
    }

    pub async fn total_count(&self, active_only: bool) -> Result<i64, StoreError> {
        let filter = if active_only { "WHERE is_active = 1" } else { "" };
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {} {filter}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Whether `subdomain` is taken by any row other than `exclude_id`.
    pub async fn exists(&self, subdomain: &str, exclude_id: Option<i64>) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} WHERE subdomain = ? AND id != ? LIMIT 1",
            self.table
        ))
        .bind(subdomain)
        .bind(exclude_id.unwrap_or(-1))
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// Insert a new active mapping and return its id.
    pub async fn add(&self, input: &MappingInput, resolver: &dyn ContentResolver) -> Result<i64, MappingError> {
        let valid = self.validate(input, resolver).await?;
        if self.exists(&valid.subdomain, None).await? {
            return Err(MappingError::Conflict(valid.subdomain));
        }

        let now = now_ms();
        let result = sqlx::query(&format!(
            "INSERT INTO {} (subdomain, mapping_type, resource_id, redirect_url, redirect_code, is_active, created_at_ms, updated_at_ms) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.table
        ))
        .bind(&valid.subdomain)
        .bind(valid.target.type_column())
        .bind(valid.target.resource_column())
        .bind(valid.target.url_column())
        .bind(i64::from(valid.code.as_u16()))
        .bind(input.active.unwrap_or(true))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, &valid.subdomain))?;

        let id = result.last_insert_rowid();
        tracing::info!(id, subdomain = %valid.subdomain, kind = valid.target.type_column(), "Mapping added");
        Ok(id)
    }

    /// Replace every field of mapping `id`; `active` is kept unless given.
    /// This also repairs a row read back as `Invalid`.
    pub async fn update(
        &self,
        id: i64,
        input: &MappingInput,
        resolver: &dyn ContentResolver,
    ) -> Result<(), MappingError> {
        let existing = self.get_by_id(id).await?.ok_or(MappingError::NotFound(id))?;
        let valid = self.validate(input, resolver).await?;
        if self.exists(&valid.subdomain, Some(id)).await? {
            return Err(MappingError::Conflict(valid.subdomain));
        }

        sqlx::query(&format!(
            "UPDATE {} SET subdomain = ?, mapping_type = ?, resource_id = ?, redirect_url = ?, \
             redirect_code = ?, is_active = ?, updated_at_ms = ? WHERE id = ?",
            self.table
        ))
        .bind(&valid.subdomain)
        .bind(valid.target.type_column())
        .bind(valid.target.resource_column())
        .bind(valid.target.url_column())
        .bind(i64::from(valid.code.as_u16()))
        .bind(input.active.unwrap_or(existing.active))
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, &valid.subdomain))?;

        tracing::info!(id, subdomain = %valid.subdomain, "Mapping updated");
        Ok(())
    }

    pub async fn set_active(&self, id: i64, active: bool) -> Result<(), MappingError> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET is_active = ?, updated_at_ms = ? WHERE id = ?",
            self.table
        ))
        .bind(active)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MappingError::NotFound(id));
        }
        Ok(())
    }

    /// Remove mapping `id`. Returns whether a row was actually deleted.
    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", self.table))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn validate(&self, input: &MappingInput, resolver: &dyn ContentResolver) -> Result<ValidMapping, MappingError> {
        let subdomain = normalize_subdomain(&input.subdomain)?;

        let target = match &input.target {
            MappingTarget::ServeResource { resource_id } => {
                if *resource_id <= 0 || resolver.resolve_by_id(*resource_id).await.is_none() {
                    return Err(MappingError::UnresolvableResource(*resource_id));
                }
                MappingTarget::ServeResource { resource_id: *resource_id }
            }
            MappingTarget::RedirectUrl { url } => {
                let url = url.trim();
                if !is_web_url(url) {
                    return Err(MappingError::InvalidUrl(url.to_string()));
                }
                MappingTarget::RedirectUrl { url: url.to_string() }
            }
            MappingTarget::RedirectHome => MappingTarget::RedirectHome,
            MappingTarget::Invalid { mapping_type } => return Err(MappingError::InvalidKind(mapping_type.clone())),
        };

        let code = input
            .status_code
            .map(|c| RedirectCode::coerce(c, RedirectCode::MovedPermanently))
            .unwrap_or_default();

        Ok(ValidMapping { subdomain, target, code })
    }
}

fn conflict_or(err: sqlx::Error, subdomain: &str) -> MappingError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return MappingError::Conflict(subdomain.to_string());
        }
    }
    err.into()
}

#[async_trait]
impl MappingLookup for MappingStore {
    async fn find_active(&self, subdomain: &str) -> Result<Option<Mapping>, StoreError> {
        self.get_by_subdomain(subdomain).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::catalog::CatalogResolver;
    use crate::content::ContentKind;
    use crate::store::test_support::installed_pool;

    fn resolver() -> CatalogResolver {
        CatalogResolver::builder("https://example.com")
            .add(42, "tickets", ContentKind::Page, true)
            .add(7, "draft-post", ContentKind::Post, false)
            .build()
    }

    fn serve(sub: &str, id: i64) -> MappingInput {
        MappingInput {
            subdomain: sub.into(),
            target: MappingTarget::ServeResource { resource_id: id },
            status_code: None,
            active: None,
        }
    }

    async fn store() -> MappingStore {
        let (pool, tables) = installed_pool().await;
        MappingStore::new(pool, &tables)
    }

    #[test]
    fn test_normalize_subdomain() {
        assert_eq!(normalize_subdomain("Tickets").unwrap(), "tickets");
        assert_eq!(normalize_subdomain("tickets.example.com").unwrap(), "tickets");
        assert_eq!(normalize_subdomain(" -my shop- ").unwrap(), "myshop");
        assert!(normalize_subdomain("").is_err());
        assert!(normalize_subdomain("!!!").is_err());
    }

    #[test]
    fn test_input_json_shape() {
        let input: MappingInput = serde_json::from_str(
            r#"{"subdomain": "go", "kind": "redirect_url", "url": "https://x.org", "status_code": 302}"#,
        )
        .unwrap();
        assert_eq!(input.target, MappingTarget::RedirectUrl { url: "https://x.org".into() });

        let input: MappingInput = serde_json::from_str(r#"{"subdomain": "home", "kind": "redirect_home"}"#).unwrap();
        assert_eq!(input.target, MappingTarget::RedirectHome);
    }

    #[tokio::test]
    async fn test_add_and_lookup() {
        let store = store().await;
        let id = store.add(&serve("Tickets.example.com", 42), &resolver()).await.unwrap();

        let mapping = store.get_by_subdomain("tickets").await.unwrap().unwrap();
        assert_eq!(mapping.id, id);
        assert_eq!(mapping.target, MappingTarget::ServeResource { resource_id: 42 });
        assert_eq!(mapping.status_code, RedirectCode::MovedPermanently);
        assert!(mapping.active);
        assert_eq!(store.total_count(false).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_subdomain_is_rejected() {
        let store = store().await;
        store.add(&serve("tickets", 42), &resolver()).await.unwrap();

        let err = store.add(&serve("TICKETS", 42), &resolver()).await.unwrap_err();
        assert!(matches!(err, MappingError::Conflict(ref s) if s == "tickets"));
        assert_eq!(store.total_count(false).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let store = store().await;
        let r = resolver();

        assert!(matches!(
            store.add(&serve("x", 999), &r).await,
            Err(MappingError::UnresolvableResource(999))
        ));

        let bad_url = MappingInput {
            subdomain: "go".into(),
            target: MappingTarget::RedirectUrl { url: "ftp://files.example.com".into() },
            status_code: None,
            active: None,
        };
        assert!(matches!(store.add(&bad_url, &r).await, Err(MappingError::InvalidUrl(_))));
        assert!(matches!(store.add(&serve("--", 42), &r).await, Err(MappingError::InvalidSubdomain(_))));
    }

    #[tokio::test]
    async fn test_unknown_code_is_coerced() {
        let store = store().await;
        let input = MappingInput {
            subdomain: "home".into(),
            target: MappingTarget::RedirectHome,
            status_code: Some(303),
            active: None,
        };
        let id = store.add(&input, &resolver()).await.unwrap();
        let m = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(m.status_code, RedirectCode::MovedPermanently);
    }

    #[tokio::test]
    async fn test_inactive_mapping_is_invisible_to_lookup() {
        let store = store().await;
        let id = store.add(&serve("tickets", 42), &resolver()).await.unwrap();
        store.set_active(id, false).await.unwrap();

        assert!(store.get_by_subdomain("tickets").await.unwrap().is_none());
        assert!(store.get_by_id(id).await.unwrap().is_some());
        assert_eq!(store.total_count(true).await.unwrap(), 0);
        assert!(matches!(store.set_active(999, true).await, Err(MappingError::NotFound(999))));
    }

    #[tokio::test]
    async fn test_update_checks_conflicts_against_other_rows() {
        let store = store().await;
        let r = resolver();
        let a = store.add(&serve("a", 42), &r).await.unwrap();
        store.add(&serve("b", 42), &r).await.unwrap();

        // Renaming onto itself is fine.
        store.update(a, &serve("a", 42), &r).await.unwrap();
        assert!(matches!(store.update(a, &serve("b", 42), &r).await, Err(MappingError::Conflict(_))));

        let redirect = MappingInput {
            subdomain: "a".into(),
            target: MappingTarget::RedirectUrl { url: "https://other.org/x".into() },
            status_code: Some(308),
            active: None,
        };
        store.update(a, &redirect, &r).await.unwrap();
        let m = store.get_by_id(a).await.unwrap().unwrap();
        assert_eq!(m.target, MappingTarget::RedirectUrl { url: "https://other.org/x".into() });
        assert_eq!(m.status_code, RedirectCode::PermanentRedirect);

        assert!(matches!(store.update(999, &redirect, &r).await, Err(MappingError::NotFound(999))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = store().await;
        let id = store.add(&serve("tickets", 42), &resolver()).await.unwrap();
        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
    }

    async fn insert_broken(store: &MappingStore) -> i64 {
        sqlx::query(&format!(
            "INSERT INTO {} (subdomain, mapping_type, redirect_url, created_at_ms, updated_at_ms) VALUES ('broken', 'url', '', 0, 0)",
            store.table
        ))
        .execute(&store.pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_inconsistent_rows_are_skipped_by_lookup_but_listed() {
        let store = store().await;
        let id = insert_broken(&store).await;

        assert!(store.get_by_subdomain("broken").await.unwrap().is_none());
        assert!(store.exists("broken", None).await.unwrap());

        let listed = store.list(&MappingQuery::default()).await.unwrap();
        assert_eq!(listed.len() as i64, store.total_count(false).await.unwrap());
        assert_eq!(listed[0].target, MappingTarget::Invalid { mapping_type: "url".into() });
        assert!(!store.get_by_id(id).await.unwrap().unwrap().target.is_valid());
    }

    #[tokio::test]
    async fn test_update_repairs_inconsistent_row() {
        let store = store().await;
        let id = insert_broken(&store).await;

        let fixed = MappingInput {
            subdomain: "broken".into(),
            target: MappingTarget::RedirectUrl { url: "https://partner.org/".into() },
            status_code: Some(302),
            active: None,
        };
        store.update(id, &fixed, &resolver()).await.unwrap();

        let m = store.get_by_subdomain("broken").await.unwrap().unwrap();
        assert_eq!(m.id, id);
        assert_eq!(m.target, MappingTarget::RedirectUrl { url: "https://partner.org/".into() });
        assert_eq!(m.status_code, RedirectCode::Found);
    }

    #[test]
    fn test_invalid_kind_is_not_accepted_as_input() {
        let parsed = serde_json::from_str::<MappingInput>(r#"{"subdomain": "x", "kind": "invalid", "mapping_type": "url"}"#);
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_list_orders_and_pages() {
        let store = store().await;
        let r = resolver();
        for sub in ["charlie", "alpha", "bravo"] {
            store.add(&serve(sub, 42), &r).await.unwrap();
        }

        let all = store.list(&MappingQuery::default()).await.unwrap();
        let names: Vec<_> = all.iter().map(|m| m.subdomain.as_str()).collect();
        assert_eq!(names, ["alpha", "bravo", "charlie"]);

        let page = store
            .list(&MappingQuery {
                dir: Some(SortDir::Desc),
                limit: Some(1),
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page[0].subdomain, "bravo");
    }
}
