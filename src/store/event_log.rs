//! Append-only log of individual routing events.
//!
//! # Responsibilities
//! - Store one row per redirect/serve when logging is enabled
//! - Anonymize visitor IPs before they touch storage
//! - Filter by key family (`@domain` vs subdomain) without exposing LIKE
//! - Age-based pruning for the retention sweeper

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};

use super::{from_ms, now_ms, page_limit, SortDir, StoreError, Tables};
use crate::routing::context::RequestContext;
use crate::settings::Settings;

/// Longest user agent or referer kept, in characters.
pub const MAX_HEADER_CHARS: usize = 500;

const DAY_MS: i64 = 86_400_000;

/// Drop the host part of an address: IPv4 keeps 24 bits, IPv6 keeps 48.
///
/// Anything that does not parse as an IP becomes the empty string.
pub fn anonymize_ip(raw: &str) -> String {
    match raw.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let [a, b, c, _] = v4.octets();
            Ipv4Addr::new(a, b, c, 0).to_string()
        }
        Ok(IpAddr::V6(v6)) => {
            let s = v6.segments();
            Ipv6Addr::new(s[0], s[1], s[2], 0, 0, 0, 0, 0).to_string()
        }
        Err(_) => String::new(),
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Key-family filter for log queries.
///
/// Both prefixes may be set at once; `None` means no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyFilter {
    pub include_prefix: Option<String>,
    pub exclude_prefix: Option<String>,
}

impl KeyFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Whole-domain redirects (`@` keys).
    pub fn domain_redirects() -> Self {
        Self::starts_with("@")
    }

    /// Subdomain events (everything that is not an `@` key).
    pub fn subdomains() -> Self {
        Self::not_starts_with("@")
    }

    pub fn starts_with(prefix: impl Into<String>) -> Self {
        Self {
            include_prefix: Some(prefix.into()),
            exclude_prefix: None,
        }
    }

    pub fn not_starts_with(prefix: impl Into<String>) -> Self {
        Self {
            include_prefix: None,
            exclude_prefix: Some(prefix.into()),
        }
    }

    /// WHERE clause and its bind values.
    fn to_sql(&self) -> (String, Vec<String>) {
        let mut clause = String::from("WHERE 1=1");
        let mut binds = Vec::new();
        if let Some(prefix) = self.include_prefix.as_deref().filter(|p| !p.is_empty()) {
            clause.push_str(" AND stat_key LIKE ? ESCAPE '\\'");
            binds.push(like_prefix(prefix));
        }
        if let Some(prefix) = self.exclude_prefix.as_deref().filter(|p| !p.is_empty()) {
            clause.push_str(" AND stat_key NOT LIKE ? ESCAPE '\\'");
            binds.push(like_prefix(prefix));
        }
        (clause, binds)
    }
}

fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// A row about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDraft {
    pub key: String,
    pub target_path: String,
    pub source_url: String,
    pub user_agent: String,
    pub ip_address: String,
    pub referer: String,
}

impl LogDraft {
    /// Capture visitor metadata from the request, anonymized and truncated.
    pub fn from_context(key: &str, target_path: &str, source_url: &str, ctx: &RequestContext) -> Self {
        Self {
            key: key.to_string(),
            target_path: target_path.to_string(),
            source_url: source_url.to_string(),
            user_agent: truncate_chars(&ctx.user_agent, MAX_HEADER_CHARS),
            ip_address: anonymize_ip(&ctx.client_ip),
            referer: truncate_chars(&ctx.referer, MAX_HEADER_CHARS),
        }
    }
}

/// Write one log row through any executor.
pub async fn insert_entry<'e, E>(executor: E, table: &str, draft: &LogDraft, created_at_ms: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(&format!(
        "INSERT INTO {table} (stat_key, target_path, source_url, user_agent, ip_address, referer, created_at_ms) \
         VALUES (?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&draft.key)
    .bind(&draft.target_path)
    .bind(&draft.source_url)
    .bind(&draft.user_agent)
    .bind(&draft.ip_address)
    .bind(&draft.referer)
    .bind(created_at_ms)
    .execute(executor)
    .await?;
    Ok(())
}

#[derive(Debug, FromRow)]
struct LogRow {
    id: i64,
    stat_key: String,
    target_path: String,
    source_url: String,
    user_agent: String,
    ip_address: String,
    referer: String,
    created_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub key: String,
    pub target_path: String,
    pub source_url: String,
    pub user_agent: String,
    pub ip_address: String,
    pub referer: String,
    pub created_at: DateTime<Utc>,
}

impl From<LogRow> for LogEntry {
    fn from(row: LogRow) -> Self {
        Self {
            id: row.id,
            key: row.stat_key,
            target_path: row.target_path,
            source_url: row.source_url,
            user_agent: row.user_agent,
            ip_address: row.ip_address,
            referer: row.referer,
            created_at: from_ms(row.created_at_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOrder {
    Key,
    #[default]
    Created,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogQuery {
    pub filter: KeyFilter,
    pub order_by: LogOrder,
    pub dir: SortDir,
    pub limit: Option<u32>,
    pub offset: u32,
}

#[derive(Clone)]
pub struct EventLog {
    pool: SqlitePool,
    table: String,
}

impl EventLog {
    pub fn new(pool: SqlitePool, tables: &Tables) -> Self {
        Self {
            pool,
            table: tables.logs.clone(),
        }
    }

    /// Append an entry if the tenant has logging on. Returns whether a row was written.
    pub async fn log(
        &self,
        settings: &Settings,
        key: &str,
        target_path: &str,
        source_url: &str,
        ctx: &RequestContext,
    ) -> Result<bool, StoreError> {
        if !settings.logging_enabled {
            return Ok(false);
        }
        let draft = LogDraft::from_context(key, target_path, source_url, ctx);
        insert_entry(&self.pool, &self.table, &draft, now_ms()).await?;
        Ok(true)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<LogEntry>, StoreError> {
        let row: Option<LogRow> = sqlx::query_as(&format!("SELECT * FROM {} WHERE id = ?", self.table))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list(&self, query: &LogQuery) -> Result<Vec<LogEntry>, StoreError> {
        let (clause, binds) = query.filter.to_sql();
        let column = match query.order_by {
            LogOrder::Key => "stat_key",
            LogOrder::Created => "created_at_ms",
        };
        let sql = format!(
            "SELECT * FROM {} {clause} ORDER BY {column} {}, id {} LIMIT ? OFFSET ?",
            self.table,
            query.dir.as_sql(),
            query.dir.as_sql()
        );

        let mut q = sqlx::query_as::<_, LogRow>(&sql);
        for value in &binds {
            q = q.bind(value);
        }
        let rows = q
            .bind(page_limit(query.limit, 50, 500))
            .bind(i64::from(query.offset))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn total_count(&self, filter: &KeyFilter) -> Result<i64, StoreError> {
        let (clause, binds) = filter.to_sql();
        let sql = format!("SELECT COUNT(*) FROM {} {clause}", self.table);
        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for value in &binds {
            q = q.bind(value);
        }
        Ok(q.fetch_one(&self.pool).await?)
    }

    /// Remove every entry. Returns the number of rows removed.
    pub async fn clear_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Remove entries older than `days` days; `0` keeps everything.
    pub async fn delete_older_than(&self, days: u32) -> Result<u64, StoreError> {
        if days == 0 {
            return Ok(0);
        }
        let cutoff = now_ms() - i64::from(days) * DAY_MS;
        let result = sqlx::query(&format!("DELETE FROM {} WHERE created_at_ms < ?", self.table))
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::installed_pool;

    fn ctx() -> RequestContext {
        RequestContext {
            scheme: "https".into(),
            host: "tickets.example.com".into(),
            path: "/".into(),
            query: None,
            client_ip: "192.168.1.100".into(),
            user_agent: "u".repeat(600),
            referer: "https://search.example/".into(),
        }
    }

    fn logging_on() -> Settings {
        Settings {
            logging_enabled: true,
            ..Settings::default()
        }
    }

    async fn event_log() -> EventLog {
        let (pool, tables) = installed_pool().await;
        EventLog::new(pool, &tables)
    }

    #[test]
    fn test_anonymize_ip() {
        assert_eq!(anonymize_ip("192.168.1.100"), "192.168.1.0");
        assert_eq!(anonymize_ip("2001:db8:85a3:8d3:1319:8a2e:370:7348"), "2001:db8:85a3::");
        assert_eq!(anonymize_ip("not-an-ip"), "");
        assert_eq!(anonymize_ip(""), "");
    }

    #[test]
    fn test_like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("@"), "@%");
        assert_eq!(like_prefix("a_b%"), "a\\_b\\%%");
    }

    #[test]
    fn test_draft_truncates_and_anonymizes() {
        let draft = LogDraft::from_context("tickets", "/t/", "https://tickets.example.com/", &ctx());
        assert_eq!(draft.user_agent.chars().count(), MAX_HEADER_CHARS);
        assert_eq!(draft.ip_address, "192.168.1.0");
    }

    #[tokio::test]
    async fn test_log_is_noop_when_disabled() {
        let log = event_log().await;
        let written = log.log(&Settings::default(), "tickets", "/", "u", &ctx()).await.unwrap();
        assert!(!written);
        assert_eq!(log.total_count(&KeyFilter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_filter_splits_domain_and_subdomain_entries() {
        let log = event_log().await;
        let settings = logging_on();
        for key in ["tickets", "@old.org", "shop", "@other.net", "s_x"] {
            assert!(log.log(&settings, key, "/", "u", &ctx()).await.unwrap());
        }

        let domains = log.total_count(&KeyFilter::domain_redirects()).await.unwrap();
        let subs = log.total_count(&KeyFilter::subdomains()).await.unwrap();
        assert_eq!(domains, 2);
        assert_eq!(subs, 3);
        assert_eq!(domains + subs, log.total_count(&KeyFilter::all()).await.unwrap());

        // `_` is literal, not a wildcard.
        assert_eq!(log.total_count(&KeyFilter::starts_with("s_")).await.unwrap(), 1);

        let listed = log
            .list(&LogQuery {
                filter: KeyFilter::domain_redirects(),
                order_by: LogOrder::Key,
                dir: SortDir::Asc,
                ..Default::default()
            })
            .await
            .unwrap();
        let keys: Vec<_> = listed.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["@old.org", "@other.net"]);

        let entry = log.get_by_id(listed[0].id).await.unwrap().unwrap();
        assert_eq!(entry.ip_address, "192.168.1.0");
        assert_eq!(entry.referer, "https://search.example/");
    }

    #[tokio::test]
    async fn test_retention_prunes_only_old_rows() {
        let log = event_log().await;
        let draft = LogDraft::from_context("old", "/", "u", &ctx());
        insert_entry(&log.pool, &log.table, &draft, now_ms() - 40 * DAY_MS).await.unwrap();
        log.log(&logging_on(), "new", "/", "u", &ctx()).await.unwrap();

        assert_eq!(log.delete_older_than(0).await.unwrap(), 0);
        assert_eq!(log.delete_older_than(30).await.unwrap(), 1);
        assert_eq!(log.delete_older_than(30).await.unwrap(), 0);
        assert_eq!(log.total_count(&KeyFilter::all()).await.unwrap(), 1);

        assert_eq!(log.clear_all().await.unwrap(), 1);
    }
}
