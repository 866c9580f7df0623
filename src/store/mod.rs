//! Persistence subsystem.
//!
//! # Data Flow
//! ```text
//! DatabaseConfig
//!     → connect() (SqlitePool, WAL, bounded acquire)
//!     → schema.rs (per-tenant tables, prefix-scoped)
//!     → mappings.rs / statistics.rs / event_log.rs (typed stores)
//!
//! counter.rs and event_log::insert_entry are free functions over any
//! executor so the early redirect handler can share them without a store.
//! ```
//!
//! # Design Decisions
//! - One SQLite database, one table set per tenant, named by prefix
//! - Timestamps are integer milliseconds since the Unix epoch
//! - Concurrency relies on UNIQUE constraints and upserts, no in-process locks

pub mod counter;
pub mod event_log;
pub mod mappings;
pub mod schema;
pub mod statistics;

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::config::schema::DatabaseConfig;

pub use event_log::{EventLog, KeyFilter, LogEntry, LogQuery};
pub use mappings::{Mapping, MappingError, MappingInput, MappingLookup, MappingStore, MappingTarget};
pub use statistics::{StatisticRecord, StatisticsEngine, StatsQuery, StatsSummary};

/// Storage-layer failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("stored value could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Open the shared pool described by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Single-connection in-memory pool.
///
/// The connection is never recycled, so the database lives as long as the pool.
pub async fn connect_in_memory() -> Result<SqlitePool, StoreError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Convert stored milliseconds back into a timestamp (epoch when out of range).
pub fn from_ms(ms: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Fully qualified table names for one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub prefix: String,
    pub mappings: String,
    pub statistics: String,
    pub logs: String,
    pub options: String,
}

impl Tables {
    pub fn for_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            mappings: format!("{prefix}mappings"),
            statistics: format!("{prefix}statistics"),
            logs: format!("{prefix}logs"),
            options: format!("{prefix}options"),
        }
    }

    /// Table prefix of tenant `id`: `src_` for the primary site, `src_{id}_` otherwise.
    pub fn prefix_for_tenant(id: u32) -> String {
        if id <= 1 {
            "src_".to_string()
        } else {
            format!("src_{id}_")
        }
    }

    pub fn for_tenant(id: u32) -> Self {
        Self::for_prefix(&Self::prefix_for_tenant(id))
    }
}

/// Sort direction for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl SortDir {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// Clamp a page size into `1..=max`, mapping absent or zero to `default`.
pub(crate) fn page_limit(limit: Option<u32>, default: u32, max: u32) -> i64 {
    i64::from(limit.filter(|l| *l > 0).unwrap_or(default).min(max))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_prefixes() {
        assert_eq!(Tables::prefix_for_tenant(1), "src_");
        assert_eq!(Tables::prefix_for_tenant(7), "src_7_");
        assert_eq!(Tables::for_tenant(7).logs, "src_7_logs");
    }

    #[test]
    fn test_page_limit() {
        assert_eq!(page_limit(None, 20, 100), 20);
        assert_eq!(page_limit(Some(0), 20, 100), 20);
        assert_eq!(page_limit(Some(500), 20, 100), 100);
    }
}
