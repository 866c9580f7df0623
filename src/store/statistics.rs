//! Per-key redirect counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::counter::increment_or_insert;
use super::{from_ms, now_ms, page_limit, SortDir, StoreError, Tables};

#[derive(Debug, FromRow)]
struct StatisticRow {
    id: i64,
    stat_key: String,
    target_path: String,
    redirect_count: i64,
    last_redirect_at_ms: Option<i64>,
    created_at_ms: i64,
}

/// One counter row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticRecord {
    pub id: i64,
    /// Subdomain label, or `@domain` for whole-domain redirects.
    pub key: String,
    pub target_path: String,
    pub redirect_count: i64,
    pub last_redirect_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<StatisticRow> for StatisticRecord {
    fn from(row: StatisticRow) -> Self {
        Self {
            id: row.id,
            key: row.stat_key,
            target_path: row.target_path,
            redirect_count: row.redirect_count,
            last_redirect_at: row.last_redirect_at_ms.map(from_ms),
            created_at: from_ms(row.created_at_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsOrder {
    Key,
    #[default]
    Count,
    Last,
    Created,
}

impl StatsOrder {
    fn column(self) -> &'static str {
        match self {
            StatsOrder::Key => "stat_key",
            StatsOrder::Count => "redirect_count",
            StatsOrder::Last => "last_redirect_at_ms",
            StatsOrder::Created => "created_at_ms",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsQuery {
    pub order_by: StatsOrder,
    pub dir: SortDir,
    pub limit: Option<u32>,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSummary {
    pub distinct_key_count: i64,
    pub total_redirects: i64,
    pub last_redirect_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct StatisticsEngine {
    pool: SqlitePool,
    table: String,
}

impl StatisticsEngine {
    pub fn new(pool: SqlitePool, tables: &Tables) -> Self {
        Self {
            pool,
            table: tables.statistics.clone(),
        }
    }

    /// Count one hit for `key`, remembering where it went.
    pub async fn record(&self, key: &str, target_path: &str) -> Result<(), StoreError> {
        increment_or_insert(&self.pool, &self.table, key, target_path, now_ms()).await?;
        Ok(())
    }

    pub async fn get_by_key(&self, key: &str) -> Result<Option<StatisticRecord>, StoreError> {
        let row: Option<StatisticRow> = sqlx::query_as(&format!("SELECT * FROM {} WHERE stat_key = ?", self.table))
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list(&self, query: &StatsQuery) -> Result<Vec<StatisticRecord>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
            self.table,
            query.order_by.column(),
            query.dir.as_sql()
        );
        let rows: Vec<StatisticRow> = sqlx::query_as(&sql)
            .bind(page_limit(query.limit, 20, 500))
            .bind(i64::from(query.offset))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn total_count(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn total_redirects(&self) -> Result<i64, StoreError> {
        let total = sqlx::query_scalar(&format!("SELECT COALESCE(SUM(redirect_count), 0) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    /// Busiest keys first.
    pub async fn top_n(&self, n: u32) -> Result<Vec<StatisticRecord>, StoreError> {
        self.list(&StatsQuery {
            order_by: StatsOrder::Count,
            dir: SortDir::Desc,
            limit: Some(n),
            offset: 0,
        })
        .await
    }

    /// Most recently hit keys first.
    pub async fn most_recent_n(&self, n: u32) -> Result<Vec<StatisticRecord>, StoreError> {
        self.list(&StatsQuery {
            order_by: StatsOrder::Last,
            dir: SortDir::Desc,
            limit: Some(n),
            offset: 0,
        })
        .await
    }

    pub async fn summary(&self) -> Result<StatsSummary, StoreError> {
        let (distinct, total, last): (i64, i64, Option<i64>) = sqlx::query_as(&format!(
            "SELECT COUNT(*), COALESCE(SUM(redirect_count), 0), MAX(last_redirect_at_ms) FROM {}",
            self.table
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(StatsSummary {
            distinct_key_count: distinct,
            total_redirects: total,
            last_redirect_at: last.map(from_ms),
        })
    }

    /// Forget one key. Returns whether it existed.
    pub async fn reset_one(&self, key: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE stat_key = ?", self.table))
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Forget every key. Returns the number of rows removed.
    pub async fn reset_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
