//! Shared increment-or-insert for statistic counters.

use sqlx::{Executor, Sqlite};

/// Add one hit for `key`, creating the row on first sight.
///
/// A single statement: the UNIQUE constraint on `stat_key` makes concurrent
/// first hits collapse into one row instead of racing.
pub async fn increment_or_insert<'e, E>(
    executor: E,
    table: &str,
    key: &str,
    target_path: &str,
    now_ms: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "INSERT INTO {table} (stat_key, target_path, redirect_count, last_redirect_at_ms, created_at_ms) \
         VALUES (?, ?, 1, ?, ?) \
         ON CONFLICT(stat_key) DO UPDATE SET \
             redirect_count = redirect_count + 1, \
             target_path = excluded.target_path, \
             last_redirect_at_ms = excluded.last_redirect_at_ms"
    );

    sqlx::query(&sql)
        .bind(key)
        .bind(target_path)
        .bind(now_ms)
        .bind(now_ms)
        .execute(executor)
        .await?;
    Ok(())
}
