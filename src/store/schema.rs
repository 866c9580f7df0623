//! Per-tenant table lifecycle.

use sqlx::SqlitePool;

use super::{StoreError, Tables};
use crate::settings::{Settings, SETTINGS_OPTION};

/// Create the tenant's tables if missing and seed default settings.
///
/// Safe to run on every start; existing rows are left alone.
pub async fn install(pool: &SqlitePool, tables: &Tables) -> Result<(), StoreError> {
    let Tables { prefix, mappings, statistics, logs, options } = tables;

    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS {mappings} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subdomain TEXT NOT NULL UNIQUE,
                mapping_type TEXT NOT NULL DEFAULT 'post',
                resource_id INTEGER,
                redirect_url TEXT,
                redirect_code INTEGER NOT NULL DEFAULT 301,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at_ms INTEGER NOT NULL,
                updated_at_ms INTEGER NOT NULL
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS {prefix}mappings_active ON {mappings} (is_active)"),
        format!(
            "CREATE TABLE IF NOT EXISTS {statistics} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stat_key TEXT NOT NULL UNIQUE,
                target_path TEXT NOT NULL DEFAULT '',
                redirect_count INTEGER NOT NULL DEFAULT 0,
                last_redirect_at_ms INTEGER,
                created_at_ms INTEGER NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {logs} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stat_key TEXT NOT NULL,
                target_path TEXT NOT NULL DEFAULT '',
                source_url TEXT NOT NULL DEFAULT '',
                user_agent TEXT NOT NULL DEFAULT '',
                ip_address TEXT NOT NULL DEFAULT '',
                referer TEXT NOT NULL DEFAULT '',
                created_at_ms INTEGER NOT NULL
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS {prefix}logs_key ON {logs} (stat_key)"),
        format!("CREATE INDEX IF NOT EXISTS {prefix}logs_created ON {logs} (created_at_ms)"),
        format!(
            "CREATE TABLE IF NOT EXISTS {options} (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )"
        ),
    ];

    for sql in &statements {
        sqlx::query(sql).execute(pool).await?;
    }

    let defaults = serde_json::to_string(&Settings::default())?;
    sqlx::query(&format!("INSERT OR IGNORE INTO {options} (name, value) VALUES (?, ?)"))
        .bind(SETTINGS_OPTION)
        .bind(defaults)
        .execute(pool)
        .await?;

    tracing::debug!(prefix = %prefix, "Tenant tables installed");
    Ok(())
}

/// Drop every table owned by the tenant.
pub async fn uninstall(pool: &SqlitePool, tables: &Tables) -> Result<(), StoreError> {
    for table in [&tables.mappings, &tables.statistics, &tables.logs, &tables.options] {
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(pool)
            .await?;
    }
    tracing::info!(prefix = %tables.prefix, "Tenant tables removed");
    Ok(())
}
