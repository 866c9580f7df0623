//! Settings persistence with a per-tenant read cache.

use std::sync::Arc;

use dashmap::DashMap;
use sqlx::SqlitePool;
use thiserror::Error;

use super::sanitize::{sanitize_rule, sanitize_settings, RedirectRuleInput, SettingsInput};
use super::{DomainRedirectRule, Settings, SETTINGS_OPTION};
use crate::store::{StoreError, Tables};

/// Process-wide settings cache keyed by tenant id.
///
/// Each slot carries a generation that every invalidation bumps. A reader
/// only fills the slot if no write landed since it sampled the generation,
/// so a slow load cannot re-cache a superseded blob.
#[derive(Clone, Default)]
pub struct SettingsCache {
    inner: Arc<DashMap<u32, CacheSlot>>,
}

#[derive(Default)]
struct CacheSlot {
    generation: u64,
    settings: Option<Arc<Settings>>,
}

impl SettingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: u32) -> Option<Arc<Settings>> {
        self.inner.get(&tenant_id).and_then(|slot| slot.settings.clone())
    }

    fn generation(&self, tenant_id: u32) -> u64 {
        self.inner.get(&tenant_id).map(|slot| slot.generation).unwrap_or(0)
    }

    /// Cache `settings` unless the slot was invalidated after `seen`.
    fn insert_if_current(&self, tenant_id: u32, seen: u64, settings: Arc<Settings>) -> bool {
        let mut slot = self.inner.entry(tenant_id).or_default();
        if slot.generation != seen {
            return false;
        }
        slot.settings = Some(settings);
        true
    }

    pub fn invalidate(&self, tenant_id: u32) {
        let mut slot = self.inner.entry(tenant_id).or_default();
        slot.generation += 1;
        slot.settings = None;
    }

    pub fn clear(&self) {
        for mut slot in self.inner.iter_mut() {
            slot.generation += 1;
            slot.settings = None;
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("redirect rule needs a domain and an absolute http(s) target URL")]
    InvalidRule,

    #[error("no redirect rule at index {0}")]
    RuleIndex(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Settings blob of one tenant.
#[derive(Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
    table: String,
    tenant_id: u32,
    cache: SettingsCache,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool, tables: &Tables, tenant_id: u32, cache: SettingsCache) -> Self {
        Self {
            pool,
            table: tables.options.clone(),
            tenant_id,
            cache,
        }
    }

    /// Current settings; defaults when the row does not exist.
    pub async fn load(&self) -> Result<Arc<Settings>, StoreError> {
        if let Some(cached) = self.cache.get(self.tenant_id) {
            return Ok(cached);
        }

        let seen = self.cache.generation(self.tenant_id);
        let raw: Option<String> = sqlx::query_scalar(&format!("SELECT value FROM {} WHERE name = ?", self.table))
            .bind(SETTINGS_OPTION)
            .fetch_optional(&self.pool)
            .await?;
        let settings = match raw {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Settings::default(),
        };

        let settings = Arc::new(settings);
        if !self.cache.insert_if_current(self.tenant_id, seen, settings.clone()) {
            tracing::debug!(tenant = self.tenant_id, "Settings changed during load, not caching");
        }
        Ok(settings)
    }

    /// Drop the cached copy so the next load reads the table.
    pub fn forget(&self) {
        self.cache.invalidate(self.tenant_id);
    }

    /// Persist `settings` as-is and drop the cached copy.
    pub async fn save(&self, settings: &Settings) -> Result<(), StoreError> {
        let value = serde_json::to_string(settings)?;
        sqlx::query(&format!(
            "INSERT INTO {} (name, value) VALUES (?, ?) ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            self.table
        ))
        .bind(SETTINGS_OPTION)
        .bind(value)
        .execute(&self.pool)
        .await?;

        self.cache.invalidate(self.tenant_id);
        tracing::info!(tenant = self.tenant_id, "Settings saved");
        Ok(())
    }

    /// Sanitize `input` over the current settings and persist the result.
    pub async fn update(&self, input: &SettingsInput) -> Result<Settings, StoreError> {
        let current = self.load().await?;
        let next = sanitize_settings(input, &current);
        self.save(&next).await?;
        Ok(next)
    }

    /// Append a domain-redirect rule; returns its index.
    pub async fn add_redirect_rule(&self, input: &RedirectRuleInput) -> Result<usize, SettingsError> {
        let rule = sanitize_rule(input).ok_or(SettingsError::InvalidRule)?;
        let mut next = (*self.load().await?).clone();
        next.redirect_domains.push(rule);
        self.save(&next).await?;
        Ok(next.redirect_domains.len() - 1)
    }

    /// Remove the rule at `index` and return it.
    pub async fn remove_redirect_rule(&self, index: usize) -> Result<DomainRedirectRule, SettingsError> {
        let mut next = (*self.load().await?).clone();
        if index >= next.redirect_domains.len() {
            return Err(SettingsError::RuleIndex(index));
        }
        let removed = next.redirect_domains.remove(index);
        self.save(&next).await?;
        Ok(removed)
    }
}
