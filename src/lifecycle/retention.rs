//! Periodic log retention.
//!
//! # Responsibilities
//! - Wake every `maintenance.retention_interval_secs`
//! - Prune each tenant's log by its own `log_retention_days`
//!
//! # Design Decisions
//! - Reads the live registry on every tick so reloads are picked up
//! - A failing tenant is logged and skipped; the sweep continues

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::http::server::{AppState, Inner};
use crate::observability::metrics::record_logs_pruned;
use crate::tenancy::{TenantContext, TenantRegistry};

async fn prune_tenant(ctx: &TenantContext) -> u64 {
    let days = match ctx.settings.load().await {
        Ok(settings) => settings.log_retention_days,
        Err(e) => {
            tracing::warn!(tenant = ctx.id(), error = %e, "Retention skipped, settings unavailable");
            return 0;
        }
    };
    if days == 0 {
        return 0;
    }

    match ctx.log.delete_older_than(days).await {
        Ok(removed) => {
            if removed > 0 {
                tracing::info!(tenant = ctx.id(), days, removed, "Pruned old log entries");
            }
            record_logs_pruned(ctx.id(), removed);
            removed
        }
        Err(e) => {
            tracing::warn!(tenant = ctx.id(), error = %e, "Log retention failed");
            0
        }
    }
}

/// Run one retention pass over every tenant. Returns rows removed.
pub async fn sweep(registry: &TenantRegistry) -> u64 {
    registry.for_each_tenant(prune_tenant).await.into_iter().sum()
}

pub struct RetentionSweeper {
    inner: Arc<ArcSwap<Inner>>,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(state: &AppState, interval: Duration) -> Self {
        Self {
            inner: state.inner.clone(),
            interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "Retention sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let inner = self.inner.load_full();
                    let removed = sweep(&inner.registry).await;
                    tracing::debug!(removed, "Retention sweep finished");
                }
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Retention sweeper stopped");
    }
}
