//! subdomain-router
//!
//! # Architecture Overview
//!
//! ```text
//!   Client request
//!        │
//!        ▼
//!   ┌──────────────┐   ┌──────────────────┐   ┌──────────────────┐
//!   │ http server  │──▶│ early domain     │──▶│ tenant registry  │
//!   │ (request id, │   │ redirect (opt.)  │   │ host → tenant    │
//!   │  trace)      │   └──────────────────┘   └────────┬─────────┘
//!   └──────────────┘                                   │
//!                                                      ▼
//!                      ┌──────────────────────────────────────────┐
//!                      │ routing pipeline                          │
//!                      │ domain rule → subdomain → mapping → slug  │
//!                      │ → unmapped fallback                       │
//!                      └───────┬───────────────────────┬──────────┘
//!                              │ redirect              │ serve / pass
//!                              ▼                       ▼
//!                       Location response        upstream origin
//!
//!   statistics + event log (SQLite, per-tenant tables)
//!   admin API · retention sweeper · config watcher
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use subdomain_router::admin::setup_admin_router;
use subdomain_router::config::{load_config, watcher::ConfigWatcher, RouterConfig};
use subdomain_router::lifecycle::{signals, RetentionSweeper, Shutdown};
use subdomain_router::observability::{logging, metrics};
use subdomain_router::settings::SettingsCache;
use subdomain_router::tenancy::TenantRegistry;
use subdomain_router::{store, HttpServer};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "subdomain-router", version, about = "Host-based subdomain router")]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long, env = "SUBDOMAIN_ROUTER_CONFIG")]
    config: Option<PathBuf>,

    /// Drop every configured tenant's tables and exit.
    #[arg(long)]
    uninstall: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "subdomain-router starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tenants = config.network.tenants.len(),
        database = %config.database.url,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let pool = store::connect(&config.database).await?;
    if args.uninstall {
        let registry = TenantRegistry::from_config(pool.clone(), &config.network, SettingsCache::new())?;
        registry.uninstall_all().await?;
        pool.close().await;
        tracing::info!(tenants = config.network.tenants.len(), "Router data removed");
        return Ok(());
    }

    let server = HttpServer::new(config.clone(), pool.clone()).await?;
    let state = server.state();
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    // Keep the watcher handle alive for the lifetime of the process.
    let (_watcher, updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), Some(updates)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    let shutdown = Shutdown::new();
    let mut tasks = JoinSet::new();

    let server_shutdown = shutdown.subscribe();
    tasks.spawn(async move {
        if let Err(e) = server.run(listener, updates, server_shutdown).await {
            tracing::error!(error = %e, "HTTP server failed");
        }
    });

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let admin = setup_admin_router(state.clone());
        let mut admin_shutdown = shutdown.subscribe();
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");
        tasks.spawn(async move {
            let served = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let sweeper = RetentionSweeper::new(
        &state,
        Duration::from_secs(config.maintenance.retention_interval_secs),
    );
    tasks.spawn(sweeper.run(shutdown.subscribe()));

    signals::shutdown_on_signal(shutdown).await;
    Shutdown::drain(&mut tasks, SHUTDOWN_GRACE).await;
    pool.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
