//! Configuration schema definitions.
//!
//! This module defines the bootstrap configuration of the router.
//! All types derive Serde traits for deserialization from config files.
//! Per-tenant routing settings are not here; they live in the database
//! (see `crate::settings`).

use serde::{Deserialize, Serialize};

use crate::content::ContentKind;

/// Root configuration for the router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Public listener.
    pub listener: ListenerConfig,

    /// SQLite connection settings.
    pub database: DatabaseConfig,

    /// Tenants and multi-tenant behaviour.
    pub network: NetworkConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    pub maintenance: MaintenanceConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL (e.g., "sqlite://router.db").
    pub url: String,

    /// Pool size.
    pub max_connections: u32,

    /// Longest wait for a pooled connection, in seconds.
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://subdomain-router.db".to_string(),
            max_connections: 8,
            acquire_timeout_secs: 3,
        }
    }
}

/// Multi-tenant deployment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Served sites. The lowest id is the primary tenant.
    pub tenants: Vec<TenantConfig>,

    /// Run the primary tenant's domain redirects before tenant resolution.
    pub early_domain_redirects: bool,

    /// Take the client address from the first `X-Forwarded-For` entry.
    pub trust_forwarded_for: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            tenants: vec![TenantConfig::default()],
            early_domain_redirects: false,
            trust_forwarded_for: false,
        }
    }
}

/// One served site.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Tenant id (1 = primary site).
    pub id: u32,

    /// Display name for admin views.
    pub name: String,

    /// Public home URL (e.g., "https://example.com").
    pub site_url: String,

    /// Origin that renders the site (e.g., "127.0.0.1:3000").
    pub upstream: String,

    /// Extra hosts that resolve to this tenant.
    pub domains: Vec<String>,

    /// Content id shown at the site root, if any.
    pub front_page_id: Option<i64>,

    /// Content the router may serve on subdomains.
    pub content: Vec<ContentEntryConfig>,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            id: 1,
            name: "Main site".to_string(),
            site_url: "http://localhost:8080".to_string(),
            upstream: "127.0.0.1:3000".to_string(),
            domains: Vec::new(),
            front_page_id: None,
            content: Vec::new(),
        }
    }
}

/// Content catalog entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentEntryConfig {
    pub id: i64,

    pub slug: String,

    #[serde(default)]
    pub kind: ContentKind,

    #[serde(default = "default_true")]
    pub published: bool,

    /// Eligible for slug matching.
    #[serde(default = "default_true")]
    pub public: bool,

    /// Upstream path; defaults to `/{slug}/`.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub log_filter: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "subdomain_router=info,tower_http=info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Background maintenance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Seconds between log retention sweeps.
    pub retention_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            retention_interval_secs: 86_400,
        }
    }
}
