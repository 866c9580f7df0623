//! Bootstrap configuration.
//!
//! # Data Flow
//! ```text
//! router.toml
//!     → loader.rs (read, toml → RouterConfig)
//!     → validation.rs (every semantic error at once)
//!     → HttpServer / admin API / retention sweeper
//!
//! While running:
//!     watcher.rs sees the file change
//!     → loader.rs + validation.rs
//!     → AppState::reload rebuilds the tenant registry and swaps it in
//! ```
//!
//! # Design Decisions
//! - Every section is optional; a missing file section means defaults
//! - Tenant routing settings are runtime data in SQLite, edited through
//!   the admin API, and never appear here

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, ContentEntryConfig, DatabaseConfig, ListenerConfig, MaintenanceConfig, NetworkConfig,
    ObservabilityConfig, RouterConfig, TenantConfig, TimeoutConfig,
};
