//! Host-based subdomain router.
//!
//! Maps `label.example.com` to content, external URLs or the homepage,
//! applies whole-domain redirects, and records per-key statistics and an
//! anonymized event log for every tenant of a deployment.

// Core subsystems
pub mod config;
pub mod http;
pub mod routing;
pub mod settings;
pub mod store;

// Sites and their content
pub mod content;
pub mod tenancy;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;

pub use config::schema::RouterConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
