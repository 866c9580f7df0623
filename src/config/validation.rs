//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check tenant integrity (unique ids, parseable site URLs and upstreams)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RouterConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "must be a socket address"));
    }
    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "must be a socket address"));
        }
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }
    if config.observability.metrics_enabled && config.observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("observability.metrics_address", "must be a socket address"));
    }
    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new("observability.log_format", "must be \"pretty\" or \"json\""));
    }

    if config.database.url.trim().is_empty() {
        errors.push(ValidationError::new("database.url", "must not be empty"));
    }
    if config.database.max_connections == 0 {
        errors.push(ValidationError::new("database.max_connections", "must be greater than 0"));
    }
    if config.database.acquire_timeout_secs == 0 {
        errors.push(ValidationError::new("database.acquire_timeout_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.maintenance.retention_interval_secs == 0 {
        errors.push(ValidationError::new("maintenance.retention_interval_secs", "must be greater than 0"));
    }

    if config.network.tenants.is_empty() {
        errors.push(ValidationError::new("network.tenants", "at least one tenant is required"));
    }

    let mut seen = HashSet::new();
    for (i, tenant) in config.network.tenants.iter().enumerate() {
        let field = |name: &str| format!("network.tenants[{i}].{name}");

        if tenant.id == 0 {
            errors.push(ValidationError::new(field("id"), "must be greater than 0"));
        } else if !seen.insert(tenant.id) {
            errors.push(ValidationError::new(field("id"), format!("duplicate tenant id {}", tenant.id)));
        }

        match url::Url::parse(&tenant.site_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
            _ => errors.push(ValidationError::new(field("site_url"), "must be an absolute http(s) URL")),
        }

        if tenant.upstream.parse::<axum::http::uri::Authority>().is_err() {
            errors.push(ValidationError::new(field("upstream"), "must be host:port"));
        }

        let mut ids = HashSet::new();
        for entry in &tenant.content {
            if !ids.insert(entry.id) {
                errors.push(ValidationError::new(field("content"), format!("duplicate content id {}", entry.id)));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TenantConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&RouterConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = RouterConfig::default();
        config.listener.bind_address = "nope".into();
        config.timeouts.request_secs = 0;
        config.network.tenants.push(TenantConfig {
            site_url: "ftp://x".into(),
            upstream: "".into(),
            ..TenantConfig::default()
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"timeouts.request_secs"));
        assert!(fields.contains(&"network.tenants[1].id"));
        assert!(fields.contains(&"network.tenants[1].site_url"));
        assert!(fields.contains(&"network.tenants[1].upstream"));
    }
}
