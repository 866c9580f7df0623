//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RouterConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: RouterConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_loads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [[network.tenants]]
            id = 1
            site_url = "https://example.com"
            upstream = "127.0.0.1:3000"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.network.tenants[0].site_url, "https://example.com");
    }

    #[test]
    fn test_reports_each_failure_kind() {
        assert!(matches!(
            load_config(Path::new("/definitely/not/here.toml")),
            Err(ConfigError::Io(_))
        ));

        let mut bad_syntax = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad_syntax, "[listener").unwrap();
        assert!(matches!(load_config(bad_syntax.path()), Err(ConfigError::Parse(_))));

        let mut invalid = tempfile::NamedTempFile::new().unwrap();
        writeln!(invalid, "[timeouts]\nrequest_secs = 0").unwrap();
        let err = load_config(invalid.path()).unwrap_err();
        assert!(err.to_string().contains("timeouts.request_secs"));
    }
}
