//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable that overrides the listener port.
pub const PORT_ENV: &str = "PORT";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("invalid PORT value '{0}'")]
    InvalidPort(String),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse configuration from TOML text without validating it.
pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load configuration from a TOML file, or defaults when `path` is `None`,
/// then apply `PORT` and validate.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            parse_config(&content)?
        }
        None => ServiceConfig::default(),
    };

    apply_port_env(&mut config, std::env::var(PORT_ENV).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply a `PORT` value, if one is set and non-empty.
pub fn apply_port_env(
    config: &mut ServiceConfig,
    value: Option<String>,
) -> Result<(), ConfigError> {
    let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
        return Ok(());
    };
    let port = value
        .trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidPort(value.clone()))?;
    apply_port_override(config, port);
    Ok(())
}

/// Replace the port of the listener bind address, keeping its host.
pub fn apply_port_override(config: &mut ServiceConfig, port: u16) {
    let address = &config.listener.bind_address;
    let host = address
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(address.as_str());
    let updated = format!("{host}:{port}");
    config.listener.bind_address = updated;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PersistenceMode;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config = parse_config("[listener]\nbind_address = \"127.0.0.1:3000\"\n").unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:3000");
        assert_eq!(config.storage.persistence, PersistenceMode::WriteThrough);
        assert!(config.cors.enabled);
    }

    #[test]
    fn test_debounce_mode_parses() {
        let config = parse_config(
            r#"
[storage]
data_dir = "/var/lib/engine"
persistence = { mode = "debounce", interval_ms = 250 }
"#,
        )
        .unwrap();
        assert_eq!(
            config.storage.persistence,
            PersistenceMode::Debounce { interval_ms: 250 }
        );
    }

    #[test]
    fn test_port_override() {
        let mut config = ServiceConfig::default();
        apply_port_env(&mut config, Some("9000".into())).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:9000");

        apply_port_env(&mut config, Some("".into())).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:9000");

        config.listener.bind_address = "[::1]:8080".into();
        apply_port_override(&mut config, 81);
        assert_eq!(config.listener.bind_address, "[::1]:81");

        assert!(matches!(
            apply_port_env(&mut config, Some("eighty".into())),
            Err(ConfigError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_load_reports_io_and_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_config(Some(&dir.path().join("missing.toml"))),
            Err(ConfigError::Io { .. })
        ));

        let path = dir.path().join("engine.toml");
        fs::write(&path, "[timeouts]\nrequest_secs = 0\n").unwrap();
        match load_config(Some(&path)) {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.field == "timeouts.request_secs"))
            }
            // PORT in the test environment may itself be invalid
            Err(ConfigError::InvalidPort(_)) => {}
            other => panic!("unexpected result {other:?}"),
        }
    }
}
