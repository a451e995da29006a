use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::types::{DuelConfig, RuntimeConfig, SessionConfig};
use crate::error_handling::types::ConfigError;

/// Top-level application configuration.
///
/// Loaded from a TOML file where every field and section is optional;
/// omitted values fall back to the defaults below. The configuration is
/// validated once at load time so the rest of the system can assume it
/// is coherent.
///
/// # Fields Overview
///
/// - `bind_address`: IP address the HTTP/WebSocket server listens on
/// - `port`: TCP port for the HTTP/WebSocket server
/// - `database_path`: SQLite file backing the durable store
/// - `runtime`: container engine tunables ([`RuntimeConfig`])
/// - `sessions`: terminal session tunables ([`SessionConfig`])
/// - `duels`: matchmaking tunables ([`DuelConfig`])
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub runtime: RuntimeConfig,
    pub sessions: SessionConfig,
    pub duels: DuelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            database_path: PathBuf::from("arena.sqlite3"),
            runtime: RuntimeConfig::default(),
            sessions: SessionConfig::default(),
            duels: DuelConfig::default(),
        }
    }
}

impl Config {
    /// Loads and validates a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the loaded values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_address
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::BadBindAddress(self.bind_address.clone()))?;

        if self.port == 0 {
            return Err(ConfigError::OutOfRange("port must be non-zero".to_string()));
        }
        if self.sessions.ttl_secs == 0 {
            return Err(ConfigError::OutOfRange(
                "sessions.ttl_secs must be non-zero".to_string(),
            ));
        }
        if self.duels.queue_ttl_secs == 0 {
            return Err(ConfigError::OutOfRange(
                "duels.queue_ttl_secs must be non-zero".to_string(),
            ));
        }
        if self.duels.default_score_change <= 0 {
            return Err(ConfigError::OutOfRange(
                "duels.default_score_change must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 8080);
        assert_eq!(config.sessions.ttl_secs, 7200);
        assert_eq!(config.duels.default_score_change, 25);
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            port = 9000

            [runtime]
            default_image = "ubuntu:22.04"
            app_label = "arena-test"

            [duels]
            queue_ttl_secs = 120
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 9000);
        assert_eq!(config.runtime.default_image, "ubuntu:22.04");
        assert_eq!(config.runtime.app_label, "arena-test");
        assert_eq!(config.duels.queue_ttl_secs, 120);
        // untouched sections keep their defaults
        assert_eq!(config.sessions.ttl_secs, 7200);
    }

    #[test]
    fn rejects_bad_bind_address() {
        let config = Config {
            bind_address: "not-an-ip".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadBindAddress(_))
        ));
    }

    #[test]
    fn rejects_zero_ttls() {
        let mut config = Config::default();
        config.sessions.ttl_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange(_))));
    }
}
