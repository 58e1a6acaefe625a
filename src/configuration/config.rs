use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::types::{RuntimeConfig, ScoringConfig, SessionConfig, WebConfig};
use crate::error_handling::types::ConfigError;

/// Top-level application configuration.
///
/// Parsed from a TOML file; every section is optional and falls back to its
/// defaults, so an empty file is a valid configuration for local use.
///
/// # Fields Overview
/// - `database_path`: SQLite database file location
/// - `web`: bind address and port of the JSON API
/// - `runtime`: container images, labels, network and readiness bounds
/// - `session`: join-code sampling bounds and session defaults
/// - `scoring`: hint penalty and the level allow-list with point values
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub web: WebConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("mits.sqlite3")
}

impl Config {
    /// Reads and validates a configuration file.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field invariants the serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scoring.level_points.is_empty() {
            return Err(ConfigError::LevelsEmpty(
                "at least one level key with a point value is required".to_string(),
            ));
        }
        if self.scoring.hint_penalty < 0 {
            return Err(ConfigError::BadPenalty(format!(
                "hint penalty must be non-negative, got {}",
                self.scoring.hint_penalty
            )));
        }
        if self.web.port < 1024 {
            return Err(ConfigError::BadPortRange(format!(
                "web port must be >= 1024, got {}",
                self.web.port
            )));
        }
        Ok(())
    }

    /// Level keys the administrator may select when creating a session.
    pub fn allowed_level_keys(&self) -> Vec<String> {
        self.scoring.level_points.keys().cloned().collect()
    }

    /// Completion point value configured for a level key (0 if unknown).
    pub fn level_points(&self, key: &str) -> i64 {
        self.scoring.level_points.get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.scoring.hint_penalty, 5);
        assert_eq!(config.runtime.attacker_image, "mits-attacker:latest");
        assert_eq!(config.level_points("level1"), 100);
        assert_eq!(config.level_points("nope"), 0);
    }

    #[test]
    fn sections_override_defaults() {
        let raw = r#"
            database_path = "/tmp/range.sqlite3"

            [web]
            port = 9000

            [scoring]
            hint_penalty = 10

            [scoring.level_points]
            web01 = 250
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.web.port, 9000);
        assert_eq!(config.scoring.hint_penalty, 10);
        assert_eq!(config.allowed_level_keys(), vec!["web01".to_string()]);
        assert_eq!(config.level_points("web01"), 250);
    }

    #[test]
    fn empty_level_table_is_rejected() {
        let raw = r#"
            [scoring]
            level_points = {}
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LevelsEmpty(_))
        ));
    }

    #[test]
    fn reserved_web_port_is_rejected() {
        let raw = r#"
            [web]
            port = 80
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadPortRange(_))
        ));
    }
}
