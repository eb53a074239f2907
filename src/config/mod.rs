//! Configuration management for svcgraph
//!
//! Configuration is loaded from `~/.svcgraph/config.json` with environment
//! variable overrides.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{ProvisionError, Result};
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the svcgraph configuration directory path (~/.svcgraph)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".svcgraph")
    }

    /// Returns the path to the config file (~/.svcgraph/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    /// Environment variables can override config values using the pattern:
    /// `SVCGRAPH_SECTION_KEY`
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            if content.trim().is_empty() {
                Config::default()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Config::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Save configuration as pretty JSON, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: SVCGRAPH_SECTION_KEY
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("SVCGRAPH_PROVISIONING_VERIFICATION_TIMEOUT_MS") {
            self.provisioning.verification_timeout_ms = val.parse().map_err(|_| {
                ProvisionError::Config(format!(
                    "SVCGRAPH_PROVISIONING_VERIFICATION_TIMEOUT_MS must be an integer, got '{}'",
                    val
                ))
            })?;
        }

        if let Ok(val) = std::env::var("SVCGRAPH_LOGGING_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("SVCGRAPH_LOGGING_FORMAT") {
            self.logging.format = match val.to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "component" => LogFormat::Component,
                "json" => LogFormat::Json,
                other => {
                    return Err(ProvisionError::Config(format!(
                        "Unknown log format '{}' (expected pretty, component or json)",
                        other
                    )))
                }
            };
        }
        if let Ok(val) = std::env::var("SVCGRAPH_LOGGING_FILE") {
            self.logging.file = Some(val);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.provisioning.verification_timeout_ms, 5_000);
        assert_eq!(
            config.provisioning.verification_timeout(),
            Duration::from_secs(5)
        );
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{"provisioning": {"verification_timeout_ms": 250}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.provisioning.verification_timeout_ms, 250);
        assert_eq!(config.logging.format, LogFormat::Component); // Default
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.logging.level, Config::default().logging.level);
    }

    #[test]
    fn test_load_empty_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "  \n").unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.provisioning.verification_timeout_ms, 5_000);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.json");
        let mut config = Config::default();
        config.logging.format = LogFormat::Json;
        config.logging.file = Some("/tmp/svcgraph.log".to_string());
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.logging.format, LogFormat::Json);
        assert_eq!(loaded.logging.file.as_deref(), Some("/tmp/svcgraph.log"));
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Config::load_from_path(&path),
            Err(ProvisionError::Json(_))
        ));
    }

    #[test]
    fn test_config_dir_and_path() {
        assert!(Config::path().ends_with(".svcgraph/config.json"));
        assert!(Config::dir().ends_with(".svcgraph"));
    }
}
