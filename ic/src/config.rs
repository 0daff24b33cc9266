//! Interceptor configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::coordinator::CoordinatorConfig;

const LOCAL_CONFIG: &str = ".interceptor.yml";

/// Main interceptor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Coordinator behaviour
    pub coordinator: CoordinatorConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidates() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Any failure yields `None`; the full load reports errors later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let paths = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::candidates(),
        };
        paths
            .iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Project-local config first, then ~/.config/interceptor/interceptor.yml
    fn candidates() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("interceptor").join("interceptor.yml"));
        }
        debug!(?paths, "Config::candidates: called");
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.log_level.is_none());
        assert!(config.coordinator.evict_after_finalize);
        assert!(config.coordinator.deferred_timeout_ms.is_none());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug
coordinator:
  deferred-timeout-ms: 250
  evict-after-finalize: false
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.coordinator.deferred_timeout_ms, Some(250));
        assert!(!config.coordinator.evict_after_finalize);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
coordinator:
  deferred-timeout-ms: 10
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.coordinator.deferred_timeout_ms, Some(10));

        // Defaults for unspecified
        assert!(config.coordinator.evict_after_finalize);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "log-level: warn\ncoordinator:\n  deferred-timeout-ms: 5").unwrap();
        let path = file.path().to_path_buf();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.coordinator.deferred_timeout_ms, Some(5));
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_explicit_path_errors() {
        let missing = PathBuf::from("/nonexistent/interceptor.yml");
        assert!(Config::load(Some(&missing)).is_err());
        assert!(Config::load_log_level(Some(&missing)).is_none());

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "coordinator: [not, a, map]").unwrap();
        let path = file.path().to_path_buf();
        assert!(Config::load(Some(&path)).is_err());
    }
}
