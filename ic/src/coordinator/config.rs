//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Upper bound on how long finalize waits for deferred work, in ms
    ///
    /// Unset means wait as long as it takes; deferred work that never
    /// settles then blocks finalization for that event indefinitely.
    #[serde(rename = "deferred-timeout-ms", default)]
    pub deferred_timeout_ms: Option<u64>,

    /// Evict records from the registry once the dispatcher finalized them
    #[serde(rename = "evict-after-finalize", default = "default_evict_after_finalize")]
    pub evict_after_finalize: bool,
}

fn default_evict_after_finalize() -> bool {
    debug!("default_evict_after_finalize: called");
    true
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            deferred_timeout_ms: None,
            evict_after_finalize: true,
        }
    }
}

impl CoordinatorConfig {
    /// Get the deferred-work deadline as a Duration
    pub fn deferred_timeout(&self) -> Option<Duration> {
        debug!(deferred_timeout_ms = ?self.deferred_timeout_ms, "CoordinatorConfig::deferred_timeout: called");
        self.deferred_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.deferred_timeout_ms, None);
        assert!(config.evict_after_finalize);
        assert_eq!(config.deferred_timeout(), None);
    }

    #[test]
    fn test_deferred_timeout_duration() {
        let config = CoordinatorConfig {
            deferred_timeout_ms: Some(250),
            ..Default::default()
        };
        assert_eq!(config.deferred_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: CoordinatorConfig = serde_yaml::from_str("deferred-timeout-ms: 1000\n").unwrap();
        assert_eq!(config.deferred_timeout_ms, Some(1000));
        assert!(config.evict_after_finalize);

        let config: CoordinatorConfig = serde_yaml::from_str("evict-after-finalize: false\n").unwrap();
        assert_eq!(config.deferred_timeout_ms, None);
        assert!(!config.evict_after_finalize);
    }
}
