//! Infrastructure configuration - fixed for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem paths used by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory searched for scenario files given by bare name.
    /// Default: ~/.config/media-arbiter/scenarios
    #[serde(default = "PathsConfig::default_scenario_dir")]
    pub scenario_dir: PathBuf,
}

impl PathsConfig {
    fn default_scenario_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("media-arbiter/scenarios"))
            .unwrap_or_else(|| PathBuf::from(".config/media-arbiter/scenarios"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            scenario_dir: Self::default_scenario_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` directive such as `info,media_arbiter=debug`).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Infrastructure settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfraConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_defaults() {
        assert_eq!(TelemetryConfig::default().log_level, "info");
    }

    #[test]
    fn test_scenario_dir_default() {
        let paths = PathsConfig::default();
        assert!(paths
            .scenario_dir
            .to_string_lossy()
            .ends_with("media-arbiter/scenarios"));
    }
}
