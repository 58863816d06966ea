//! Minimal configuration loading for the media session arbiter.
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): things fixed for the life of the
//!   process - log filter, scenario directory.
//!
//! - **Seed** (`SeedConfig`): initial policy that seeds the arbiter. After
//!   startup the arbiter is the source of truth; restrictions change only
//!   through its add/remove calls.
//!
//! # Usage
//!
//! ```rust,no_run
//! use arbiterconf::ArbiterConfig;
//!
//! let config = ArbiterConfig::load().expect("Failed to load config");
//! println!("log level: {}", config.infra.telemetry.log_level);
//! for (media_type, names) in config.seed.restrictions.entries() {
//!     println!("{}: {:?}", media_type, names);
//! }
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/media-arbiter/config.toml` (system)
//! 2. `~/.config/media-arbiter/config.toml` (user)
//! 3. `./media-arbiter.toml` (local override, or `--config <path>`)
//! 4. Environment variables (`MEDIA_ARBITER_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [telemetry]
//! log_level = "info,media_arbiter=debug"
//!
//! [policy]
//! deactivate_audio_session_when_idle = true
//!
//! [restrictions]
//! video = ["concurrent_playback_not_permitted", "background_process_playback_restricted"]
//! audio = ["concurrent_playback_not_permitted"]
//!
//! [decoders]
//! opus = true
//! ```

pub mod infra;
pub mod loader;
pub mod policy;

pub use infra::{InfraConfig, PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};
pub use policy::{DecoderConfig, PolicyConfig, RestrictionsConfig, SeedConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key} in {path}: {message}")]
    InvalidValue {
        path: PathBuf,
        key: String,
        message: String,
    },
}

/// Complete arbiter configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Infrastructure - fixed at runtime.
    #[serde(flatten)]
    pub infra: InfraConfig,

    /// Seed - initial arbiter policy.
    #[serde(flatten)]
    pub seed: SeedConfig,
}

impl ArbiterConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with an optional CLI override path, then apply
    /// env overrides. System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and report where values came from.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = ArbiterConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> String {
        // Built by hand so section order and comments stay stable
        let mut output = String::new();

        output.push_str("# Media Arbiter Configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "scenario_dir = \"{}\"\n",
            self.infra.paths.scenario_dir.display()
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.infra.telemetry.log_level
        ));

        output.push_str("\n[policy]\n");
        output.push_str(&format!(
            "deactivate_audio_session_when_idle = {}\n",
            self.seed.policy.deactivate_audio_session_when_idle
        ));

        output.push_str("\n[restrictions]\n");
        for (media_type, names) in self.seed.restrictions.entries() {
            let quoted: Vec<String> = names.iter().map(|n| format!("\"{}\"", n)).collect();
            output.push_str(&format!("{} = [{}]\n", media_type, quoted.join(", ")));
        }

        output.push_str("\n[decoders]\n");
        for (name, enabled) in self.seed.decoders.entries() {
            output.push_str(&format!("{} = {}\n", name, enabled));
        }

        output
    }
}
