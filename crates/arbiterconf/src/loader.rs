//! Config file discovery, loading, and environment variable overlay.
//!
//! Each file is applied on top of the config built so far, key by key, so a
//! later file only overrides the keys it actually sets.

use crate::{ArbiterConfig, ConfigError};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli). Only existing
/// files are returned.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/media-arbiter/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("media-arbiter/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("media-arbiter.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and apply it on top of `config`.
pub fn apply_file(config: &mut ArbiterConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Apply the keys present in a TOML document on top of `config`.
pub(crate) fn apply_toml(
    config: &mut ArbiterConfig,
    contents: &str,
    path: &Path,
) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("scenario_dir").and_then(|v| v.as_str()) {
            config.infra.paths.scenario_dir = expand_path(v);
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.infra.telemetry.log_level = v.to_string();
        }
    }

    if let Some(policy) = table.get("policy").and_then(|v| v.as_table()) {
        if let Some(v) = policy.get("deactivate_audio_session_when_idle") {
            config.seed.policy.deactivate_audio_session_when_idle =
                v.as_bool().ok_or_else(|| ConfigError::InvalidValue {
                    path: path.to_path_buf(),
                    key: "policy.deactivate_audio_session_when_idle".to_string(),
                    message: "expected a boolean".to_string(),
                })?;
        }
    }

    if let Some(restrictions) = table.get("restrictions").and_then(|v| v.as_table()) {
        for (media_type, value) in restrictions {
            let names = string_array(value).ok_or_else(|| ConfigError::InvalidValue {
                path: path.to_path_buf(),
                key: format!("restrictions.{}", media_type),
                message: "expected an array of restriction names".to_string(),
            })?;

            let slot = match media_type.as_str() {
                "video" => &mut config.seed.restrictions.video,
                "audio" => &mut config.seed.restrictions.audio,
                "video_audio" => &mut config.seed.restrictions.video_audio,
                "web_audio" => &mut config.seed.restrictions.web_audio,
                other => {
                    return Err(ConfigError::InvalidValue {
                        path: path.to_path_buf(),
                        key: format!("restrictions.{}", other),
                        message: "unknown media type".to_string(),
                    })
                }
            };
            *slot = names;
        }
    }

    if let Some(decoders) = table.get("decoders").and_then(|v| v.as_table()) {
        for (name, value) in decoders {
            let enabled = value.as_bool().ok_or_else(|| ConfigError::InvalidValue {
                path: path.to_path_buf(),
                key: format!("decoders.{}", name),
                message: "expected a boolean".to_string(),
            })?;
            if !config.seed.decoders.set(name, enabled) {
                return Err(ConfigError::InvalidValue {
                    path: path.to_path_buf(),
                    key: format!("decoders.{}", name),
                    message: "unknown decoder".to_string(),
                });
            }
        }
    }

    Ok(())
}

fn string_array(value: &toml::Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Apply environment variable overrides from the process environment.
pub fn apply_env_overrides(config: &mut ArbiterConfig, sources: &mut ConfigSources) {
    apply_env_overrides_from(config, sources, env::vars());
}

/// Apply overrides from an explicit set of variables.
pub fn apply_env_overrides_from<I>(config: &mut ArbiterConfig, sources: &mut ConfigSources, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut rust_log = None;

    for (key, value) in vars {
        match key.as_str() {
            "MEDIA_ARBITER_LOG_LEVEL" => {
                config.infra.telemetry.log_level = value;
                sources.env_overrides.push(key);
            }
            // RUST_LOG wins over the crate-specific variable regardless of order
            "RUST_LOG" => rust_log = Some(value),
            "MEDIA_ARBITER_SCENARIO_DIR" => {
                config.infra.paths.scenario_dir = expand_path(&value);
                sources.env_overrides.push(key);
            }
            "MEDIA_ARBITER_DEACTIVATE_WHEN_IDLE" => {
                if let Some(flag) = parse_bool(&value) {
                    config.seed.policy.deactivate_audio_session_when_idle = flag;
                    sources.env_overrides.push(key);
                }
            }
            _ => {}
        }
    }

    if let Some(value) = rust_log {
        config.infra.telemetry.log_level = value;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        return PathBuf::from(path);
    }

    if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        return match stripped.split_once('/') {
            Some((var_name, rest)) => env::var(var_name)
                .map(|v| PathBuf::from(v).join(rest))
                .unwrap_or_else(|_| PathBuf::from(path)),
            None => env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path)),
        };
    }

    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        assert_eq!(expand_path("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files();
    }

    #[test]
    fn test_apply_minimal_toml() {
        let mut config = ArbiterConfig::default();
        apply_toml(
            &mut config,
            "[telemetry]\nlog_level = \"debug\"\n",
            Path::new("test.toml"),
        )
        .unwrap();

        assert_eq!(config.infra.telemetry.log_level, "debug");
        // Untouched sections keep their defaults
        assert!(config.seed.policy.deactivate_audio_session_when_idle);
        assert!(config.seed.restrictions.is_empty());
    }

    #[test]
    fn test_apply_full_toml() {
        let toml = r#"
[paths]
scenario_dir = "/srv/scenarios"

[telemetry]
log_level = "info,media_arbiter=trace"

[policy]
deactivate_audio_session_when_idle = false

[restrictions]
video = ["concurrent_playback_not_permitted", "background_process_playback_restricted"]
web_audio = ["interrupted_playback_not_permitted"]

[decoders]
opus = true
vp9 = true
"#;
        let mut config = ArbiterConfig::default();
        apply_toml(&mut config, toml, Path::new("test.toml")).unwrap();

        assert_eq!(config.infra.paths.scenario_dir, PathBuf::from("/srv/scenarios"));
        assert_eq!(config.infra.telemetry.log_level, "info,media_arbiter=trace");
        assert!(!config.seed.policy.deactivate_audio_session_when_idle);
        assert_eq!(config.seed.restrictions.video.len(), 2);
        assert!(config.seed.restrictions.audio.is_empty());
        assert_eq!(
            config.seed.restrictions.web_audio,
            vec!["interrupted_playback_not_permitted".to_string()]
        );
        assert!(config.seed.decoders.opus);
        assert!(config.seed.decoders.vp9);
        assert!(!config.seed.decoders.vorbis);
    }

    #[test]
    fn test_later_file_overrides_only_its_keys() {
        let mut config = ArbiterConfig::default();
        apply_toml(
            &mut config,
            "[restrictions]\naudio = [\"concurrent_playback_not_permitted\"]\n[telemetry]\nlog_level = \"warn\"\n",
            Path::new("system.toml"),
        )
        .unwrap();
        apply_toml(
            &mut config,
            "[telemetry]\nlog_level = \"debug\"\n",
            Path::new("local.toml"),
        )
        .unwrap();

        assert_eq!(config.infra.telemetry.log_level, "debug");
        assert_eq!(config.seed.restrictions.audio.len(), 1);
    }

    #[test]
    fn test_unknown_media_type_rejected() {
        let mut config = ArbiterConfig::default();
        let err = apply_toml(
            &mut config,
            "[restrictions]\nmidi = []\n",
            Path::new("bad.toml"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "restrictions.midi"));
    }

    #[test]
    fn test_unknown_decoder_rejected() {
        let mut config = ArbiterConfig::default();
        let err = apply_toml(&mut config, "[decoders]\nh265 = true\n", Path::new("bad.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_malformed_toml() {
        let mut config = ArbiterConfig::default();
        let err = apply_toml(&mut config, "[telemetry\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ArbiterConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides_from(
            &mut config,
            &mut sources,
            vars(&[
                ("MEDIA_ARBITER_LOG_LEVEL", "trace"),
                ("MEDIA_ARBITER_DEACTIVATE_WHEN_IDLE", "no"),
                ("UNRELATED", "1"),
            ]),
        );

        assert_eq!(config.infra.telemetry.log_level, "trace");
        assert!(!config.seed.policy.deactivate_audio_session_when_idle);
        assert_eq!(sources.env_overrides.len(), 2);
    }

    #[test]
    fn test_rust_log_wins() {
        let mut config = ArbiterConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides_from(
            &mut config,
            &mut sources,
            vars(&[("RUST_LOG", "warn"), ("MEDIA_ARBITER_LOG_LEVEL", "trace")]),
        );

        assert_eq!(config.infra.telemetry.log_level, "warn");
        assert_eq!(sources.env_overrides.last().map(String::as_str), Some("RUST_LOG"));
    }

    #[test]
    fn test_bad_bool_env_ignored() {
        let mut config = ArbiterConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides_from(
            &mut config,
            &mut sources,
            vars(&[("MEDIA_ARBITER_DEACTIVATE_WHEN_IDLE", "maybe")]),
        );

        assert!(config.seed.policy.deactivate_audio_session_when_idle);
        assert!(sources.env_overrides.is_empty());
    }
}
