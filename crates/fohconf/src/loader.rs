//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, FohConfig};
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
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    // System config
    let system = PathBuf::from("/etc/fohbrain/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("fohbrain/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    // Local override (current directory)
    let local = PathBuf::from("fohbrain.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<FohConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Merge two configs, with `overlay` taking precedence.
///
/// Sections replace wholesale except the channel map, which merges per
/// channel id so a venue override file can adjust a single channel
/// without repeating the whole map.
pub fn merge_configs(base: FohConfig, overlay: FohConfig) -> FohConfig {
    let mut channels = base.channels;
    for (id, channel) in overlay.channels {
        channels.insert(id, channel);
    }

    FohConfig {
        bus: overlay.bus,
        logging: overlay.logging,
        tuning: overlay.tuning,
        channels,
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut FohConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("FOHBRAIN_TELEMETRY_ENDPOINT") {
        config.bus.telemetry_endpoint = v;
        sources
            .env_overrides
            .push("FOHBRAIN_TELEMETRY_ENDPOINT".to_string());
    }
    if let Ok(v) = env::var("FOHBRAIN_COMMAND_ENDPOINT") {
        config.bus.command_endpoint = v;
        sources
            .env_overrides
            .push("FOHBRAIN_COMMAND_ENDPOINT".to_string());
    }

    if let Ok(v) = env::var("FOHBRAIN_LOG_LEVEL") {
        config.logging.log_level = v;
        sources.env_overrides.push("FOHBRAIN_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.logging.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Ok(v) = env::var("FOHBRAIN_TICK_MS") {
        if let Ok(ms) = v.parse() {
            config.tuning.tick_ms = ms;
            sources.env_overrides.push("FOHBRAIN_TICK_MS".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelConfig, ChannelRole};
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files();
    }

    #[test]
    fn test_load_minimal_toml() {
        let file = write_temp(
            r#"
[channels.1]
role = "vocal"
group = "vocals"
"#,
        );
        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.channels["1"].role, ChannelRole::Vocal);
        // Untouched sections come back as defaults
        assert_eq!(config.bus.telemetry_endpoint, "tcp://127.0.0.1:5561");
        assert_eq!(config.tuning.rate_limit_ms, 200);
    }

    #[test]
    fn test_load_full_toml() {
        let file = write_temp(
            r#"
[bus]
telemetry_endpoint = "tcp://stage-edge:5561"
command_endpoint = "tcp://0.0.0.0:7000"

[logging]
log_level = "debug"

[tuning]
dead_band_db = 2.0
override_window_ms = 8000
activity_threshold_db = -40.0
duck_targets = ["band"]

[channels.1]
role = "vocal"
group = "vocals"
auto_level_target_db = -20.0

[channels.9]
role = "speech"
group = "speech"

[channels.11]
role = "band"
group = "band"
ducking_offset_db = -6.0
"#,
        );
        let config = load_from_file(file.path()).unwrap();

        assert_eq!(config.bus.telemetry_endpoint, "tcp://stage-edge:5561");
        assert_eq!(config.bus.command_endpoint, "tcp://0.0.0.0:7000");
        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.tuning.dead_band_db, 2.0);
        assert_eq!(config.tuning.override_window_ms, 8000);
        assert_eq!(config.tuning.activity_threshold_db, -40.0);

        assert_eq!(config.channels.len(), 3);
        assert_eq!(config.channels["1"].auto_level_target_db, -20.0);
        assert_eq!(config.channels["9"].role, ChannelRole::Speech);
        assert_eq!(config.channels["11"].ducking_offset_db, -6.0);

        config.validate().unwrap();
    }

    #[test]
    fn test_load_rejects_bad_role() {
        let file = write_temp(
            r#"
[channels.1]
role = "karaoke"
"#,
        );
        assert!(matches!(
            load_from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_merge_overlays_channels() {
        let mut base = FohConfig::default();
        base.channels.insert(
            "1".to_string(),
            ChannelConfig {
                role: ChannelRole::Vocal,
                ..Default::default()
            },
        );
        base.channels
            .insert("2".to_string(), ChannelConfig::default());

        let mut overlay = FohConfig::default();
        overlay.channels.insert(
            "1".to_string(),
            ChannelConfig {
                role: ChannelRole::Speech,
                ..Default::default()
            },
        );

        let merged = merge_configs(base, overlay);
        // Channel 1 replaced, channel 2 preserved
        assert_eq!(merged.channels["1"].role, ChannelRole::Speech);
        assert!(merged.channels.contains_key("2"));
    }
}
