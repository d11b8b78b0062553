//! Configuration loading for the fohbrain mixing core.
//!
//! This crate provides configuration loading with minimal dependencies,
//! designed to be imported by all fohbrain crates without causing
//! circular dependency issues.
//!
//! # Configuration Philosophy
//!
//! Configuration is split into two categories:
//!
//! - **Bus** (`BusConfig`): Things that physically cannot change at
//!   runtime - the endpoints used to reach the message bus.
//!
//! - **Channel map + tuning** (`ChannelConfig`, `TuningConfig`): The
//!   static description of the console and the control-loop parameters.
//!   Loaded once at startup; the brain never reloads mid-show.
//!
//! # Usage
//!
//! ```rust,no_run
//! use fohconf::FohConfig;
//!
//! let config = FohConfig::load().expect("Failed to load config");
//!
//! println!("telemetry from: {}", config.bus.telemetry_endpoint);
//! for (id, channel) in &config.channels {
//!     println!("channel {}: {:?}", id, channel.role);
//! }
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/fohbrain/config.toml` (system)
//! 2. `~/.config/fohbrain/config.toml` (user)
//! 3. `./fohbrain.toml` (local override)
//! 4. Environment variables (`FOHBRAIN_*`)
//!
//! # Example Config
//!
//! ```toml
//! [bus]
//! telemetry_endpoint = "tcp://127.0.0.1:5561"
//! command_endpoint = "tcp://0.0.0.0:5562"
//!
//! [logging]
//! log_level = "info"
//!
//! [tuning]
//! dead_band_db = 1.0
//! override_window_ms = 5000
//! duck_targets = ["band", "drums"]
//!
//! [channels.1]
//! role = "vocal"
//! group = "vocals"
//! auto_level_target_db = -18.0
//!
//! [channels.9]
//! role = "speech"
//! group = "speech"
//!
//! [channels.11]
//! role = "band"
//! group = "band"
//! ducking_offset_db = -4.0
//! ```

pub mod loader;
pub mod schema;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use schema::{BusConfig, ChannelConfig, ChannelRole, LoggingConfig, TuningConfig};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
///
/// All of these are fatal at startup: the brain must never run against a
/// partial or malformed channel map.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Complete fohbrain configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FohConfig {
    /// Message bus endpoints - cannot change at runtime.
    #[serde(default)]
    pub bus: BusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Control-loop tunables.
    #[serde(default)]
    pub tuning: TuningConfig,

    /// Static channel map, keyed by the console's channel id.
    ///
    /// BTreeMap keeps iteration order deterministic, which the brain
    /// relies on for reproducible evaluation order.
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelConfig>,
}

impl FohConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/fohbrain/config.toml`
    /// 3. `~/.config/fohbrain/config.toml`
    /// 4. `./fohbrain.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./fohbrain.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about sources.
    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = FohConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        config.validate()?;

        Ok((config, sources))
    }

    /// Validate the loaded configuration.
    ///
    /// The channel map is the contract with the console; starting with a
    /// broken one would let the brain write garbage to a live mix.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::Invalid {
                message: "channel map is empty; at least one channel is required".to_string(),
            });
        }

        if self.tuning.tick_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "tuning.tick_ms must be greater than zero".to_string(),
            });
        }

        for field in [
            ("tuning.dead_band_db", self.tuning.dead_band_db),
            ("tuning.gain_factor", self.tuning.gain_factor),
            ("tuning.max_step_db", self.tuning.max_step_db),
            ("tuning.noop_tolerance", self.tuning.noop_tolerance),
            (
                "tuning.divergence_tolerance",
                self.tuning.divergence_tolerance,
            ),
        ] {
            if !field.1.is_finite() || field.1 < 0.0 {
                return Err(ConfigError::Invalid {
                    message: format!("{} must be a finite non-negative number", field.0),
                });
            }
        }

        if !self.tuning.activity_threshold_db.is_finite() {
            return Err(ConfigError::Invalid {
                message: "tuning.activity_threshold_db must be finite".to_string(),
            });
        }

        for (id, channel) in &self.channels {
            if id.is_empty() {
                return Err(ConfigError::Invalid {
                    message: "channel id must not be empty".to_string(),
                });
            }
            if !channel.auto_level_target_db.is_finite()
                || channel.auto_level_target_db > 0.0
                || channel.auto_level_target_db < -90.0
            {
                return Err(ConfigError::Invalid {
                    message: format!(
                        "channel {}: auto_level_target_db {} outside [-90, 0] dBFS",
                        id, channel.auto_level_target_db
                    ),
                });
            }
            if !channel.ducking_offset_db.is_finite() || channel.ducking_offset_db > 0.0 {
                return Err(ConfigError::Invalid {
                    message: format!(
                        "channel {}: ducking_offset_db {} must be an attenuation (<= 0 dB)",
                        id, channel.ducking_offset_db
                    ),
                });
            }
        }

        // Every configured duck target group must exist on some Band/Bus
        // channel, otherwise speech activation would silently do nothing.
        for group in &self.tuning.duck_targets {
            let matched = self.channels.values().any(|c| {
                c.group == *group
                    && matches!(c.role, ChannelRole::Band | ChannelRole::Bus)
            });
            if !matched {
                return Err(ConfigError::Invalid {
                    message: format!(
                        "duck target group '{}' does not match any band/bus channel",
                        group
                    ),
                });
            }
        }

        Ok(())
    }
}
