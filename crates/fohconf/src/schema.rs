//! Configuration schema: bus endpoints, channel map, control-loop tuning.

use serde::{Deserialize, Serialize};

/// Message bus endpoints for this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// ZMQ SUB endpoint the Edge publishes telemetry on (we connect).
    /// Default: tcp://127.0.0.1:5561
    #[serde(default = "BusConfig::default_telemetry_endpoint")]
    pub telemetry_endpoint: String,

    /// ZMQ PUB endpoint we broadcast commands on (we bind).
    /// Default: tcp://0.0.0.0:5562
    #[serde(default = "BusConfig::default_command_endpoint")]
    pub command_endpoint: String,
}

impl BusConfig {
    fn default_telemetry_endpoint() -> String {
        "tcp://127.0.0.1:5561".to_string()
    }

    fn default_command_endpoint() -> String {
        "tcp://0.0.0.0:5562".to_string()
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            telemetry_endpoint: Self::default_telemetry_endpoint(),
            command_endpoint: Self::default_command_endpoint(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "LoggingConfig::default_log_level")]
    pub log_level: String,
}

impl LoggingConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Which automation applies to a channel.
///
/// Exactly one role per channel, fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    /// Live vocal: auto-leveled toward `auto_level_target_db`.
    Vocal,
    /// Spoken word: activity on these channels triggers ducking.
    Speech,
    /// Backing band input: candidate ducking target.
    Band,
    /// Mix bus: candidate ducking target.
    Bus,
    /// Everything else: telemetry is tracked but never automated.
    Other,
}

impl Default for ChannelRole {
    fn default() -> Self {
        ChannelRole::Other
    }
}

/// One entry in the console channel map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Automation role for this channel.
    #[serde(default)]
    pub role: ChannelRole,

    /// Grouping label used for ducking target selection.
    /// Default: "other"
    #[serde(default = "ChannelConfig::default_group")]
    pub group: String,

    /// Auto-level loudness target in dBFS.
    /// Default: -18.0
    #[serde(default = "ChannelConfig::default_auto_level_target_db")]
    pub auto_level_target_db: f64,

    /// Attenuation applied while ducked, in dB (must be <= 0).
    /// Default: -4.0
    #[serde(default = "ChannelConfig::default_ducking_offset_db")]
    pub ducking_offset_db: f64,
}

impl ChannelConfig {
    fn default_group() -> String {
        "other".to_string()
    }

    fn default_auto_level_target_db() -> f64 {
        -18.0
    }

    fn default_ducking_offset_db() -> f64 {
        -4.0
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            role: ChannelRole::default(),
            group: Self::default_group(),
            auto_level_target_db: Self::default_auto_level_target_db(),
            ducking_offset_db: Self::default_ducking_offset_db(),
        }
    }
}

/// Global control-loop tunables.
///
/// Defaults are the values the system was commissioned with; every one of
/// them is a knob the operator may need to turn per venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Auto-level dead-band in dB: errors within this band produce no
    /// correction. Default: 1.0
    #[serde(default = "TuningConfig::default_dead_band_db")]
    pub dead_band_db: f64,

    /// Proportional factor applied to the auto-level error. Default: 0.5
    #[serde(default = "TuningConfig::default_gain_factor")]
    pub gain_factor: f64,

    /// Largest single auto-level step in dB. Default: 3.0
    #[serde(default = "TuningConfig::default_max_step_db")]
    pub max_step_db: f64,

    /// How long automation stays suspended after a human fader move.
    /// Default: 5000 ms
    #[serde(default = "TuningConfig::default_override_window_ms")]
    pub override_window_ms: u64,

    /// Minimum interval between commands for the same channel.
    /// Default: 200 ms
    #[serde(default = "TuningConfig::default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    /// Commands within this distance of the last commanded fader value
    /// are suppressed as no-ops. Fader units (0.0-1.0). Default: 0.005
    #[serde(default = "TuningConfig::default_noop_tolerance")]
    pub noop_tolerance: f64,

    /// Fader movement larger than this is treated as a deliberate move.
    /// Fader units (0.0-1.0). Default: 0.03
    #[serde(default = "TuningConfig::default_divergence_tolerance")]
    pub divergence_tolerance: f64,

    /// Window after a dispatched command during which a matching fader
    /// move is attributed to the system itself (absorbs bus -> console ->
    /// telemetry propagation latency). Default: 1000 ms
    #[serde(default = "TuningConfig::default_command_grace_ms")]
    pub command_grace_ms: u64,

    /// Speech level above this counts as activity. Default: -35.0 dBFS
    #[serde(default = "TuningConfig::default_activity_threshold_db")]
    pub activity_threshold_db: f64,

    /// Speech must stay above threshold this long before ducking engages
    /// (rejects coughs and transients). Default: 300 ms
    #[serde(default = "TuningConfig::default_activity_debounce_ms")]
    pub activity_debounce_ms: u64,

    /// Speech must stay below threshold this long before targets are
    /// restored. Default: 1500 ms
    #[serde(default = "TuningConfig::default_release_debounce_ms")]
    pub release_debounce_ms: u64,

    /// Telemetry older than this marks a channel unknown and excludes it
    /// from automation. Default: 1000 ms
    #[serde(default = "TuningConfig::default_staleness_ms")]
    pub staleness_ms: u64,

    /// Evaluation cadence of the control loop. Default: 250 ms
    #[serde(default = "TuningConfig::default_tick_ms")]
    pub tick_ms: u64,

    /// Channel groups that get ducked while speech is active.
    /// Default: ["band", "drums"]
    #[serde(default = "TuningConfig::default_duck_targets")]
    pub duck_targets: Vec<String>,
}

impl TuningConfig {
    fn default_dead_band_db() -> f64 {
        1.0
    }

    fn default_gain_factor() -> f64 {
        0.5
    }

    fn default_max_step_db() -> f64 {
        3.0
    }

    fn default_override_window_ms() -> u64 {
        5000
    }

    fn default_rate_limit_ms() -> u64 {
        200
    }

    fn default_noop_tolerance() -> f64 {
        0.005
    }

    fn default_divergence_tolerance() -> f64 {
        0.03
    }

    fn default_command_grace_ms() -> u64 {
        1000
    }

    fn default_activity_threshold_db() -> f64 {
        -35.0
    }

    fn default_activity_debounce_ms() -> u64 {
        300
    }

    fn default_release_debounce_ms() -> u64 {
        1500
    }

    fn default_staleness_ms() -> u64 {
        1000
    }

    fn default_tick_ms() -> u64 {
        250
    }

    fn default_duck_targets() -> Vec<String> {
        vec!["band".to_string(), "drums".to_string()]
    }
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            dead_band_db: Self::default_dead_band_db(),
            gain_factor: Self::default_gain_factor(),
            max_step_db: Self::default_max_step_db(),
            override_window_ms: Self::default_override_window_ms(),
            rate_limit_ms: Self::default_rate_limit_ms(),
            noop_tolerance: Self::default_noop_tolerance(),
            divergence_tolerance: Self::default_divergence_tolerance(),
            command_grace_ms: Self::default_command_grace_ms(),
            activity_threshold_db: Self::default_activity_threshold_db(),
            activity_debounce_ms: Self::default_activity_debounce_ms(),
            release_debounce_ms: Self::default_release_debounce_ms(),
            staleness_ms: Self::default_staleness_ms(),
            tick_ms: Self::default_tick_ms(),
            duck_targets: Self::default_duck_targets(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serde_lowercase() {
        let role: ChannelRole = toml::from_str::<ChannelConfig>("role = \"vocal\"")
            .unwrap()
            .role;
        assert_eq!(role, ChannelRole::Vocal);
    }

    #[test]
    fn test_channel_defaults() {
        let channel: ChannelConfig = toml::from_str("").unwrap();
        assert_eq!(channel.role, ChannelRole::Other);
        assert_eq!(channel.group, "other");
        assert_eq!(channel.auto_level_target_db, -18.0);
        assert_eq!(channel.ducking_offset_db, -4.0);
    }

    #[test]
    fn test_tuning_defaults() {
        let tuning = TuningConfig::default();
        assert_eq!(tuning.dead_band_db, 1.0);
        assert_eq!(tuning.override_window_ms, 5000);
        assert_eq!(tuning.rate_limit_ms, 200);
        assert_eq!(tuning.tick_ms, 250);
        assert!(tuning.duck_targets.contains(&"band".to_string()));
    }
}
