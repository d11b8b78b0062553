//! Telemetry and command event payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::WireError;

/// Loudest telemetry level the schema accepts, in dBFS.
///
/// Digital meters top out at 0 dBFS; a little headroom absorbs Edge-side
/// rounding without admitting garbage.
pub const MAX_LEVEL_DB: f64 = 6.0;

/// Quietest telemetry level the schema accepts, in dBFS.
pub const MIN_LEVEL_DB: f64 = -120.0;

/// Per-channel measurement published by the Edge on `telemetry/{channel_id}`.
///
/// Immutable value; consumed exactly once by the ingestor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Console channel id, matching the configured channel map.
    pub channel_id: String,
    /// Measured RMS level in dBFS.
    pub level_db: f64,
    /// Reported fader/send position, 0.0-1.0.
    pub fader: f64,
    /// When the Edge took the measurement.
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    /// Validate ranges before the event touches any channel state.
    ///
    /// A failed validation drops the event; the channel then goes stale,
    /// which is the fail-safe (no action on bad data).
    pub fn validate(&self) -> Result<(), WireError> {
        if !self.level_db.is_finite() {
            return Err(WireError::NotFinite("level_db"));
        }
        if !self.fader.is_finite() {
            return Err(WireError::NotFinite("fader"));
        }
        if self.level_db < MIN_LEVEL_DB || self.level_db > MAX_LEVEL_DB {
            return Err(WireError::LevelOutOfRange(self.level_db));
        }
        if !(0.0..=1.0).contains(&self.fader) {
            return Err(WireError::FaderOutOfRange(self.fader));
        }
        Ok(())
    }
}

/// Why a command was issued. Carried on the wire for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandReason {
    /// Slow trim toward the configured loudness target.
    AutoLevel,
    /// Speech-triggered attenuation of a target channel.
    Ducking,
    /// Restoring a ducked channel to its pre-duck baseline.
    Release,
}

/// Fader write published by the Brain on `command/{channel_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEvent {
    /// Console channel id.
    pub channel_id: String,
    /// Requested fader/send position, 0.0-1.0.
    pub target_fader: f64,
    /// Which controller produced this command.
    pub reason: CommandReason,
    /// When the Brain dispatched it.
    pub timestamp: DateTime<Utc>,
}
