//! Auto-leveling: slow proportional trim that pulls each vocal channel's
//! measured level toward its configured target.
//!
//! The controller is deliberately timid. Corrections are proportional to
//! the error but capped at `max_step_db` per cycle, and a dead band
//! around the target stops it from chasing measurement noise. A vocalist
//! drifting off mic gets walked back over a few seconds rather than
//! yanked.
//!
//! Only `Vocal` channels are leveled. Everything else on the desk either
//! belongs to the ducker or to the operator.

use chrono::{DateTime, Duration, Utc};
use fohconf::{ChannelRole, TuningConfig};
use fohproto::CommandReason;
use tracing::{debug, trace};

use crate::dispatch::Proposal;
use crate::fader::apply_db_offset;
use crate::registry::ChannelState;

/// Proportional auto-level controller. Stateless: each evaluation sees
/// only the current channel snapshot.
pub struct AutoLevelController {
    dead_band_db: f64,
    gain_factor: f64,
    max_step_db: f64,
    staleness: Duration,
}

impl AutoLevelController {
    pub fn new(tuning: &TuningConfig) -> Self {
        Self {
            dead_band_db: tuning.dead_band_db,
            gain_factor: tuning.gain_factor,
            max_step_db: tuning.max_step_db,
            staleness: Duration::milliseconds(tuning.staleness_ms as i64),
        }
    }

    /// Evaluate one channel, returning a correction proposal if one is
    /// warranted this cycle.
    pub fn evaluate(&self, channel: &ChannelState, now: DateTime<Utc>) -> Option<Proposal> {
        if channel.role != ChannelRole::Vocal {
            return None;
        }
        if channel.is_stale(now, self.staleness) {
            trace!("channel {}: telemetry stale, skipping auto-level", channel.id);
            return None;
        }
        if channel.is_overridden(now) {
            trace!("channel {}: operator override, skipping auto-level", channel.id);
            return None;
        }

        let level_db = channel.level_db?;
        let fader = channel.fader?;

        let error_db = channel.auto_level_target_db - level_db;
        if error_db.abs() <= self.dead_band_db {
            return None;
        }

        let step_db = (error_db * self.gain_factor).clamp(-self.max_step_db, self.max_step_db);
        let target_fader = apply_db_offset(fader, step_db);

        debug!(
            "channel {}: level {:.1} dBFS, target {:.1}, stepping {:+.2} dB (fader {:.3} -> {:.3})",
            channel.id, level_db, channel.auto_level_target_db, step_db, fader, target_fader
        );

        Some(Proposal {
            channel_id: channel.id.clone(),
            target_fader,
            reason: CommandReason::AutoLevel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fohconf::{ChannelConfig, ChannelRole, FohConfig};
    use crate::registry::ChannelRegistry;
    use fohproto::TelemetryEvent;
    use pretty_assertions::assert_eq;

    fn vocal_channel(level_db: f64, fader: f64, now: DateTime<Utc>) -> ChannelState {
        let mut config = FohConfig::default();
        config.channels.insert(
            "1".to_string(),
            ChannelConfig {
                role: ChannelRole::Vocal,
                group: "vocals".to_string(),
                ..Default::default()
            },
        );
        let registry = ChannelRegistry::from_config(&config);
        registry
            .upsert_telemetry(&TelemetryEvent {
                channel_id: "1".to_string(),
                level_db,
                fader,
                timestamp: now,
            })
            .unwrap();
        registry.snapshot("1").unwrap()
    }

    fn controller() -> AutoLevelController {
        AutoLevelController::new(&TuningConfig::default())
    }

    #[test]
    fn test_quiet_vocal_stepped_up() {
        let now = Utc::now();
        // 6 dB under the -18 target: error 6, gain 0.5 -> +3 dB step,
        // which on the upper fader segment is +3/40 of travel.
        let channel = vocal_channel(-24.0, 0.75, now);
        let proposal = controller().evaluate(&channel, now).unwrap();
        assert_eq!(proposal.reason, CommandReason::AutoLevel);
        assert!((proposal.target_fader - 0.825).abs() < 1e-9);
    }

    #[test]
    fn test_loud_vocal_stepped_down() {
        let now = Utc::now();
        let channel = vocal_channel(-14.0, 0.75, now);
        let proposal = controller().evaluate(&channel, now).unwrap();
        assert!(proposal.target_fader < 0.75);
    }

    #[test]
    fn test_dead_band_holds_fader() {
        let now = Utc::now();
        // 0.5 dB off target, inside the 1 dB dead band.
        let channel = vocal_channel(-18.5, 0.75, now);
        assert_eq!(controller().evaluate(&channel, now), None);
    }

    #[test]
    fn test_step_clamped() {
        let now = Utc::now();
        // 30 dB under target would want a 15 dB step; clamp to 3.
        let channel = vocal_channel(-48.0, 0.5, now);
        let proposal = controller().evaluate(&channel, now).unwrap();
        let expected = apply_db_offset(0.5, 3.0);
        assert!((proposal.target_fader - expected).abs() < 1e-9);
    }

    #[test]
    fn test_stale_channel_skipped() {
        let now = Utc::now();
        let channel = vocal_channel(-30.0, 0.75, now - Duration::seconds(5));
        assert_eq!(controller().evaluate(&channel, now), None);
    }

    #[test]
    fn test_overridden_channel_skipped() {
        let now = Utc::now();
        let mut channel = vocal_channel(-30.0, 0.75, now);
        channel.override_until = Some(now + Duration::seconds(3));
        assert_eq!(controller().evaluate(&channel, now), None);
    }

    #[test]
    fn test_non_vocal_ignored() {
        let now = Utc::now();
        let mut channel = vocal_channel(-30.0, 0.75, now);
        channel.role = ChannelRole::Band;
        assert_eq!(controller().evaluate(&channel, now), None);
    }
}
