//! Speech-priority ducking: when anyone talks on a speech channel, pull
//! the configured band groups down by a fixed offset; when they stop,
//! restore each channel to exactly where it was.
//!
//! The engine is the single owner of duck state. It remembers, per
//! channel, the baseline fader captured at the moment of ducking, and it
//! carries the attack/release debounce timers for speech detection. The
//! registry stays a plain telemetry mirror.
//!
//! Detection is asymmetric on purpose: the attack debounce is short so
//! an announcement lands over a quiet band almost immediately, while the
//! release debounce is long enough to ride out pauses between sentences
//! without pumping the mix.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use fohconf::{ChannelRole, TuningConfig};
use fohproto::CommandReason;
use tracing::{debug, info};

use crate::dispatch::Proposal;
use crate::fader::apply_db_offset;
use crate::registry::ChannelState;

pub struct DuckingEngine {
    activity_threshold_db: f64,
    attack_debounce: Duration,
    release_debounce: Duration,
    staleness: Duration,
    duck_targets: Vec<String>,

    speech_active: bool,
    above_since: Option<DateTime<Utc>>,
    below_since: Option<DateTime<Utc>>,
    /// Baseline fader per ducked channel, captured once at duck time.
    ducked: HashMap<String, f64>,
}

impl DuckingEngine {
    pub fn new(tuning: &TuningConfig) -> Self {
        Self {
            activity_threshold_db: tuning.activity_threshold_db,
            attack_debounce: Duration::milliseconds(tuning.activity_debounce_ms as i64),
            release_debounce: Duration::milliseconds(tuning.release_debounce_ms as i64),
            staleness: Duration::milliseconds(tuning.staleness_ms as i64),
            duck_targets: tuning.duck_targets.clone(),
            speech_active: false,
            above_since: None,
            below_since: None,
            ducked: HashMap::new(),
        }
    }

    /// True while the engine considers someone to be speaking.
    pub fn speech_active(&self) -> bool {
        self.speech_active
    }

    /// Channels currently held below their baseline.
    pub fn ducked_count(&self) -> usize {
        self.ducked.len()
    }

    /// Run one detection-and-duck cycle over the channel snapshots.
    ///
    /// Snapshots are expected in registry (sorted-id) order; proposals
    /// come out in the same order.
    pub fn evaluate(&mut self, snapshots: &[ChannelState], now: DateTime<Utc>) -> Vec<Proposal> {
        self.update_speech_state(snapshots, now);

        if self.speech_active {
            self.duck_proposals(snapshots, now)
        } else {
            self.release_proposals(snapshots)
        }
    }

    /// Debounced speech detection over the fresh speech channels.
    ///
    /// A stale speech channel contributes nothing: if the speech mic's
    /// edge node dies mid-announcement, the release debounce runs out
    /// and the band comes back rather than staying ducked forever.
    fn update_speech_state(&mut self, snapshots: &[ChannelState], now: DateTime<Utc>) {
        let above = snapshots.iter().any(|ch| {
            ch.role == ChannelRole::Speech
                && !ch.is_stale(now, self.staleness)
                && ch.level_db.is_some_and(|db| db >= self.activity_threshold_db)
        });

        if above {
            self.below_since = None;
            let since = *self.above_since.get_or_insert(now);
            if !self.speech_active && now - since >= self.attack_debounce {
                info!("speech detected, ducking {:?}", self.duck_targets);
                self.speech_active = true;
            }
        } else {
            self.above_since = None;
            let since = *self.below_since.get_or_insert(now);
            if self.speech_active && now - since >= self.release_debounce {
                info!("speech ended, releasing {} channel(s)", self.ducked.len());
                self.speech_active = false;
            }
        }
    }

    fn duck_proposals(&mut self, snapshots: &[ChannelState], now: DateTime<Utc>) -> Vec<Proposal> {
        let mut proposals = Vec::new();

        for ch in snapshots {
            if !matches!(ch.role, ChannelRole::Band | ChannelRole::Bus) {
                continue;
            }
            if !self.duck_targets.contains(&ch.group) {
                continue;
            }
            if self.ducked.contains_key(&ch.id) {
                continue;
            }
            if ch.is_stale(now, self.staleness) || ch.is_overridden(now) {
                continue;
            }
            let Some(baseline) = ch.fader else { continue };

            // Captured exactly once; repeated ducks while active never
            // re-read the (already ducked) fader as a new baseline.
            self.ducked.insert(ch.id.clone(), baseline);
            let target = apply_db_offset(baseline, ch.ducking_offset_db);
            debug!(
                "ducking channel {}: {:.3} -> {:.3} ({:+.1} dB)",
                ch.id, baseline, target, ch.ducking_offset_db
            );
            proposals.push(Proposal {
                channel_id: ch.id.clone(),
                target_fader: target,
                reason: CommandReason::Ducking,
            });
        }

        proposals
    }

    fn release_proposals(&mut self, snapshots: &[ChannelState]) -> Vec<Proposal> {
        let mut proposals = Vec::new();

        // Release goes out even to overridden or stale channels: leaving
        // a channel stuck 4 dB down because the operator touched it
        // mid-announcement would be worse than one redundant write.
        for ch in snapshots {
            if let Some(baseline) = self.ducked.remove(&ch.id) {
                debug!("releasing channel {} to {:.3}", ch.id, baseline);
                proposals.push(Proposal {
                    channel_id: ch.id.clone(),
                    target_fader: baseline,
                    reason: CommandReason::Release,
                });
            }
        }

        proposals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChannelRegistry;
    use fohconf::{ChannelConfig, FohConfig};
    use fohproto::TelemetryEvent;
    use pretty_assertions::assert_eq;

    fn registry() -> ChannelRegistry {
        let mut config = FohConfig::default();
        config.channels.insert(
            "9".to_string(),
            ChannelConfig {
                role: ChannelRole::Speech,
                group: "speech".to_string(),
                ..Default::default()
            },
        );
        for id in ["11", "12"] {
            config.channels.insert(
                id.to_string(),
                ChannelConfig {
                    role: ChannelRole::Band,
                    group: "band".to_string(),
                    ..Default::default()
                },
            );
        }
        ChannelRegistry::from_config(&config)
    }

    fn feed(registry: &ChannelRegistry, id: &str, level_db: f64, fader: f64, at: DateTime<Utc>) {
        registry
            .upsert_telemetry(&TelemetryEvent {
                channel_id: id.to_string(),
                level_db,
                fader,
                timestamp: at,
            })
            .unwrap();
    }

    fn engine() -> DuckingEngine {
        DuckingEngine::new(&TuningConfig::default())
    }

    /// Default tuning: threshold -35 dBFS, attack 300 ms, release 1500 ms.
    #[test]
    fn test_duck_after_attack_debounce() {
        let registry = registry();
        let mut engine = engine();
        let t0 = Utc::now();

        feed(&registry, "9", -20.0, 0.7, t0);
        feed(&registry, "11", -25.0, 0.75, t0);
        feed(&registry, "12", -25.0, 0.6, t0);

        // First sight of speech: debounce still running, no duck yet.
        assert!(engine.evaluate(&registry.snapshots(), t0).is_empty());
        assert!(!engine.speech_active());

        // 400 ms of sustained speech: duck both band channels.
        let t1 = t0 + Duration::milliseconds(400);
        feed(&registry, "9", -20.0, 0.7, t1);
        feed(&registry, "11", -25.0, 0.75, t1);
        feed(&registry, "12", -25.0, 0.6, t1);
        let proposals = engine.evaluate(&registry.snapshots(), t1);

        assert!(engine.speech_active());
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].channel_id, "11");
        assert_eq!(proposals[0].reason, CommandReason::Ducking);
        // 0.75 - 4 dB on the upper segment: 0.75 - 4/40 = 0.65
        assert!((proposals[0].target_fader - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_baseline_captured_once() {
        let registry = registry();
        let mut engine = engine();
        let t0 = Utc::now();

        feed(&registry, "9", -20.0, 0.7, t0);
        feed(&registry, "11", -25.0, 0.75, t0);
        engine.evaluate(&registry.snapshots(), t0);

        let t1 = t0 + Duration::milliseconds(400);
        feed(&registry, "9", -20.0, 0.7, t1);
        feed(&registry, "11", -25.0, 0.75, t1);
        let first = engine.evaluate(&registry.snapshots(), t1);
        assert_eq!(first.len(), 1);

        // Next cycle the fader reads the ducked 0.65; nothing new comes
        // out and the stored baseline stays 0.75.
        let t2 = t1 + Duration::milliseconds(300);
        feed(&registry, "9", -20.0, 0.7, t2);
        feed(&registry, "11", -25.0, 0.65, t2);
        assert!(engine.evaluate(&registry.snapshots(), t2).is_empty());

        // Speech stops; after the release debounce the baseline comes back.
        let t3 = t2 + Duration::milliseconds(300);
        feed(&registry, "9", -60.0, 0.7, t3);
        feed(&registry, "11", -25.0, 0.65, t3);
        assert!(engine.evaluate(&registry.snapshots(), t3).is_empty());

        let t4 = t3 + Duration::milliseconds(1600);
        feed(&registry, "9", -60.0, 0.7, t4);
        feed(&registry, "11", -25.0, 0.65, t4);
        let released = engine.evaluate(&registry.snapshots(), t4);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].reason, CommandReason::Release);
        assert!((released[0].target_fader - 0.75).abs() < 1e-9);
        assert_eq!(engine.ducked_count(), 0);
    }

    #[test]
    fn test_brief_pause_does_not_release() {
        let registry = registry();
        let mut engine = engine();
        let t0 = Utc::now();

        feed(&registry, "9", -20.0, 0.7, t0);
        feed(&registry, "11", -25.0, 0.75, t0);
        engine.evaluate(&registry.snapshots(), t0);

        let t1 = t0 + Duration::milliseconds(400);
        feed(&registry, "9", -20.0, 0.7, t1);
        engine.evaluate(&registry.snapshots(), t1);
        assert!(engine.speech_active());

        // A 500 ms breath between sentences: still speaking.
        let t2 = t1 + Duration::milliseconds(500);
        feed(&registry, "9", -60.0, 0.7, t2);
        engine.evaluate(&registry.snapshots(), t2);
        assert!(engine.speech_active());

        // Speech resumes; the below timer must have reset.
        let t3 = t2 + Duration::milliseconds(200);
        feed(&registry, "9", -20.0, 0.7, t3);
        engine.evaluate(&registry.snapshots(), t3);

        let t4 = t3 + Duration::milliseconds(1400);
        feed(&registry, "9", -60.0, 0.7, t4);
        engine.evaluate(&registry.snapshots(), t4);
        assert!(engine.speech_active());
    }

    #[test]
    fn test_overridden_channel_not_ducked_but_released() {
        let registry = registry();
        let mut engine = engine();
        let t0 = Utc::now();

        feed(&registry, "9", -20.0, 0.7, t0);
        feed(&registry, "11", -25.0, 0.75, t0);
        feed(&registry, "12", -25.0, 0.6, t0);
        engine.evaluate(&registry.snapshots(), t0);

        let t1 = t0 + Duration::milliseconds(400);
        feed(&registry, "9", -20.0, 0.7, t1);
        feed(&registry, "11", -25.0, 0.75, t1);
        feed(&registry, "12", -25.0, 0.6, t1);
        let ducked = engine.evaluate(&registry.snapshots(), t1);
        assert_eq!(ducked.len(), 2);

        // Operator grabs channel 11 mid-announcement.
        registry
            .extend_override("11", t1 + Duration::seconds(10))
            .unwrap();

        // Speech ends; after the release debounce the restore still
        // targets channel 11 even though its override window is open.
        let t2 = t1 + Duration::seconds(2);
        feed(&registry, "9", -60.0, 0.7, t2);
        assert!(engine.evaluate(&registry.snapshots(), t2).is_empty());

        let t3 = t2 + Duration::milliseconds(1600);
        feed(&registry, "9", -60.0, 0.7, t3);
        let released = engine.evaluate(&registry.snapshots(), t3);
        assert_eq!(released.len(), 2);
        assert!(released.iter().all(|p| p.reason == CommandReason::Release));
        assert!(released.iter().any(|p| p.channel_id == "11"));
    }

    #[test]
    fn test_stale_speech_channel_eventually_releases() {
        let registry = registry();
        let mut engine = engine();
        let t0 = Utc::now();

        feed(&registry, "9", -20.0, 0.7, t0);
        feed(&registry, "11", -25.0, 0.75, t0);
        engine.evaluate(&registry.snapshots(), t0);

        let t1 = t0 + Duration::milliseconds(400);
        feed(&registry, "9", -20.0, 0.7, t1);
        feed(&registry, "11", -25.0, 0.75, t1);
        engine.evaluate(&registry.snapshots(), t1);
        assert!(engine.speech_active());

        // The speech mic's edge node goes silent. Once its telemetry is
        // stale it no longer counts as active; the release debounce runs
        // from the first cycle that sees it gone.
        let t2 = t1 + Duration::seconds(3);
        assert!(engine.evaluate(&registry.snapshots(), t2).is_empty());
        assert!(engine.speech_active());

        let t3 = t2 + Duration::milliseconds(1600);
        let released = engine.evaluate(&registry.snapshots(), t3);
        assert!(!engine.speech_active());
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].reason, CommandReason::Release);
    }

    #[test]
    fn test_non_target_group_untouched() {
        let mut config = FohConfig::default();
        config.channels.insert(
            "9".to_string(),
            ChannelConfig {
                role: ChannelRole::Speech,
                group: "speech".to_string(),
                ..Default::default()
            },
        );
        config.channels.insert(
            "15".to_string(),
            ChannelConfig {
                role: ChannelRole::Band,
                group: "keys".to_string(),
                ..Default::default()
            },
        );
        let registry = ChannelRegistry::from_config(&config);
        let mut engine = engine();
        let t0 = Utc::now();

        feed(&registry, "9", -20.0, 0.7, t0);
        feed(&registry, "15", -25.0, 0.75, t0);
        engine.evaluate(&registry.snapshots(), t0);

        let t1 = t0 + Duration::milliseconds(400);
        feed(&registry, "9", -20.0, 0.7, t1);
        feed(&registry, "15", -25.0, 0.75, t1);
        // "keys" is not in the default duck_targets list.
        assert!(engine.evaluate(&registry.snapshots(), t1).is_empty());
    }
}
