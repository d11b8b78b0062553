//! Human override arbitration: detect fader moves the brain did not
//! cause, and cede the channel to the operator for a window.
//!
//! Detection is edge-triggered on movement. The arbiter remembers the
//! last fader position it saw per channel; a jump beyond the divergence
//! tolerance is a move. One physical move therefore opens (or extends)
//! exactly one window, instead of the steady-state divergence between
//! fader and last command re-triggering forever.
//!
//! A move is excused as self-caused only when the brain commanded this
//! channel recently *and* the fader landed where the command said. A
//! moved fader on a channel the brain never touched is still an operator
//! move.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use fohconf::TuningConfig;
use tracing::{debug, info, warn};

use crate::registry::{ChannelRegistry, ChannelState};

pub struct OverrideArbiter {
    divergence_tolerance: f64,
    command_grace: Duration,
    override_window: Duration,
    staleness: Duration,
    /// Last fader position seen per channel.
    observed: HashMap<String, f64>,
}

impl OverrideArbiter {
    pub fn new(tuning: &TuningConfig) -> Self {
        Self {
            divergence_tolerance: tuning.divergence_tolerance,
            command_grace: Duration::milliseconds(tuning.command_grace_ms as i64),
            override_window: Duration::milliseconds(tuning.override_window_ms as i64),
            staleness: Duration::milliseconds(tuning.staleness_ms as i64),
            observed: HashMap::new(),
        }
    }

    /// Scan the snapshots for operator moves and open override windows.
    /// Returns the ids whose window was opened or extended this cycle.
    pub fn evaluate(
        &mut self,
        snapshots: &[ChannelState],
        registry: &ChannelRegistry,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut touched = Vec::new();

        for ch in snapshots {
            if ch.is_stale(now, self.staleness) {
                continue;
            }
            let Some(fader) = ch.fader else { continue };

            let Some(&last_seen) = self.observed.get(&ch.id) else {
                // First reading for this channel is the reference point,
                // never a move.
                self.observed.insert(ch.id.clone(), fader);
                continue;
            };

            if (fader - last_seen).abs() <= self.divergence_tolerance {
                // Track small drift so sensor noise cannot accumulate
                // into a phantom move.
                self.observed.insert(ch.id.clone(), fader);
                continue;
            }

            self.observed.insert(ch.id.clone(), fader);

            if self.is_self_caused(ch, fader, now) {
                debug!(
                    "channel {}: fader settled at commanded value {:.3}",
                    ch.id, fader
                );
                continue;
            }

            let until = now + self.override_window;
            let already_open = ch.is_overridden(now);
            if let Err(e) = registry.extend_override(&ch.id, until) {
                warn!("failed to extend override: {}", e);
                continue;
            }
            if already_open {
                debug!("channel {}: operator still active, override extended", ch.id);
            } else {
                info!(
                    "channel {}: operator move ({:.3} -> {:.3}), overriding for {} ms",
                    ch.id,
                    last_seen,
                    fader,
                    self.override_window.num_milliseconds()
                );
            }
            touched.push(ch.id.clone());
        }

        touched
    }

    /// A move matches a recent command when the command is inside the
    /// grace period and the fader sits within tolerance of its value.
    fn is_self_caused(&self, ch: &ChannelState, fader: f64, now: DateTime<Utc>) -> bool {
        ch.last_commanded.is_some_and(|cmd| {
            now - cmd.at <= self.command_grace
                && (fader - cmd.value).abs() <= self.divergence_tolerance
        })
    }
}
