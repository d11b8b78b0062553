//! Command dispatcher: merges controller proposals, applies the safety
//! rails, and hands surviving commands to the bus publisher.
//!
//! Conflict rules, in order:
//! 1. Override wins: while a channel is operator-owned, everything except
//!    a duck Release is suppressed.
//! 2. Ducking/Release beats Auto-Level for the same channel in the same
//!    cycle - ducking is momentary and time-critical, leveling is a slow
//!    trim that can wait a tick.
//!
//! Before publishing, commands are rate-limited per channel and no-op
//! suppressed. Release commands skip the rate limit: restoring a ducked
//! channel is time-critical the same way override suppression is.
//!
//! Every published command updates the registry via `record_command`
//! *before* reaching the publisher, closing the loop the override
//! arbiter depends on.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use fohconf::TuningConfig;
use fohproto::{CommandEvent, CommandReason};

use crate::registry::ChannelRegistry;

/// A controller's requested fader write for one channel, one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub channel_id: String,
    pub target_fader: f64,
    pub reason: CommandReason,
}

/// Boundary to the bus transport.
///
/// Implementations must not block: the dispatcher runs inside the tick
/// loop, and a transport stall must never delay evaluation. Commands that
/// cannot be handed off are dropped, not queued indefinitely.
pub trait CommandPublisher: Send + Sync {
    fn publish(&self, event: CommandEvent);
}

/// Publisher that discards everything. Used in tests and during startup.
pub struct NoOpPublisher;

impl CommandPublisher for NoOpPublisher {
    fn publish(&self, _event: CommandEvent) {}
}

/// Publisher that hands commands to the bus task over a bounded queue.
///
/// `try_send` keeps the tick loop non-blocking; if the transport has
/// stalled long enough to fill the queue, commands are dropped with a
/// warning rather than bursting stale fader writes on reconnect.
pub struct QueuePublisher {
    tx: tokio::sync::mpsc::Sender<CommandEvent>,
}

impl QueuePublisher {
    pub fn new(tx: tokio::sync::mpsc::Sender<CommandEvent>) -> Self {
        Self { tx }
    }
}

impl CommandPublisher for QueuePublisher {
    fn publish(&self, event: CommandEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!("transport unavailable, dropping command: {}", e);
        }
    }
}

/// Merges, filters, and publishes the cycle's proposals.
pub struct CommandDispatcher {
    rate_limit: Duration,
    noop_tolerance: f64,
    publisher: Arc<dyn CommandPublisher>,
}

impl CommandDispatcher {
    pub fn new(tuning: &TuningConfig, publisher: Arc<dyn CommandPublisher>) -> Self {
        Self {
            rate_limit: Duration::milliseconds(tuning.rate_limit_ms as i64),
            noop_tolerance: tuning.noop_tolerance,
            publisher,
        }
    }

    /// Dispatch one cycle's proposals. Returns the commands actually
    /// published, in deterministic (first-proposed channel) order.
    pub fn dispatch(
        &self,
        proposals: Vec<Proposal>,
        registry: &ChannelRegistry,
        now: DateTime<Utc>,
    ) -> Vec<CommandEvent> {
        let mut dispatched = Vec::new();

        for proposal in merge_per_channel(proposals) {
            let Some(channel) = registry.snapshot(&proposal.channel_id) else {
                warn!(
                    "dropping proposal for unconfigured channel {}",
                    proposal.channel_id
                );
                continue;
            };

            // Override always wins; only a duck Release may pass, since it
            // returns the channel to its pre-automation baseline.
            if channel.is_overridden(now) && proposal.reason != CommandReason::Release {
                debug!(
                    "channel {}: {:?} suppressed by operator override",
                    proposal.channel_id, proposal.reason
                );
                continue;
            }

            if let Some(commanded) = channel.last_commanded {
                if proposal.reason != CommandReason::Release
                    && now - commanded.at < self.rate_limit
                {
                    debug!(
                        "channel {}: rate limited ({:?})",
                        proposal.channel_id, proposal.reason
                    );
                    continue;
                }
                if (proposal.target_fader - commanded.value).abs() <= self.noop_tolerance {
                    debug!("channel {}: no-op suppressed", proposal.channel_id);
                    continue;
                }
            }

            let target = proposal.target_fader.clamp(0.0, 1.0);

            // Record before publish so the arbiter sees every command we
            // ever sent, even ones the transport later drops.
            if let Err(e) = registry.record_command(&proposal.channel_id, target, now) {
                warn!("failed to record command: {}", e);
                continue;
            }

            let event = CommandEvent {
                channel_id: proposal.channel_id,
                target_fader: target,
                reason: proposal.reason,
                timestamp: now,
            };
            debug!(
                "channel {}: {:?} -> {:.3}",
                event.channel_id, event.reason, event.target_fader
            );
            self.publisher.publish(event.clone());
            dispatched.push(event);
        }

        dispatched
    }
}

/// Collapse proposals to one winner per channel, preserving first-seen
/// channel order. Ducking and Release outrank AutoLevel.
fn merge_per_channel(proposals: Vec<Proposal>) -> Vec<Proposal> {
    let mut winners: Vec<Proposal> = Vec::new();
    let mut by_channel: HashMap<String, usize> = HashMap::new();

    for proposal in proposals {
        match by_channel.get(&proposal.channel_id) {
            None => {
                by_channel.insert(proposal.channel_id.clone(), winners.len());
                winners.push(proposal);
            }
            Some(&idx) => {
                let incumbent = &winners[idx];
                let incumbent_is_duck = incumbent.reason != CommandReason::AutoLevel;
                let challenger_is_duck = proposal.reason != CommandReason::AutoLevel;
                if challenger_is_duck && !incumbent_is_duck {
                    winners[idx] = proposal;
                }
            }
        }
    }

    winners
}
