//! Channel registry: the single source of truth for per-channel state.
//!
//! Channels are instantiated once at startup from the configured channel
//! map and live for the process lifetime; only their dynamic fields
//! mutate. The arena-of-channels plus id index gives controllers a
//! deterministic iteration order (sorted channel id) and O(1) lookup.
//!
//! **Write discipline:** every mutation goes through an accessor that
//! takes the per-channel lock, so the telemetry task and the tick loop
//! can run concurrently without torn reads. Controllers never see the
//! live state - they reason over cloned [`ChannelState`] snapshots.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::debug;

use fohconf::{ChannelRole, FohConfig};
use fohproto::TelemetryEvent;

/// Registry access errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown channel id: {0}")]
    UnknownChannel(String),
}

/// The value and time of the last command this system sent for a channel.
///
/// Written only by the dispatcher; the override arbiter reads it to tell
/// self-caused fader motion from a human move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Commanded {
    pub value: f64,
    pub at: DateTime<Utc>,
}

/// Full state of one channel. Cloned copies serve as snapshots.
#[derive(Debug, Clone)]
pub struct ChannelState {
    /// Console channel id.
    pub id: String,
    /// Automation role, static from configuration.
    pub role: ChannelRole,
    /// Grouping label for ducking target selection.
    pub group: String,
    /// Auto-level loudness target in dBFS.
    pub auto_level_target_db: f64,
    /// Attenuation applied while ducked, in dB.
    pub ducking_offset_db: f64,

    /// Last reported measured level in dBFS.
    pub level_db: Option<f64>,
    /// When that level was measured.
    pub level_at: Option<DateTime<Utc>>,
    /// Last reported fader position.
    pub fader: Option<f64>,

    /// Last command this system dispatched for the channel.
    pub last_commanded: Option<Commanded>,
    /// While set and in the future, the channel is operator-owned.
    pub override_until: Option<DateTime<Utc>>,
}

impl ChannelState {
    /// True when the channel has no telemetry, or its telemetry is older
    /// than the staleness threshold. Stale channels are excluded from
    /// every automated decision.
    pub fn is_stale(&self, now: DateTime<Utc>, staleness: Duration) -> bool {
        match self.level_at {
            Some(at) => now - at > staleness,
            None => true,
        }
    }

    /// True while a human override window is open.
    pub fn is_overridden(&self, now: DateTime<Utc>) -> bool {
        self.override_until.is_some_and(|until| now < until)
    }
}

/// Process-wide channel state store.
pub struct ChannelRegistry {
    channels: Vec<RwLock<ChannelState>>,
    index: HashMap<String, usize>,
}

impl ChannelRegistry {
    /// Build the registry from the configured channel map.
    ///
    /// The channel map is a BTreeMap, so arena order (and therefore every
    /// snapshot iteration) is sorted by channel id.
    pub fn from_config(config: &FohConfig) -> Self {
        let mut channels = Vec::with_capacity(config.channels.len());
        let mut index = HashMap::with_capacity(config.channels.len());

        for (id, entry) in &config.channels {
            index.insert(id.clone(), channels.len());
            channels.push(RwLock::new(ChannelState {
                id: id.clone(),
                role: entry.role,
                group: entry.group.clone(),
                auto_level_target_db: entry.auto_level_target_db,
                ducking_offset_db: entry.ducking_offset_db,
                level_db: None,
                level_at: None,
                fader: None,
                last_commanded: None,
                override_until: None,
            }));
        }

        Self { channels, index }
    }

    fn slot(&self, channel_id: &str) -> Result<&RwLock<ChannelState>, RegistryError> {
        self.index
            .get(channel_id)
            .map(|&i| &self.channels[i])
            .ok_or_else(|| RegistryError::UnknownChannel(channel_id.to_string()))
    }

    /// Number of configured channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no channels are configured.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// True if the channel id is configured.
    pub fn contains(&self, channel_id: &str) -> bool {
        self.index.contains_key(channel_id)
    }

    /// Apply one telemetry event to a channel's dynamic fields.
    ///
    /// Never touches `last_commanded` - that field belongs to the
    /// dispatcher alone.
    pub fn upsert_telemetry(&self, event: &TelemetryEvent) -> Result<(), RegistryError> {
        let slot = self.slot(&event.channel_id)?;
        let mut channel = slot.write().unwrap();
        channel.level_db = Some(event.level_db);
        channel.level_at = Some(event.timestamp);
        channel.fader = Some(event.fader);
        Ok(())
    }

    /// Immutable copy of one channel's state.
    pub fn snapshot(&self, channel_id: &str) -> Option<ChannelState> {
        self.index
            .get(channel_id)
            .map(|&i| self.channels[i].read().unwrap().clone())
    }

    /// Immutable copies of every channel, in sorted-id order.
    pub fn snapshots(&self) -> Vec<ChannelState> {
        self.channels
            .iter()
            .map(|slot| slot.read().unwrap().clone())
            .collect()
    }

    /// Record a dispatched command. Called by the dispatcher only, just
    /// before the event is handed to the bus publisher.
    pub fn record_command(
        &self,
        channel_id: &str,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let slot = self.slot(channel_id)?;
        let mut channel = slot.write().unwrap();
        channel.last_commanded = Some(Commanded { value, at });
        Ok(())
    }

    /// Open or extend the override window for a channel.
    ///
    /// The deadline only ever moves forward: repeated human moves extend
    /// the window, they never shorten it.
    pub fn extend_override(
        &self,
        channel_id: &str,
        until: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let slot = self.slot(channel_id)?;
        let mut channel = slot.write().unwrap();
        match channel.override_until {
            Some(existing) if existing >= until => {
                debug!(
                    "channel {}: override already open past {}",
                    channel_id, until
                );
            }
            _ => channel.override_until = Some(until),
        }
        Ok(())
    }
}
