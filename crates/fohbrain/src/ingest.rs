//! Telemetry ingestor: validates bus telemetry and applies it to the
//! registry.
//!
//! Runs on its own task, decoupled from the tick loop. Every fault here
//! is per-channel and non-fatal: an invalid or unknown event is logged
//! and dropped, and the affected channel simply goes stale until fresh
//! data arrives (fail-safe: no action on bad data).

use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{Stream, StreamExt};
use tracing::{trace, warn};

use fohproto::TelemetryEvent;

use crate::registry::ChannelRegistry;

/// Consumes the inbound telemetry stream into the channel registry.
pub struct TelemetryIngestor {
    registry: Arc<ChannelRegistry>,
}

impl TelemetryIngestor {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self { registry }
    }

    /// Validate and apply a single event.
    pub fn ingest(&self, event: TelemetryEvent) {
        if let Err(e) = event.validate() {
            warn!(
                "dropping invalid telemetry for channel {}: {}",
                event.channel_id, e
            );
            return;
        }

        match self.registry.upsert_telemetry(&event) {
            Ok(()) => trace!(
                "channel {}: {:.1} dBFS, fader {:.3}",
                event.channel_id,
                event.level_db,
                event.fader
            ),
            Err(e) => warn!("dropping telemetry: {}", e),
        }
    }

    /// Drain a telemetry stream until it ends.
    pub async fn run(self, mut stream: Pin<Box<dyn Stream<Item = TelemetryEvent> + Send>>) {
        while let Some(event) = stream.next().await {
            self.ingest(event);
        }
        warn!("telemetry stream ended");
    }
}
