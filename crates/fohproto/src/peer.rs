//! BusPeer - ZMQ pub/sub transport for the brain daemon.
//!
//! One SUB socket connected to the Edge's telemetry publisher (subscribed
//! to the `telemetry/` prefix) and one PUB socket bound for command
//! broadcasts. Frames are `[topic, json payload]`, the payload being a
//! [`Message`] envelope.
//!
//! Transport faults are isolated here: a decode failure is logged and the
//! frame dropped, a publish failure surfaces as an error the caller logs
//! and moves on from. Nothing in this module blocks controller
//! evaluation.
//!
//! ## Usage
//!
//! ```ignore
//! use fohconf::FohConfig;
//! use fohproto::BusPeer;
//!
//! let config = FohConfig::load()?;
//! let peer = BusPeer::from_config(&config)?;
//! let mut telemetry = peer.telemetry();
//! ```

use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use futures::stream::{Stream, StreamExt};
use futures::SinkExt;
use tmq::{Context, Multipart, TmqError};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use fohconf::FohConfig;

use crate::envelope::Message;
use crate::events::{CommandEvent, TelemetryEvent};
use crate::topic::{command_topic, parse_telemetry_topic, TELEMETRY_PREFIX};

/// Source tag stamped on every envelope this peer publishes.
const SOURCE: &str = "fohbrain";

/// Boxed sink type for sending messages
type BoxedSink = Pin<Box<dyn futures::Sink<Multipart, Error = TmqError> + Send>>;

/// Boxed stream type for receiving messages
type BoxedStream = Pin<Box<dyn Stream<Item = Result<Multipart, TmqError>> + Send>>;

/// ZMQ peer connecting the brain to the message bus.
pub struct BusPeer {
    command_tx: Arc<Mutex<BoxedSink>>,
    telemetry_rx: Arc<Mutex<BoxedStream>>,
}

impl BusPeer {
    /// Create a peer from FohConfig (the recommended way).
    pub fn from_config(config: &FohConfig) -> Result<Self> {
        Self::connect(
            &config.bus.telemetry_endpoint,
            &config.bus.command_endpoint,
        )
    }

    /// Connect the SUB side and bind the PUB side.
    pub fn connect(telemetry_endpoint: &str, command_endpoint: &str) -> Result<Self> {
        let context = Context::new();

        let subscriber = tmq::subscribe(&context)
            .connect(telemetry_endpoint)
            .with_context(|| {
                format!("Failed to connect telemetry SUB to {}", telemetry_endpoint)
            })?
            .subscribe(TELEMETRY_PREFIX.as_bytes())
            .context("Failed to set telemetry subscription")?;

        let publisher = tmq::publish(&context)
            .bind(command_endpoint)
            .with_context(|| format!("Failed to bind command PUB to {}", command_endpoint))?;

        info!(
            "bus peer up: telemetry from {}, commands on {}",
            telemetry_endpoint, command_endpoint
        );

        Ok(Self {
            command_tx: Arc::new(Mutex::new(Box::pin(publisher))),
            telemetry_rx: Arc::new(Mutex::new(Box::pin(subscriber))),
        })
    }

    /// Publish one command event on `command/{channel_id}`.
    pub async fn publish_command(&self, event: &CommandEvent) -> Result<()> {
        let msg = Message::new("command", SOURCE, event.clone());
        let payload = serde_json::to_vec(&msg).context("Failed to serialize command")?;
        let topic = command_topic(&event.channel_id).into_bytes();

        let multipart: Multipart = vec![topic, payload].into();

        let mut tx = self.command_tx.lock().await;
        tx.send(multipart)
            .await
            .context("Command publish failed")?;

        debug!(
            "published {:?} for channel {} -> {:.3}",
            event.reason, event.channel_id, event.target_fader
        );
        Ok(())
    }

    /// Stream of decoded telemetry events.
    ///
    /// Malformed frames are logged and skipped; the stream only ends when
    /// the socket does.
    pub fn telemetry(&self) -> Pin<Box<dyn Stream<Item = TelemetryEvent> + Send + 'static>> {
        let telemetry_rx = self.telemetry_rx.clone();

        Box::pin(async_stream::stream! {
            loop {
                let msg = {
                    let mut rx = telemetry_rx.lock().await;
                    rx.next().await
                };

                match msg {
                    Some(Ok(multipart)) => {
                        if let Some(event) = decode_telemetry(multipart) {
                            yield event;
                        }
                    }
                    Some(Err(e)) => {
                        error!("telemetry socket error: {}", e);
                        break;
                    }
                    None => {
                        error!("telemetry socket stream ended");
                        break;
                    }
                }
            }
        })
    }
}

/// Decode one `[topic, payload]` frame pair into a telemetry event.
///
/// Returns None (after logging) for anything malformed; one bad frame
/// must never take the ingest loop down.
fn decode_telemetry(multipart: Multipart) -> Option<TelemetryEvent> {
    let frames: Vec<Vec<u8>> = multipart.into_iter().map(|m| m.to_vec()).collect();

    if frames.len() != 2 {
        warn!("telemetry frame with {} parts, expected 2", frames.len());
        return None;
    }

    let topic = match std::str::from_utf8(&frames[0]) {
        Ok(t) => t,
        Err(_) => {
            warn!("telemetry topic is not UTF-8, dropping frame");
            return None;
        }
    };

    let Some(channel_id) = parse_telemetry_topic(topic) else {
        warn!("unexpected topic on telemetry socket: {}", topic);
        return None;
    };

    let msg: Message<TelemetryEvent> = match serde_json::from_slice(&frames[1]) {
        Ok(m) => m,
        Err(e) => {
            warn!("failed to decode telemetry payload on {}: {}", topic, e);
            return None;
        }
    };

    if msg.content.channel_id != channel_id {
        warn!(
            "topic/payload channel mismatch: topic {} vs payload {}",
            channel_id, msg.content.channel_id
        );
        return None;
    }

    Some(msg.content)
}
