//! Bus schema for the fohbrain system.
//!
//! The Brain and the Edge node talk over a publish/subscribe bus with two
//! topic families:
//!
//! - `telemetry/{channel_id}` - per-channel level and fader position,
//!   published by the Edge at a roughly periodic rate
//! - `command/{channel_id}` - fader write commands, published by the Brain
//!
//! Payloads are JSON, wrapped in a [`Message`] envelope carrying a message
//! id, source, and timestamp for observability.
//!
//! The `peer` feature (default on) adds [`BusPeer`], the ZMQ PUB/SUB
//! transport used by the brain daemon. The schema types compile without it
//! so tests and tooling can use the wire format without linking libzmq.

pub mod envelope;
pub mod events;
pub mod topic;

#[cfg(feature = "peer")]
pub mod peer;

pub use envelope::{Message, MessageHeader};
pub use events::{CommandEvent, CommandReason, TelemetryEvent};
pub use topic::{command_topic, parse_command_topic, parse_telemetry_topic, telemetry_topic};
pub use topic::{COMMAND_PREFIX, TELEMETRY_PREFIX};

#[cfg(feature = "peer")]
pub use peer::BusPeer;

use thiserror::Error;

/// Protocol version, carried in every envelope header.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Errors produced while validating or decoding bus messages.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("telemetry level {0} dBFS outside sane range")]
    LevelOutOfRange(f64),

    #[error("fader value {0} outside 0.0-1.0")]
    FaderOutOfRange(f64),

    #[error("non-finite value in {0}")]
    NotFinite(&'static str),

    #[error("unrecognized topic: {0}")]
    BadTopic(String),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}
