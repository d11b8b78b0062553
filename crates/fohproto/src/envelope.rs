//! Message envelope shared by every bus payload.
//!
//! Mirrors the header/content split used across the system: the header is
//! transport-agnostic metadata (id, type, source, timestamp), the content
//! is the typed payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PROTOCOL_VERSION;

/// Envelope header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Unique message id.
    pub msg_id: Uuid,
    /// Message type tag, e.g. "telemetry" or "command".
    pub msg_type: String,
    /// Logical sender, e.g. "fohbrain" or "edge".
    pub source: String,
    /// When the message was created.
    pub created: DateTime<Utc>,
    /// Protocol version.
    pub version: String,
}

/// A typed message with envelope header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message<T> {
    pub header: MessageHeader,
    pub content: T,
}

impl<T> Message<T> {
    /// Create a new message with a fresh id and the current time.
    pub fn new(msg_type: impl Into<String>, source: impl Into<String>, content: T) -> Self {
        Self {
            header: MessageHeader {
                msg_id: Uuid::new_v4(),
                msg_type: msg_type.into(),
                source: source.into(),
                created: Utc::now(),
                version: PROTOCOL_VERSION.to_string(),
            },
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CommandEvent, CommandReason};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_envelope_round_trip() {
        let msg = Message::new(
            "command",
            "fohbrain",
            CommandEvent {
                channel_id: "11".to_string(),
                target_fader: 0.65,
                reason: CommandReason::Ducking,
                timestamp: Utc::now(),
            },
        );

        let json = serde_json::to_string(&msg).unwrap();
        let back: Message<CommandEvent> = serde_json::from_str(&json).unwrap();

        assert_eq!(back.header.msg_id, msg.header.msg_id);
        assert_eq!(back.header.msg_type, "command");
        assert_eq!(back.header.source, "fohbrain");
        assert_eq!(back.content.channel_id, "11");
        assert_eq!(back.content.reason, CommandReason::Ducking);
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = Message::new("telemetry", "edge", ());
        let b = Message::new("telemetry", "edge", ());
        assert!(a.header.msg_id != b.header.msg_id);
    }
}
