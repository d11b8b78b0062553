//! Topic names for the pub/sub bus.
//!
//! The namespace is stable and versionless: `telemetry/{channel_id}` and
//! `command/{channel_id}`. Topic strings double as ZMQ subscription
//! prefixes, so subscribing to [`TELEMETRY_PREFIX`] receives every channel.

/// Prefix for Edge-published telemetry topics.
pub const TELEMETRY_PREFIX: &str = "telemetry/";

/// Prefix for Brain-published command topics.
pub const COMMAND_PREFIX: &str = "command/";

/// Topic the Edge publishes telemetry for `channel_id` on.
pub fn telemetry_topic(channel_id: &str) -> String {
    format!("{}{}", TELEMETRY_PREFIX, channel_id)
}

/// Topic the Brain publishes commands for `channel_id` on.
pub fn command_topic(channel_id: &str) -> String {
    format!("{}{}", COMMAND_PREFIX, channel_id)
}

/// Extract the channel id from a telemetry topic, if it is one.
pub fn parse_telemetry_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(TELEMETRY_PREFIX)
        .filter(|id| !id.is_empty())
}

/// Extract the channel id from a command topic, if it is one.
pub fn parse_command_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(COMMAND_PREFIX)
        .filter(|id| !id.is_empty())
}
