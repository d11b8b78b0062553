//! fohbrain - decision core for live mixing automation.
//!
//! The brain sits between edge nodes on the telemetry side and the
//! console on the command side. It keeps a registry of per-channel
//! state fed by telemetry, runs three controllers on a fixed tick
//! (auto-level, speech ducking, human-override arbitration), and
//! dispatches the surviving fader commands back over the bus.
//!
//! The whole control path is synchronous and clock-parameterized; only
//! the edges (ingest, publish, the tick timer) are async.

pub mod arbiter;
pub mod autolevel;
pub mod daemon;
pub mod dispatch;
pub mod ducking;
pub mod engine;
pub mod fader;
pub mod ingest;
pub mod registry;

pub use dispatch::{CommandPublisher, NoOpPublisher, Proposal, QueuePublisher};
pub use engine::BrainEngine;
pub use registry::{ChannelRegistry, ChannelState};
