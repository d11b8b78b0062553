//! The decision core: one `tick` runs the whole control cycle against
//! the registry's current state.
//!
//! Cycle order is fixed and matters:
//! 1. Override arbitration, so a fader grab observed this cycle
//!    suppresses this cycle's proposals, not next cycle's.
//! 2. Ducking, which outranks leveling at merge time.
//! 3. Auto-level.
//! 4. Dispatch, which merges, filters, and publishes.
//!
//! `tick` takes `now` explicitly so the entire control loop can be
//! driven through simulated time in tests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::trace;

use fohconf::FohConfig;
use fohproto::CommandEvent;

use crate::arbiter::OverrideArbiter;
use crate::autolevel::AutoLevelController;
use crate::dispatch::{CommandDispatcher, CommandPublisher};
use crate::ducking::DuckingEngine;
use crate::registry::ChannelRegistry;

pub struct BrainEngine {
    registry: Arc<ChannelRegistry>,
    arbiter: OverrideArbiter,
    ducking: DuckingEngine,
    autolevel: AutoLevelController,
    dispatcher: CommandDispatcher,
}

impl BrainEngine {
    pub fn new(config: &FohConfig, publisher: Arc<dyn CommandPublisher>) -> Self {
        let registry = Arc::new(ChannelRegistry::from_config(config));
        Self {
            registry: registry.clone(),
            arbiter: OverrideArbiter::new(&config.tuning),
            ducking: DuckingEngine::new(&config.tuning),
            autolevel: AutoLevelController::new(&config.tuning),
            dispatcher: CommandDispatcher::new(&config.tuning, publisher),
        }
    }

    /// Shared handle for the telemetry ingest path.
    pub fn registry(&self) -> Arc<ChannelRegistry> {
        self.registry.clone()
    }

    /// Run one full control cycle. Returns the commands that went out.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<CommandEvent> {
        // Arbitration first, against the state at tick start.
        let snapshots = self.registry.snapshots();
        let overridden = self.arbiter.evaluate(&snapshots, &self.registry, now);

        // Re-snapshot so windows opened just now are visible to the
        // controllers below.
        let snapshots = if overridden.is_empty() {
            snapshots
        } else {
            self.registry.snapshots()
        };

        let mut proposals = self.ducking.evaluate(&snapshots, now);
        for channel in &snapshots {
            proposals.extend(self.autolevel.evaluate(channel, now));
        }

        trace!(
            "tick: {} channel(s), {} proposal(s), {} override(s) touched",
            snapshots.len(),
            proposals.len(),
            overridden.len()
        );

        self.dispatcher.dispatch(proposals, &self.registry, now)
    }
}
