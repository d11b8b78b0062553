//! Daemon wiring: bus peer, telemetry ingest, the tick loop, and the
//! command publish task.
//!
//! Three concerns run concurrently and stay decoupled:
//! - the ingest task drains the telemetry stream into the registry,
//! - the tick loop evaluates the engine at a fixed cadence,
//! - the publish task drains the command queue onto the PUB socket.
//!
//! The tick loop never awaits the transport. Commands cross to the
//! publish task over a bounded queue; if the socket stalls, the queue
//! fills and commands are dropped with a warning instead of backing up
//! into evaluation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use fohconf::FohConfig;
use fohproto::{BusPeer, CommandEvent};

use crate::dispatch::QueuePublisher;
use crate::engine::BrainEngine;
use crate::ingest::TelemetryIngestor;

/// Commands buffered toward the PUB socket before we start dropping.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Run the brain until ctrl-c.
pub async fn run(config: FohConfig) -> Result<()> {
    let peer = BusPeer::from_config(&config)?;
    let telemetry = peer.telemetry();

    let (command_tx, mut command_rx) = mpsc::channel::<CommandEvent>(COMMAND_QUEUE_DEPTH);
    let mut engine = BrainEngine::new(&config, Arc::new(QueuePublisher::new(command_tx)));

    let ingest_task = tokio::spawn(TelemetryIngestor::new(engine.registry()).run(telemetry));

    let publish_task = tokio::spawn(async move {
        while let Some(event) = command_rx.recv().await {
            if let Err(e) = peer.publish_command(&event).await {
                error!("command publish failed: {:#}", e);
            }
        }
    });

    let mut interval = tokio::time::interval(Duration::from_millis(config.tuning.tick_ms));
    // A stalled tick must not be followed by a catch-up burst of fader
    // writes; skip straight to the next cadence point.
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "brain running: {} channel(s), tick every {} ms",
        engine.registry().len(),
        config.tuning.tick_ms
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let commands = engine.tick(Utc::now());
                if !commands.is_empty() {
                    debug!("tick dispatched {} command(s)", commands.len());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    ingest_task.abort();
    publish_task.abort();
    info!("brain stopped");
    Ok(())
}
