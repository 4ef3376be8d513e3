//! Fleet engine binary for the botfleet simulation.
//!
//! Wires together configuration, logging, the demonstration arena, the
//! scenario spawner and the bounded tick loop.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`BOTFLEET_CONFIG`, else `botfleet-config.yaml`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the demo arena in an in-memory world
//! 4. Create the simulation state and worker pool
//! 5. Spawn the scenario's players, groups and relationships
//! 6. Create operator state from simulation bounds; Ctrl-C requests a stop
//! 7. Run the simulation loop
//! 8. Log the result

mod error;
mod spawner;
mod summary;

use std::sync::Arc;

use botfleet_core::config::{LoggingConfig, SimulationConfig};
use botfleet_core::operator::OperatorState;
use botfleet_core::runner;
use botfleet_core::SimulationState;
use botfleet_world::{SimWorld, create_demo_arena};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::summary::SummaryLogger;

/// Application entry point for the fleet engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the simulation itself fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration. Logging is not up yet, so a failure here is
    //    reported by the returned error alone.
    let config = SimulationConfig::load()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        world_name = config.world.name,
        seed = config.world.seed,
        tick_interval_ms = config.world.tick_interval_ms,
        max_agents = config.fleet.max_agents,
        "botfleet-engine starting"
    );

    // 3. Build the arena.
    let world = SimWorld::new();
    let landmarks = create_demo_arena(&world)?;
    info!(blocks = world.block_count(), spawn = %landmarks.spawn, "Arena ready");

    // 4. Simulation state.
    let mut state = SimulationState::new(&config, world)?;
    info!(workers = state.worker_count(), "Simulation state created");

    // 5. Scenario.
    let outcome = spawner::spawn_scenario(&config.scenario, &state, config.world.seed)?;
    info!(
        agents = outcome.agents_spawned(),
        players = outcome.players.len(),
        "Scenario spawned"
    );

    // 6. Operator state.
    let operator = Arc::new(OperatorState::new(
        config.world.tick_interval_ms,
        &config.simulation,
    ));
    {
        let operator = Arc::clone(&operator);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, stopping");
                    operator.request_stop();
                }
                Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
            }
        });
    }

    // 7. Run.
    let mut callback = SummaryLogger::new(config.logging.summary_interval_ticks);
    let result = runner::run_simulation(&mut state, &operator, &mut callback).await?;

    // 8. Log results.
    runner::log_simulation_end(&result);
    let status = operator
        .status(state.clock.tick(), state.fleet.population())
        .await;
    match serde_json::to_string(&status) {
        Ok(json) => info!(status = %json, "Final operator status"),
        Err(e) => warn!(error = %e, "failed to serialize final status"),
    }
    match serde_json::to_string(&state.fleet.group_views()) {
        Ok(json) => info!(groups = %json, "Final groups"),
        Err(e) => warn!(error = %e, "failed to serialize final groups"),
    }

    info!(
        end_reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        "botfleet-engine shutdown complete"
    );
    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured
/// level.
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
