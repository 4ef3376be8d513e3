//! Simulation loop runner with operator controls.
//!
//! [`run_simulation`] drives [`run_tick`] on a fixed cadence and wraps it
//! in the control plane: bounded runs (`max_ticks`,
//! `max_real_time_seconds`), pause and resume, a runtime-adjustable tick
//! interval, and a clean operator stop.
//!
//! [`run_tick`]: crate::tick::run_tick

use std::sync::Arc;

use tracing::{info, warn};

use crate::fleet::Fleet;
use crate::operator::{OperatorState, SimulationEndReason};
use crate::tick::{self, SimulatedWorld, SimulationState, TickError, TickSummary};

/// Errors that can occur during the simulation run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A tick execution failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },
}

/// Result of the simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The reason the simulation ended.
    pub end_reason: SimulationEndReason,
    /// The last tick summary, if any tick completed.
    pub final_summary: Option<TickSummary>,
    /// Total number of ticks executed.
    pub total_ticks: u64,
}

/// Callback invoked after each tick completes.
pub trait TickCallback: Send {
    /// Called after a tick completes successfully.
    fn on_tick(&mut self, summary: &TickSummary, fleet: &Fleet);
}

/// A no-op tick callback.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary, _fleet: &Fleet) {}
}

/// Run the simulation loop until a termination condition is met.
///
/// The stop request and the wall-clock limit are checked before each
/// tick; the tick limit is checked after it, so `max_ticks = 5` runs
/// exactly five ticks.
///
/// # Errors
///
/// Returns [`RunnerError`] if a tick fails unrecoverably. Individual agent
/// failures never end the run.
pub async fn run_simulation<W: SimulatedWorld>(
    state: &mut SimulationState<W>,
    operator: &Arc<OperatorState>,
    callback: &mut dyn TickCallback,
) -> Result<SimulationResult, RunnerError> {
    let mut last_summary: Option<TickSummary> = None;
    let mut total_ticks: u64 = 0;

    info!(
        max_ticks = operator.max_ticks(),
        max_real_time_seconds = operator.max_real_time_seconds(),
        tick_interval_ms = operator.tick_interval_ms(),
        workers = state.worker_count(),
        population = state.fleet.population(),
        "Simulation starting"
    );

    loop {
        // --- Pause ---
        if operator.is_paused() {
            info!("Simulation paused, waiting for resume...");
            operator.wait_if_paused().await;
            info!("Simulation resumed");
        }

        // --- Stop request (before tick) ---
        if operator.is_stop_requested() {
            info!("Operator stop requested");
            return Ok(finish(
                operator,
                SimulationEndReason::OperatorStop,
                last_summary,
                total_ticks,
            )
            .await);
        }

        // --- Time limit (before tick) ---
        if operator.time_limit_reached() {
            info!(
                max_seconds = operator.max_real_time_seconds(),
                elapsed = operator.elapsed_seconds(),
                "Real-time limit reached"
            );
            return Ok(finish(
                operator,
                SimulationEndReason::MaxRealTimeReached,
                last_summary,
                total_ticks,
            )
            .await);
        }

        let summary = tick::run_tick(state)?;
        total_ticks = total_ticks.saturating_add(1);
        callback.on_tick(&summary, &state.fleet);

        // --- Tick limit (after tick) ---
        if operator.tick_limit_reached(summary.tick) {
            info!(
                tick = summary.tick,
                max_ticks = operator.max_ticks(),
                "Tick limit reached"
            );
            return Ok(finish(
                operator,
                SimulationEndReason::MaxTicksReached,
                Some(summary),
                total_ticks,
            )
            .await);
        }

        last_summary = Some(summary);

        let interval_ms = operator.tick_interval_ms();
        if interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(interval_ms)).await;
        }
    }
}

async fn finish(
    operator: &OperatorState,
    reason: SimulationEndReason,
    final_summary: Option<TickSummary>,
    total_ticks: u64,
) -> SimulationResult {
    operator.set_end_reason(reason).await;
    SimulationResult {
        end_reason: reason,
        final_summary,
        total_ticks,
    }
}

/// Log the simulation end sequence.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        final_tick = result.final_summary.as_ref().map(|s| s.tick),
        final_agents_alive = result.final_summary.as_ref().map(|s| s.agents_alive),
        "Simulation ended"
    );

    if let Some(ref summary) = result.final_summary {
        info!(
            tick = summary.tick,
            agents_alive = summary.agents_alive,
            modes = ?summary.modes,
            "Final tick summary"
        );
    } else {
        warn!("Simulation ended with no ticks executed");
    }
}
