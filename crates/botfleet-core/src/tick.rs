//! Tick cycle: the per-tick loop body that drives the fleet.
//!
//! Each tick runs these phases:
//!
//! 1. **Clock** -- advance the tick counter.
//!
//! 2. **Physics** -- let the world advance one step (movement, gravity).
//!
//! 3. **AI pass** -- only on every Nth tick. Every live agent is advanced
//!    by one [`BehaviorScheduler`] pass, sharded across the worker pool.
//!    One agent's failure is logged and counted; it never aborts the pass.
//!
//! 4. **Cleanup** -- every Mth tick, agents whose world entity is gone or
//!    dead are removed through the idempotent removal path.
//!
//! 5. **Summary** -- count living agents and behavior modes.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use botfleet_agents::{AdvanceOutcome, AgentError, BehaviorScheduler, SpawnParams, TickContext};
use botfleet_types::{AgentId, BehaviorMode, EntityRef, Vec3};
use botfleet_world::{AgentActions, NavigationPrimitive, SimWorld, WorldError, WorldQuery};

use crate::clock::{ClockError, TickClock};
use crate::config::SimulationConfig;
use crate::fleet::Fleet;
use crate::registry::{AgentCell, RegistryError};

/// Errors that can occur during tick execution.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A clock operation failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A registry operation failed.
    #[error("registry error: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: RegistryError,
    },

    /// A world operation failed.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },
}

/// A world the tick loop can drive: queries, navigation, actions and a
/// physics step.
pub trait SimulatedWorld: WorldQuery + NavigationPrimitive + AgentActions {
    /// Advance world physics by one tick. Worlds driven elsewhere keep the
    /// default no-op.
    fn advance_physics(&self) {}
}

impl SimulatedWorld for SimWorld {
    fn advance_physics(&self) {
        self.step();
    }
}

/// One agent whose pass failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentFailure {
    /// The agent.
    pub agent_id: AgentId,
    /// What went wrong, formatted.
    pub error: String,
}

/// Summary of a single tick's execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickSummary {
    /// The tick number that was executed.
    pub tick: u64,
    /// Whether the AI pass ran this tick.
    pub ai_pass: bool,
    /// Registered agents whose world entity is alive at end of tick.
    pub agents_alive: usize,
    /// Agents whose behavior table was evaluated.
    pub agents_evaluated: usize,
    /// Behavior changes this tick.
    pub transitions: usize,
    /// Agents whose pass failed.
    pub failures: Vec<AgentFailure>,
    /// Agents removed by the cleanup sweep.
    pub removed: Vec<AgentId>,
    /// Agents per behavior mode at end of tick.
    pub modes: BTreeMap<BehaviorMode, usize>,
}

/// The state the tick loop runs over.
pub struct SimulationState<W> {
    /// The tick clock.
    pub clock: TickClock,
    /// Agents, groups and relationships.
    pub fleet: Fleet,
    /// The world the fleet lives in.
    pub world: W,
    /// Worker pool for the AI pass; `None` runs it on the calling thread.
    pool: Option<rayon::ThreadPool>,
}

impl<W: SimulatedWorld> SimulationState<W> {
    /// Build the clock, fleet and worker pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Clock`] for a zero interval and
    /// [`TickError::Registry`] for a zero population cap.
    pub fn new(config: &SimulationConfig, world: W) -> Result<Self, TickError> {
        let clock = TickClock::new(&config.fleet)?;
        let fleet = Fleet::new(config.fleet.max_agents, config.tuning())?;
        let workers = config.fleet.worker_threads;
        // 0 lets rayon pick one thread per core.
        let pool = if workers == 1 {
            None
        } else {
            rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|index| format!("botfleet-ai-{index}"))
                .build()
                .ok()
        };
        debug!(
            workers = pool.as_ref().map_or(1, rayon::ThreadPool::current_num_threads),
            "simulation state ready"
        );
        Ok(Self {
            clock,
            fleet,
            world,
            pool,
        })
    }

    /// Number of threads the AI pass runs on.
    pub fn worker_count(&self) -> usize {
        self.pool
            .as_ref()
            .map_or(1, rayon::ThreadPool::current_num_threads)
    }
}

impl SimulationState<SimWorld> {
    /// Register an agent and place its entity in the world.
    ///
    /// If the world rejects the entity the agent is removed again, so no
    /// partial agent survives.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Registry`] when the registry refuses the spawn
    /// and [`TickError::World`] when the world does.
    pub fn spawn_agent(
        &self,
        params: &SpawnParams,
        position: Vec3,
        max_health: f64,
    ) -> Result<Arc<AgentCell>, TickError> {
        let cell = self.fleet.spawn(params)?;
        if let Err(err) = self
            .world
            .spawn_entity(EntityRef::Agent(cell.id()), position, max_health)
        {
            self.fleet.remove(cell.id());
            return Err(err.into());
        }
        Ok(cell)
    }
}

enum AgentTick {
    Skipped,
    Advanced(AdvanceOutcome),
    Failed(AgentId, AgentError),
}

/// Execute one tick.
///
/// # Errors
///
/// Returns [`TickError::Clock`] if the tick counter overflows. Per-agent
/// failures are reported in the summary instead.
pub fn run_tick<W: SimulatedWorld>(state: &mut SimulationState<W>) -> Result<TickSummary, TickError> {
    let tick = state.clock.advance()?;
    state.world.advance_physics();

    let mut summary = TickSummary {
        tick,
        ai_pass: state.clock.is_ai_tick(),
        agents_alive: 0,
        agents_evaluated: 0,
        transitions: 0,
        failures: Vec::new(),
        removed: Vec::new(),
        modes: BTreeMap::new(),
    };

    if summary.ai_pass {
        let results = run_ai_pass(state, tick, state.clock.ai_pass());
        for result in results {
            match result {
                AgentTick::Skipped => {}
                AgentTick::Advanced(outcome) => {
                    if outcome.evaluated {
                        summary.agents_evaluated = summary.agents_evaluated.saturating_add(1);
                    }
                    if outcome.transition.is_some() {
                        summary.transitions = summary.transitions.saturating_add(1);
                    }
                }
                AgentTick::Failed(agent_id, error) => {
                    warn!(%agent_id, tick, error = %error, "agent pass failed");
                    summary.failures.push(AgentFailure {
                        agent_id,
                        error: error.to_string(),
                    });
                }
            }
        }
    }

    if state.clock.is_cleanup_tick() {
        summary.removed = state.fleet.cleanup(&state.world);
    }

    for cell in state.fleet.registry().cells() {
        let alive = state
            .world
            .entity(EntityRef::Agent(cell.id()))
            .is_some_and(|snapshot| snapshot.alive);
        if alive {
            summary.agents_alive = summary.agents_alive.saturating_add(1);
        }
        let mode = cell.lock().mode();
        let count = summary.modes.entry(mode).or_insert(0);
        *count = count.saturating_add(1);
    }

    debug!(
        tick,
        ai_pass = summary.ai_pass,
        agents_alive = summary.agents_alive,
        evaluated = summary.agents_evaluated,
        failures = summary.failures.len(),
        removed = summary.removed.len(),
        "tick complete"
    );
    Ok(summary)
}

/// Advance every live agent by one AI pass.
fn run_ai_pass<W: SimulatedWorld>(state: &SimulationState<W>, tick: u64, pass: u64) -> Vec<AgentTick> {
    let cells = state.fleet.registry().cells();
    let ctx = TickContext {
        tick,
        pass,
        world: &state.world,
        navigation: &state.world,
        actions: &state.world,
        relationships: state.fleet.relationships(),
        directory: state.fleet.registry(),
    };
    let scheduler = BehaviorScheduler::new(state.fleet.tuning());

    let advance = |cell: &Arc<AgentCell>| -> AgentTick {
        if cell.is_removed() {
            return AgentTick::Skipped;
        }
        let mut agent = cell.lock();
        match scheduler.advance(&ctx, &mut agent) {
            Ok(outcome) => AgentTick::Advanced(outcome),
            Err(error) => AgentTick::Failed(cell.id(), error),
        }
    };

    match &state.pool {
        Some(pool) if cells.len() > 1 => pool.install(|| cells.par_iter().map(advance).collect()),
        _ => cells.iter().map(advance).collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use botfleet_types::{BlockPos, GroupName, Relationship};

    use super::*;

    fn state(workers: usize) -> SimulationState<SimWorld> {
        let mut config = SimulationConfig::default();
        config.fleet.worker_threads = workers;
        let world = SimWorld::new();
        world
            .fill(BlockPos::new(-30, 0, -30), BlockPos::new(30, 0, 30))
            .unwrap();
        SimulationState::new(&config, world).unwrap()
    }

    #[test]
    fn ai_pass_runs_every_fourth_tick() {
        let mut state = state(1);
        state
            .spawn_agent(&SpawnParams::default(), Vec3::new(0.5, 1.0, 0.5), 20.0)
            .unwrap();
        let passes: Vec<bool> = (0..8)
            .map(|_| run_tick(&mut state).unwrap().ai_pass)
            .collect();
        assert_eq!(passes, vec![false, false, false, true, false, false, false, true]);
    }

    #[test]
    fn one_failing_agent_does_not_stop_the_others() {
        let mut state = state(2);
        for i in 0..4 {
            state
                .spawn_agent(
                    &SpawnParams::default(),
                    Vec3::new(f64::from(i) * 2.0 + 0.5, 1.0, 0.5),
                    20.0,
                )
                .unwrap();
        }
        // Registered but never placed in the world.
        let ghost = state.fleet.spawn(&SpawnParams::default()).unwrap();

        let mut summary = run_tick(&mut state).unwrap();
        while !summary.ai_pass {
            summary = run_tick(&mut state).unwrap();
        }
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures.first().unwrap().agent_id, ghost.id());
        assert_eq!(summary.agents_evaluated, 4);
        assert_eq!(summary.agents_alive, 4);
        assert_eq!(summary.modes.get(&BehaviorMode::Idle), Some(&5));
    }

    #[test]
    fn cleanup_sweeps_dead_agents_on_schedule() {
        let mut state = state(1);
        let doomed = state
            .spawn_agent(&SpawnParams::default(), Vec3::new(0.5, 1.0, 0.5), 20.0)
            .unwrap();
        state
            .spawn_agent(&SpawnParams::default(), Vec3::new(4.5, 1.0, 0.5), 20.0)
            .unwrap();
        state.world.kill(EntityRef::Agent(doomed.id())).unwrap();

        let mut removed_at = None;
        for _ in 0..100 {
            let summary = run_tick(&mut state).unwrap();
            if !summary.removed.is_empty() {
                removed_at = Some((summary.tick, summary.removed));
            }
        }
        assert_eq!(removed_at, Some((100, vec![doomed.id()])));
        assert_eq!(state.fleet.population(), 1);
    }

    #[test]
    fn refused_spawn_places_nothing() {
        let state = state(1);
        let first = state
            .spawn_agent(&SpawnParams::default().named("Ada"), Vec3::new(0.5, 1.0, 0.5), 20.0)
            .unwrap();
        let dup = state.spawn_agent(&SpawnParams::default().named("Ada"), Vec3::ZERO, 20.0);
        assert!(matches!(dup, Err(TickError::Registry { .. })));
        assert_eq!(state.fleet.registry().ids(), vec![first.id()]);
        assert_eq!(state.world.living_count(), 1);
    }

    #[test]
    fn hostile_groups_engage_across_workers() {
        let mut state = state(4);
        let red = GroupName::from("Red");
        let blue = GroupName::from("Blue");
        for i in 0..3 {
            let z = f64::from(i) * 2.0 + 0.5;
            state
                .spawn_agent(&SpawnParams::default().in_group("Red"), Vec3::new(0.5, 1.0, z), 20.0)
                .unwrap();
            state
                .spawn_agent(&SpawnParams::default().in_group("Blue"), Vec3::new(8.5, 1.0, z), 20.0)
                .unwrap();
        }
        state.fleet.set_group_relationship(&red, &blue, Relationship::Hostile);

        let mut attacking = 0;
        for _ in 0..8 {
            let summary = run_tick(&mut state).unwrap();
            attacking = summary
                .modes
                .get(&BehaviorMode::Attacking)
                .copied()
                .unwrap_or(0);
        }
        assert_eq!(attacking, 6);
    }
}
