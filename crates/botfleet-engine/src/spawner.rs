//! Scenario spawner for seeding the simulation before the first tick.
//!
//! Places the scenario's players, spawns each group's agents scattered
//! around the group's spawn point, wires up leaders and follow radii, and
//! applies the initial relationships. Scatter is drawn from a generator
//! seeded with `world.seed`, so the same config lays the fleet out the
//! same way every run.

use std::collections::BTreeMap;

use botfleet_agents::SpawnParams;
use botfleet_core::SimulationState;
use botfleet_core::config::{GroupSpec, ScenarioConfig};
use botfleet_types::{AgentId, EntityRef, GroupName, PlayerId, Vec3};
use botfleet_world::{SimWorld, WorldQuery};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::error::EngineError;

/// Maximum health every spawned agent starts with.
pub const AGENT_MAX_HEALTH: f64 = 20.0;

/// How far members scatter from the group spawn point, per axis.
const SCATTER_RADIUS: f64 = 3.0;

/// How far up or down a scattered point may move to find ground.
const GROUND_SEARCH_WINDOW: u32 = 4;

/// Leader keyword meaning "the group's first agent".
const FIRST_MEMBER: &str = "first";

// -----------------------------------------------------------------------
// Spawning result
// -----------------------------------------------------------------------

/// Everything the spawner created.
#[derive(Debug, Default)]
pub struct ScenarioOutcome {
    /// Players by scenario name.
    pub players: BTreeMap<String, PlayerId>,
    /// Members of each spawned group, in spawn order.
    pub groups: BTreeMap<GroupName, Vec<AgentId>>,
}

impl ScenarioOutcome {
    /// Total agents spawned.
    pub fn agents_spawned(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

// -----------------------------------------------------------------------
// Scenario spawn
// -----------------------------------------------------------------------

/// Spawn the whole scenario into `state`.
///
/// # Errors
///
/// Returns [`EngineError::Scenario`] for duplicate player names, unknown
/// leaders and relationships naming unknown parties;
/// [`EngineError::Tick`] when the registry or world refuses a spawn.
pub fn spawn_scenario(
    scenario: &ScenarioConfig,
    state: &SimulationState<SimWorld>,
    seed: u64,
) -> Result<ScenarioOutcome, EngineError> {
    if scenario.groups.is_empty() {
        warn!("scenario has no groups, the fleet starts empty");
    }
    let mut outcome = ScenarioOutcome::default();
    let mut rng = StdRng::seed_from_u64(seed);

    for player in &scenario.players {
        if outcome.players.contains_key(&player.name) {
            return Err(EngineError::Scenario {
                message: format!("player {} is declared twice", player.name),
            });
        }
        let id = PlayerId::new();
        state
            .world
            .spawn_entity(EntityRef::Player(id), player.position, player.max_health)?;
        info!(player = %player.name, player_id = %id, position = %player.position, "player placed");
        outcome.players.insert(player.name.clone(), id);
    }

    for spec in &scenario.groups {
        let members = spawn_group(spec, state, &outcome.players, &mut rng)?;
        outcome.groups.insert(GroupName::from(spec.name.as_str()), members);
    }

    for rel in &scenario.relationships {
        let to = GroupName::from(rel.to.as_str());
        let from_group = GroupName::from(rel.from.as_str());
        if outcome.groups.contains_key(&from_group) {
            state
                .fleet
                .set_group_relationship(&from_group, &to, rel.relationship);
        } else if let Some(&player) = outcome.players.get(&rel.from) {
            state
                .fleet
                .set_player_relationship(player, &to, rel.relationship);
        } else {
            return Err(EngineError::Scenario {
                message: format!("relationship from unknown party {}", rel.from),
            });
        }
        info!(from = %rel.from, to = %to, relationship = %rel.relationship, "relationship applied");
    }

    info!(
        players = outcome.players.len(),
        groups = outcome.groups.len(),
        agents = outcome.agents_spawned(),
        "scenario spawned"
    );
    Ok(outcome)
}

fn spawn_group(
    spec: &GroupSpec,
    state: &SimulationState<SimWorld>,
    players: &BTreeMap<String, PlayerId>,
    rng: &mut StdRng,
) -> Result<Vec<AgentId>, EngineError> {
    let group = GroupName::from(spec.name.as_str());
    let params = SpawnParams {
        name: None,
        group: Some(group.clone()),
        is_static: spec.is_static,
        home: spec.home,
        patrol: spec.patrol.clone(),
        can_build: spec.can_build,
    };

    let mut members = Vec::new();
    for _ in 0..spec.size {
        let at = scatter(&state.world, rng, spec.spawn);
        let cell = state.spawn_agent(&params, at, AGENT_MAX_HEALTH)?;
        members.push(cell.id());
    }
    let Some(&first) = members.first() else {
        warn!(%group, "group has size 0, nothing spawned");
        return Ok(members);
    };

    if let Some(leader) = &spec.leader {
        let entity = if leader == FIRST_MEMBER {
            EntityRef::Agent(first)
        } else {
            let player = players.get(leader).ok_or_else(|| EngineError::Scenario {
                message: format!("group {group} follows unknown player {leader}"),
            })?;
            EntityRef::Player(*player)
        };
        state.fleet.set_group_leader(&group, Some(entity))?;
    }
    if let Some(radius) = spec.follow_radius {
        state.fleet.set_group_follow_radius(&group, radius)?;
    }

    info!(
        %group,
        members = members.len(),
        leader = spec.leader.as_deref().unwrap_or("none"),
        is_static = spec.is_static,
        "group spawned"
    );
    Ok(members)
}

/// A standable point near `around`, offset by a seeded draw.
fn scatter(world: &dyn WorldQuery, rng: &mut StdRng, around: Vec3) -> Vec3 {
    let dx = rng.random_range(-SCATTER_RADIUS..=SCATTER_RADIUS);
    let dz = rng.random_range(-SCATTER_RADIUS..=SCATTER_RADIUS);
    let point = around.offset(dx, 0.0, dz).to_block();
    world
        .find_standable_near(point.x, point.z, point.y, GROUND_SEARCH_WINDOW)
        .map_or(around, |feet| feet.below().top_center())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
