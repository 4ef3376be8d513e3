//! Priority behavior scheduling.
//!
//! Each agent runs exactly one [`Behavior`]. On an evaluation pass the
//! scheduler walks [`Behavior::PRIORITY`] from the top and picks the first
//! behavior whose eligibility predicate holds; if that differs from the
//! running one, navigation is stopped, the old behavior's transient state is
//! dropped and the new one starts. Every pass the running behavior ticks
//! once. A behavior that reports it has ended forces an immediate
//! re-selection.
//!
//! Evaluation does not happen on every pass: agents re-evaluate every Nth
//! pass with an identity-derived stagger so the fleet's selection work is
//! spread out.
//!
//! # Static agents
//!
//! A static agent only ever runs Defend or Idle. Defend lets it leave its
//! anchor to engage a hostile within the defend range; once no hostile
//! remains it stops where it is and goes idle.
//!
//! # Failure isolation
//!
//! [`BehaviorScheduler::advance`] returns a `Result` for the few genuinely
//! unexpected conditions (no world entity, refused navigation). The caller
//! logs them per agent and carries on with the rest of the fleet. Missing
//! leaders and targets are not errors; they make the dependent behavior
//! ineligible.

use serde::Serialize;
use tracing::debug;

use botfleet_types::{AgentId, BehaviorMode, EntityRef, EntitySnapshot, GroupName, Relationship, Vec3};
use botfleet_world::{AgentActions, NavigationPrimitive, WorldQuery};

use crate::agent::Agent;
use crate::config::AgentTuning;
use crate::construction::{ConstructionPlan, ObstacleTraversalPlanner, PlanAction};
use crate::error::AgentError;
use crate::positioning::PositioningEngine;
use crate::relationship::RelationshipGraph;
use crate::seed;

/// Height of an agent's eyes above its feet, for sight lines.
const EYE_HEIGHT: f64 = 1.6;

/// Horizontal distance at which a walk-to step counts as reached.
const STEP_TOLERANCE: f64 = 0.6;

/// Vertical window used when snapping flee and dispersal points to ground.
const SNAP_WINDOW: u32 = 3;

/// Lookup of group membership for agents other than the one being advanced.
///
/// Implementations must not block on another agent's decision step.
pub trait AgentDirectory: Send + Sync {
    /// The group an agent belongs to, if any.
    fn group_of(&self, agent: AgentId) -> Option<GroupName>;
}

/// Everything a behavior may consult during one pass.
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    /// Current simulation tick.
    pub tick: u64,
    /// Index of the current AI pass.
    pub pass: u64,
    /// Terrain and entity queries.
    pub world: &'a dyn WorldQuery,
    /// Movement requests.
    pub navigation: &'a dyn NavigationPrimitive,
    /// Block placement and strikes.
    pub actions: &'a dyn AgentActions,
    /// Group and player relationships.
    pub relationships: &'a RelationshipGraph,
    /// Group membership of other agents.
    pub directory: &'a dyn AgentDirectory,
}

/// The behaviors an agent can run, listed in descending priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Run from threats at low health.
    Flee,
    /// Move away from the group on command.
    Disperse,
    /// Static agents only: engage a hostile near the anchor.
    Defend,
    /// Build past an obstacle.
    Climb,
    /// Close on and strike a hostile.
    Attack,
    /// Walk back home after straying.
    Guard,
    /// Stay near the leader.
    Follow,
    /// Walk the waypoint loop.
    Patrol,
    /// Do nothing.
    #[default]
    Idle,
}

impl Behavior {
    /// Selection order, highest priority first.
    pub const PRIORITY: [Self; 9] = [
        Self::Flee,
        Self::Disperse,
        Self::Defend,
        Self::Climb,
        Self::Attack,
        Self::Guard,
        Self::Follow,
        Self::Patrol,
        Self::Idle,
    ];

    /// The externally visible mode. Defending shows as attacking.
    pub const fn mode(self) -> BehaviorMode {
        match self {
            Self::Flee => BehaviorMode::Fleeing,
            Self::Disperse => BehaviorMode::Dispersing,
            Self::Defend | Self::Attack => BehaviorMode::Attacking,
            Self::Climb => BehaviorMode::Climbing,
            Self::Guard => BehaviorMode::Guarding,
            Self::Follow => BehaviorMode::Following,
            Self::Patrol => BehaviorMode::Patrolling,
            Self::Idle => BehaviorMode::Idle,
        }
    }

    /// Whether a static agent may run this behavior.
    pub const fn allowed_when_static(self) -> bool {
        matches!(self, Self::Defend | Self::Idle)
    }
}

impl core::fmt::Display for Behavior {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::Flee => "flee",
            Self::Disperse => "disperse",
            Self::Defend => "defend",
            Self::Climb => "climb",
            Self::Attack => "attack",
            Self::Guard => "guard",
            Self::Follow => "follow",
            Self::Patrol => "patrol",
            Self::Idle => "idle",
        };
        f.write_str(label)
    }
}

/// What happened to one agent during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceOutcome {
    /// Mode after the pass.
    pub mode: BehaviorMode,
    /// Whether the priority table was evaluated.
    pub evaluated: bool,
    /// Behavior change, if any.
    pub transition: Option<(Behavior, Behavior)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Running,
    Ended,
}

/// The winner of one evaluation.
struct Selection {
    behavior: Behavior,
    target: Option<EntityRef>,
    plan: Option<ConstructionPlan>,
}

impl Selection {
    const fn plain(behavior: Behavior) -> Self {
        Self {
            behavior,
            target: None,
            plan: None,
        }
    }
}

/// Per-agent behavior selection and execution.
#[derive(Debug, Clone, Copy)]
pub struct BehaviorScheduler<'a> {
    tuning: &'a AgentTuning,
    positioning: PositioningEngine<'a>,
    planner: ObstacleTraversalPlanner<'a>,
}

impl<'a> BehaviorScheduler<'a> {
    /// Create a scheduler over the given tunables.
    pub const fn new(tuning: &'a AgentTuning) -> Self {
        Self {
            tuning,
            positioning: PositioningEngine::new(&tuning.positioning),
            planner: ObstacleTraversalPlanner::new(&tuning.construction),
        }
    }

    /// Advance one agent by one AI pass.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::MissingEntity`] when the world has no entity
    /// for the agent and [`AgentError::NavigationRefused`] when a movement
    /// request is rejected. The agent's state stays consistent either way.
    pub fn advance(
        &self,
        ctx: &TickContext<'_>,
        agent: &mut Agent,
    ) -> Result<AdvanceOutcome, AgentError> {
        let me = ctx
            .world
            .entity(EntityRef::Agent(agent.id))
            .ok_or(AgentError::MissingEntity(agent.id))?;
        if !me.alive {
            // Left for the cleanup sweep.
            return Ok(AdvanceOutcome {
                mode: agent.mode(),
                evaluated: false,
                transition: None,
            });
        }
        if agent.is_static && agent.static_anchor.is_none() {
            agent.static_anchor = Some(agent.home.unwrap_or(me.position));
        }
        agent.stuck_checks = if ctx.navigation.is_stuck(agent.id) {
            agent.stuck_checks.saturating_add(1)
        } else {
            0
        };

        let period = self.tuning.behavior.reevaluate_every_passes;
        let due = agent.reevaluate_now
            || ctx
                .pass
                .wrapping_add(agent.stagger)
                .checked_rem(period)
                .is_none_or(|phase| phase == 0);
        let mut evaluated = false;
        let mut transition = None;
        if due {
            transition = self.reselect(ctx, agent, &me);
            evaluated = true;
        }

        if self.tick_behavior(ctx, agent, &me)? == Status::Ended {
            if let Some(changed) = self.reselect(ctx, agent, &me) {
                transition = Some(changed);
            }
            evaluated = true;
        }

        Ok(AdvanceOutcome {
            mode: agent.mode(),
            evaluated,
            transition,
        })
    }

    // -------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------

    fn reselect(
        &self,
        ctx: &TickContext<'_>,
        agent: &mut Agent,
        me: &EntitySnapshot,
    ) -> Option<(Behavior, Behavior)> {
        let selection = self.select(ctx, agent, me);
        agent.reevaluate_now = false;

        if selection.behavior == agent.behavior {
            match selection.behavior {
                Behavior::Attack | Behavior::Defend => agent.target = selection.target,
                // A finished stage hands over to the next one.
                Behavior::Climb => {
                    if let Some(plan) = selection.plan {
                        agent.target = selection.target;
                        agent.plan = Some(plan);
                    }
                }
                _ => {}
            }
            return None;
        }

        let from = agent.behavior;
        ctx.navigation.stop(agent.id);
        agent.clear_transient();
        agent.behavior = selection.behavior;
        agent.target = selection.target;
        agent.plan = selection.plan;
        debug!(
            agent_id = %agent.id,
            tick = ctx.tick,
            %from,
            to = %selection.behavior,
            "behavior transition"
        );
        Some((from, selection.behavior))
    }

    /// Walk the priority table and return the first eligible behavior.
    fn select(&self, ctx: &TickContext<'_>, agent: &Agent, me: &EntitySnapshot) -> Selection {
        let cfg = &self.tuning.behavior;
        let here = me.position;

        for behavior in Behavior::PRIORITY {
            if agent.is_static && !behavior.allowed_when_static() {
                continue;
            }
            match behavior {
                Behavior::Flee => {
                    if me.health_fraction() < cfg.flee_health_fraction {
                        return Selection::plain(Behavior::Flee);
                    }
                }
                Behavior::Disperse => {
                    if agent.is_dispersing(ctx.tick) {
                        return Selection::plain(Behavior::Disperse);
                    }
                }
                Behavior::Defend => {
                    let anchor = agent.static_anchor.unwrap_or(here);
                    if let Some(threat) =
                        self.acquire_target(ctx, agent, me, anchor, cfg.static_defend_range)
                    {
                        return Selection {
                            behavior: Behavior::Defend,
                            target: Some(threat.entity),
                            plan: None,
                        };
                    }
                }
                Behavior::Climb => {
                    if let Some(plan) = self.climb_candidate(ctx, agent, me) {
                        return Selection {
                            behavior: Behavior::Climb,
                            target: agent.target,
                            plan,
                        };
                    }
                }
                Behavior::Attack => {
                    if let Some(threat) =
                        self.acquire_target(ctx, agent, me, here, cfg.detection_range)
                    {
                        return Selection {
                            behavior: Behavior::Attack,
                            target: Some(threat.entity),
                            plan: None,
                        };
                    }
                }
                Behavior::Guard => {
                    // Once walking home, keep going until actually there.
                    let reach = if agent.behavior == Behavior::Guard {
                        cfg.waypoint_tolerance
                    } else {
                        cfg.guard_radius
                    };
                    if agent.home.is_some_and(|home| here.distance(home) > reach) {
                        return Selection::plain(Behavior::Guard);
                    }
                }
                Behavior::Follow => {
                    if self.resolve_leader(ctx, agent).is_some() {
                        return Selection::plain(Behavior::Follow);
                    }
                }
                Behavior::Patrol => {
                    if !agent.patrol.is_empty() {
                        return Selection::plain(Behavior::Patrol);
                    }
                }
                Behavior::Idle => return Selection::plain(Behavior::Idle),
            }
        }
        Selection::plain(Behavior::Idle)
    }

    /// Climb eligibility. `Some(None)` keeps the running plan, `Some(Some)`
    /// starts a fresh one.
    fn climb_candidate(
        &self,
        ctx: &TickContext<'_>,
        agent: &Agent,
        me: &EntitySnapshot,
    ) -> Option<Option<ConstructionPlan>> {
        if agent.behavior == Behavior::Climb
            && agent.plan.as_ref().is_some_and(|p| !p.is_complete())
        {
            return Some(None);
        }
        let goal = self.movement_goal(ctx, agent, me)?;
        self.planner.engage_trigger(ctx.world, agent, me.position, goal)?;
        self.planner
            .plan_path(ctx.world, agent, me.position, goal, ctx.tick)
            .map(Some)
    }

    /// Where the agent is trying to get to, in the order the lower-priority
    /// movement behaviors would choose.
    fn movement_goal(
        &self,
        ctx: &TickContext<'_>,
        agent: &Agent,
        me: &EntitySnapshot,
    ) -> Option<Vec3> {
        let cfg = &self.tuning.behavior;
        let here = me.position;
        if let Some(threat) = self.acquire_target(ctx, agent, me, here, cfg.detection_range) {
            return Some(threat.position);
        }
        if let Some(home) = agent.home.filter(|h| here.distance(*h) > cfg.guard_radius) {
            return Some(home);
        }
        if let Some(leader) = self.resolve_leader(ctx, agent) {
            return Some(leader.position);
        }
        self.current_waypoint(agent)
    }

    // -------------------------------------------------------------------
    // Perception helpers
    // -------------------------------------------------------------------

    fn resolve_leader(&self, ctx: &TickContext<'_>, agent: &Agent) -> Option<EntitySnapshot> {
        let leader = agent.leader?;
        if leader == EntityRef::Agent(agent.id) {
            return None;
        }
        ctx.world.entity(leader).filter(|s| s.alive)
    }

    fn is_hostile(&self, ctx: &TickContext<'_>, group: &GroupName, entity: EntityRef) -> bool {
        let their_group = entity.as_agent().and_then(|id| ctx.directory.group_of(id));
        ctx.relationships
            .relationship_of_entity(group, entity, their_group.as_ref())
            == Relationship::Hostile
    }

    /// The hostile to engage within `range` of `center`: the current target
    /// while it stays valid, otherwise the nearest visible hostile.
    fn acquire_target(
        &self,
        ctx: &TickContext<'_>,
        agent: &Agent,
        me: &EntitySnapshot,
        center: Vec3,
        range: f64,
    ) -> Option<EntitySnapshot> {
        if !agent.hostile {
            return None;
        }
        let group = agent.group.as_ref()?;
        let own = EntityRef::Agent(agent.id);

        if let Some(current) = agent.target {
            let kept = ctx.world.entity(current).filter(|s| {
                s.alive && s.position.distance(center) <= range && self.is_hostile(ctx, group, current)
            });
            if kept.is_some() {
                return kept;
            }
        }

        let eyes = me.position.offset(0.0, EYE_HEIGHT, 0.0);
        ctx.world
            .entities_near(center, range)
            .into_iter()
            .filter(|s| s.entity != own && s.alive)
            .filter(|s| self.is_hostile(ctx, group, s.entity))
            .filter(|s| {
                ctx.world
                    .line_of_sight(eyes, s.position.offset(0.0, EYE_HEIGHT, 0.0))
            })
            .min_by(|a, b| {
                me.position
                    .distance(a.position)
                    .total_cmp(&me.position.distance(b.position))
            })
    }

    /// Nearest hostile within detection range, visible or not.
    fn nearest_threat(
        &self,
        ctx: &TickContext<'_>,
        agent: &Agent,
        me: &EntitySnapshot,
    ) -> Option<Vec3> {
        let group = agent.group.as_ref()?;
        let own = EntityRef::Agent(agent.id);
        ctx.world
            .entities_near(me.position, self.tuning.behavior.detection_range)
            .into_iter()
            .filter(|s| s.entity != own && s.alive && self.is_hostile(ctx, group, s.entity))
            .map(|s| s.position)
            .min_by(|a, b| me.position.distance(*a).total_cmp(&me.position.distance(*b)))
    }

    fn current_waypoint(&self, agent: &Agent) -> Option<Vec3> {
        let len = agent.patrol.len();
        if len == 0 {
            return None;
        }
        agent
            .patrol
            .get(agent.patrol_index.checked_rem(len).unwrap_or(0))
            .copied()
    }

    /// A point `distance` away from `origin` along the horizontal direction
    /// `(dx, dz)`, on the ground if there is any nearby.
    fn ground_point(
        &self,
        ctx: &TickContext<'_>,
        origin: Vec3,
        (dx, dz): (f64, f64),
        distance: f64,
    ) -> Vec3 {
        let raw = origin.offset(dx * distance, 0.0, dz * distance);
        let column = raw.to_block();
        ctx.world
            .find_standable_near(column.x, column.z, origin.to_block().y, SNAP_WINDOW)
            .map_or(raw, |feet| raw.with_y(f64::from(feet.y)))
    }

    fn walk(
        &self,
        ctx: &TickContext<'_>,
        agent: &Agent,
        destination: Vec3,
        speed: f64,
    ) -> Result<(), AgentError> {
        if ctx.navigation.move_to(agent.id, destination, speed) {
            Ok(())
        } else {
            Err(AgentError::NavigationRefused {
                agent: agent.id,
                destination: destination.to_string(),
            })
        }
    }

    // -------------------------------------------------------------------
    // Behavior ticks
    // -------------------------------------------------------------------

    fn tick_behavior(
        &self,
        ctx: &TickContext<'_>,
        agent: &mut Agent,
        me: &EntitySnapshot,
    ) -> Result<Status, AgentError> {
        let cfg = &self.tuning.behavior;
        match agent.behavior {
            Behavior::Idle => Ok(Status::Running),
            Behavior::Flee => self.tick_flee(ctx, agent, me),
            Behavior::Disperse => self.tick_disperse(ctx, agent, me),
            Behavior::Defend => {
                let anchor = agent.static_anchor.unwrap_or(me.position);
                self.tick_engage(ctx, agent, me, anchor, cfg.static_defend_range)
            }
            Behavior::Attack => self.tick_engage(ctx, agent, me, me.position, cfg.detection_range),
            Behavior::Climb => self.tick_climb(ctx, agent, me),
            Behavior::Guard => self.tick_guard(ctx, agent, me),
            Behavior::Follow => self.tick_follow(ctx, agent, me),
            Behavior::Patrol => self.tick_patrol(ctx, agent, me),
        }
    }

    fn tick_flee(
        &self,
        ctx: &TickContext<'_>,
        agent: &mut Agent,
        me: &EntitySnapshot,
    ) -> Result<Status, AgentError> {
        let Some(threat) = self.nearest_threat(ctx, agent, me) else {
            // Nothing to run from; hold still until health or orders change.
            if agent.destination.take().is_some() {
                ctx.navigation.stop(agent.id);
            }
            return Ok(Status::Running);
        };
        if agent.destination.is_some() && !ctx.navigation.is_done(agent.id) {
            return Ok(Status::Running);
        }
        let away = threat.horizontal_direction_to(me.position).unwrap_or_else(|| {
            let angle = seed::follow_angle(agent.seed);
            (angle.cos(), angle.sin())
        });
        let dest = self.ground_point(ctx, me.position, away, self.tuning.behavior.flee_distance);
        self.walk(ctx, agent, dest, self.tuning.behavior.flee_speed)?;
        agent.destination = Some(dest);
        Ok(Status::Running)
    }

    fn tick_disperse(
        &self,
        ctx: &TickContext<'_>,
        agent: &mut Agent,
        me: &EntitySnapshot,
    ) -> Result<Status, AgentError> {
        if !agent.is_dispersing(ctx.tick) {
            agent.disperse_until = None;
            return Ok(Status::Ended);
        }
        if agent.destination.is_some() {
            return Ok(Status::Running);
        }
        let origin = self
            .resolve_leader(ctx, agent)
            .map_or(me.position, |leader| leader.position);
        let angle = seed::follow_angle(agent.seed);
        let dest = self.ground_point(
            ctx,
            origin,
            (angle.cos(), angle.sin()),
            self.tuning.behavior.disperse_distance,
        );
        self.walk(ctx, agent, dest, self.tuning.positioning.base_speed)?;
        agent.destination = Some(dest);
        Ok(Status::Running)
    }

    /// Shared by Attack and Defend: keep the target within `range` of
    /// `center`, close in, strike when in reach and off cooldown.
    fn tick_engage(
        &self,
        ctx: &TickContext<'_>,
        agent: &mut Agent,
        me: &EntitySnapshot,
        center: Vec3,
        range: f64,
    ) -> Result<Status, AgentError> {
        let cfg = &self.tuning.behavior;
        let Some(target_ref) = agent.target else {
            return Ok(Status::Ended);
        };
        let Some(target) = ctx
            .world
            .entity(target_ref)
            .filter(|s| s.alive && s.position.distance(center) <= range)
        else {
            agent.target = None;
            return Ok(Status::Ended);
        };

        if me.position.distance(target.position) > cfg.melee_reach {
            self.walk(ctx, agent, target.position, cfg.attack_speed)?;
            return Ok(Status::Running);
        }

        ctx.navigation.stop(agent.id);
        let ready = agent
            .last_strike_tick
            .is_none_or(|last| ctx.tick.saturating_sub(last) >= cfg.strike_cooldown_ticks);
        if ready && ctx.actions.strike(agent.id, target_ref) {
            agent.last_strike_tick = Some(ctx.tick);
            debug!(agent_id = %agent.id, target = %target_ref, tick = ctx.tick, "strike");
        }
        Ok(Status::Running)
    }

    fn tick_climb(
        &self,
        ctx: &TickContext<'_>,
        agent: &mut Agent,
        me: &EntitySnapshot,
    ) -> Result<Status, AgentError> {
        if agent.building_blocks == 0 {
            agent.plan = None;
            return Ok(Status::Ended);
        }
        let Some(anchor) = agent.plan.as_ref().map(|p| p.anchor) else {
            return Ok(Status::Ended);
        };
        let goal = self.movement_goal(ctx, agent, me).unwrap_or(anchor);

        let stale = agent
            .plan
            .as_ref()
            .is_some_and(|plan| self.planner.needs_refresh(plan, goal, ctx.tick));
        if stale {
            ctx.navigation.stop(agent.id);
            agent.plan = self
                .planner
                .plan_path(ctx.world, agent, me.position, goal, ctx.tick);
            if agent.plan.is_none() {
                return Ok(Status::Ended);
            }
        }

        let Some(plan) = agent.plan.as_mut() else {
            return Ok(Status::Ended);
        };
        match self.planner.next_action(ctx.world, plan, me.position) {
            PlanAction::Complete => {
                debug!(
                    agent_id = %agent.id,
                    placed = plan.placed,
                    skipped = plan.skipped,
                    "construction plan complete"
                );
                agent.plan = None;
                agent.stuck_checks = 0;
                Ok(Status::Ended)
            }
            PlanAction::Place(pos) => {
                if ctx.actions.place_block(agent.id, pos) {
                    plan.mark_placed();
                    agent.building_blocks = agent.building_blocks.saturating_sub(1);
                } else {
                    debug!(agent_id = %agent.id, %pos, "placement refused, skipping");
                    plan.skip_head();
                }
                Ok(Status::Running)
            }
            PlanAction::WalkTo(stand) => {
                if me.position.horizontal_distance(stand) <= STEP_TOLERANCE
                    || ctx.navigation.is_stuck(agent.id)
                {
                    plan.stalls = plan.stalls.saturating_add(1);
                    return Ok(Status::Running);
                }
                let id = agent.id;
                if !ctx.navigation.move_to(id, stand, self.tuning.positioning.base_speed) {
                    return Err(AgentError::NavigationRefused {
                        agent: id,
                        destination: stand.to_string(),
                    });
                }
                Ok(Status::Running)
            }
        }
    }

    fn tick_guard(
        &self,
        ctx: &TickContext<'_>,
        agent: &mut Agent,
        me: &EntitySnapshot,
    ) -> Result<Status, AgentError> {
        let Some(home) = agent.home else {
            return Ok(Status::Ended);
        };
        if me.position.distance(home) <= self.tuning.behavior.waypoint_tolerance {
            ctx.navigation.stop(agent.id);
            return Ok(Status::Ended);
        }
        if agent.destination != Some(home) || ctx.navigation.is_done(agent.id) {
            self.walk(ctx, agent, home, self.tuning.positioning.base_speed)?;
            agent.destination = Some(home);
        }
        Ok(Status::Running)
    }

    fn tick_follow(
        &self,
        ctx: &TickContext<'_>,
        agent: &mut Agent,
        me: &EntitySnapshot,
    ) -> Result<Status, AgentError> {
        let Some(leader) = self.resolve_leader(ctx, agent) else {
            return Ok(Status::Ended);
        };
        let plan = self.positioning.compute_follow_target(
            ctx.world,
            agent,
            me.position,
            leader.position,
            ctx.tick,
        );
        if self.positioning.has_arrived(me.position, plan.target) {
            if !ctx.navigation.is_done(agent.id) {
                ctx.navigation.stop(agent.id);
            }
        } else {
            self.walk(ctx, agent, plan.target, plan.speed)?;
        }
        Ok(Status::Running)
    }

    fn tick_patrol(
        &self,
        ctx: &TickContext<'_>,
        agent: &mut Agent,
        me: &EntitySnapshot,
    ) -> Result<Status, AgentError> {
        let Some(mut waypoint) = self.current_waypoint(agent) else {
            return Ok(Status::Ended);
        };
        if me.position.distance(waypoint) <= self.tuning.behavior.waypoint_tolerance {
            agent.patrol_index = agent
                .patrol_index
                .wrapping_add(1)
                .checked_rem(agent.patrol.len())
                .unwrap_or(0);
            let Some(next) = self.current_waypoint(agent) else {
                return Ok(Status::Ended);
            };
            waypoint = next;
        }
        if agent.destination != Some(waypoint) || ctx.navigation.is_done(agent.id) {
            self.walk(ctx, agent, waypoint, self.tuning.positioning.base_speed)?;
            agent.destination = Some(waypoint);
        }
        Ok(Status::Running)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};

    use botfleet_types::{BlockPos, PlacementStrategy, PlayerId};
    use botfleet_world::SimWorld;

    use super::*;

    /// Group lookup backed by a plain map.
    #[derive(Default)]
    struct Groups(BTreeMap<AgentId, GroupName>);

    impl AgentDirectory for Groups {
        fn group_of(&self, agent: AgentId) -> Option<GroupName> {
            self.0.get(&agent).cloned()
        }
    }

    struct Harness {
        world: SimWorld,
        relationships: RelationshipGraph,
        groups: Groups,
        tuning: AgentTuning,
    }

    impl Harness {
        fn new() -> Self {
            let world = SimWorld::new();
            world
                .fill(BlockPos::new(-40, 0, -40), BlockPos::new(40, 0, 40))
                .unwrap();
            Self {
                world,
                relationships: RelationshipGraph::new(),
                groups: Groups::default(),
                tuning: AgentTuning::default(),
            }
        }

        fn spawn(&mut self, group: &str, at: Vec3) -> Agent {
            let id = AgentId::new();
            self.world.spawn_entity(EntityRef::Agent(id), at, 20.0).unwrap();
            let mut agent = Agent::new(id, format!("bot-{id}"), &self.tuning);
            let group = GroupName::from(group);
            self.groups.0.insert(id, group.clone());
            agent.group = Some(group);
            agent
        }

        fn ctx(&self, pass: u64) -> TickContext<'_> {
            TickContext {
                tick: pass * 4,
                pass,
                world: &self.world,
                navigation: &self.world,
                actions: &self.world,
                relationships: &self.relationships,
                directory: &self.groups,
            }
        }

        /// Run passes until the agent has been evaluated at least once more.
        fn evaluate(&self, agent: &mut Agent, start_pass: u64) -> AdvanceOutcome {
            let scheduler = BehaviorScheduler::new(&self.tuning);
            let mut pass = start_pass;
            loop {
                let outcome = scheduler.advance(&self.ctx(pass), agent).unwrap();
                if outcome.evaluated {
                    return outcome;
                }
                pass += 1;
            }
        }
    }

    /// Refuses the first placement, then defers to the world.
    struct RefuseFirst<'w> {
        world: &'w SimWorld,
        refused: AtomicBool,
    }

    impl AgentActions for RefuseFirst<'_> {
        fn place_block(&self, agent: AgentId, pos: BlockPos) -> bool {
            self.refused.swap(true, Ordering::Relaxed) && self.world.place_block(agent, pos)
        }

        fn strike(&self, agent: AgentId, target: EntityRef) -> bool {
            self.world.strike(agent, target)
        }
    }

    fn plan_of(steps: &[BlockPos], origin: Vec3, anchor: Vec3) -> ConstructionPlan {
        ConstructionPlan {
            strategy: PlacementStrategy::HorizontalBridge,
            steps: steps.iter().copied().collect::<VecDeque<_>>(),
            origin,
            anchor,
            created_at: 0,
            last_placed: None,
            placed: 0,
            skipped: 0,
            stalls: 0,
        }
    }

    fn snapshot(h: &Harness, agent: &Agent) -> EntitySnapshot {
        h.world.entity(EntityRef::Agent(agent.id)).unwrap()
    }

    fn place_player(h: &Harness, at: Vec3) -> EntityRef {
        let player = EntityRef::Player(PlayerId::new());
        h.world.spawn_entity(player, at, 20.0).unwrap();
        player
    }

    #[test]
    fn priority_table_is_complete_and_ordered() {
        assert_eq!(Behavior::PRIORITY.first(), Some(&Behavior::Flee));
        assert_eq!(Behavior::PRIORITY.last(), Some(&Behavior::Idle));
        let mut sorted = Behavior::PRIORITY;
        sorted.sort();
        assert_eq!(sorted, Behavior::PRIORITY);
    }

    #[test]
    fn follower_with_live_leader_follows() {
        let mut h = Harness::new();
        let leader = h.spawn("Red", Vec3::new(0.5, 1.0, 0.5));
        let mut follower = h.spawn("Red", Vec3::new(20.5, 1.0, 0.5));
        follower.leader = Some(EntityRef::Agent(leader.id));

        let outcome = h.evaluate(&mut follower, 0);
        assert_eq!(outcome.mode, BehaviorMode::Following);
        assert!(h.world.destination(follower.id).is_some());
    }

    #[test]
    fn dead_leader_is_not_found_not_an_error() {
        let mut h = Harness::new();
        let leader = h.spawn("Red", Vec3::new(0.5, 1.0, 0.5));
        let mut follower = h.spawn("Red", Vec3::new(6.5, 1.0, 0.5));
        follower.leader = Some(EntityRef::Agent(leader.id));
        h.evaluate(&mut follower, 0);
        h.world.kill(EntityRef::Agent(leader.id)).unwrap();

        let scheduler = BehaviorScheduler::new(&h.tuning);
        let outcome = scheduler.advance(&h.ctx(1), &mut follower).unwrap();
        assert_eq!(outcome.mode, BehaviorMode::Idle);
    }

    #[test]
    fn hostile_player_in_sight_is_attacked() {
        let mut h = Harness::new();
        let player = PlayerId::new();
        h.world
            .spawn_entity(EntityRef::Player(player), Vec3::new(8.5, 1.0, 0.5), 20.0)
            .unwrap();
        h.relationships
            .set_player_relationship(player, &GroupName::from("Red"), Relationship::Hostile);
        let mut bot = h.spawn("Red", Vec3::new(0.5, 1.0, 0.5));
        bot.hostile = true;

        let outcome = h.evaluate(&mut bot, 0);
        assert_eq!(outcome.mode, BehaviorMode::Attacking);
        assert_eq!(bot.target, Some(EntityRef::Player(player)));
    }

    #[test]
    fn hostile_flag_gates_target_scanning() {
        let mut h = Harness::new();
        let player = PlayerId::new();
        h.world
            .spawn_entity(EntityRef::Player(player), Vec3::new(4.5, 1.0, 0.5), 20.0)
            .unwrap();
        h.relationships
            .set_player_relationship(player, &GroupName::from("Red"), Relationship::Hostile);
        let mut bot = h.spawn("Red", Vec3::new(0.5, 1.0, 0.5));
        // Flag not pushed yet: the agent does not look for targets.
        let outcome = h.evaluate(&mut bot, 0);
        assert_eq!(outcome.mode, BehaviorMode::Idle);
    }

    #[test]
    fn wounded_attacker_flees() {
        let mut h = Harness::new();
        let player = PlayerId::new();
        h.world
            .spawn_entity(EntityRef::Player(player), Vec3::new(6.5, 1.0, 0.5), 20.0)
            .unwrap();
        h.relationships
            .set_player_relationship(player, &GroupName::from("Red"), Relationship::Hostile);
        let mut bot = h.spawn("Red", Vec3::new(0.5, 1.0, 0.5));
        bot.hostile = true;
        assert_eq!(h.evaluate(&mut bot, 0).mode, BehaviorMode::Attacking);

        h.world.set_health(EntityRef::Agent(bot.id), 5.0).unwrap();
        let outcome = h.evaluate(&mut bot, 1);
        assert_eq!(outcome.mode, BehaviorMode::Fleeing);
        let dest = h.world.destination(bot.id).unwrap();
        // Running away from the player, who stands on +x.
        assert!(dest.x < 0.5);
    }

    #[test]
    fn static_agent_ignores_leader_and_patrol() {
        let mut h = Harness::new();
        let leader = h.spawn("Red", Vec3::new(15.5, 1.0, 0.5));
        let mut post = h.spawn("Red", Vec3::new(0.5, 1.0, 0.5));
        post.leader = Some(EntityRef::Agent(leader.id));
        post.patrol = vec![Vec3::new(5.5, 1.0, 5.5), Vec3::new(-5.5, 1.0, -5.5)];
        post.set_static(true);

        for start in 0..6 {
            let outcome = h.evaluate(&mut post, start);
            assert_eq!(outcome.mode, BehaviorMode::Idle);
        }
        assert!(h.world.destination(post.id).is_none());
    }

    #[test]
    fn ended_behavior_forces_immediate_reselection() {
        let mut h = Harness::new();
        let mut bot = h.spawn("Red", Vec3::new(0.5, 1.0, 0.5));
        bot.disperse_until = Some(8);
        let scheduler = BehaviorScheduler::new(&h.tuning);

        let first = scheduler.advance(&h.ctx(0), &mut bot).unwrap();
        assert_eq!(first.mode, BehaviorMode::Dispersing);
        // Tick 8 is past the order; the pass re-selects even off-cycle.
        let later = scheduler.advance(&h.ctx(2), &mut bot).unwrap();
        assert_eq!(later.mode, BehaviorMode::Idle);
        assert!(later.evaluated);
    }

    #[test]
    fn missing_entity_is_reported() {
        let h = Harness::new();
        let mut ghost = Agent::new(AgentId::new(), "ghost".to_owned(), &h.tuning);
        let scheduler = BehaviorScheduler::new(&h.tuning);
        let result = scheduler.advance(&h.ctx(0), &mut ghost);
        assert!(matches!(result, Err(AgentError::MissingEntity(_))));
    }

    // ---------------------------------------------------------------
    // Guard and patrol
    // ---------------------------------------------------------------

    #[test]
    fn strayed_guard_walks_all_the_way_home_then_idles() {
        let mut h = Harness::new();
        let home = Vec3::new(0.5, 1.0, 0.5);
        let mut bot = h.spawn("Red", Vec3::new(12.5, 1.0, 0.5));
        bot.home = Some(home);
        let scheduler = BehaviorScheduler::new(&h.tuning);

        let mut guarded = false;
        for pass in 0..200 {
            let outcome = scheduler.advance(&h.ctx(pass), &mut bot).unwrap();
            guarded |= outcome.mode == BehaviorMode::Guarding;
            if guarded && outcome.mode == BehaviorMode::Idle {
                break;
            }
            h.world.step();
        }

        assert!(guarded);
        assert_eq!(bot.mode(), BehaviorMode::Idle);
        let at = snapshot(&h, &bot).position;
        // Well inside the guard radius, not just back across its edge.
        assert!(at.distance(home) <= h.tuning.behavior.waypoint_tolerance);
        assert!(h.world.destination(bot.id).is_none());
    }

    #[test]
    fn guard_is_not_selected_inside_the_radius() {
        let mut h = Harness::new();
        let mut bot = h.spawn("Red", Vec3::new(5.5, 1.0, 0.5));
        bot.home = Some(Vec3::new(0.5, 1.0, 0.5));
        assert_eq!(h.evaluate(&mut bot, 0).mode, BehaviorMode::Idle);
    }

    #[test]
    fn patrol_cycles_waypoints_and_wraps() {
        let mut h = Harness::new();
        let mut bot = h.spawn("Red", Vec3::new(0.5, 1.0, 0.5));
        bot.patrol = vec![Vec3::new(6.5, 1.0, 0.5), Vec3::new(6.5, 1.0, 6.5)];
        let scheduler = BehaviorScheduler::new(&h.tuning);

        let mut visited = vec![bot.patrol_index];
        for pass in 0..300 {
            scheduler.advance(&h.ctx(pass), &mut bot).unwrap();
            if visited.last() != Some(&bot.patrol_index) {
                visited.push(bot.patrol_index);
            }
            if visited.len() >= 4 {
                break;
            }
            h.world.step();
        }

        assert_eq!(bot.mode(), BehaviorMode::Patrolling);
        assert!(visited.starts_with(&[0, 1, 0, 1]), "visited: {visited:?}");
    }

    // ---------------------------------------------------------------
    // Construction plans through the scheduler
    // ---------------------------------------------------------------

    #[test]
    fn tall_rise_is_climbed_in_several_plans() {
        let mut h = Harness::new();
        h.tuning.construction.max_placements = 2;
        let leader = place_player(&h, Vec3::new(1.5, 7.0, 0.5));
        let mut bot = h.spawn("Red", Vec3::new(0.5, 1.0, 0.5));
        bot.leader = Some(leader);
        let blocks = bot.building_blocks;
        let scheduler = BehaviorScheduler::new(&h.tuning);

        let mut strategies = Vec::new();
        for pass in 0..60 {
            scheduler.advance(&h.ctx(pass), &mut bot).unwrap();
            if let Some(plan) = &bot.plan {
                strategies.push(plan.strategy);
            }
        }

        let at = snapshot(&h, &bot).position;
        // Each plan holds two blocks; standing at y 5 takes two plans.
        assert!(at.y >= 5.0, "stalled at y={}", at.y);
        assert!(blocks - bot.building_blocks >= 4);
        assert!(strategies.contains(&PlacementStrategy::VerticalTower));
    }

    #[test]
    fn refused_placement_is_skipped_and_not_retried() {
        let mut h = Harness::new();
        let at = Vec3::new(0.5, 1.0, 0.5);
        let mut bot = h.spawn("Red", at);
        let blocks = bot.building_blocks;
        bot.behavior = Behavior::Climb;
        bot.plan = Some(plan_of(
            &[BlockPos::new(1, 1, 0), BlockPos::new(2, 1, 0)],
            at,
            at,
        ));
        let refusing = RefuseFirst {
            world: &h.world,
            refused: AtomicBool::new(false),
        };
        let ctx = TickContext {
            actions: &refusing,
            ..h.ctx(1)
        };
        let scheduler = BehaviorScheduler::new(&h.tuning);
        let me = snapshot(&h, &bot);

        assert_eq!(scheduler.tick_climb(&ctx, &mut bot, &me).unwrap(), Status::Running);
        let plan = bot.plan.as_ref().unwrap();
        assert_eq!((plan.placed, plan.skipped, plan.steps.len()), (0, 1, 1));
        assert_eq!(bot.building_blocks, blocks);
        assert!(!h.world.is_solid(BlockPos::new(1, 1, 0)));

        assert_eq!(scheduler.tick_climb(&ctx, &mut bot, &me).unwrap(), Status::Running);
        assert_eq!(bot.plan.as_ref().map(|p| p.placed), Some(1));
        assert_eq!(bot.building_blocks, blocks - 1);
        assert!(h.world.is_solid(BlockPos::new(2, 1, 0)));

        assert_eq!(scheduler.tick_climb(&ctx, &mut bot, &me).unwrap(), Status::Ended);
        assert!(bot.plan.is_none());
        assert!(!h.world.is_solid(BlockPos::new(1, 1, 0)));
    }

    #[test]
    fn expired_plan_is_replanned_before_placing() {
        let mut h = Harness::new();
        let at = Vec3::new(0.5, 1.0, 0.5);
        let leader_at = Vec3::new(1.5, 7.0, 0.5);
        let leader = place_player(&h, leader_at);
        let mut bot = h.spawn("Red", at);
        bot.leader = Some(leader);
        bot.behavior = Behavior::Climb;
        bot.plan = Some(plan_of(&[BlockPos::new(5, 1, 5)], at, leader_at));

        // Tick 120 is past the refresh window of a plan made at tick 0.
        let ctx = h.ctx(30);
        let scheduler = BehaviorScheduler::new(&h.tuning);
        let me = snapshot(&h, &bot);
        assert_eq!(scheduler.tick_climb(&ctx, &mut bot, &me).unwrap(), Status::Running);

        let plan = bot.plan.as_ref().unwrap();
        assert_eq!(plan.strategy, PlacementStrategy::VerticalTower);
        assert_eq!(plan.created_at, ctx.tick);
        assert_eq!(plan.placed, 1);
        assert!(!h.world.is_solid(BlockPos::new(5, 1, 5)));
        assert!(h.world.is_solid(BlockPos::new(0, 1, 0)));
    }

    #[test]
    fn last_block_ends_the_climb_and_falls_through() {
        let mut h = Harness::new();
        let leader = place_player(&h, Vec3::new(1.5, 7.0, 0.5));
        let at = Vec3::new(0.5, 1.0, 0.5);
        let mut bot = h.spawn("Red", at);
        bot.leader = Some(leader);
        bot.building_blocks = 1;
        bot.behavior = Behavior::Climb;
        bot.plan = Some(plan_of(
            &[BlockPos::new(0, 1, 0), BlockPos::new(0, 2, 0)],
            at,
            Vec3::new(1.5, 7.0, 0.5),
        ));
        let scheduler = BehaviorScheduler::new(&h.tuning);
        let me = snapshot(&h, &bot);

        assert_eq!(scheduler.tick_climb(&h.ctx(1), &mut bot, &me).unwrap(), Status::Running);
        assert_eq!(bot.building_blocks, 0);

        let outcome = scheduler.advance(&h.ctx(2), &mut bot).unwrap();
        assert_eq!(outcome.mode, BehaviorMode::Following);
        assert!(bot.plan.is_none());
        assert!(!h.world.is_solid(BlockPos::new(0, 2, 0)));
    }
}
