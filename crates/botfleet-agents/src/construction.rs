//! Obstacle traversal planning.
//!
//! When plain navigation cannot get an agent to where it wants to be, the
//! planner synthesizes a short list of block placements that will: a pillar
//! out of an enclosure, a tower or a staircase up to a higher target, or a
//! bridge across missing ground.
//!
//! # Triggers
//!
//! Planning is considered when any of these holds and the agent may build,
//! has blocks left and the target is within engagement range:
//!
//! - **Enclosed**: at least 6 of the 8 lateral directions are solid at feet
//!   or head level, with air above the head.
//! - **Height gap**: the target is more than 2 blocks up and no more than 8
//!   away horizontally.
//! - **Gap**: a column on the straight line to the target has no ground
//!   within 3 blocks below the agent's feet.
//! - **Stuck**: navigation reported no progress for 3 consecutive checks.
//!
//! # Strategies
//!
//! Escape route beats vertical tower beats diagonal stairs beats horizontal
//! bridge. Every strategy walks a bounded line of cells and only emits a
//! cell that is empty and has a solid (or already planned) face neighbor.
//! The total number of placements is capped.
//!
//! # Execution
//!
//! A plan is consumed from the front. A head that is out of reach sends
//! the agent back onto the last block it placed; a head that is no longer
//! valid is dropped and never retried.

use std::collections::{BTreeSet, VecDeque};

use tracing::debug;

use botfleet_types::{BlockPos, LATERAL_DIRECTIONS, PlacementStrategy, Vec3};
use botfleet_world::WorldQuery;

use crate::agent::Agent;
use crate::config::ConstructionConfig;

/// Height of an agent's eyes above its feet.
const EYE_HEIGHT: f64 = 1.6;

/// Tallest wall an escape route will climb.
const MAX_ESCAPE_HEIGHT: i32 = 8;

/// Why the planner wants to engage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngageTrigger {
    /// Walled in on most sides with open sky.
    Enclosed,
    /// Target is well above and close enough to build up to.
    HeightGap,
    /// Missing ground on the straight line to the target.
    Gap,
    /// Navigation kept failing.
    Stuck,
}

/// What the agent should do next to advance its plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanAction {
    /// Place a block here.
    Place(BlockPos),
    /// Walk here first; the next placement is out of reach.
    WalkTo(Vec3),
    /// Nothing left to place.
    Complete,
}

/// An ordered queue of placements.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructionPlan {
    /// Strategy the plan was built with.
    pub strategy: PlacementStrategy,
    /// Cells still to place, front first.
    pub steps: VecDeque<BlockPos>,
    /// Where the agent stood when the plan was made.
    pub origin: Vec3,
    /// Where the target was when the plan was made.
    pub anchor: Vec3,
    /// Tick the plan was made.
    pub created_at: u64,
    /// Most recent successful placement.
    pub last_placed: Option<BlockPos>,
    /// Successful placements so far.
    pub placed: u32,
    /// Steps dropped as invalid.
    pub skipped: u32,
    /// Consecutive checks without progress.
    pub stalls: u32,
}

impl ConstructionPlan {
    /// Whether every step has been placed or skipped.
    pub fn is_complete(&self) -> bool {
        self.steps.is_empty()
    }

    /// Record a successful placement of the head.
    pub fn mark_placed(&mut self) {
        if let Some(pos) = self.steps.pop_front() {
            self.last_placed = Some(pos);
            self.placed = self.placed.saturating_add(1);
            self.stalls = 0;
        }
    }

    /// Drop the head without placing it.
    pub fn skip_head(&mut self) {
        if self.steps.pop_front().is_some() {
            self.skipped = self.skipped.saturating_add(1);
        }
    }
}

/// Cells chosen so far, layered over the real terrain.
struct Layout<'w> {
    world: &'w dyn WorldQuery,
    planned: BTreeSet<BlockPos>,
    steps: VecDeque<BlockPos>,
    cap: usize,
}

impl<'w> Layout<'w> {
    fn new(world: &'w dyn WorldQuery, cap: usize) -> Self {
        Self {
            world,
            planned: BTreeSet::new(),
            steps: VecDeque::new(),
            cap,
        }
    }

    fn occupied(&self, pos: BlockPos) -> bool {
        self.world.is_solid(pos) || self.planned.contains(&pos)
    }

    fn supported(&self, pos: BlockPos) -> bool {
        pos.face_neighbors().any(|n| self.occupied(n))
    }

    /// Ensure `pos` will be solid. Already-solid cells need nothing.
    /// Returns `false` when the cell cannot be filled.
    fn fill(&mut self, pos: BlockPos) -> bool {
        if self.occupied(pos) {
            return true;
        }
        if self.steps.len() >= self.cap || !self.supported(pos) {
            return false;
        }
        self.planned.insert(pos);
        self.steps.push_back(pos);
        true
    }
}

/// Plans and tracks block placements that get an agent past terrain.
#[derive(Debug, Clone, Copy)]
pub struct ObstacleTraversalPlanner<'a> {
    config: &'a ConstructionConfig,
}

impl<'a> ObstacleTraversalPlanner<'a> {
    /// Create a planner over the given tunables.
    pub const fn new(config: &'a ConstructionConfig) -> Self {
        Self { config }
    }

    // -------------------------------------------------------------------
    // Triggers
    // -------------------------------------------------------------------

    /// Whether the cell at `feet` is walled in with open sky above.
    pub fn is_enclosed(&self, world: &dyn WorldQuery, feet: BlockPos) -> bool {
        let walled = LATERAL_DIRECTIONS
            .into_iter()
            .filter(|&(dx, dz)| {
                world.is_solid(feet.offset(dx, 0, dz)) || world.is_solid(feet.offset(dx, 1, dz))
            })
            .count();
        walled >= self.config.enclosure_min_solid && world.is_air(feet.offset(0, 2, 0))
    }

    /// Whether the target is high above and horizontally close.
    pub fn has_height_gap(&self, agent_at: Vec3, target: Vec3) -> bool {
        target.y - agent_at.y > self.config.height_trigger
            && agent_at.horizontal_distance(target) <= self.config.height_trigger_horizontal
    }

    /// Whether some column between agent and target lacks nearby ground.
    pub fn has_gap(&self, world: &dyn WorldQuery, agent_at: Vec3, target: Vec3) -> bool {
        let feet = agent_at.to_block();
        let end = target.to_block();
        let len = manhattan(feet, end).min(self.engagement_columns());
        grid_walk((feet.x, feet.z), (end.x, end.z), len)
            .into_iter()
            .any(|(x, z)| {
                world
                    .find_ground_below(BlockPos::new(x, feet.y, z).below(), self.config.gap_probe_depth)
                    .is_none()
            })
    }

    /// The first trigger that fires for this agent heading to `target`,
    /// or `None` when the agent should not build.
    pub fn engage_trigger(
        &self,
        world: &dyn WorldQuery,
        agent: &Agent,
        agent_at: Vec3,
        target: Vec3,
    ) -> Option<EngageTrigger> {
        if !agent.can_build || agent.building_blocks == 0 {
            return None;
        }
        if agent_at.distance(target) > self.config.engagement_range {
            return None;
        }
        if self.is_enclosed(world, agent_at.to_block()) {
            Some(EngageTrigger::Enclosed)
        } else if self.has_height_gap(agent_at, target) {
            Some(EngageTrigger::HeightGap)
        } else if self.has_gap(world, agent_at, target) {
            Some(EngageTrigger::Gap)
        } else if agent.stuck_checks >= self.config.stuck_checks {
            Some(EngageTrigger::Stuck)
        } else {
            None
        }
    }

    /// Whether the planner should engage at all.
    pub fn should_engage(
        &self,
        world: &dyn WorldQuery,
        agent: &Agent,
        agent_at: Vec3,
        target: Vec3,
    ) -> bool {
        self.engage_trigger(world, agent, agent_at, target).is_some()
    }

    // -------------------------------------------------------------------
    // Planning
    // -------------------------------------------------------------------

    /// Build a plan toward `target`. Returns `None` when no strategy yields
    /// any placement.
    pub fn plan_path(
        &self,
        world: &dyn WorldQuery,
        agent: &Agent,
        agent_at: Vec3,
        target: Vec3,
        tick: u64,
    ) -> Option<ConstructionPlan> {
        let feet = agent_at.to_block();
        let goal = target.to_block();
        let budget = usize::try_from(agent.building_blocks)
            .unwrap_or(usize::MAX)
            .min(self.config.max_placements);
        let mut layout = Layout::new(world, budget);

        let strategy = if self.is_enclosed(world, feet) {
            let height = escape_height(world, feet);
            pillar(&mut layout, feet, height);
            PlacementStrategy::EscapeRoute
        } else if self.has_height_gap(agent_at, target) {
            let rise = goal.y.saturating_sub(feet.y);
            if agent_at.horizontal_distance(target) <= self.config.tower_max_horizontal {
                pillar(&mut layout, feet, rise);
                PlacementStrategy::VerticalTower
            } else {
                stairs(&mut layout, feet, goal, rise);
                PlacementStrategy::DiagonalStairs
            }
        } else {
            let len = manhattan(feet, goal).min(self.engagement_columns());
            bridge(&mut layout, feet, goal, len);
            PlacementStrategy::HorizontalBridge
        };

        if layout.steps.is_empty() {
            debug!(agent_id = %agent.id, %strategy, "no placements found");
            return None;
        }
        debug!(
            agent_id = %agent.id,
            %strategy,
            steps = layout.steps.len(),
            "construction plan created"
        );
        Some(ConstructionPlan {
            strategy,
            steps: layout.steps,
            origin: agent_at,
            anchor: target,
            created_at: tick,
            last_placed: None,
            placed: 0,
            skipped: 0,
            stalls: 0,
        })
    }

    /// Whether a plan is stale: too old, its target moved away, or it
    /// stopped making progress.
    pub fn needs_refresh(&self, plan: &ConstructionPlan, target: Vec3, tick: u64) -> bool {
        tick.saturating_sub(plan.created_at) >= self.config.refresh_ticks
            || plan.anchor.distance(target) > self.config.target_moved_threshold
            || plan.stalls >= self.config.stuck_checks
    }

    /// Decide the next step for a plan, dropping heads that are no longer
    /// valid.
    pub fn next_action(
        &self,
        world: &dyn WorldQuery,
        plan: &mut ConstructionPlan,
        agent_at: Vec3,
    ) -> PlanAction {
        let eyes = agent_at.offset(0.0, EYE_HEIGHT, 0.0);
        while let Some(&head) = plan.steps.front() {
            let valid = world.is_air(head) && head.face_neighbors().any(|n| world.is_solid(n));
            if !valid {
                debug!(%head, "skipping invalid placement");
                plan.skip_head();
                continue;
            }
            if eyes.distance(head.center()) <= self.config.placement_reach {
                return PlanAction::Place(head);
            }
            let stand = plan.last_placed.map_or(plan.origin, BlockPos::top_center);
            return PlanAction::WalkTo(stand);
        }
        PlanAction::Complete
    }

    fn engagement_columns(&self) -> usize {
        // Saturating float-to-int cast; the range is a small positive value.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let columns = self.config.engagement_range.ceil().max(0.0) as usize;
        columns
    }
}

// ---------------------------------------------------------------------------
// Strategy layouts
// ---------------------------------------------------------------------------

/// Fill the agent's own column from the feet up, one level per step.
fn pillar(layout: &mut Layout<'_>, feet: BlockPos, height: i32) {
    for level in 0..height.max(0) {
        let cell = feet.offset(0, level, 0);
        // The agent rides the pillar up; it needs headroom above.
        if layout.world.is_solid(cell.offset(0, 2, 0)) || !layout.fill(cell) {
            break;
        }
    }
}

/// Rising steps along a grid line, with a riser under each step that has
/// nothing beneath it.
fn stairs(layout: &mut Layout<'_>, feet: BlockPos, goal: BlockPos, rise: i32) {
    let count = usize::try_from(rise.max(0)).unwrap_or(0);
    for (i, (x, z)) in grid_walk((feet.x, feet.z), (goal.x, goal.z), count)
        .into_iter()
        .enumerate()
    {
        let lift = i32::try_from(i).unwrap_or(i32::MAX);
        let step = BlockPos::new(x, feet.y.saturating_add(lift), z);
        if !layout.occupied(step.below()) && !layout.supported(step) {
            layout.fill(step.below());
        }
        if !layout.fill(step) {
            break;
        }
    }
}

/// A level span one block below the feet toward the goal.
fn bridge(layout: &mut Layout<'_>, feet: BlockPos, goal: BlockPos, len: usize) {
    let level = feet.y.saturating_sub(1);
    for (x, z) in grid_walk((feet.x, feet.z), (goal.x, goal.z), len) {
        if !layout.fill(BlockPos::new(x, level, z)) {
            break;
        }
    }
}

/// Height of the tallest lateral wall around `feet`, at least one block.
fn escape_height(world: &dyn WorldQuery, feet: BlockPos) -> i32 {
    LATERAL_DIRECTIONS
        .into_iter()
        .map(|(dx, dz)| {
            (0..MAX_ESCAPE_HEIGHT)
                .take_while(|&h| world.is_solid(feet.offset(dx, h, dz)))
                .count()
        })
        .max()
        .and_then(|h| i32::try_from(h).ok())
        .unwrap_or(0)
        .max(1)
}

fn manhattan(a: BlockPos, b: BlockPos) -> usize {
    let d = a.x.abs_diff(b.x).saturating_add(a.z.abs_diff(b.z));
    usize::try_from(d).unwrap_or(usize::MAX)
}

/// `count` columns stepping from `from` (exclusive) toward `to` along a
/// four-connected line. Past `to` it keeps going in the last direction.
fn grid_walk(from: (i32, i32), to: (i32, i32), count: usize) -> Vec<(i32, i32)> {
    let mut out = Vec::with_capacity(count);
    let (mut x, mut z) = from;
    let mut last = (1, 0);
    for _ in 0..count {
        let (rx, rz) = (to.0.saturating_sub(x), to.1.saturating_sub(z));
        let dir = if rx == 0 && rz == 0 {
            last
        } else if rx.unsigned_abs() >= rz.unsigned_abs() {
            (rx.signum(), 0)
        } else {
            (0, rz.signum())
        };
        x = x.saturating_add(dir.0);
        z = z.saturating_add(dir.1);
        last = dir;
        out.push((x, z));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use botfleet_types::{AgentId, EntityRef};
    use botfleet_world::{AgentActions, SimWorld};

    use super::*;
    use crate::config::AgentTuning;

    fn flat() -> SimWorld {
        let world = SimWorld::new();
        world
            .fill(BlockPos::new(-30, 0, -30), BlockPos::new(30, 0, 30))
            .unwrap();
        world
    }

    fn agent(tuning: &AgentTuning) -> Agent {
        Agent::new(AgentId::new(), "Builder".to_owned(), tuning)
    }

    fn wall_in(world: &SimWorld, feet: BlockPos, height: i32) {
        for (dx, dz) in LATERAL_DIRECTIONS {
            world
                .fill(feet.offset(dx, 0, dz), feet.offset(dx, height - 1, dz))
                .unwrap();
        }
    }

    #[test]
    fn grid_walk_is_four_connected() {
        let cols = grid_walk((0, 0), (3, -2), 5);
        assert_eq!(cols.last(), Some(&(3, -2)));
        let mut prev = (0_i32, 0_i32);
        for c in cols {
            assert_eq!(prev.0.abs_diff(c.0) + prev.1.abs_diff(c.1), 1);
            prev = c;
        }
    }

    #[test]
    fn enclosure_triggers_escape_route_with_rising_steps() {
        let tuning = AgentTuning::default();
        let planner = ObstacleTraversalPlanner::new(&tuning.construction);
        let world = flat();
        let feet = BlockPos::new(0, 1, 0);
        wall_in(&world, feet, 3);
        let me = agent(&tuning);
        let at = feet.below().top_center();
        let target = Vec3::new(10.5, 1.0, 0.5);

        assert_eq!(
            planner.engage_trigger(&world, &me, at, target),
            Some(EngageTrigger::Enclosed)
        );
        let plan = planner.plan_path(&world, &me, at, target, 0).unwrap();
        assert_eq!(plan.strategy, PlacementStrategy::EscapeRoute);
        assert_eq!(plan.steps.len(), 3);
        let ys: Vec<i32> = plan.steps.iter().map(|p| p.y).collect();
        assert!(ys.windows(2).all(|w| matches!(w, [a, b] if a < b)), "not rising: {ys:?}");
    }

    #[test]
    fn high_close_target_builds_tower_far_builds_stairs() {
        let tuning = AgentTuning::default();
        let planner = ObstacleTraversalPlanner::new(&tuning.construction);
        let world = flat();
        let me = agent(&tuning);
        let at = Vec3::new(0.5, 1.0, 0.5);

        let overhead = Vec3::new(1.5, 6.0, 0.5);
        let tower = planner.plan_path(&world, &me, at, overhead, 0).unwrap();
        assert_eq!(tower.strategy, PlacementStrategy::VerticalTower);
        assert_eq!(tower.steps.len(), 5);

        let ahead = Vec3::new(6.5, 5.0, 0.5);
        let stairs = planner.plan_path(&world, &me, at, ahead, 0).unwrap();
        assert_eq!(stairs.strategy, PlacementStrategy::DiagonalStairs);
        // Every planned cell is empty and touches ground or an earlier cell.
        let mut solid: BTreeSet<BlockPos> = BTreeSet::new();
        for cell in &stairs.steps {
            assert!(world.is_air(*cell));
            assert!(cell.face_neighbors().any(|n| world.is_solid(n) || solid.contains(&n)));
            solid.insert(*cell);
        }
        assert!(stairs.steps.iter().any(|p| p.y == 4));
    }

    #[test]
    fn chasm_triggers_bridge_at_floor_level() {
        let tuning = AgentTuning::default();
        let planner = ObstacleTraversalPlanner::new(&tuning.construction);
        let world = flat();
        for x in 2..=4 {
            for z in -3..=3 {
                world.remove_block(BlockPos::new(x, 0, z));
            }
        }
        let me = agent(&tuning);
        let at = Vec3::new(0.5, 1.0, 0.5);
        let target = Vec3::new(7.5, 1.0, 0.5);
        assert_eq!(
            planner.engage_trigger(&world, &me, at, target),
            Some(EngageTrigger::Gap)
        );
        let plan = planner.plan_path(&world, &me, at, target, 0).unwrap();
        assert_eq!(plan.strategy, PlacementStrategy::HorizontalBridge);
        let cells: Vec<BlockPos> = plan.steps.iter().copied().collect();
        assert_eq!(
            cells,
            vec![
                BlockPos::new(2, 0, 0),
                BlockPos::new(3, 0, 0),
                BlockPos::new(4, 0, 0)
            ]
        );
    }

    #[test]
    fn placements_are_capped() {
        let mut tuning = AgentTuning::default();
        tuning.construction.max_placements = 2;
        let planner = ObstacleTraversalPlanner::new(&tuning.construction);
        let world = flat();
        let me = agent(&tuning);
        let plan = planner
            .plan_path(&world, &me, Vec3::new(0.5, 1.0, 0.5), Vec3::new(0.5, 8.0, 1.5), 0)
            .unwrap();
        assert_eq!(plan.steps.len(), 2);
    }

    #[test]
    fn builders_without_blocks_never_engage() {
        let tuning = AgentTuning::default();
        let planner = ObstacleTraversalPlanner::new(&tuning.construction);
        let world = flat();
        let mut me = agent(&tuning);
        me.building_blocks = 0;
        let at = Vec3::new(0.5, 1.0, 0.5);
        assert!(!planner.should_engage(&world, &me, at, Vec3::new(1.5, 8.0, 0.5)));
        me.building_blocks = 10;
        me.can_build = false;
        assert!(!planner.should_engage(&world, &me, at, Vec3::new(1.5, 8.0, 0.5)));
    }

    #[test]
    fn invalid_heads_are_skipped_not_retried() {
        let tuning = AgentTuning::default();
        let planner = ObstacleTraversalPlanner::new(&tuning.construction);
        let world = flat();
        let id = AgentId::new();
        let at = Vec3::new(0.5, 1.0, 0.5);
        world.spawn_entity(EntityRef::Agent(id), at, 20.0).unwrap();

        let mut plan = ConstructionPlan {
            strategy: PlacementStrategy::HorizontalBridge,
            steps: VecDeque::from(vec![
                BlockPos::new(0, 0, 0),  // already solid
                BlockPos::new(5, 9, 5),  // floating
                BlockPos::new(1, 1, 0),  // valid
            ]),
            origin: at,
            anchor: at,
            created_at: 0,
            last_placed: None,
            placed: 0,
            skipped: 0,
            stalls: 0,
        };
        let action = planner.next_action(&world, &mut plan, at);
        assert_eq!(action, PlanAction::Place(BlockPos::new(1, 1, 0)));
        assert_eq!(plan.skipped, 2);
        assert!(world.place_block(id, BlockPos::new(1, 1, 0)));
        plan.mark_placed();
        assert_eq!(planner.next_action(&world, &mut plan, at), PlanAction::Complete);
    }

    #[test]
    fn stale_plans_need_refresh() {
        let tuning = AgentTuning::default();
        let planner = ObstacleTraversalPlanner::new(&tuning.construction);
        let at = Vec3::new(0.5, 1.0, 0.5);
        let mut plan = ConstructionPlan {
            strategy: PlacementStrategy::VerticalTower,
            steps: VecDeque::new(),
            origin: at,
            anchor: Vec3::new(1.5, 5.0, 0.5),
            created_at: 10,
            last_placed: None,
            placed: 0,
            skipped: 0,
            stalls: 0,
        };
        assert!(!planner.needs_refresh(&plan, plan.anchor, 50));
        assert!(planner.needs_refresh(&plan, plan.anchor, 110));
        assert!(planner.needs_refresh(&plan, Vec3::new(9.5, 5.0, 0.5), 50));
        plan.stalls = 3;
        assert!(planner.needs_refresh(&plan, plan.anchor, 50));
    }
}
