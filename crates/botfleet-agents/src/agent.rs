//! The per-agent record mutated by the scheduler.
//!
//! An [`Agent`] carries identity, group back-reference, standing orders
//! (static, home, patrol, dispersal) and the transient state of whatever
//! behavior is running. It holds no pointer to its group or leader: the
//! group is a [`GroupName`] resolved through the registry and the leader is
//! an [`EntityRef`] resolved through the world, so either may vanish
//! without leaving a dangling reference.

use chrono::{DateTime, Utc};
use serde::Serialize;

use botfleet_types::{AgentId, BehaviorMode, EntityRef, FollowerClass, GroupName, Vec3};

use crate::behavior::Behavior;
use crate::config::AgentTuning;
use crate::construction::ConstructionPlan;
use crate::positioning::FollowState;
use crate::seed;

/// Standing orders for a newly spawned agent.
///
/// Everything here can also be changed later through the fleet's bulk
/// operations.
#[derive(Debug, Clone)]
pub struct SpawnParams {
    /// Display name. Drawn from the name pool when `None`.
    pub name: Option<String>,
    /// Group to join on spawn.
    pub group: Option<GroupName>,
    /// Hold position except to defend.
    pub is_static: bool,
    /// Position to guard.
    pub home: Option<Vec3>,
    /// Waypoint loop to patrol.
    pub patrol: Vec<Vec3>,
    /// Whether the agent may place blocks to get past obstacles.
    pub can_build: bool,
}

impl Default for SpawnParams {
    fn default() -> Self {
        Self {
            name: None,
            group: None,
            is_static: false,
            home: None,
            patrol: Vec::new(),
            can_build: true,
        }
    }
}

impl SpawnParams {
    /// Spawn into the named group.
    #[must_use]
    pub fn in_group(mut self, group: impl Into<GroupName>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Spawn with a fixed display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A bot managed by the fleet.
#[derive(Debug, Clone)]
pub struct Agent {
    /// Unique identifier, shared with the agent's world entity.
    pub id: AgentId,
    /// Display name, unique within the fleet.
    pub name: String,
    /// Stable seed derived from `id`.
    pub seed: u64,
    /// Formation class fixed at creation.
    pub follower_class: FollowerClass,
    /// Offset that staggers this agent's re-evaluations across passes.
    pub stagger: u64,
    /// The behavior currently running.
    pub behavior: Behavior,
    /// Back-reference to the agent's group, if any.
    pub group: Option<GroupName>,
    /// Who the agent follows. Resolved through the world on every use.
    pub leader: Option<EntityRef>,
    /// Never moves except to defend.
    pub is_static: bool,
    /// Where a static agent holds position. Captured on first evaluation.
    pub static_anchor: Option<Vec3>,
    /// Preferred maximum distance from the leader.
    pub follow_radius: f64,
    /// Aggregate hostile flag pushed from the relationship graph.
    pub hostile: bool,
    /// Position to guard.
    pub home: Option<Vec3>,
    /// Patrol waypoints, visited in order and looped.
    pub patrol: Vec<Vec3>,
    /// Index of the next patrol waypoint.
    pub patrol_index: usize,
    /// Tick until which the agent is dispersing.
    pub disperse_until: Option<u64>,
    /// Whether the agent may build.
    pub can_build: bool,
    /// Building blocks left.
    pub building_blocks: u32,
    /// Current attack or defend target.
    pub target: Option<EntityRef>,
    /// Tick of the last strike, for the cooldown.
    pub last_strike_tick: Option<u64>,
    /// Consecutive AI passes in which navigation reported stuck.
    pub stuck_checks: u32,
    /// Cached follow target.
    pub follow: Option<FollowState>,
    /// Destination of the running flee, dispersal, guard or patrol leg.
    pub destination: Option<Vec3>,
    /// Active construction plan.
    pub plan: Option<ConstructionPlan>,
    /// Set when the running behavior ended; forces selection next pass.
    pub reevaluate_now: bool,
    /// Wall-clock spawn time.
    pub spawned_at: DateTime<Utc>,
}

impl Agent {
    /// Create an idle agent with identity-derived seed and class.
    pub fn new(id: AgentId, name: String, tuning: &AgentTuning) -> Self {
        let seed = seed::identity_seed(id);
        let period = tuning.behavior.reevaluate_every_passes;
        Self {
            id,
            name,
            seed,
            follower_class: seed::follower_class(seed),
            stagger: seed::stagger_offset(seed, period),
            behavior: Behavior::Idle,
            group: None,
            leader: None,
            is_static: false,
            static_anchor: None,
            follow_radius: tuning.behavior.default_follow_radius,
            hostile: false,
            home: None,
            patrol: Vec::new(),
            patrol_index: 0,
            disperse_until: None,
            can_build: true,
            building_blocks: tuning.construction.starting_blocks,
            target: None,
            last_strike_tick: None,
            stuck_checks: 0,
            follow: None,
            destination: None,
            plan: None,
            reevaluate_now: true,
            spawned_at: Utc::now(),
        }
    }

    /// Apply the standing orders from spawn parameters.
    pub fn apply_params(&mut self, params: &SpawnParams) {
        self.is_static = params.is_static;
        self.home = params.home;
        self.patrol.clone_from(&params.patrol);
        self.can_build = params.can_build;
    }

    /// The externally visible behavior mode.
    pub const fn mode(&self) -> BehaviorMode {
        self.behavior.mode()
    }

    /// Whether a dispersal order is active at `tick`.
    pub fn is_dispersing(&self, tick: u64) -> bool {
        self.disperse_until.is_some_and(|until| tick < until)
    }

    /// Make the agent static or mobile. Clearing the flag forgets the anchor.
    pub fn set_static(&mut self, is_static: bool) {
        self.is_static = is_static;
        if !is_static {
            self.static_anchor = None;
        }
        self.reevaluate_now = true;
    }

    /// Drop everything tied to the running behavior.
    pub fn clear_transient(&mut self) {
        self.target = None;
        self.plan = None;
        self.follow = None;
        self.destination = None;
        self.stuck_checks = 0;
    }

    /// A serializable summary for logs and reports.
    pub fn view(&self) -> AgentView {
        AgentView {
            id: self.id,
            name: self.name.clone(),
            mode: self.mode(),
            group: self.group.clone(),
            is_static: self.is_static,
            hostile: self.hostile,
            building_blocks: self.building_blocks,
        }
    }
}

/// Read-only summary of an agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentView {
    /// Agent identifier.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Current behavior mode.
    pub mode: BehaviorMode,
    /// Group membership.
    pub group: Option<GroupName>,
    /// Static flag.
    pub is_static: bool,
    /// Aggregate hostile flag.
    pub hostile: bool,
    /// Building blocks left.
    pub building_blocks: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_agent_is_idle_with_full_blocks() {
        let tuning = AgentTuning::default();
        let agent = Agent::new(AgentId::new(), "Ada".to_owned(), &tuning);
        assert_eq!(agent.mode(), BehaviorMode::Idle);
        assert_eq!(agent.building_blocks, tuning.construction.starting_blocks);
        assert!(agent.reevaluate_now);
        assert!(agent.stagger < tuning.behavior.reevaluate_every_passes);
    }

    #[test]
    fn follower_class_is_fixed_by_identity() {
        let tuning = AgentTuning::default();
        let id = AgentId::new();
        let a = Agent::new(id, "A".to_owned(), &tuning);
        let b = Agent::new(id, "B".to_owned(), &tuning);
        assert_eq!(a.follower_class, b.follower_class);
        assert_eq!(a.seed, b.seed);
    }

    #[test]
    fn dispersal_window_is_exclusive() {
        let mut agent = Agent::new(AgentId::new(), "D".to_owned(), &AgentTuning::default());
        agent.disperse_until = Some(100);
        assert!(agent.is_dispersing(99));
        assert!(!agent.is_dispersing(100));
    }

    #[test]
    fn unsetting_static_forgets_anchor() {
        let mut agent = Agent::new(AgentId::new(), "S".to_owned(), &AgentTuning::default());
        agent.set_static(true);
        agent.static_anchor = Some(Vec3::new(1.0, 2.0, 3.0));
        agent.set_static(false);
        assert!(agent.static_anchor.is_none());
    }
}
