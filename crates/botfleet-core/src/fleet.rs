//! The fleet facade: registry plus relationships.
//!
//! [`Fleet`] is the only mutation entry point for orchestration layers
//! (commands, scenarios, tests). It keeps the one invariant that spans the
//! registry and the relationship graph: every live member of a group
//! carries that group's current aggregate hostile flag. The flag is pushed
//! whenever a relationship change flips it and whenever an agent joins a
//! group.
//!
//! Flag writers are serialized: a relationship change and the push that
//! follows it happen under one fleet-level lock, so two concurrent changes
//! can never deliver their flags out of order. The lock is taken before
//! any registry lock and never while holding one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use botfleet_agents::{
    AgentTuning, AgentView, AggregateChange, RelationshipEntry, RelationshipGraph, SpawnParams,
};
use botfleet_types::{AgentId, EntityRef, GroupName, PlayerId, Relationship, Vec3};
use botfleet_world::WorldQuery;

use crate::registry::{AgentCell, FleetRegistry, GroupView, RegistryError};

/// Registry and relationship graph, owned together.
#[derive(Debug)]
pub struct Fleet {
    registry: FleetRegistry,
    relationships: RelationshipGraph,
    flag_writes: Mutex<()>,
}

impl Fleet {
    /// Create an empty fleet.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize, tuning: AgentTuning) -> Result<Self, RegistryError> {
        Ok(Self {
            registry: FleetRegistry::new(capacity, tuning)?,
            relationships: RelationshipGraph::new(),
            flag_writes: Mutex::new(()),
        })
    }

    /// The agent and group registry.
    pub const fn registry(&self) -> &FleetRegistry {
        &self.registry
    }

    /// The relationship graph.
    pub const fn relationships(&self) -> &RelationshipGraph {
        &self.relationships
    }

    /// Tunables every agent runs with.
    pub const fn tuning(&self) -> &AgentTuning {
        self.registry.tuning()
    }

    // -------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------

    /// Spawn an agent, giving it its group's hostile flag.
    ///
    /// # Errors
    ///
    /// See [`FleetRegistry::spawn`].
    pub fn spawn(&self, params: &SpawnParams) -> Result<Arc<AgentCell>, RegistryError> {
        let _writes = self.flag_writes();
        let cell = self.registry.spawn(params)?;
        if let Some(group) = &params.group {
            let hostile = self.relationships.aggregate_hostile(group);
            cell.update(|agent| agent.hostile = hostile);
        }
        Ok(cell)
    }

    /// Remove an agent. Returns `false` if it was already gone.
    pub fn remove(&self, id: AgentId) -> bool {
        self.registry.remove(id)
    }

    /// Remove agents whose world entity is gone or dead.
    pub fn cleanup(&self, world: &dyn WorldQuery) -> Vec<AgentId> {
        self.registry.cleanup(world)
    }

    /// Move an agent into a group and give it the group's hostile flag.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AgentNotFound`] for an unknown agent.
    pub fn join_group(&self, id: AgentId, group: &GroupName) -> Result<(), RegistryError> {
        let _writes = self.flag_writes();
        self.registry.join_group(id, group)?;
        let hostile = self.relationships.aggregate_hostile(group);
        if let Some(cell) = self.registry.get(id) {
            cell.update(|agent| agent.hostile = hostile);
        }
        Ok(())
    }

    /// Take an agent out of its group. Returns the group it left.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AgentNotFound`] for an unknown agent.
    pub fn leave_group(&self, id: AgentId) -> Result<Option<GroupName>, RegistryError> {
        let _writes = self.flag_writes();
        self.registry.leave_group(id)
    }

    // -------------------------------------------------------------------
    // Relationships
    // -------------------------------------------------------------------

    /// Set a symmetric group-to-group relationship and push any flag
    /// changes to members.
    pub fn set_group_relationship(
        &self,
        a: &GroupName,
        b: &GroupName,
        relationship: Relationship,
    ) -> Vec<AggregateChange> {
        let _writes = self.flag_writes();
        let changes = self.relationships.set_group_relationship(a, b, relationship);
        for change in &changes {
            self.push_hostile_flag(change);
        }
        changes
    }

    /// Set how a player stands toward a group and push any flag change.
    pub fn set_player_relationship(
        &self,
        player: PlayerId,
        group: &GroupName,
        relationship: Relationship,
    ) -> Option<AggregateChange> {
        let _writes = self.flag_writes();
        let change = self
            .relationships
            .set_player_relationship(player, group, relationship);
        if let Some(change) = &change {
            self.push_hostile_flag(change);
        }
        change
    }

    /// Relationship between two groups.
    pub fn group_relationship(&self, a: &GroupName, b: &GroupName) -> Relationship {
        self.relationships.get_group_relationship(a, b)
    }

    /// Every stored relationship.
    pub fn relationship_entries(&self) -> Vec<RelationshipEntry> {
        self.relationships.entries()
    }

    fn flag_writes(&self) -> MutexGuard<'_, ()> {
        self.flag_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn push_hostile_flag(&self, change: &AggregateChange) {
        // A group with no live members has nobody to tell.
        let pushed = self
            .registry
            .apply_to_group(&change.group, |cell| {
                cell.update(|agent| {
                    agent.hostile = change.hostile;
                    agent.reevaluate_now = true;
                });
            })
            .unwrap_or(0);
        debug!(
            group = %change.group,
            hostile = change.hostile,
            members = pushed,
            "aggregate hostile flag pushed"
        );
    }

    // -------------------------------------------------------------------
    // Group bulk operations
    // -------------------------------------------------------------------

    /// Set who a group follows.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`] for an unknown group.
    pub fn set_group_leader(
        &self,
        group: &GroupName,
        leader: Option<EntityRef>,
    ) -> Result<usize, RegistryError> {
        self.registry.set_group_leader(group, leader)
    }

    /// Set a group's follow radius.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`] for an unknown group.
    pub fn set_group_follow_radius(
        &self,
        group: &GroupName,
        radius: f64,
    ) -> Result<usize, RegistryError> {
        self.registry.set_group_follow_radius(group, radius)
    }

    /// Set or clear a group's guard position.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`] for an unknown group.
    pub fn set_group_home(
        &self,
        group: &GroupName,
        home: Option<Vec3>,
    ) -> Result<usize, RegistryError> {
        self.registry.set_group_home(group, home)
    }

    /// Make every member static or mobile.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`] for an unknown group.
    pub fn set_group_static(&self, group: &GroupName, is_static: bool) -> Result<usize, RegistryError> {
        let applied = self
            .registry
            .apply_to_group(group, |cell| cell.update(|agent| agent.set_static(is_static)))?;
        info!(%group, is_static, members = applied, "group static flag set");
        Ok(applied)
    }

    /// Order a group to disperse until `now + duration_ticks`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`] for an unknown group.
    pub fn disperse_group(
        &self,
        group: &GroupName,
        now: u64,
        duration_ticks: u64,
    ) -> Result<usize, RegistryError> {
        let until = now.saturating_add(duration_ticks);
        let applied = self.registry.apply_to_group(group, |cell| {
            cell.update(|agent| {
                agent.disperse_until = Some(until);
                agent.reevaluate_now = true;
            });
        })?;
        info!(%group, until, members = applied, "group dispersing");
        Ok(applied)
    }

    /// Set every member's patrol route.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`] for an unknown group.
    pub fn set_group_patrol(
        &self,
        group: &GroupName,
        waypoints: &[Vec3],
    ) -> Result<usize, RegistryError> {
        self.registry.apply_to_group(group, |cell| {
            cell.update(|agent| {
                agent.patrol = waypoints.to_vec();
                agent.patrol_index = 0;
                agent.reevaluate_now = true;
            });
        })
    }

    /// Remove every member of a group. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`] for an unknown group.
    pub fn remove_group(&self, group: &GroupName) -> Result<usize, RegistryError> {
        let mut removed: usize = 0;
        self.registry.apply_to_group(group, |cell| {
            if self.registry.remove(cell.id()) {
                removed = removed.saturating_add(1);
            }
        })?;
        info!(%group, removed, "group removed");
        Ok(removed)
    }

    // -------------------------------------------------------------------
    // Counters
    // -------------------------------------------------------------------

    /// Number of live agents.
    pub fn population(&self) -> usize {
        self.registry.population()
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.registry.group_count()
    }

    /// Members in a group; zero when it does not exist.
    pub fn group_size(&self, group: &GroupName) -> usize {
        self.registry.group_size(group)
    }

    /// Every group name.
    pub fn group_names(&self) -> Vec<GroupName> {
        self.registry.group_names()
    }

    /// Summaries of every group.
    pub fn group_views(&self) -> Vec<GroupView> {
        self.registry.group_views()
    }

    /// Summaries of every live agent.
    pub fn agent_views(&self) -> Vec<AgentView> {
        self.registry
            .cells()
            .iter()
            .map(|cell| cell.lock().view())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use botfleet_types::BehaviorMode;

    use super::*;

    fn fleet() -> Fleet {
        Fleet::new(50, AgentTuning::default()).unwrap()
    }

    fn hostile_flags(fleet: &Fleet, group: &GroupName) -> Vec<bool> {
        fleet
            .registry()
            .group_members(group)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| fleet.registry().get(id))
            .map(|cell| cell.lock().hostile)
            .collect()
    }

    #[test]
    fn late_joiner_inherits_hostile_flag() {
        let fleet = fleet();
        let red = GroupName::from("Red");
        let blue = GroupName::from("Blue");
        fleet.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        fleet.spawn(&SpawnParams::default().in_group("Blue")).unwrap();
        fleet.set_group_relationship(&red, &blue, Relationship::Hostile);

        let late = fleet.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        assert!(late.lock().hostile);

        let loner = fleet.spawn(&SpawnParams::default()).unwrap();
        assert!(!loner.lock().hostile);
        fleet.join_group(loner.id(), &blue).unwrap();
        assert!(loner.lock().hostile);
        fleet.leave_group(loner.id()).unwrap();
        assert!(!loner.lock().hostile);
    }

    #[test]
    fn player_hostility_flags_only_that_group() {
        let fleet = fleet();
        let red = GroupName::from("Red");
        let blue = GroupName::from("Blue");
        for _ in 0..3 {
            fleet.spawn(&SpawnParams::default().in_group("Red")).unwrap();
            fleet.spawn(&SpawnParams::default().in_group("Blue")).unwrap();
        }
        let player = PlayerId::new();
        assert!(fleet
            .set_player_relationship(player, &red, Relationship::Hostile)
            .is_some());
        assert!(hostile_flags(&fleet, &red).iter().all(|h| *h));
        assert!(hostile_flags(&fleet, &blue).iter().all(|h| !*h));

        fleet.set_player_relationship(player, &red, Relationship::Neutral);
        assert!(hostile_flags(&fleet, &red).iter().all(|h| !*h));
    }

    #[test]
    fn concurrent_player_toggles_leave_members_matching_the_aggregate() {
        let fleet = fleet();
        let red = GroupName::from("Red");
        for _ in 0..20 {
            fleet.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        }
        let players = [PlayerId::new(), PlayerId::new()];

        for round in 0..200 {
            std::thread::scope(|scope| {
                for (i, player) in players.iter().enumerate() {
                    let fleet = &fleet;
                    let red = &red;
                    scope.spawn(move || {
                        for step in 0..10 {
                            let relationship = if (step + i + round) % 2 == 0 {
                                Relationship::Hostile
                            } else {
                                Relationship::Neutral
                            };
                            fleet.set_player_relationship(*player, red, relationship);
                        }
                    });
                }
            });
            let aggregate = fleet.relationships().aggregate_hostile(&red);
            assert!(
                hostile_flags(&fleet, &red).iter().all(|h| *h == aggregate),
                "round {round}: member flags disagree with aggregate {aggregate}"
            );
        }
    }

    #[test]
    fn bulk_operations_reach_every_member() {
        let fleet = fleet();
        let red = GroupName::from("Red");
        for _ in 0..4 {
            fleet.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        }
        assert_eq!(fleet.set_group_static(&red, true).unwrap(), 4);
        assert_eq!(fleet.disperse_group(&red, 100, 50).unwrap(), 4);
        for cell in fleet.registry().cells() {
            let agent = cell.lock();
            assert!(agent.is_static);
            assert_eq!(agent.disperse_until, Some(150));
            assert_eq!(agent.mode(), BehaviorMode::Idle);
        }
        assert_eq!(fleet.remove_group(&red).unwrap(), 4);
        assert_eq!(fleet.population(), 0);
        assert_eq!(fleet.group_count(), 0);
        assert!(fleet.remove_group(&red).is_err());
    }

    #[test]
    fn views_cover_every_agent() {
        let fleet = fleet();
        fleet.spawn(&SpawnParams::default().in_group("Red").named("Ada")).unwrap();
        fleet.spawn(&SpawnParams::default()).unwrap();
        let views = fleet.agent_views();
        assert_eq!(views.len(), 2);
        assert!(views.iter().any(|v| v.name == "Ada"));
        assert_eq!(fleet.group_views().first().map(|g| g.size), Some(1));
    }
}
