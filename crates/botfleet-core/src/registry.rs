//! The fleet registry: live agents, groups and the name pool.
//!
//! Agents live in [`AgentCell`]s, each behind its own mutex, so the AI pass
//! can advance many agents in parallel without any agent's step waiting on
//! another's. The registry's own tables are guarded by two `RwLock`s:
//!
//! - the agent table (cells by id plus the set of claimed names), and
//! - the group table (groups by name plus an agent-to-group membership
//!   index that serves cross-agent lookups during the AI pass).
//!
//! # Lock order
//!
//! agent table, then group table, then agent cells. A cell lock is never
//! held while taking either table lock for writing.
//!
//! # Removal
//!
//! [`FleetRegistry::remove`] is idempotent: the first call removes the
//! agent from both tables, releases its name and flags the cell removed;
//! every later call finds nothing and returns `false`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use botfleet_agents::{Agent, AgentDirectory, AgentTuning, SpawnParams};
use botfleet_types::{AgentId, EntityRef, GroupName, Vec3};
use botfleet_world::WorldQuery;

/// Names handed out to unnamed spawns before falling back to `Bot-<n>`.
const NAME_POOL: &[&str] = &[
    "Ash", "Birch", "Cedar", "Dusk", "Ember", "Flint", "Gale", "Hazel", "Iris", "Juniper",
    "Kestrel", "Lark", "Moss", "Nettle", "Onyx", "Pike", "Quill", "Rook", "Sage", "Thorn",
    "Umber", "Vale", "Wren", "Yarrow", "Zephyr",
];

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The population cap has been reached.
    #[error("population cap of {capacity} reached")]
    CapacityExceeded {
        /// The configured cap.
        capacity: usize,
    },

    /// A registry was configured with a zero population cap.
    #[error("population cap must be at least 1")]
    InvalidCapacity,

    /// No live agent has this id.
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    /// No group has this name.
    #[error("group not found: {0}")]
    GroupNotFound(GroupName),

    /// The requested display name is already taken.
    #[error("agent name already in use: {0}")]
    DuplicateName(String),
}

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

/// A live agent slot.
#[derive(Debug)]
pub struct AgentCell {
    id: AgentId,
    name: String,
    removed: AtomicBool,
    state: Mutex<Agent>,
}

impl AgentCell {
    fn new(agent: Agent) -> Self {
        Self {
            id: agent.id,
            name: agent.name.clone(),
            removed: AtomicBool::new(false),
            state: Mutex::new(agent),
        }
    }

    /// The agent's id.
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// The agent's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the agent has been removed from the registry.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Lock the agent state.
    pub fn lock(&self) -> MutexGuard<'_, Agent> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the locked agent state.
    pub fn update<R>(&self, f: impl FnOnce(&mut Agent) -> R) -> R {
        f(&mut self.lock())
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// A named set of agents sharing a leader and follow radius.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Group name.
    pub name: GroupName,
    /// Member ids.
    pub members: BTreeSet<AgentId>,
    /// Who the group follows.
    pub leader: Option<EntityRef>,
    /// Shared follow radius.
    pub follow_radius: f64,
    /// Shared guard position.
    pub home: Option<Vec3>,
}

/// Read-only summary of a group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupView {
    /// Group name.
    pub name: GroupName,
    /// Number of members.
    pub size: usize,
    /// Who the group follows.
    pub leader: Option<EntityRef>,
    /// Shared follow radius.
    pub follow_radius: f64,
}

#[derive(Debug, Default)]
struct AgentTable {
    cells: BTreeMap<AgentId, Arc<AgentCell>>,
    names: BTreeSet<String>,
    fallback_serial: u64,
}

impl AgentTable {
    /// First free pool name, else the next free `Bot-<n>`.
    fn next_name(&mut self) -> String {
        if let Some(name) = NAME_POOL.iter().find(|n| !self.names.contains(**n)) {
            return (*name).to_owned();
        }
        loop {
            self.fallback_serial = self.fallback_serial.saturating_add(1);
            let candidate = format!("Bot-{}", self.fallback_serial);
            if !self.names.contains(&candidate) {
                return candidate;
            }
        }
    }
}

#[derive(Debug, Default)]
struct GroupTable {
    groups: BTreeMap<GroupName, Group>,
    membership: BTreeMap<AgentId, GroupName>,
}

impl GroupTable {
    /// Add `agent` to `name`, creating the group if needed. Returns the
    /// group's shared settings.
    fn join(
        &mut self,
        agent: AgentId,
        name: &GroupName,
        default_radius: f64,
    ) -> (Option<EntityRef>, f64, Option<Vec3>) {
        let group = self.groups.entry(name.clone()).or_insert_with(|| {
            debug!(group = %name, "group created");
            Group {
                name: name.clone(),
                members: BTreeSet::new(),
                leader: None,
                follow_radius: default_radius,
                home: None,
            }
        });
        group.members.insert(agent);
        self.membership.insert(agent, name.clone());
        (group.leader, group.follow_radius, group.home)
    }

    /// Drop `agent` from its group, deleting the group when it empties.
    fn leave(&mut self, agent: AgentId) -> Option<Departure> {
        let name = self.membership.remove(&agent)?;
        let mut orphaned = Vec::new();
        let mut home = None;
        let now_empty = self.groups.get_mut(&name).is_some_and(|group| {
            group.members.remove(&agent);
            if group.leader == Some(EntityRef::Agent(agent)) {
                group.leader = None;
                orphaned.extend(group.members.iter().copied());
            }
            home = group.home;
            group.members.is_empty()
        });
        if now_empty {
            self.groups.remove(&name);
            debug!(group = %name, "group dissolved");
        }
        Some(Departure {
            group: name,
            home,
            orphaned,
        })
    }
}

/// What leaving a group left behind.
#[derive(Debug)]
struct Departure {
    /// The group that was left.
    group: GroupName,
    /// The group's guard position at the time.
    home: Option<Vec3>,
    /// Members whose leader was the departing agent.
    orphaned: Vec<AgentId>,
}

impl Departure {
    /// Cells of the orphaned members that are still registered.
    fn orphaned_cells(&self, agents: &AgentTable) -> Vec<Arc<AgentCell>> {
        self.orphaned
            .iter()
            .filter_map(|m| agents.cells.get(m).cloned())
            .collect()
    }
}

/// Clear the leader of members whose leader just left, and have them
/// re-evaluate on their next pass.
fn release_orphans(orphaned: &[Arc<AgentCell>]) {
    for member in orphaned {
        member.update(|agent| {
            agent.leader = None;
            agent.reevaluate_now = true;
        });
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owns every live agent and group.
#[derive(Debug)]
pub struct FleetRegistry {
    capacity: usize,
    tuning: AgentTuning,
    agents: RwLock<AgentTable>,
    groups: RwLock<GroupTable>,
}

impl FleetRegistry {
    /// Create an empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize, tuning: AgentTuning) -> Result<Self, RegistryError> {
        if capacity == 0 {
            return Err(RegistryError::InvalidCapacity);
        }
        Ok(Self {
            capacity,
            tuning,
            agents: RwLock::new(AgentTable::default()),
            groups: RwLock::new(GroupTable::default()),
        })
    }

    /// Population cap.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tunables every agent is created with.
    pub const fn tuning(&self) -> &AgentTuning {
        &self.tuning
    }

    // -------------------------------------------------------------------
    // Spawn and remove
    // -------------------------------------------------------------------

    /// Register a new agent.
    ///
    /// The agent's world entity is the caller's concern; it must be spawned
    /// under the returned id before the agent's first AI pass.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CapacityExceeded`] at the population cap and
    /// [`RegistryError::DuplicateName`] when an explicit name is taken. No
    /// agent is created in either case.
    pub fn spawn(&self, params: &SpawnParams) -> Result<Arc<AgentCell>, RegistryError> {
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        if agents.cells.len() >= self.capacity {
            warn!(capacity = self.capacity, "spawn refused: population cap reached");
            return Err(RegistryError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let name = match &params.name {
            Some(name) if agents.names.contains(name) => {
                return Err(RegistryError::DuplicateName(name.clone()));
            }
            Some(name) => name.clone(),
            None => agents.next_name(),
        };

        let id = AgentId::new();
        let mut agent = Agent::new(id, name.clone(), &self.tuning);
        agent.apply_params(params);

        if let Some(group) = &params.group {
            let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
            let (leader, radius, home) =
                groups.join(id, group, self.tuning.behavior.default_follow_radius);
            agent.group = Some(group.clone());
            agent.leader = leader;
            agent.follow_radius = radius;
            agent.home = agent.home.or(home);
        }

        let cell = Arc::new(AgentCell::new(agent));
        agents.names.insert(name.clone());
        agents.cells.insert(id, Arc::clone(&cell));
        let population = agents.cells.len();
        drop(agents);

        info!(
            agent_id = %id,
            name = %name,
            group = ?params.group,
            population,
            "agent spawned"
        );
        Ok(cell)
    }

    /// Remove an agent. Returns `false` if it was already gone.
    pub fn remove(&self, id: AgentId) -> bool {
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        let Some(cell) = agents.cells.remove(&id) else {
            return false;
        };
        agents.names.remove(cell.name());
        cell.removed.store(true, Ordering::Release);

        let left = self
            .groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .leave(id);
        let orphaned = left
            .as_ref()
            .map(|departure| departure.orphaned_cells(&agents))
            .unwrap_or_default();
        let population = agents.cells.len();
        drop(agents);

        release_orphans(&orphaned);
        cell.update(|agent| {
            agent.group = None;
            agent.leader = None;
        });

        info!(
            agent_id = %id,
            name = %cell.name(),
            group = ?left.map(|departure| departure.group),
            population,
            "agent removed"
        );
        true
    }

    /// Remove every agent whose world entity is gone or dead.
    ///
    /// Runs through [`remove`](Self::remove), so it is safe to race with
    /// explicit removals. Returns the ids actually removed by this sweep.
    pub fn cleanup(&self, world: &dyn WorldQuery) -> Vec<AgentId> {
        let dead: Vec<AgentId> = self
            .ids()
            .into_iter()
            .filter(|id| {
                world
                    .entity(EntityRef::Agent(*id))
                    .is_none_or(|snapshot| !snapshot.alive)
            })
            .collect();
        let removed: Vec<AgentId> = dead.into_iter().filter(|id| self.remove(*id)).collect();
        if !removed.is_empty() {
            info!(removed = removed.len(), "cleanup sweep removed dead agents");
        }
        removed
    }

    // -------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------

    /// The cell for a live agent.
    pub fn get(&self, id: AgentId) -> Option<Arc<AgentCell>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cells
            .get(&id)
            .cloned()
    }

    /// Find a live agent by display name.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<AgentCell>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cells
            .values()
            .find(|cell| cell.name() == name)
            .cloned()
    }

    /// Snapshot of every live cell, in id order.
    pub fn cells(&self) -> Vec<Arc<AgentCell>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cells
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of every live agent id.
    pub fn ids(&self) -> Vec<AgentId> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cells
            .keys()
            .copied()
            .collect()
    }

    /// Whether a display name is claimed.
    pub fn is_name_taken(&self, name: &str) -> bool {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .contains(name)
    }

    // -------------------------------------------------------------------
    // Counters
    // -------------------------------------------------------------------

    /// Number of live agents.
    pub fn population(&self) -> usize {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cells
            .len()
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .groups
            .len()
    }

    /// Number of members in a group; zero when the group does not exist.
    pub fn group_size(&self, name: &GroupName) -> usize {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .groups
            .get(name)
            .map_or(0, |group| group.members.len())
    }

    /// Every group name, sorted.
    pub fn group_names(&self) -> Vec<GroupName> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .groups
            .keys()
            .cloned()
            .collect()
    }

    /// A copy of one group's record.
    pub fn group(&self, name: &GroupName) -> Option<Group> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .groups
            .get(name)
            .cloned()
    }

    /// Summaries of every group.
    pub fn group_views(&self) -> Vec<GroupView> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .groups
            .values()
            .map(|group| GroupView {
                name: group.name.clone(),
                size: group.members.len(),
                leader: group.leader,
                follow_radius: group.follow_radius,
            })
            .collect()
    }

    /// Snapshot of a group's member ids.
    pub fn group_members(&self, name: &GroupName) -> Option<Vec<AgentId>> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .groups
            .get(name)
            .map(|group| group.members.iter().copied().collect())
    }

    // -------------------------------------------------------------------
    // Group membership
    // -------------------------------------------------------------------

    /// Move an agent into a group, leaving its current one.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AgentNotFound`] for an unknown agent.
    pub fn join_group(&self, id: AgentId, name: &GroupName) -> Result<(), RegistryError> {
        let agents = self.agents.read().unwrap_or_else(PoisonError::into_inner);
        let cell = agents
            .cells
            .get(&id)
            .cloned()
            .ok_or(RegistryError::AgentNotFound(id))?;

        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        if groups.membership.get(&id) == Some(name) {
            return Ok(());
        }
        let left = groups.leave(id);
        let (leader, radius, home) =
            groups.join(id, name, self.tuning.behavior.default_follow_radius);
        drop(groups);
        let orphaned = left
            .as_ref()
            .map(|departure| departure.orphaned_cells(&agents))
            .unwrap_or_default();
        drop(agents);

        release_orphans(&orphaned);
        let inherited = left.as_ref().and_then(|departure| departure.home);
        cell.update(|agent| {
            agent.group = Some(name.clone());
            agent.leader = leader;
            agent.follow_radius = radius;
            if home.is_some() {
                agent.home = home;
            } else if inherited.is_some() && agent.home == inherited {
                agent.home = None;
            }
            agent.reevaluate_now = true;
        });
        debug!(
            agent_id = %id,
            group = %name,
            from = ?left.map(|departure| departure.group),
            "agent joined group"
        );
        Ok(())
    }

    /// Take an agent out of its group. Returns the group it left.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AgentNotFound`] for an unknown agent.
    pub fn leave_group(&self, id: AgentId) -> Result<Option<GroupName>, RegistryError> {
        let agents = self.agents.read().unwrap_or_else(PoisonError::into_inner);
        let cell = agents
            .cells
            .get(&id)
            .cloned()
            .ok_or(RegistryError::AgentNotFound(id))?;
        let left = self
            .groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .leave(id);
        let orphaned = left
            .as_ref()
            .map(|departure| departure.orphaned_cells(&agents))
            .unwrap_or_default();
        drop(agents);

        release_orphans(&orphaned);
        let inherited = left.as_ref().and_then(|departure| departure.home);
        cell.update(|agent| {
            if inherited.is_some() && agent.home == inherited {
                agent.home = None;
            }
            agent.group = None;
            agent.leader = None;
            agent.hostile = false;
            agent.follow_radius = self.tuning.behavior.default_follow_radius;
            agent.reevaluate_now = true;
        });
        Ok(left.map(|departure| departure.group))
    }

    // -------------------------------------------------------------------
    // Bulk operations
    // -------------------------------------------------------------------

    /// Run `f` on every member of a group.
    ///
    /// The member set is snapshotted first, so `f` may remove agents
    /// (including the one it is given) without disturbing the iteration.
    /// Members removed before their turn are skipped. Returns how many
    /// members `f` ran on.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`] for an unknown group.
    pub fn apply_to_group(
        &self,
        name: &GroupName,
        mut f: impl FnMut(&AgentCell),
    ) -> Result<usize, RegistryError> {
        let members = self
            .group_members(name)
            .ok_or_else(|| RegistryError::GroupNotFound(name.clone()))?;
        let mut applied: usize = 0;
        for id in members {
            if let Some(cell) = self.get(id) {
                f(&cell);
                applied = applied.saturating_add(1);
            }
        }
        Ok(applied)
    }

    /// Change a group's stored settings and push them to every member.
    fn update_group(
        &self,
        name: &GroupName,
        edit: impl FnOnce(&mut Group),
        push: impl Fn(&mut Agent, &Group),
    ) -> Result<usize, RegistryError> {
        let snapshot = {
            let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
            let group = groups
                .groups
                .get_mut(name)
                .ok_or_else(|| RegistryError::GroupNotFound(name.clone()))?;
            edit(group);
            group.clone()
        };
        self.apply_to_group(name, |cell| {
            cell.update(|agent| {
                push(agent, &snapshot);
                agent.reevaluate_now = true;
            });
        })
    }

    /// Set who a group follows.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`] for an unknown group.
    pub fn set_group_leader(
        &self,
        name: &GroupName,
        leader: Option<EntityRef>,
    ) -> Result<usize, RegistryError> {
        info!(group = %name, leader = ?leader, "group leader set");
        self.update_group(
            name,
            |group| group.leader = leader,
            |agent, group| {
                agent.leader = group.leader;
                agent.follow = None;
            },
        )
    }

    /// Set a group's shared follow radius.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`] for an unknown group.
    pub fn set_group_follow_radius(
        &self,
        name: &GroupName,
        radius: f64,
    ) -> Result<usize, RegistryError> {
        let radius = radius.max(0.0);
        self.update_group(
            name,
            |group| group.follow_radius = radius,
            |agent, group| {
                agent.follow_radius = group.follow_radius;
                agent.follow = None;
            },
        )
    }

    /// Set or clear a group's guard position.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`] for an unknown group.
    pub fn set_group_home(
        &self,
        name: &GroupName,
        home: Option<Vec3>,
    ) -> Result<usize, RegistryError> {
        self.update_group(
            name,
            |group| group.home = home,
            |agent, group| {
                agent.home = group.home;
                if agent.is_static {
                    agent.static_anchor = group.home;
                }
            },
        )
    }
}

impl AgentDirectory for FleetRegistry {
    fn group_of(&self, agent: AgentId) -> Option<GroupName> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .membership
            .get(&agent)
            .cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use botfleet_types::{BlockPos, PlayerId};
    use botfleet_world::SimWorld;

    use super::*;

    fn registry(capacity: usize) -> FleetRegistry {
        FleetRegistry::new(capacity, AgentTuning::default()).unwrap()
    }

    fn red() -> GroupName {
        GroupName::from("Red")
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            FleetRegistry::new(0, AgentTuning::default()),
            Err(RegistryError::InvalidCapacity)
        ));
    }

    #[test]
    fn spawn_creates_group_lazily() {
        let reg = registry(10);
        assert_eq!(reg.group_count(), 0);
        let cell = reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        assert_eq!(reg.group_count(), 1);
        assert_eq!(reg.group_size(&red()), 1);
        assert_eq!(reg.group_of(cell.id()), Some(red()));
        assert_eq!(cell.lock().group, Some(red()));
    }

    #[test]
    fn spawn_at_capacity_creates_nothing() {
        let reg = registry(2);
        reg.spawn(&SpawnParams::default()).unwrap();
        reg.spawn(&SpawnParams::default()).unwrap();
        let third = reg.spawn(&SpawnParams::default().named("Extra").in_group("Red"));
        assert!(matches!(third, Err(RegistryError::CapacityExceeded { capacity: 2 })));
        assert_eq!(reg.population(), 2);
        assert!(!reg.is_name_taken("Extra"));
        assert_eq!(reg.group_count(), 0);
    }

    #[test]
    fn names_are_unique_and_released_on_removal() {
        let reg = registry(10);
        let first = reg.spawn(&SpawnParams::default().named("Ada")).unwrap();
        let dup = reg.spawn(&SpawnParams::default().named("Ada"));
        assert!(matches!(dup, Err(RegistryError::DuplicateName(_))));
        assert!(reg.remove(first.id()));
        assert!(reg.spawn(&SpawnParams::default().named("Ada")).is_ok());
    }

    #[test]
    fn pool_names_fall_back_to_serials() {
        let reg = registry(NAME_POOL.len() + 3);
        let mut names = BTreeSet::new();
        for _ in 0..NAME_POOL.len() + 2 {
            let cell = reg.spawn(&SpawnParams::default()).unwrap();
            names.insert(cell.name().to_owned());
        }
        assert_eq!(names.len(), NAME_POOL.len() + 2);
        assert!(names.contains("Bot-1"));
        assert!(names.contains("Bot-2"));
    }

    #[test]
    fn double_remove_is_a_no_op() {
        let reg = registry(10);
        let a = reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        let b = reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        assert!(reg.remove(a.id()));
        assert!(a.is_removed());
        assert_eq!(reg.population(), 1);
        assert!(!reg.remove(a.id()));
        assert_eq!(reg.population(), 1);
        assert_eq!(reg.group_size(&red()), 1);
        assert!(reg.remove(b.id()));
        // Last member gone: the group is deleted.
        assert_eq!(reg.group_count(), 0);
        assert!(a.lock().group.is_none());
    }

    #[test]
    fn removing_the_leader_clears_member_leaders() {
        let reg = registry(10);
        let leader = reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        let member = reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        reg.set_group_leader(&red(), Some(EntityRef::Agent(leader.id())))
            .unwrap();
        assert_eq!(member.lock().leader, Some(EntityRef::Agent(leader.id())));
        reg.remove(leader.id());
        assert!(member.lock().leader.is_none());
        assert!(reg.group(&red()).unwrap().leader.is_none());
    }

    #[test]
    fn apply_to_group_tolerates_removal_during_iteration() {
        let reg = registry(10);
        for _ in 0..5 {
            reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        }
        let applied = reg
            .apply_to_group(&red(), |cell| {
                reg.remove(cell.id());
            })
            .unwrap();
        assert_eq!(applied, 5);
        assert_eq!(reg.population(), 0);
        assert!(matches!(
            reg.apply_to_group(&red(), |_| {}),
            Err(RegistryError::GroupNotFound(_))
        ));
    }

    #[test]
    fn join_and_leave_move_membership() {
        let reg = registry(10);
        let cell = reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        let blue = GroupName::from("Blue");
        reg.set_group_follow_radius(&red(), 12.0).unwrap();
        reg.spawn(&SpawnParams::default().in_group("Blue")).unwrap();
        reg.set_group_follow_radius(&blue, 5.0).unwrap();

        reg.join_group(cell.id(), &blue).unwrap();
        assert_eq!(reg.group_count(), 1);
        assert_eq!(reg.group_size(&blue), 2);
        assert!((cell.lock().follow_radius - 5.0).abs() < f64::EPSILON);

        assert_eq!(reg.leave_group(cell.id()).unwrap(), Some(blue.clone()));
        assert_eq!(reg.group_size(&blue), 1);
        assert!(cell.lock().group.is_none());
        assert!(matches!(
            reg.join_group(AgentId::new(), &blue),
            Err(RegistryError::AgentNotFound(_))
        ));
    }

    #[test]
    fn group_settings_reach_members() {
        let reg = registry(10);
        let cell = reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        let player = EntityRef::Player(PlayerId::new());
        let home = Vec3::new(3.5, 1.0, 3.5);
        assert_eq!(reg.set_group_leader(&red(), Some(player)).unwrap(), 1);
        reg.set_group_home(&red(), Some(home)).unwrap();
        let agent = cell.lock();
        assert_eq!(agent.leader, Some(player));
        assert_eq!(agent.home, Some(home));
        drop(agent);

        // Late joiners inherit the settings.
        let late = reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        assert_eq!(late.lock().leader, Some(player));
        assert_eq!(late.lock().home, Some(home));
    }

    #[test]
    fn members_of_a_departing_leader_reevaluate() {
        let reg = registry(10);
        let blue = GroupName::from("Blue");
        let first = reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        let member = reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();

        reg.set_group_leader(&red(), Some(EntityRef::Agent(first.id()))).unwrap();
        member.update(|agent| agent.reevaluate_now = false);
        reg.leave_group(first.id()).unwrap();
        assert_eq!(member.lock().leader, None);
        assert!(member.lock().reevaluate_now);

        let second = reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        reg.set_group_leader(&red(), Some(EntityRef::Agent(second.id()))).unwrap();
        member.update(|agent| agent.reevaluate_now = false);
        reg.join_group(second.id(), &blue).unwrap();
        assert_eq!(member.lock().leader, None);
        assert!(member.lock().reevaluate_now);
    }

    #[test]
    fn leaving_drops_the_group_home_but_not_an_own_one() {
        let reg = registry(10);
        let blue = GroupName::from("Blue");
        let group_home = Vec3::new(3.5, 1.0, 3.5);
        let own_home = Vec3::new(-7.5, 1.0, 2.5);
        let inherits = reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        let switches = reg.spawn(&SpawnParams::default().in_group("Red")).unwrap();
        let keeps = reg
            .spawn(
                &SpawnParams {
                    home: Some(own_home),
                    ..SpawnParams::default()
                }
                .in_group("Red"),
            )
            .unwrap();
        reg.set_group_home(&red(), Some(group_home)).unwrap();
        // Setting the group home overrides every member's, so restore one.
        keeps.update(|agent| agent.home = Some(own_home));

        reg.leave_group(inherits.id()).unwrap();
        assert_eq!(inherits.lock().home, None);

        reg.join_group(switches.id(), &blue).unwrap();
        assert_eq!(switches.lock().home, None);

        reg.leave_group(keeps.id()).unwrap();
        assert_eq!(keeps.lock().home, Some(own_home));
    }

    #[test]
    fn cleanup_removes_dead_and_missing_agents() {
        let reg = registry(10);
        let world = SimWorld::new();
        world
            .fill(BlockPos::new(-5, 0, -5), BlockPos::new(5, 0, 5))
            .unwrap();
        let alive = reg.spawn(&SpawnParams::default()).unwrap();
        let dead = reg.spawn(&SpawnParams::default()).unwrap();
        let missing = reg.spawn(&SpawnParams::default()).unwrap();
        for cell in [&alive, &dead] {
            world
                .spawn_entity(EntityRef::Agent(cell.id()), Vec3::new(0.5, 1.0, 0.5), 20.0)
                .unwrap();
        }
        world.kill(EntityRef::Agent(dead.id())).unwrap();

        let removed = reg.cleanup(&world);
        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&dead.id()));
        assert!(removed.contains(&missing.id()));
        assert_eq!(reg.ids(), vec![alive.id()]);
        // A second sweep finds nothing new.
        assert!(reg.cleanup(&world).is_empty());
    }
}
