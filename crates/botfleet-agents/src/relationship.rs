//! Relationship graph between groups and players.
//!
//! Group-to-group relationships are symmetric: setting A hostile to B also
//! sets B hostile to A, in one write, so no reader ever sees half of the
//! pair. Player-to-group relationships are one-directional. A group is
//! always allied with itself and any pair without an entry is neutral.
//!
//! Each group also has an *aggregate hostile flag*: true if it has any
//! HOSTILE entry, toward another group or from any player. Setters return
//! the groups whose flag changed so the caller can push the new value to
//! every live member. Agents read the flag instead of querying the graph
//! every tick.
//!
//! # Invariants
//!
//! - `get_group_relationship(a, b) == get_group_relationship(b, a)`.
//! - `get_group_relationship(g, g) == Allied`.
//! - Setting NEUTRAL removes the entry.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info};

use botfleet_types::{EntityRef, GroupName, PlayerId, Relationship};

/// A group whose aggregate hostile flag changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateChange {
    /// The group.
    pub group: GroupName,
    /// Its new flag value.
    pub hostile: bool,
}

/// The party on the subject side of a relationship entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Party {
    /// A group of agents.
    Group(GroupName),
    /// An external player.
    Player(PlayerId),
}

/// One stored relationship, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipEntry {
    /// Subject of the relationship.
    pub from: Party,
    /// The group it applies to.
    pub to: GroupName,
    /// The stored value.
    pub relationship: Relationship,
}

#[derive(Debug, Default)]
struct Tables {
    groups: BTreeMap<(GroupName, GroupName), Relationship>,
    players: BTreeMap<(PlayerId, GroupName), Relationship>,
}

impl Tables {
    fn aggregate(&self, group: &GroupName) -> bool {
        self.groups
            .iter()
            .any(|((a, _), rel)| a == group && *rel == Relationship::Hostile)
            || self
                .players
                .iter()
                .any(|((_, g), rel)| g == group && *rel == Relationship::Hostile)
    }
}

/// Concurrent relationship store. Reads vastly outnumber writes.
#[derive(Debug, Default)]
pub struct RelationshipGraph {
    tables: RwLock<Tables>,
}

impl RelationshipGraph {
    /// Create an empty graph; every pair starts neutral.
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------
    // Group to group
    // -------------------------------------------------------------------

    /// Set the relationship between two groups, symmetrically.
    ///
    /// Returns the groups whose aggregate hostile flag changed. Setting a
    /// group's relationship with itself is ignored.
    pub fn set_group_relationship(
        &self,
        a: &GroupName,
        b: &GroupName,
        relationship: Relationship,
    ) -> Vec<AggregateChange> {
        if a == b {
            debug!(group = %a, %relationship, "ignoring relationship of a group with itself");
            return Vec::new();
        }
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let before = (tables.aggregate(a), tables.aggregate(b));
        if relationship == Relationship::Neutral {
            tables.groups.remove(&(a.clone(), b.clone()));
            tables.groups.remove(&(b.clone(), a.clone()));
        } else {
            tables.groups.insert((a.clone(), b.clone()), relationship);
            tables.groups.insert((b.clone(), a.clone()), relationship);
        }
        let after = (tables.aggregate(a), tables.aggregate(b));
        drop(tables);

        info!(group_a = %a, group_b = %b, %relationship, "group relationship set");
        let mut changes = Vec::new();
        if before.0 != after.0 {
            changes.push(AggregateChange {
                group: a.clone(),
                hostile: after.0,
            });
        }
        if before.1 != after.1 {
            changes.push(AggregateChange {
                group: b.clone(),
                hostile: after.1,
            });
        }
        changes
    }

    /// Relationship between two groups: allied with itself, neutral when
    /// nothing is stored.
    pub fn get_group_relationship(&self, a: &GroupName, b: &GroupName) -> Relationship {
        if a == b {
            return Relationship::Allied;
        }
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .groups
            .get(&(a.clone(), b.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// Whether two groups are hostile to each other.
    pub fn is_group_hostile(&self, a: &GroupName, b: &GroupName) -> bool {
        self.get_group_relationship(a, b) == Relationship::Hostile
    }

    /// Every group `group` is hostile to.
    pub fn hostile_groups_of(&self, group: &GroupName) -> Vec<GroupName> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .groups
            .iter()
            .filter(|((a, _), rel)| a == group && **rel == Relationship::Hostile)
            .map(|((_, b), _)| b.clone())
            .collect()
    }

    // -------------------------------------------------------------------
    // Player to group
    // -------------------------------------------------------------------

    /// Set how a player stands toward a group. One-directional.
    ///
    /// Returns the group if its aggregate hostile flag changed.
    pub fn set_player_relationship(
        &self,
        player: PlayerId,
        group: &GroupName,
        relationship: Relationship,
    ) -> Option<AggregateChange> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let before = tables.aggregate(group);
        let key = (player, group.clone());
        if relationship == Relationship::Neutral {
            tables.players.remove(&key);
        } else {
            tables.players.insert(key, relationship);
        }
        let after = tables.aggregate(group);
        drop(tables);

        info!(%player, %group, %relationship, "player relationship set");
        (before != after).then(|| AggregateChange {
            group: group.clone(),
            hostile: after,
        })
    }

    /// How a player stands toward a group.
    pub fn get_player_relationship(&self, player: PlayerId, group: &GroupName) -> Relationship {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .players
            .get(&(player, group.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// Whether a player is hostile to a group.
    pub fn is_player_hostile(&self, player: PlayerId, group: &GroupName) -> bool {
        self.get_player_relationship(player, group) == Relationship::Hostile
    }

    // -------------------------------------------------------------------
    // Aggregates and lookups
    // -------------------------------------------------------------------

    /// The aggregate hostile flag for a group.
    pub fn aggregate_hostile(&self, group: &GroupName) -> bool {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .aggregate(group)
    }

    /// How `group` stands toward an arbitrary entity.
    ///
    /// Players use the player table. Agents use their group's relationship;
    /// an agent with no group is neutral to everyone.
    pub fn relationship_of_entity(
        &self,
        group: &GroupName,
        entity: EntityRef,
        entity_group: Option<&GroupName>,
    ) -> Relationship {
        match entity {
            EntityRef::Player(player) => self.get_player_relationship(player, group),
            EntityRef::Agent(_) => entity_group.map_or(Relationship::Neutral, |other| {
                self.get_group_relationship(group, other)
            }),
        }
    }

    /// Every stored entry, groups first.
    pub fn entries(&self) -> Vec<RelationshipEntry> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let groups = tables.groups.iter().map(|((a, b), rel)| RelationshipEntry {
            from: Party::Group(a.clone()),
            to: b.clone(),
            relationship: *rel,
        });
        let players = tables.players.iter().map(|((p, g), rel)| RelationshipEntry {
            from: Party::Player(*p),
            to: g.clone(),
            relationship: *rel,
        });
        groups.chain(players).collect()
    }
}

#[cfg(test)]
mod tests {
    use botfleet_types::AgentId;

    use super::*;

    fn red() -> GroupName {
        GroupName::from("Red")
    }

    fn blue() -> GroupName {
        GroupName::from("Blue")
    }

    #[test]
    fn group_relationships_are_symmetric() {
        let graph = RelationshipGraph::new();
        graph.set_group_relationship(&red(), &blue(), Relationship::Hostile);
        assert_eq!(graph.get_group_relationship(&blue(), &red()), Relationship::Hostile);
        assert!(graph.is_group_hostile(&red(), &blue()));
    }

    #[test]
    fn group_is_always_allied_with_itself() {
        let graph = RelationshipGraph::new();
        let changes = graph.set_group_relationship(&red(), &red(), Relationship::Hostile);
        assert!(changes.is_empty());
        assert_eq!(graph.get_group_relationship(&red(), &red()), Relationship::Allied);
        assert!(!graph.aggregate_hostile(&red()));
    }

    #[test]
    fn missing_entries_are_neutral() {
        let graph = RelationshipGraph::new();
        assert_eq!(graph.get_group_relationship(&red(), &blue()), Relationship::Neutral);
        assert_eq!(
            graph.get_player_relationship(PlayerId::new(), &red()),
            Relationship::Neutral
        );
    }

    #[test]
    fn hostility_reports_both_groups_once() {
        let graph = RelationshipGraph::new();
        let first = graph.set_group_relationship(&red(), &blue(), Relationship::Hostile);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|c| c.hostile));
        // Setting the same value again changes nothing.
        let again = graph.set_group_relationship(&blue(), &red(), Relationship::Hostile);
        assert!(again.is_empty());
        // Clearing it flips both back.
        let cleared = graph.set_group_relationship(&red(), &blue(), Relationship::Neutral);
        assert_eq!(cleared.len(), 2);
        assert!(cleared.iter().all(|c| !c.hostile));
        assert!(graph.entries().is_empty());
    }

    #[test]
    fn player_relationships_are_one_directional() {
        let graph = RelationshipGraph::new();
        let player = PlayerId::new();
        let change = graph.set_player_relationship(player, &red(), Relationship::Hostile);
        assert_eq!(
            change,
            Some(AggregateChange {
                group: red(),
                hostile: true
            })
        );
        assert!(graph.is_player_hostile(player, &red()));
        assert!(!graph.is_player_hostile(player, &blue()));
        assert!(graph.aggregate_hostile(&red()));
        assert!(!graph.aggregate_hostile(&blue()));
    }

    #[test]
    fn aggregate_stays_true_while_any_hostility_remains() {
        let graph = RelationshipGraph::new();
        let green = GroupName::from("Green");
        graph.set_group_relationship(&red(), &blue(), Relationship::Hostile);
        graph.set_group_relationship(&red(), &green, Relationship::Hostile);
        let changes = graph.set_group_relationship(&red(), &blue(), Relationship::Allied);
        // Red is still at war with Green; only Blue calms down.
        assert_eq!(
            changes,
            vec![AggregateChange {
                group: blue(),
                hostile: false
            }]
        );
        assert_eq!(graph.hostile_groups_of(&red()), vec![green]);
    }

    #[test]
    fn entity_relationship_uses_the_right_table() {
        let graph = RelationshipGraph::new();
        let player = PlayerId::new();
        graph.set_player_relationship(player, &red(), Relationship::Hostile);
        graph.set_group_relationship(&red(), &blue(), Relationship::Allied);

        let agent = EntityRef::Agent(AgentId::new());
        assert_eq!(
            graph.relationship_of_entity(&red(), EntityRef::Player(player), None),
            Relationship::Hostile
        );
        assert_eq!(
            graph.relationship_of_entity(&red(), agent, Some(&blue())),
            Relationship::Allied
        );
        assert_eq!(
            graph.relationship_of_entity(&red(), agent, Some(&red())),
            Relationship::Allied
        );
        assert_eq!(
            graph.relationship_of_entity(&red(), agent, None),
            Relationship::Neutral
        );
    }
}
