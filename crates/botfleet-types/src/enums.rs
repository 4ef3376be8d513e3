//! Enumeration types shared across the fleet crates.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Behavior modes
// ---------------------------------------------------------------------------

/// The externally visible behavior an agent is currently running.
///
/// Exactly one mode is active per agent at any time. The scheduler picks
/// it each evaluation from a fixed priority table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorMode {
    /// Standing still, no movement goal.
    #[default]
    Idle,
    /// Staying near a leader.
    Following,
    /// Closing on and striking a hostile target.
    Attacking,
    /// Walking a waypoint loop.
    Patrolling,
    /// Returning to a home position after straying.
    Guarding,
    /// Running away from threats at low health.
    Fleeing,
    /// Spreading out from the group on command.
    Dispersing,
    /// Executing a construction plan to get past an obstacle.
    Climbing,
}

impl BehaviorMode {
    /// All modes, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Idle,
        Self::Following,
        Self::Attacking,
        Self::Patrolling,
        Self::Guarding,
        Self::Fleeing,
        Self::Dispersing,
        Self::Climbing,
    ];

    /// Whether this mode moves the agent away from where it stands.
    pub const fn is_movement_bearing(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl core::fmt::Display for BehaviorMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Following => "following",
            Self::Attacking => "attacking",
            Self::Patrolling => "patrolling",
            Self::Guarding => "guarding",
            Self::Fleeing => "fleeing",
            Self::Dispersing => "dispersing",
            Self::Climbing => "climbing",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// Relationship between two groups, or from a player toward a group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Relationship {
    /// Friendly; never targeted.
    Allied,
    /// The default for any pair without an entry.
    #[default]
    Neutral,
    /// Targeted on sight.
    Hostile,
}

/// Error returned when a relationship name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown relationship: {0}")]
pub struct ParseRelationshipError(pub String);

impl core::str::FromStr for Relationship {
    type Err = ParseRelationshipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "allied" | "ally" => Ok(Self::Allied),
            "neutral" => Ok(Self::Neutral),
            "hostile" | "enemy" => Ok(Self::Hostile),
            other => Err(ParseRelationshipError(other.to_owned())),
        }
    }
}

impl core::fmt::Display for Relationship {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::Allied => "ALLIED",
            Self::Neutral => "NEUTRAL",
            Self::Hostile => "HOSTILE",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Follower classes
// ---------------------------------------------------------------------------

/// How an agent positions itself around its leader.
///
/// Derived from agent identity at creation; one in six agents is a close
/// follower, the rest spread across the group follow radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowerClass {
    /// Stays 2.0 to 3.5 blocks from the leader.
    Close,
    /// Stays between 70% and 90% of the group follow radius.
    Radius,
}

// ---------------------------------------------------------------------------
// Construction strategies
// ---------------------------------------------------------------------------

/// How a construction plan gets an agent past an obstacle.
///
/// Listed in selection priority: when more than one applies, the earliest
/// variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    /// Pillar up out of an enclosure.
    EscapeRoute,
    /// Pillar straight up toward a target overhead.
    VerticalTower,
    /// Rising diagonal steps toward a higher target further away.
    DiagonalStairs,
    /// Level span across missing ground.
    HorizontalBridge,
}

impl core::fmt::Display for PlacementStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::EscapeRoute => "escape_route",
            Self::VerticalTower => "vertical_tower",
            Self::DiagonalStairs => "diagonal_stairs",
            Self::HorizontalBridge => "horizontal_bridge",
        };
        f.write_str(label)
    }
}
