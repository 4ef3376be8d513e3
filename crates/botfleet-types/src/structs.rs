//! Plain data records exchanged between the world and the decision core.

use serde::{Deserialize, Serialize};

use crate::geometry::Vec3;
use crate::ids::EntityRef;

/// A point-in-time view of an entity as reported by the world.
///
/// The decision core never stores these; it asks the world for a fresh
/// snapshot whenever it needs an entity's position or health.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Which entity this is.
    pub entity: EntityRef,
    /// Feet position.
    pub position: Vec3,
    /// Current health points.
    pub health: f64,
    /// Maximum health points.
    pub max_health: f64,
    /// Whether the entity is alive and loaded.
    pub alive: bool,
}

impl EntitySnapshot {
    /// Current health as a fraction of maximum, clamped to `[0, 1]`.
    ///
    /// An entity with a non-positive maximum is reported as fully healthy.
    pub fn health_fraction(&self) -> f64 {
        if self.max_health <= 0.0 {
            return 1.0;
        }
        (self.health / self.max_health).clamp(0.0, 1.0)
    }
}

/// Progress reported by the navigation collaborator for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NavigationStatus {
    /// No destination is set.
    #[default]
    Idle,
    /// Moving toward the destination.
    InProgress,
    /// The destination was reached.
    Done,
    /// No progress was made since the last check.
    Stuck,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::AgentId;

    fn snapshot(health: f64, max_health: f64) -> EntitySnapshot {
        EntitySnapshot {
            entity: EntityRef::Agent(AgentId::new()),
            position: Vec3::ZERO,
            health,
            max_health,
            alive: true,
        }
    }

    #[test]
    fn health_fraction_is_clamped() {
        assert!((snapshot(5.0, 20.0).health_fraction() - 0.25).abs() < 1e-9);
        assert!((snapshot(40.0, 20.0).health_fraction() - 1.0).abs() < 1e-9);
        assert!(snapshot(-3.0, 20.0).health_fraction().abs() < 1e-9);
    }

    #[test]
    fn zero_max_health_counts_as_healthy() {
        assert!((snapshot(0.0, 0.0).health_fraction() - 1.0).abs() < 1e-9);
    }
}
