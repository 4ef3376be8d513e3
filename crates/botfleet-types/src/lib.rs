//! Shared type definitions for the botfleet decision core.
//!
//! This crate is the single source of truth for the identifiers, enums and
//! geometry used across the workspace. It has no behavior of its own.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifiers for agents, players and groups
//! - [`enums`] -- Behavior modes, relationships, follower classes, placement
//!   strategies
//! - [`geometry`] -- Continuous [`Vec3`] points and integer [`BlockPos`] cells
//! - [`structs`] -- Entity snapshots and navigation status reported by the world

pub mod enums;
pub mod geometry;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    BehaviorMode, FollowerClass, ParseRelationshipError, PlacementStrategy, Relationship,
};
pub use geometry::{BlockPos, FACE_NEIGHBORS, LATERAL_DIRECTIONS, Vec3};
pub use ids::{AgentId, EntityRef, GroupName, PlayerId};
pub use structs::{EntitySnapshot, NavigationStatus};
