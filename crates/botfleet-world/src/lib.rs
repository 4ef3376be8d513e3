//! World collaborators for the botfleet decision core.
//!
//! The decision core does not own terrain, physics or pathfinding. It talks
//! to them through the traits defined here. This crate also ships
//! [`SimWorld`], an in-memory voxel world that implements all of them, so
//! the core can be exercised without an external game server.
//!
//! # Modules
//!
//! - [`error`] -- Error types for world editing.
//! - [`query`] -- [`WorldQuery`]: solidity, ground-finding, line of sight
//!   and entity lookup.
//! - [`navigation`] -- [`NavigationPrimitive`] (move, stop, progress) and
//!   [`AgentActions`] (block placement, strikes).
//! - [`sim`] -- [`SimWorld`], the in-memory implementation with simple
//!   walking physics.
//! - [`starting_arena`] -- Demonstration arena with a pit, a cliff and a
//!   chasm.

pub mod error;
pub mod navigation;
pub mod query;
pub mod sim;
pub mod starting_arena;

// Re-export primary types at crate root.
pub use error::WorldError;
pub use navigation::{AgentActions, NavigationPrimitive};
pub use query::WorldQuery;
pub use sim::SimWorld;
pub use starting_arena::{ArenaLandmarks, create_demo_arena};
