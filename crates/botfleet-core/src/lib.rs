//! Fleet registry, tick loop, and orchestration for the botfleet simulation.
//!
//! This crate owns the fleet (agents, groups, relationships) and the tick
//! cycle that advances it: clock, AI pass across a worker pool, and a
//! periodic liveness sweep.
//!
//! # Modules
//!
//! - [`clock`] -- Tick counter with the AI and cleanup cadence.
//! - [`config`] -- Configuration loading from `botfleet-config.yaml` into
//!   strongly-typed structs.
//! - [`fleet`] -- [`Fleet`], the registry plus the relationship graph and
//!   the group-wide commands that touch both.
//! - [`operator`] -- Pause, resume, speed and stop controls.
//! - [`registry`] -- [`FleetRegistry`]: agent and group tables with
//!   per-agent locking.
//! - [`runner`] -- The async loop that drives ticks under operator control.
//! - [`tick`] -- A single tick: physics, sharded AI pass, cleanup.
//!
//! [`Fleet`]: fleet::Fleet
//! [`FleetRegistry`]: registry::FleetRegistry

pub mod clock;
pub mod config;
pub mod fleet;
pub mod operator;
pub mod registry;
pub mod runner;
pub mod tick;

pub use fleet::Fleet;
pub use registry::{AgentCell, FleetRegistry, GroupView, RegistryError};
pub use tick::{SimulatedWorld, SimulationState, TickError, TickSummary, run_tick};
