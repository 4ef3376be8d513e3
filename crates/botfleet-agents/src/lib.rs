//! Per-agent decision logic for the botfleet decision core.
//!
//! This crate holds everything that decides what a single agent does on an
//! AI pass. It operates on agent state and the world seams from
//! `botfleet-world` and performs no I/O. The registry, the tick loop and
//! the operator controls live in `botfleet-core`.
//!
//! # Modules
//!
//! - [`agent`] -- The per-agent record and spawn parameters ([`Agent`], [`SpawnParams`])
//! - [`behavior`] -- Priority behavior table and scheduler ([`BehaviorScheduler`])
//! - [`config`] -- Tunables for behavior, positioning and construction ([`AgentTuning`])
//! - [`construction`] -- Obstacle traversal planning ([`ObstacleTraversalPlanner`])
//! - [`error`] -- Error types for agent operations ([`AgentError`])
//! - [`positioning`] -- Follow-target and pace computation ([`PositioningEngine`])
//! - [`relationship`] -- Group and player relationships ([`RelationshipGraph`])
//! - [`seed`] -- Identity-derived seeds and tick buckets

pub mod agent;
pub mod behavior;
pub mod config;
pub mod construction;
pub mod error;
pub mod positioning;
pub mod relationship;
pub mod seed;

// Re-export primary types at crate root for convenience.
pub use agent::{Agent, AgentView, SpawnParams};
pub use behavior::{AdvanceOutcome, AgentDirectory, Behavior, BehaviorScheduler, TickContext};
pub use config::{AgentTuning, BehaviorConfig, ConstructionConfig, PositioningConfig};
pub use construction::{ConstructionPlan, EngageTrigger, ObstacleTraversalPlanner, PlanAction};
pub use error::AgentError;
pub use positioning::{FollowPlan, FollowState, PositioningEngine};
pub use relationship::{AggregateChange, Party, RelationshipEntry, RelationshipGraph};
