//! Error types for the botfleet-agents crate.
//!
//! Expected absence (a leader that left, a target that died) is never an
//! error here; it makes the dependent behavior ineligible instead. These
//! variants cover the cases the scheduler boundary logs and moves past.

use botfleet_types::AgentId;

/// Errors that can occur while advancing or configuring an agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The world has no entity for this agent.
    #[error("agent {0} has no entity in the world")]
    MissingEntity(AgentId),

    /// The agent was removed from the fleet while a worker still held it.
    #[error("agent {0} was removed")]
    Removed(AgentId),

    /// A tunable was outside its allowed range.
    #[error("invalid configuration: {field} = {value} ({reason})")]
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value, formatted.
        value: String,
        /// Why the value was rejected.
        reason: &'static str,
    },

    /// The world refused a navigation request.
    #[error("navigation refused for agent {agent} toward {destination}")]
    NavigationRefused {
        /// The agent that asked to move.
        agent: AgentId,
        /// Where it asked to go, formatted.
        destination: String,
    },
}
