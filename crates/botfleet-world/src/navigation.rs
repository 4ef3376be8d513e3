//! Movement and action collaborators.
//!
//! The decision core never moves an agent or edits terrain directly. It
//! issues requests through [`NavigationPrimitive`] (where to walk) and
//! [`AgentActions`] (place a block, strike an entity). The host decides
//! how those requests play out.

use botfleet_types::{AgentId, BlockPos, EntityRef, NavigationStatus, Vec3};

/// Path-following service for agents.
///
/// A new `move_to` supersedes any previous request for the same agent.
/// Requests are never cancelled implicitly; the scheduler calls
/// [`NavigationPrimitive::stop`] whenever the running behavior changes.
pub trait NavigationPrimitive: Send + Sync {
    /// Start moving `agent` toward `destination` at `speed` times its base
    /// speed. Returns `false` if the request was rejected outright.
    fn move_to(&self, agent: AgentId, destination: Vec3, speed: f64) -> bool;

    /// Clear any in-flight movement for `agent`.
    fn stop(&self, agent: AgentId);

    /// Current progress of the agent's movement request.
    fn status(&self, agent: AgentId) -> NavigationStatus;

    /// Whether the agent has reached its destination or has none.
    fn is_done(&self, agent: AgentId) -> bool {
        matches!(
            self.status(agent),
            NavigationStatus::Done | NavigationStatus::Idle
        )
    }

    /// Whether the agent failed to make progress on its last step.
    fn is_stuck(&self, agent: AgentId) -> bool {
        self.status(agent) == NavigationStatus::Stuck
    }

    /// The waypoints of the agent's current path, if one is active.
    fn current_path(&self, agent: AgentId) -> Option<Vec<Vec3>>;

    /// The destination of the agent's current request, if any.
    fn destination(&self, agent: AgentId) -> Option<Vec3>;
}

/// World-changing actions an agent may perform.
pub trait AgentActions: Send + Sync {
    /// Place one building block at `pos`. Returns `false` if the placement
    /// was refused (occupied cell, no support, out of reach).
    fn place_block(&self, agent: AgentId, pos: BlockPos) -> bool;

    /// Strike `target` once. Returns `false` if the target is out of reach
    /// or no longer alive.
    fn strike(&self, agent: AgentId, target: EntityRef) -> bool;
}
