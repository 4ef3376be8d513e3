//! Type-safe identifiers for fleet entities.
//!
//! Agents and players are identified by UUID newtypes so the two can never
//! be mixed at compile time. Agent IDs use UUID v7 (time-ordered), which
//! keeps registry iteration roughly in spawn order.
//!
//! Groups are identified by name. A [`GroupName`] is the only handle an
//! agent holds to its group; the group itself is owned by the registry.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }

            /// Return the raw bytes of the identifier.
            pub const fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a bot agent managed by the fleet.
    AgentId
}

define_id! {
    /// Unique identifier for an external actor (a human player).
    PlayerId
}

/// Name of a group of agents.
///
/// Groups are created implicitly when the first agent joins a name and
/// deleted when the last member leaves. Relationships are keyed by name,
/// so they survive a group being emptied and later re-populated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(String);

impl GroupName {
    /// Create a group name from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for GroupName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupName {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for GroupName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A reference to any entity the core can reason about: one of its own
/// agents or an external player.
///
/// Leaders and attack targets are stored as `EntityRef` and resolved
/// lazily through the world each tick. A reference that no longer
/// resolves is treated as "not found", never as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    /// A bot agent in the fleet.
    Agent(AgentId),
    /// An external player.
    Player(PlayerId),
}

impl EntityRef {
    /// Return the agent id if this reference points at an agent.
    pub const fn as_agent(self) -> Option<AgentId> {
        match self {
            Self::Agent(id) => Some(id),
            Self::Player(_) => None,
        }
    }

    /// Return the player id if this reference points at a player.
    pub const fn as_player(self) -> Option<PlayerId> {
        match self {
            Self::Player(id) => Some(id),
            Self::Agent(_) => None,
        }
    }
}

impl core::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Agent(id) => write!(f, "agent:{id}"),
            Self::Player(id) => write!(f, "player:{id}"),
        }
    }
}

impl From<AgentId> for EntityRef {
    fn from(id: AgentId) -> Self {
        Self::Agent(id)
    }
}

impl From<PlayerId> for EntityRef {
    fn from(id: PlayerId) -> Self {
        Self::Player(id)
    }
}
