//! Enumeration types shared by the store, the orchestrator and the agents.
//!
//! Every enum here has a stable `snake_case` wire name. The same string is
//! used in serialized JSON and in the `TEXT` columns of the store, so
//! [`as_str`](EventType::as_str) and [`FromStr`] must stay in lockstep.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a wire name does not match any enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct ParseEnumError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Category of an entry in the global event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// An agent connected and was registered in the live set.
    AgentSpawned,
    /// An agent was removed from the live set by the orchestrator.
    AgentRemoved,
    /// An agent died in the world.
    AgentDied,
    /// The world server kicked an agent.
    AgentKicked,
    /// An agent's world connection dropped.
    AgentDisconnected,
    /// A village row was created.
    VillageFounded,
    /// A village has no live members.
    VillageAbandoned,
    /// A spatial cluster of socially bonded agents looks like a new village.
    VillageFormationDetected,
    /// An agent joined a village.
    VillageMemberJoined,
    /// An agent left a village.
    VillageMemberLeft,
    /// An agent finished one of its goals.
    GoalCompleted,
    /// An agent gave up on one of its goals.
    GoalAbandoned,
    /// An agent finished a structure.
    StructureBuilt,
}

impl EventType {
    /// Every variant, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::AgentSpawned,
        Self::AgentRemoved,
        Self::AgentDied,
        Self::AgentKicked,
        Self::AgentDisconnected,
        Self::VillageFounded,
        Self::VillageAbandoned,
        Self::VillageFormationDetected,
        Self::VillageMemberJoined,
        Self::VillageMemberLeft,
        Self::GoalCompleted,
        Self::GoalAbandoned,
        Self::StructureBuilt,
    ];

    /// The stable wire / column name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgentSpawned => "agent_spawned",
            Self::AgentRemoved => "agent_removed",
            Self::AgentDied => "agent_died",
            Self::AgentKicked => "agent_kicked",
            Self::AgentDisconnected => "agent_disconnected",
            Self::VillageFounded => "village_founded",
            Self::VillageAbandoned => "village_abandoned",
            Self::VillageFormationDetected => "village_formation_detected",
            Self::VillageMemberJoined => "village_member_joined",
            Self::VillageMemberLeft => "village_member_left",
            Self::GoalCompleted => "goal_completed",
            Self::GoalAbandoned => "goal_abandoned",
            Self::StructureBuilt => "structure_built",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|et| et.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("event type", s))
    }
}

// ---------------------------------------------------------------------------
// GoalStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a per-agent goal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Still being worked on.
    #[default]
    Active,
    /// Finished successfully.
    Completed,
    /// Given up.
    Abandoned,
}

impl GoalStatus {
    /// The stable wire / column name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoalStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(ParseEnumError::new("goal status", other)),
        }
    }
}
