//! Core entity structs for the civilization state.
//!
//! These are the shapes the store hands out and the orchestrator reasons
//! about. Mutation always goes through the store API; nothing here writes to
//! disk on its own.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{EventType, GoalStatus};
use crate::ids::{AgentId, VillageId};

/// Item name to held quantity, as reported by the world connection.
pub type Inventory = BTreeMap<String, u32>;

/// Default dimension for agents whose dimension has not been reported.
pub const DEFAULT_DIMENSION: &str = "overworld";

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A continuous world position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// East/west axis.
    pub x: f64,
    /// Vertical axis.
    pub y: f64,
    /// North/south axis.
    pub z: f64,
}

impl Position {
    /// Create a position from its three coordinates.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Distance on the ground plane (x, z), ignoring height.
    pub fn planar_distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.z - other.z)
    }

    /// Full 3D distance.
    pub fn distance(&self, other: &Self) -> f64 {
        let dy = self.y - other.y;
        self.planar_distance(other).hypot(dy)
    }

    /// The block containing this position.
    pub fn block(&self) -> BlockPos {
        BlockPos::from_floor(self)
    }
}

/// An integer block coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    /// East/west axis.
    pub x: i32,
    /// Vertical axis.
    pub y: i32,
    /// North/south axis.
    pub z: i32,
}

impl BlockPos {
    /// Create a block position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The block containing a continuous position.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_floor(pos: &Position) -> Self {
        Self {
            x: pos.x.floor() as i32,
            y: pos.y.floor() as i32,
            z: pos.z.floor() as i32,
        }
    }

    /// Offset by the given deltas, saturating at the coordinate bounds.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
            z: self.z.saturating_add(dz),
        }
    }

    /// The centre of this block as a continuous position.
    pub fn center(self) -> Position {
        Position::new(
            f64::from(self.x) + 0.5,
            f64::from(self.y),
            f64::from(self.z) + 0.5,
        )
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Vital statistics reported by the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    /// Health points (0-20 on a vanilla server).
    pub health: f64,
    /// Food points (0-20).
    pub food: i64,
    /// Experience level.
    pub level: i64,
    /// Total experience points.
    pub experience: i64,
}

impl Default for AgentStats {
    fn default() -> Self {
        Self {
            health: 20.0,
            food: 20,
            level: 0,
            experience: 0,
        }
    }
}

/// A persisted agent (bot) identity with its last known state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identifier.
    pub id: AgentId,
    /// Unique display name.
    pub name: String,
    /// Username used on the world server.
    pub username: String,
    /// When the row was first created.
    pub created_at: DateTime<Utc>,
    /// Last time the agent's runtime touched the row.
    pub last_active: DateTime<Utc>,
    /// Last known position, if the agent has ever reported one.
    pub position: Option<Position>,
    /// Dimension the position refers to.
    pub dimension: String,
    /// Last reported vitals.
    pub stats: AgentStats,
}

// ---------------------------------------------------------------------------
// Personality
// ---------------------------------------------------------------------------

/// Eight bounded behavioural traits, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Personality {
    /// Drive to explore and learn.
    pub curiosity: f64,
    /// Desire for interaction versus solitude.
    pub sociability: f64,
    /// Drive to build and accumulate.
    pub ambition: f64,
    /// Tendency toward conflict.
    pub aggression: f64,
    /// Care for other agents.
    pub empathy: f64,
    /// Preference for novel building.
    pub creativity: f64,
    /// Willingness to take uncertain actions.
    pub risk_tolerance: f64,
    /// Preference for productive work versus rest.
    pub work_ethic: f64,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            curiosity: 0.5,
            sociability: 0.5,
            ambition: 0.5,
            aggression: 0.3,
            empathy: 0.5,
            creativity: 0.5,
            risk_tolerance: 0.5,
            work_ethic: 0.5,
        }
    }
}

impl Personality {
    /// Return a copy with every trait clamped into `[0, 1]`.
    ///
    /// `NaN` traits fall back to the default value for that trait.
    #[must_use]
    pub fn clamped(self) -> Self {
        let d = Self::default();
        Self {
            curiosity: clamp_unit(self.curiosity, d.curiosity),
            sociability: clamp_unit(self.sociability, d.sociability),
            ambition: clamp_unit(self.ambition, d.ambition),
            aggression: clamp_unit(self.aggression, d.aggression),
            empathy: clamp_unit(self.empathy, d.empathy),
            creativity: clamp_unit(self.creativity, d.creativity),
            risk_tolerance: clamp_unit(self.risk_tolerance, d.risk_tolerance),
            work_ethic: clamp_unit(self.work_ethic, d.work_ethic),
        }
    }
}

fn clamp_unit(value: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Emotions and memories
// ---------------------------------------------------------------------------

/// Emotion levels, nominally in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Emotions {
    /// How hungry the agent is.
    pub hunger: f64,
    /// How safe the agent feels.
    pub safety: f64,
    /// Need for company.
    pub loneliness: f64,
    /// Need for novelty.
    pub boredom: f64,
    /// Momentary curiosity.
    pub curiosity: f64,
    /// General contentment.
    pub satisfaction: f64,
    /// Accumulated stress.
    pub stress: f64,
}

impl Default for Emotions {
    fn default() -> Self {
        Self {
            hunger: 0.0,
            safety: 1.0,
            loneliness: 0.0,
            boredom: 0.0,
            curiosity: 0.5,
            satisfaction: 0.5,
            stress: 0.0,
        }
    }
}

/// An immutable, timestamped emotion reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSnapshot {
    /// Row id.
    pub id: i64,
    /// Owning agent.
    pub agent_id: AgentId,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
    /// The emotion levels.
    pub emotions: Emotions,
}

/// Well-known memory type tags.
pub mod memory_types {
    /// A chat message heard in the world.
    pub const CHAT: &str = "chat";
    /// The outcome of an action the agent performed.
    pub const ACTION: &str = "action";
    /// A dangerous situation (low health, attack).
    pub const DANGER: &str = "danger";
    /// The agent died.
    pub const DEATH: &str = "death";
    /// A social interaction with another agent.
    pub const SOCIAL: &str = "social";
}

/// An append-only memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Row id.
    pub id: i64,
    /// Owning agent.
    pub agent_id: AgentId,
    /// When the memory was formed.
    pub timestamp: DateTime<Utc>,
    /// Category tag (see [`memory_types`]).
    pub memory_type: String,
    /// Free-text content.
    pub content: String,
    /// Importance in `[0, 1]`.
    pub importance: f64,
    /// Another agent the memory is about, if any.
    pub related_agent_id: Option<AgentId>,
    /// Where it happened, if known.
    pub location: Option<Position>,
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// A directed social edge from `agent_id` towards `other_agent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source agent.
    pub agent_id: AgentId,
    /// Target agent.
    pub other_agent_id: AgentId,
    /// Accumulated liking, clamped to `[-1, 1]`.
    pub affinity: f64,
    /// Accumulated trust, clamped to `[-1, 1]`.
    pub trust: f64,
    /// Time of the most recent update.
    pub last_interaction: Option<DateTime<Utc>>,
    /// Number of updates applied to this edge.
    pub interaction_count: i64,
}

// ---------------------------------------------------------------------------
// Villages
// ---------------------------------------------------------------------------

/// A settlement with a spatial footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Village {
    /// Stable identifier.
    pub id: VillageId,
    /// Display name.
    pub name: String,
    /// When the village was founded.
    pub founded_at: DateTime<Utc>,
    /// Spatial centre.
    pub center: Position,
    /// Footprint radius around the centre.
    pub radius: f64,
    /// Cached live membership count.
    pub population: i64,
    /// Culture tag (`generic` by default).
    pub culture: String,
}

impl Village {
    /// Whether a point lies strictly inside the village footprint (planar).
    pub fn contains(&self, point: &Position) -> bool {
        self.center.planar_distance(point) < self.radius
    }
}

/// One agent's membership in one village.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VillageMember {
    /// The village.
    pub village_id: VillageId,
    /// The member agent.
    pub agent_id: AgentId,
    /// The member's display name.
    pub agent_name: String,
    /// When the agent joined.
    pub joined_at: DateTime<Utc>,
    /// Role within the village (`citizen` by default).
    pub role: String,
    /// Accumulated contribution score.
    pub contribution_score: f64,
}

// ---------------------------------------------------------------------------
// Events and goals
// ---------------------------------------------------------------------------

/// An immutable entry in the global audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Row id.
    pub id: i64,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Event category.
    pub event_type: EventType,
    /// Human-readable description.
    pub description: String,
    /// Agent involved, if any (nulled if the agent is later deleted).
    pub agent_id: Option<AgentId>,
    /// Village involved, if any.
    pub village_id: Option<VillageId>,
    /// Structured payload.
    pub metadata: Option<serde_json::Value>,
}

/// A per-agent task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Row id.
    pub id: i64,
    /// Owning agent.
    pub agent_id: AgentId,
    /// When the goal was created.
    pub created_at: DateTime<Utc>,
    /// Goal kind; for action-driven goals this is an action name.
    pub goal_type: String,
    /// Free-text description.
    pub description: String,
    /// Priority, higher first.
    pub priority: f64,
    /// Lifecycle state.
    pub status: GoalStatus,
    /// When the goal was completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Structured parameters.
    pub metadata: Option<serde_json::Value>,
}

/// A point-in-time copy of an agent's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    /// Row id.
    pub id: i64,
    /// Owning agent.
    pub agent_id: AgentId,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Item counts.
    pub items: Inventory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_distance_ignores_height() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 100.0, 4.0);
        assert!((a.planar_distance(&b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn personality_clamps_out_of_range_traits() {
        let p = Personality {
            curiosity: 1.7,
            aggression: -0.2,
            empathy: f64::NAN,
            ..Personality::default()
        }
        .clamped();
        assert!((p.curiosity - 1.0).abs() < f64::EPSILON);
        assert!(p.aggression.abs() < f64::EPSILON);
        assert!((p.empathy - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn personality_deserializes_with_defaults() {
        let p: Personality =
            serde_json::from_str(r#"{"curiosity": 0.9}"#).unwrap_or_default();
        assert!((p.curiosity - 0.9).abs() < f64::EPSILON);
        assert!((p.aggression - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn village_contains_is_strict() {
        let v = Village {
            id: VillageId::new("v"),
            name: "Oakridge".to_owned(),
            founded_at: Utc::now(),
            center: Position::new(0.0, 64.0, 0.0),
            radius: 50.0,
            population: 0,
            culture: "generic".to_owned(),
        };
        assert!(v.contains(&Position::new(30.0, 70.0, 30.0)));
        assert!(!v.contains(&Position::new(50.0, 64.0, 0.0)));
    }

    #[test]
    fn block_from_negative_position_floors() {
        let b = Position::new(-0.5, 64.2, 3.9).block();
        assert_eq!(b, BlockPos::new(-1, 64, 3));
    }
}
