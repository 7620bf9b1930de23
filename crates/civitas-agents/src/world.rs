//! The world-connection boundary.
//!
//! Civitas never speaks the game protocol itself. A [`Connector`] logs an
//! agent in and returns a [`WorldSession`]: a shared [`WorldConnection`] for
//! commands plus an mpsc receiver of [`WorldEvent`]s. Movement, pathfinding
//! and block interaction all happen on the far side of this trait.
//!
//! The in-process implementation lives in [`crate::sim`].

use std::sync::Arc;

use async_trait::async_trait;
use civitas_types::{BlockPos, Inventory, Position};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::WorldError;

/// Buffer size for per-session event channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Login parameters for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectProfile {
    /// Username to log in with.
    pub username: String,
    /// World server host.
    pub host: String,
    /// World server port.
    pub port: u16,
    /// Protocol / game version string.
    pub version: String,
}

/// A block found by [`WorldConnection::find_block`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block name (`oak_log`, `stone`, ...).
    pub name: String,
    /// Where it is.
    pub position: BlockPos,
}

/// An entity found by [`WorldConnection::find_entity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    /// World-assigned entity id.
    pub id: u64,
    /// Entity name (`cow`, `zombie`, ...).
    pub name: String,
    /// Current position.
    pub position: Position,
}

/// Something that happened to an agent in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorldEvent {
    /// Login accepted.
    Login,
    /// The agent entered the world.
    Spawn {
        /// Spawn position.
        position: Position,
    },
    /// The agent moved.
    PositionChanged {
        /// New position.
        position: Position,
    },
    /// Health or food changed.
    HealthChanged {
        /// Health points.
        health: f64,
        /// Food points.
        food: i64,
    },
    /// The agent died.
    Death,
    /// Someone said something in chat.
    Chat {
        /// Sender username.
        from: String,
        /// Message text.
        message: String,
    },
    /// The server kicked the agent.
    Kicked {
        /// Server-provided reason.
        reason: String,
    },
    /// The connection closed.
    Disconnected,
}

/// Commands an agent can issue to the world.
///
/// Distances are in blocks. Every call can fail with [`WorldError`]; a closed
/// connection fails with [`WorldError::Disconnected`].
#[async_trait]
pub trait WorldConnection: Send + Sync {
    /// The username this connection is logged in as.
    fn username(&self) -> &str;

    /// Current position, or `None` before the first spawn.
    async fn position(&self) -> Result<Option<Position>, WorldError>;

    /// Current inventory.
    async fn inventory(&self) -> Result<Inventory, WorldError>;

    /// The nearest block whose name is in `names`, within `max_distance`.
    async fn find_block(
        &self,
        names: &[&str],
        max_distance: f64,
    ) -> Result<Option<BlockInfo>, WorldError>;

    /// The nearest entity whose name is in `names`, within `max_distance`.
    async fn find_entity(
        &self,
        names: &[&str],
        max_distance: f64,
    ) -> Result<Option<EntityInfo>, WorldError>;

    /// Walk until within `range` of `target`.
    async fn goto(&self, target: Position, range: f64) -> Result<(), WorldError>;

    /// Clear any movement goal.
    async fn stop_movement(&self) -> Result<(), WorldError>;

    /// Break the block at `at`, collecting its drop.
    async fn dig(&self, at: BlockPos) -> Result<(), WorldError>;

    /// Place one `item` from the inventory at `at`.
    async fn place(&self, item: &str, at: BlockPos) -> Result<(), WorldError>;

    /// Craft `item` `times` times from inventory ingredients.
    async fn craft(&self, item: &str, times: u32) -> Result<(), WorldError>;

    /// Hold `item` in the main hand.
    async fn equip(&self, item: &str) -> Result<(), WorldError>;

    /// Say something in public chat.
    async fn chat(&self, message: &str) -> Result<(), WorldError>;

    /// Attack the entity with the given id.
    async fn attack(&self, entity_id: u64) -> Result<(), WorldError>;

    /// Close the connection. Idempotent.
    async fn disconnect(&self) -> Result<(), WorldError>;
}

/// A live login: a command handle plus the agent's event stream.
pub struct WorldSession {
    /// Shared command handle.
    pub connection: Arc<dyn WorldConnection>,
    /// Events for this agent, in order.
    pub events: mpsc::Receiver<WorldEvent>,
}

impl std::fmt::Debug for WorldSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldSession")
            .field("username", &self.connection.username())
            .finish_non_exhaustive()
    }
}

/// Establishes world connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Log in with `profile`.
    async fn connect(&self, profile: &ConnectProfile) -> Result<WorldSession, WorldError>;
}
