//! Orchestrator error types.

use civitas_agents::WorldError;
use civitas_db::DbError;
use civitas_types::AgentId;

/// Why a single agent could not be spawned.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// No personality templates are loaded.
    #[error("no personality templates loaded")]
    NoPersonality,

    /// An agent with this id is already live.
    #[error("agent {0} is already running")]
    AlreadyRunning(AgentId),

    /// The manager is shutting down.
    #[error("manager is shutting down")]
    ShuttingDown,

    /// Every connection attempt failed.
    #[error("failed to connect {name} after {attempts} attempts: {source}")]
    ConnectFailed {
        /// The agent's name.
        name: String,
        /// Attempts made.
        attempts: u32,
        /// The last connection error.
        source: WorldError,
    },

    /// Persisting the agent failed.
    #[error("store error while spawning: {0}")]
    Store(#[from] DbError),
}

/// Fatal errors from [`BotManager::start`](crate::BotManager::start).
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The configuration cannot produce a civilization.
    #[error("invalid startup configuration: {0}")]
    Config(String),

    /// No configured agent could be spawned.
    #[error("all {attempted} configured agents failed to spawn")]
    AllSpawnsFailed {
        /// Agents attempted.
        attempted: usize,
        /// The last spawn error.
        #[source]
        last: Box<SpawnError>,
    },
}

/// Errors from manager operations after startup.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] DbError),

    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
