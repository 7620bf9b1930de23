//! Persistent store for the Civitas agent civilization (`SQLite`).
//!
//! A single `SQLite` file in WAL mode holds every entity: agents and their
//! personalities, emotion and memory journals, directed relationships,
//! villages with membership, goals, inventory snapshots and the global event
//! log. Many agent tasks write concurrently through one pooled handle.
//!
//! # Architecture
//!
//! ```text
//! SqliteStore (pool, migrations, backup, restore, export)
//!     |-- AgentStore         (agents, personalities, inventory snapshots)
//!     |-- JournalStore       (emotions, memories)
//!     |-- RelationshipStore  (directed affinity / trust edges)
//!     |-- VillageStore       (villages, memberships)
//!     |-- EventStore         (append-only events)
//!     +-- GoalStore          (per-agent goals)
//! ```
//!
//! # Modules
//!
//! - [`sqlite`] -- Connection pool, configuration and snapshots
//! - [`agent_store`] -- Agent rows and their one-to-one / snapshot tables
//! - [`journal_store`] -- Emotions and memories
//! - [`social_store`] -- Relationship edges
//! - [`village_store`] -- Villages and membership
//! - [`event_store`] -- The event log
//! - [`goal_store`] -- Goals
//! - [`export`] -- Full-dataset export
//! - [`error`] -- Shared error types

pub mod agent_store;
mod codec;
pub mod error;
pub mod event_store;
pub mod export;
pub mod goal_store;
pub mod journal_store;
pub mod social_store;
pub mod sqlite;
pub mod village_store;

// Re-export primary types for convenience.
pub use agent_store::AgentStore;
pub use error::DbError;
pub use event_store::{DEFAULT_EVENT_LIMIT, EventStore, NewEvent};
pub use export::{PersonalityRecord, StoreExport};
pub use goal_store::{GoalStore, NewGoal};
pub use journal_store::{DEFAULT_MEMORY_LIMIT, JournalStore, NewMemory};
pub use social_store::{RelationshipStore, RelationshipView};
pub use sqlite::{SqliteConfig, SqliteStore};
pub use village_store::{NewVillage, VillageStore};
