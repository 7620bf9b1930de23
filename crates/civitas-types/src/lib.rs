//! Shared type definitions for the Civitas agent civilization.
//!
//! This crate is the single source of truth for the shapes that flow between
//! the store (`civitas-db`), the agent layer (`civitas-agents`) and the
//! orchestrator (`civitas-core`).
//!
//! # Modules
//!
//! - [`ids`] -- Identifier wrappers for agents and villages
//! - [`enums`] -- Event categories and goal lifecycle states
//! - [`structs`] -- Persisted entities (agents, memories, villages, events)
//! - [`actions`] -- Action requests, success payloads and failure codes

pub mod actions;
pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use actions::{
    ActionData, ActionFailure, ActionRequest, ActionResult, ActionType, BuildParams,
    FailureReason, TradeParams,
};
pub use enums::{EventType, GoalStatus, ParseEnumError};
pub use ids::{AgentId, VillageId};
pub use structs::{
    Agent, AgentStats, BlockPos, DEFAULT_DIMENSION, EmotionSnapshot, Emotions, Event, Goal,
    Inventory, InventorySnapshot, MemoryEntry, Personality, Position, Relationship, Village,
    VillageMember, memory_types,
};
