//! The per-agent action layer for Civitas.
//!
//! This crate sits between the world (reached only through the traits in
//! [`world`]) and the orchestrator in `civitas-core`. It turns typed
//! [`ActionRequest`](civitas_types::ActionRequest)s into world calls, one at a
//! time per agent, and plans multi-step material gathering for builds.
//!
//! # Modules
//!
//! - [`world`] -- Connection and connector traits, world events
//! - [`error`] -- World error taxonomy ([`WorldError`])
//! - [`executor`] -- Single-flight action execution ([`ActionExecutor`])
//! - [`planner`] -- Material checks and tiered gathering plans
//! - [`blueprint`] -- Structure material bills and block layout
//! - [`crafting`] -- Recipe table and item classification
//! - [`inventory`] -- Checked inventory arithmetic
//! - [`tools`] -- Tool and weapon selection
//! - [`phrasebook`] -- Chat lines for social actions
//! - [`sim`] -- In-process sandbox world ([`SimulatedWorld`])

pub mod blueprint;
pub mod crafting;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod phrasebook;
pub mod planner;
pub mod sim;
pub mod tools;
pub mod world;

// Re-export primary types at crate root for convenience.
pub use blueprint::{BLUEPRINTS, Blueprint, blueprint};
pub use crafting::{CraftRecipe, recipe_for};
pub use error::WorldError;
pub use executor::ActionExecutor;
pub use phrasebook::{DefaultPhrasebook, Phrasebook};
pub use planner::{
    GatherMethod, GatherOptions, GatherReport, Gatherer, MaterialCheck, PlanTask,
    check_materials, gather_materials,
};
pub use sim::{SimConnection, SimulatedWorld};
pub use world::{
    BlockInfo, ConnectProfile, Connector, EntityInfo, WorldConnection, WorldEvent, WorldSession,
};
