//! Orchestration for the Civitas agent civilization.
//!
//! [`BotManager`] spawns agents through a world [`Connector`], gives each a
//! runtime loop that writes its experience into the store, and runs the
//! periodic civilization tick that looks for villages forming.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `civitas.yaml` into typed structs
//! - [`personality`] -- Personality templates and the registry
//! - [`cluster`] -- Single-linkage spatial clustering
//! - [`civilization`] -- The civilization tick ([`TickReport`])
//! - [`activity`] -- Personality-weighted action choice
//! - [`runtime`] -- The per-agent event and activity loop
//! - [`manager`] -- [`BotManager`]
//! - [`error`] -- Spawn, startup and manager errors
//!
//! [`Connector`]: civitas_agents::Connector

pub mod activity;
pub mod civilization;
pub mod cluster;
pub mod config;
pub mod error;
pub mod manager;
pub mod personality;
pub mod runtime;

pub use civilization::{FormationCandidate, TickReport, run_civilization_tick};
pub use cluster::{Cluster, single_linkage};
pub use config::{AgentSpec, CivitasConfig, ConfigError};
pub use error::{ManagerError, SpawnError, StartupError};
pub use manager::{AgentStatus, BotManager, CivilizationStatus, StartupReport};
pub use personality::{PersonalityError, PersonalityRegistry, PersonalityTemplate};
pub use runtime::{AgentContext, AgentRuntime, RuntimeExit};
