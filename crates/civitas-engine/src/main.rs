//! Engine binary for the Civitas agent civilization.
//!
//! Runs a whole civilization offline against the in-process sandbox world.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `civitas.yaml` (or the path given as the
//!    first argument), falling back to defaults when the file is missing
//! 2. Initialize structured logging (tracing)
//! 3. Load personality templates
//! 4. Generate sandbox terrain
//! 5. Open the store and start the manager
//! 6. Run until ctrl-c, then shut down with a final backup

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use civitas_agents::{Connector, SimulatedWorld};
use civitas_core::config::LoggingConfig;
use civitas_core::{BotManager, CivitasConfig, PersonalityRegistry};
use civitas_types::BlockPos;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

const DEFAULT_CONFIG_PATH: &str = "civitas.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration, personalities, the store or startup
/// fail, or if the final backup cannot be written.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is not up yet, so remember the outcome.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, from_file) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("civitas-engine starting");
    if from_file {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        warn!(path = %config_path.display(), "Config file not found, using defaults");
    }

    if let Err(err) = run(config).await {
        error!(%err, "civitas-engine failed");
        return Err(err.into());
    }
    Ok(())
}

async fn run(config: CivitasConfig) -> Result<(), EngineError> {
    // 3. Personality templates.
    let personalities = PersonalityRegistry::load_dir(&config.personalities.dir)?;

    // 4. Sandbox world.
    let world = SimulatedWorld::default();
    let spawn = world.spawn_point();
    world.generate_terrain(
        config.sandbox.seed,
        BlockPos::from_floor(&spawn),
        config.sandbox.radius,
    );
    info!(
        seed = config.sandbox.seed,
        radius = config.sandbox.radius,
        host = %config.world.host,
        port = config.world.port,
        "Sandbox world ready"
    );

    // 5. Store and manager.
    let connector: Arc<dyn Connector> = Arc::new(world);
    let manager = BotManager::open(config, connector, personalities).await?;
    let report = match manager.start().await {
        Ok(report) => report,
        Err(err) => {
            manager.store().close().await;
            return Err(err.into());
        }
    };
    info!(
        spawned = report.spawned.len(),
        failed = report.failed,
        "Civilization running, press ctrl-c to stop"
    );

    // 6. Wait for ctrl-c.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    stop(&manager).await?;
    info!("civitas-engine stopped");
    Ok(())
}

/// Log the final status, then shut the manager down.
///
/// A failed status query never skips the shutdown.
async fn stop(manager: &BotManager) -> Result<(), EngineError> {
    match manager.status().await {
        Ok(status) => info!(
            total_agents = status.total_agents,
            active_agents = status.active_agents,
            villages = status.villages,
            uptime_secs = status.uptime.as_secs(),
            "Final civilization status"
        ),
        Err(err) => warn!(%err, "Final status unavailable"),
    }
    if let Some(backup) = manager.shutdown().await? {
        info!(path = %backup.display(), "Final backup written");
    }
    Ok(())
}

/// Load configuration from `path`, or defaults if it does not exist.
///
/// The flag reports whether the file was found.
fn load_config(path: &Path) -> Result<(CivitasConfig, bool), EngineError> {
    if path.exists() {
        Ok((CivitasConfig::from_file(path)?, true))
    } else {
        let mut config = CivitasConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok((config, false))
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
