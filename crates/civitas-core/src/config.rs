//! Configuration loading and typed config structures for Civitas.
//!
//! The canonical configuration lives in `civitas.yaml` at the project root.
//! Every field has a default, so an empty document (or a missing file, at
//! the engine's discretion) yields a runnable configuration.
//!
//! Environment variables override YAML values after parsing:
//! - `CIVITAS_DB_PATH` overrides `store.path`
//! - `CIVITAS_BACKUP_DIR` overrides `store.backup_dir`
//! - `CIVITAS_WORLD_HOST` overrides `world.host`
//! - `CIVITAS_WORLD_PORT` overrides `world.port`

use std::path::{Path, PathBuf};
use std::time::Duration;

use civitas_agents::{ConnectProfile, GatherOptions};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CivitasConfig {
    /// Agents to spawn at startup, in order.
    #[serde(default)]
    pub agents: Vec<AgentSpec>,

    /// World server connection.
    #[serde(default)]
    pub world: WorldServerConfig,

    /// Persistent store location.
    #[serde(default)]
    pub store: StoreConfig,

    /// Civilization tick and village formation.
    #[serde(default)]
    pub civilization: CivilizationConfig,

    /// Spawn retry behaviour.
    #[serde(default)]
    pub spawning: SpawnConfig,

    /// Material gathering for builds.
    #[serde(default)]
    pub gathering: GatheringConfig,

    /// Per-agent runtime loop.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Personality template directory.
    #[serde(default)]
    pub personalities: PersonalitiesConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Offline sandbox world used by the engine.
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

impl CivitasConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string and apply env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_without_env(yaml)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, ignoring the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse_without_env(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Override store and world settings with environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `CIVITAS_WORLD_PORT` is not a port.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("CIVITAS_DB_PATH") {
            self.store.path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("CIVITAS_BACKUP_DIR") {
            self.store.backup_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("CIVITAS_WORLD_HOST") {
            self.world.host = val;
        }
        if let Ok(val) = std::env::var("CIVITAS_WORLD_PORT") {
            self.world.port = val
                .parse()
                .map_err(|e: std::num::ParseIntError| invalid("world.port", e.to_string()))?;
        }
        Ok(())
    }

    /// Reject values no component can work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let civ = &self.civilization;
        if civ.tick_interval_secs == 0 {
            return Err(invalid("civilization.tick_interval_secs", "must be positive"));
        }
        if !(civ.cluster_radius.is_finite() && civ.cluster_radius > 0.0) {
            return Err(invalid("civilization.cluster_radius", "must be a positive number"));
        }
        if civ.min_cluster_size < 2 {
            return Err(invalid("civilization.min_cluster_size", "must be at least 2"));
        }
        if !(-1.0..=1.0).contains(&civ.strong_affinity) {
            return Err(invalid("civilization.strong_affinity", "must be within [-1, 1]"));
        }
        if self.spawning.max_spawn_attempts == 0 {
            return Err(invalid("spawning.max_spawn_attempts", "must be at least 1"));
        }
        if self.gathering.max_attempts == 0 {
            return Err(invalid("gathering.max_attempts", "must be at least 1"));
        }
        if self.runtime.activity_interval_secs == 0 {
            return Err(invalid("runtime.activity_interval_secs", "must be positive"));
        }
        Ok(())
    }
}

/// One agent to spawn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AgentSpec {
    /// Stable id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,

    /// Display name and login username; generated when absent.
    #[serde(default)]
    pub name: Option<String>,

    /// Personality template name; random when absent or unknown.
    #[serde(default, alias = "personalityType")]
    pub personality_type: Option<String>,
}

impl AgentSpec {
    /// An agent entry with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Request a specific personality template.
    #[must_use]
    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.personality_type = Some(personality.into());
        self
    }
}

/// World server connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldServerConfig {
    /// Server host.
    #[serde(default = "default_world_host")]
    pub host: String,

    /// Server port.
    #[serde(default = "default_world_port")]
    pub port: u16,

    /// Game version string.
    #[serde(default = "default_world_version")]
    pub version: String,
}

impl Default for WorldServerConfig {
    fn default() -> Self {
        Self {
            host: default_world_host(),
            port: default_world_port(),
            version: default_world_version(),
        }
    }
}

impl WorldServerConfig {
    /// Login parameters for `username` on this server.
    pub fn profile(&self, username: &str) -> ConnectProfile {
        ConnectProfile {
            username: username.to_owned(),
            host: self.host.clone(),
            port: self.port,
            version: self.version.clone(),
        }
    }
}

/// Persistent store settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Directory for timestamped backups.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            backup_dir: default_backup_dir(),
            max_connections: default_max_connections(),
        }
    }
}

/// Civilization tick and village formation thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CivilizationConfig {
    /// Seconds between civilization ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Planar link distance for clustering.
    #[serde(default = "default_cluster_radius")]
    pub cluster_radius: f64,

    /// Smallest cluster considered for formation.
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    /// Affinity at or above which a pair counts as strong.
    #[serde(default = "default_strong_affinity")]
    pub strong_affinity: f64,

    /// Strong pairs required to flag a formation.
    #[serde(default = "default_min_strong_pairs")]
    pub min_strong_pairs: usize,
}

impl Default for CivilizationConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            cluster_radius: default_cluster_radius(),
            min_cluster_size: default_min_cluster_size(),
            strong_affinity: default_strong_affinity(),
            min_strong_pairs: default_min_strong_pairs(),
        }
    }
}

impl CivilizationConfig {
    /// The tick interval as a [`Duration`].
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

/// Spawn retry behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpawnConfig {
    /// Fixed delay between spawns and between retries, in milliseconds.
    #[serde(default = "default_spawn_delay_ms")]
    pub spawn_delay_ms: u64,

    /// Connection attempts per agent.
    #[serde(default = "default_max_spawn_attempts")]
    pub max_spawn_attempts: u32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            spawn_delay_ms: default_spawn_delay_ms(),
            max_spawn_attempts: default_max_spawn_attempts(),
        }
    }
}

impl SpawnConfig {
    /// The spawn delay as a [`Duration`].
    pub const fn spawn_delay(&self) -> Duration {
        Duration::from_millis(self.spawn_delay_ms)
    }
}

/// Material gathering settings used by `build_structure`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatheringConfig {
    /// Attempts per material.
    #[serde(default = "default_gather_attempts")]
    pub max_attempts: u32,

    /// Budget per material, in seconds.
    #[serde(default = "default_timeout_per_material_secs")]
    pub timeout_per_material_secs: u64,

    /// Delay between attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for GatheringConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_gather_attempts(),
            timeout_per_material_secs: default_timeout_per_material_secs(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl GatheringConfig {
    /// The planner options these settings describe.
    pub const fn options(&self) -> GatherOptions {
        GatherOptions {
            max_attempts: self.max_attempts,
            timeout_per_material: Duration::from_secs(self.timeout_per_material_secs),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Per-agent runtime loop settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RuntimeConfig {
    /// Seconds between autonomous activity choices.
    #[serde(default = "default_activity_interval_secs")]
    pub activity_interval_secs: u64,

    /// Health below which the agent abandons its action and rests.
    #[serde(default = "default_safety_health_threshold")]
    pub safety_health_threshold: f64,

    /// Run autonomous activity at all. Disabled agents only record events.
    #[serde(default = "default_true")]
    pub autonomous: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            activity_interval_secs: default_activity_interval_secs(),
            safety_health_threshold: default_safety_health_threshold(),
            autonomous: true,
        }
    }
}

impl RuntimeConfig {
    /// The activity interval as a [`Duration`].
    pub const fn activity_interval(&self) -> Duration {
        Duration::from_secs(self.activity_interval_secs)
    }
}

/// Where personality templates come from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersonalitiesConfig {
    /// Directory of `*.json` templates.
    #[serde(default = "default_personalities_dir")]
    pub dir: PathBuf,
}

impl Default for PersonalitiesConfig {
    fn default() -> Self {
        Self {
            dir: default_personalities_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Terrain for the in-process sandbox world.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SandboxConfig {
    /// Terrain seed.
    #[serde(default = "default_sandbox_seed")]
    pub seed: u64,

    /// Half-width of the generated square, in blocks.
    #[serde(default = "default_sandbox_radius")]
    pub radius: i32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            seed: default_sandbox_seed(),
            radius: default_sandbox_radius(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_world_host() -> String {
    "localhost".to_owned()
}

const fn default_world_port() -> u16 {
    25565
}

fn default_world_version() -> String {
    "1.20.1".to_owned()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/civilization/civilization.db")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("data/civilization/backups")
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_tick_interval_secs() -> u64 {
    300
}

const fn default_cluster_radius() -> f64 {
    75.0
}

const fn default_min_cluster_size() -> usize {
    3
}

const fn default_strong_affinity() -> f64 {
    0.6
}

const fn default_min_strong_pairs() -> usize {
    2
}

const fn default_spawn_delay_ms() -> u64 {
    3_000
}

const fn default_max_spawn_attempts() -> u32 {
    3
}

const fn default_gather_attempts() -> u32 {
    2
}

const fn default_timeout_per_material_secs() -> u64 {
    30
}

const fn default_retry_delay_ms() -> u64 {
    2_000
}

const fn default_activity_interval_secs() -> u64 {
    30
}

const fn default_safety_health_threshold() -> f64 {
    6.0
}

fn default_personalities_dir() -> PathBuf {
    PathBuf::from("personalities")
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_sandbox_seed() -> u64 {
    42
}

const fn default_sandbox_radius() -> i32 {
    64
}

const fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = CivitasConfig::default();
        assert!(config.agents.is_empty());
        assert_eq!(config.world.host, "localhost");
        assert_eq!(config.world.port, 25565);
        assert_eq!(config.world.version, "1.20.1");
        assert_eq!(config.civilization.tick_interval(), Duration::from_secs(300));
        assert_eq!(config.civilization.cluster_radius, 75.0);
        assert_eq!(config.civilization.min_cluster_size, 3);
        assert_eq!(config.civilization.min_strong_pairs, 2);
        assert_eq!(config.gathering.options(), GatherOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_is_all_defaults() {
        assert_eq!(
            CivitasConfig::parse_without_env("").unwrap(),
            CivitasConfig::default()
        );
    }

    #[test]
    fn parse_partial_yaml() {
        let yaml = r"
agents:
  - name: Ash
    personality_type: builder
  - personalityType: explorer
  - {}
world:
  port: 25570
civilization:
  cluster_radius: 40
  tick_interval_secs: 60
logging:
  json: true
";
        let config = CivitasConfig::parse_without_env(yaml).unwrap();
        assert_eq!(config.agents.len(), 3);
        assert_eq!(
            config.agents.first(),
            Some(&AgentSpec::named("Ash").with_personality("builder"))
        );
        assert_eq!(
            config.agents.get(1).and_then(|a| a.personality_type.as_deref()),
            Some("explorer")
        );
        assert_eq!(config.world.port, 25570);
        assert_eq!(config.world.host, "localhost");
        assert_eq!(config.civilization.cluster_radius, 40.0);
        assert_eq!(config.civilization.min_cluster_size, 3);
        assert!(config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_degenerate_thresholds() {
        let mut config = CivitasConfig::default();
        config.civilization.cluster_radius = -5.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "civilization.cluster_radius",
                ..
            })
        ));

        let mut config = CivitasConfig::default();
        config.spawning.max_spawn_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let err = CivitasConfig::parse_without_env("agents: [unterminated").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }

    #[test]
    fn shipped_config_is_valid() {
        let config = CivitasConfig::parse_without_env(include_str!("../../../civitas.yaml")).unwrap();
        assert_eq!(config.agents.len(), 5);
        assert!(config.agents.iter().all(|a| a.personality_type.is_some()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn profile_carries_server_settings() {
        let profile = WorldServerConfig::default().profile("Ash");
        assert_eq!(profile.username, "Ash");
        assert_eq!(profile.port, 25565);
    }
}
