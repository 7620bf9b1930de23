//! The orchestrator: live agents, the civilization tick, backups, shutdown.
//!
//! [`BotManager`] owns the live-agent map and the personality registry. Each
//! live agent has its own runtime task and stop signal; the civilization tick
//! runs as one more task sharing nothing with the agents but the store.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use civitas_agents::{
    ActionExecutor, Connector, DefaultPhrasebook, Phrasebook, WorldConnection, WorldSession,
};
use civitas_db::{DbError, NewEvent, SqliteConfig, SqliteStore};
use civitas_types::{ActionType, AgentId, AgentStats, Event, EventType, Personality, Position};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::civilization::{TickReport, run_civilization_tick};
use crate::config::{AgentSpec, CivilizationConfig, CivitasConfig};
use crate::error::{ManagerError, SpawnError, StartupError};
use crate::personality::PersonalityRegistry;
use crate::runtime::{AgentContext, AgentRuntime, RuntimeExit};

/// Events included in [`CivilizationStatus::recent_events`].
pub const STATUS_EVENT_LIMIT: u32 = 50;

/// How long stopping an agent waits for its runtime to exit.
const AGENT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Aggregate view of the civilization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CivilizationStatus {
    /// Agents with a persisted row.
    pub total_agents: i64,
    /// Agents in the live set.
    pub active_agents: usize,
    /// Existing villages.
    pub villages: usize,
    /// Newest events first.
    pub recent_events: Vec<Event>,
    /// Time since the manager was created.
    pub uptime: Duration,
}

/// One live agent as seen by administrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Agent id.
    pub id: AgentId,
    /// Display name.
    pub name: String,
    /// Personality template name.
    pub personality: String,
    /// Action in flight, if any.
    pub current_action: Option<ActionType>,
    /// Whether the runtime loop is still running.
    pub online: bool,
    /// Persisted position.
    pub position: Option<Position>,
    /// Persisted vitals.
    pub stats: AgentStats,
    /// Last persisted activity.
    pub last_active: Option<DateTime<Utc>>,
}

/// Outcome of [`BotManager::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    /// Agents that came up, in configuration order.
    pub spawned: Vec<AgentId>,
    /// Configured agents that failed.
    pub failed: usize,
}

struct LiveAgent {
    name: String,
    personality: String,
    executor: Arc<ActionExecutor>,
    connection: Arc<dyn WorldConnection>,
    stop: watch::Sender<bool>,
    runtime: JoinHandle<RuntimeExit>,
}

/// Coordinates every agent of one civilization.
pub struct BotManager {
    config: CivitasConfig,
    store: SqliteStore,
    connector: Arc<dyn Connector>,
    personalities: PersonalityRegistry,
    phrasebook: Arc<dyn Phrasebook>,
    agents: Mutex<BTreeMap<AgentId, LiveAgent>>,
    tick_stop: watch::Sender<bool>,
    tick_task: Mutex<Option<JoinHandle<()>>>,
    started_at: Instant,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for BotManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotManager")
            .field("store", &self.store.path())
            .field("personalities", &self.personalities.len())
            .field("live_agents", &self.live().len())
            .finish_non_exhaustive()
    }
}

impl BotManager {
    /// A manager over an already opened store.
    pub fn new(
        config: CivitasConfig,
        store: SqliteStore,
        connector: Arc<dyn Connector>,
        personalities: PersonalityRegistry,
    ) -> Self {
        let (tick_stop, _) = watch::channel(false);
        Self {
            config,
            store,
            connector,
            personalities,
            phrasebook: Arc::new(DefaultPhrasebook),
            agents: Mutex::new(BTreeMap::new()),
            tick_stop,
            tick_task: Mutex::new(None),
            started_at: Instant::now(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Open the store named in `config` and build a manager over it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be opened or migrated.
    pub async fn open(
        config: CivitasConfig,
        connector: Arc<dyn Connector>,
        personalities: PersonalityRegistry,
    ) -> Result<Self, DbError> {
        let store = SqliteStore::open(
            &SqliteConfig::new(config.store.path.clone())
                .with_max_connections(config.store.max_connections),
        )
        .await?;
        Ok(Self::new(config, store, connector, personalities))
    }

    /// Use `phrasebook` for agents spawned from now on.
    #[must_use]
    pub fn with_phrasebook(mut self, phrasebook: Arc<dyn Phrasebook>) -> Self {
        self.phrasebook = phrasebook;
        self
    }

    /// The shared store.
    pub const fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// The active configuration.
    pub const fn config(&self) -> &CivitasConfig {
        &self.config
    }

    /// The loaded personality templates.
    pub const fn personalities(&self) -> &PersonalityRegistry {
        &self.personalities
    }

    /// Ids of every live agent.
    pub fn live_agents(&self) -> Vec<AgentId> {
        self.live().keys().cloned().collect()
    }

    /// The executor of a live agent, for issuing actions directly.
    pub fn executor(&self, id: &AgentId) -> Option<Arc<ActionExecutor>> {
        self.live().get(id).map(|a| Arc::clone(&a.executor))
    }

    fn live(&self) -> MutexGuard<'_, BTreeMap<AgentId, LiveAgent>> {
        self.agents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Spawn every configured agent, then start the civilization tick.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::Config`] when no personalities are loaded or
    /// no agents are configured, and [`StartupError::AllSpawnsFailed`] when
    /// not a single agent came up.
    pub async fn start(&self) -> Result<StartupReport, StartupError> {
        if self.personalities.is_empty() {
            return Err(StartupError::Config(
                "no personality templates loaded".to_owned(),
            ));
        }
        if self.config.agents.is_empty() {
            return Err(StartupError::Config("no agents configured".to_owned()));
        }

        info!(agents = self.config.agents.len(), "Starting civilization");
        let delay = self.config.spawning.spawn_delay();
        let mut spawned = Vec::new();
        let mut last_error = None;
        for (i, spec) in self.config.agents.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(delay).await;
            }
            match self.spawn_agent(spec.clone()).await {
                Ok(id) => spawned.push(id),
                Err(err) => {
                    warn!(name = ?spec.name, %err, "Agent failed to spawn");
                    last_error = Some(err);
                }
            }
        }

        let attempted = self.config.agents.len();
        let failed = attempted.saturating_sub(spawned.len());
        if spawned.is_empty() {
            self.stop_all_agents().await;
            error!(attempted, "Every configured agent failed to spawn");
            return Err(StartupError::AllSpawnsFailed {
                attempted,
                last: Box::new(last_error.unwrap_or(SpawnError::NoPersonality)),
            });
        }
        if failed > 0 {
            warn!(spawned = spawned.len(), failed, "Some agents failed to spawn");
        }

        self.start_tick();
        info!(spawned = spawned.len(), "Civilization started");
        Ok(StartupReport { spawned, failed })
    }

    /// Bring one agent into the world and start its runtime.
    ///
    /// Without an explicit id, an agent already persisted under the same
    /// name keeps its id, so a restart picks up the stored rows.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::NoPersonality`] without connecting when no
    /// templates are loaded, [`SpawnError::ConnectFailed`] when every
    /// connection attempt fails and [`SpawnError::Store`] when the agent
    /// cannot be persisted.
    pub async fn spawn_agent(&self, spec: AgentSpec) -> Result<AgentId, SpawnError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(SpawnError::ShuttingDown);
        }
        let template = self
            .personalities
            .choose(spec.personality_type.as_deref(), &mut rand::rng())
            .cloned()
            .ok_or(SpawnError::NoPersonality)?;

        let name = match spec.name {
            Some(name) => name,
            None => self.next_default_name().await?,
        };
        let id = match spec.id {
            Some(id) => AgentId::new(id),
            None => self
                .store
                .agents()
                .get_agent_by_name(&name)
                .await?
                .map_or_else(AgentId::generate, |agent| agent.id),
        };
        if self.live().contains_key(&id) {
            return Err(SpawnError::AlreadyRunning(id));
        }

        let session = self.connect_with_retry(&name).await?;
        if let Err(err) = self.persist_spawn(&id, &name, &template.name, &template.traits).await {
            disconnect_quietly(&session.connection).await;
            return Err(err.into());
        }

        let executor = Arc::new(
            ActionExecutor::new(Arc::clone(&session.connection))
                .with_phrasebook(Arc::clone(&self.phrasebook))
                .with_gather_options(self.config.gathering.options()),
        );
        let ctx = Arc::new(AgentContext {
            agent_id: id.clone(),
            name: name.clone(),
            store: self.store.clone(),
            executor: Arc::clone(&executor),
            personality: template.traits,
            config: self.config.runtime.clone(),
        });
        let (stop, stop_rx) = watch::channel(false);
        let WorldSession { connection, events } = session;
        let runtime = tokio::spawn(AgentRuntime::new(ctx, events, stop_rx).run());

        let live = LiveAgent {
            name: name.clone(),
            personality: template.name.clone(),
            executor,
            connection,
            stop,
            runtime,
        };
        let rejected = {
            let mut agents = self.live();
            if agents.contains_key(&id) {
                Some(live)
            } else {
                agents.insert(id.clone(), live);
                None
            }
        };
        if let Some(duplicate) = rejected {
            stop_agent(duplicate).await;
            return Err(SpawnError::AlreadyRunning(id));
        }

        info!(
            agent_id = %id,
            %name,
            personality = %template.name,
            live = self.live().len(),
            "Agent spawned"
        );
        Ok(id)
    }

    /// Stop, disconnect and deregister a live agent. Its rows are kept.
    ///
    /// Returns `false` when `id` is not live.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Store`] if the removal event cannot be logged.
    pub async fn remove_agent(&self, id: &AgentId) -> Result<bool, ManagerError> {
        let Some(agent) = self.live().remove(id) else {
            return Ok(false);
        };
        let name = agent.name.clone();
        stop_agent(agent).await;

        self.store
            .events()
            .log_event(
                &NewEvent::new(EventType::AgentRemoved, format!("{name} was removed"))
                    .agent(id.clone()),
            )
            .await?;
        info!(agent_id = %id, %name, "Agent removed");
        Ok(true)
    }

    /// Stop the tick and every agent, write a final backup and close the
    /// store. Later calls do nothing and return `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError`] if the final backup fails; the store is
    /// closed regardless.
    pub async fn shutdown(&self) -> Result<Option<PathBuf>, ManagerError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        info!("Shutting down civilization");

        self.tick_stop.send_replace(true);
        let tick = self
            .tick_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tick) = tick {
            if let Err(err) = tick.await {
                warn!(%err, "Civilization tick task ended abnormally");
            }
        }

        self.stop_all_agents().await;
        let backup = self.backup().await;
        self.store.close().await;
        info!("Civilization stopped");
        backup.map(Some)
    }

    async fn stop_all_agents(&self) {
        let agents = std::mem::take(&mut *self.live());
        for (id, agent) in agents {
            debug!(agent_id = %id, "Stopping agent");
            stop_agent(agent).await;
        }
    }

    async fn connect_with_retry(&self, name: &str) -> Result<WorldSession, SpawnError> {
        let profile = self.config.world.profile(name);
        let attempts = self.config.spawning.max_spawn_attempts.max(1);
        let delay = self.config.spawning.spawn_delay();

        let mut attempt = 1;
        loop {
            match self.connector.connect(&profile).await {
                Ok(session) => return Ok(session),
                Err(err) if attempt < attempts => {
                    warn!(%name, attempt, %err, "Connection failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(source) => {
                    return Err(SpawnError::ConnectFailed {
                        name: name.to_owned(),
                        attempts,
                        source,
                    });
                }
            }
        }
    }

    async fn persist_spawn(
        &self,
        id: &AgentId,
        name: &str,
        personality_name: &str,
        traits: &Personality,
    ) -> Result<(), DbError> {
        self.store.agents().upsert_agent(id, name, name).await?;
        self.store.agents().set_personality(id, traits).await?;
        self.store
            .events()
            .log_event(
                &NewEvent::new(EventType::AgentSpawned, format!("{name} joined the world"))
                    .agent(id.clone())
                    .metadata(serde_json::json!({ "personality": personality_name })),
            )
            .await?;
        Ok(())
    }

    /// The first `Bot_<n>` that is neither live nor persisted.
    async fn next_default_name(&self) -> Result<String, DbError> {
        let live: Vec<String> = self.live().values().map(|a| a.name.clone()).collect();
        let mut n = live.len().saturating_add(1);
        loop {
            let candidate = format!("Bot_{n}");
            if !live.contains(&candidate)
                && self
                    .store
                    .agents()
                    .get_agent_by_name(&candidate)
                    .await?
                    .is_none()
            {
                return Ok(candidate);
            }
            n = n.saturating_add(1);
        }
    }

    // -----------------------------------------------------------------------
    // Civilization
    // -----------------------------------------------------------------------

    /// Run the civilization tick now.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Store`] if the tick cannot read or log.
    pub async fn run_civilization_tick(&self) -> Result<TickReport, ManagerError> {
        Ok(run_civilization_tick(&self.store, &self.config.civilization).await?)
    }

    fn start_tick(&self) {
        let mut slot = self
            .tick_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        *slot = Some(tokio::spawn(tick_loop(
            self.store.clone(),
            self.config.civilization.clone(),
            self.tick_stop.subscribe(),
        )));
    }

    /// Write a timestamped snapshot into the backup directory.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError`] if the directory or snapshot cannot be
    /// written.
    pub async fn backup(&self) -> Result<PathBuf, ManagerError> {
        let dir = &self.config.store.backup_dir;
        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ");
        let mut target = dir.join(format!("civilization_{stamp}.db"));
        let mut n = 0_u32;
        while tokio::fs::try_exists(&target).await? {
            n = n.saturating_add(1);
            target = dir.join(format!("civilization_{stamp}_{n}.db"));
        }
        self.store.backup_to(&target).await?;
        info!(path = %target.display(), "Civilization backed up");
        Ok(target)
    }

    // -----------------------------------------------------------------------
    // Administrative queries
    // -----------------------------------------------------------------------

    /// Aggregate counts and the latest events.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Store`] if a count or listing fails.
    pub async fn status(&self) -> Result<CivilizationStatus, ManagerError> {
        Ok(CivilizationStatus {
            total_agents: self.store.agents().count_agents().await?,
            active_agents: self.live().len(),
            villages: self.store.villages().list_villages().await?.len(),
            recent_events: self
                .store
                .events()
                .recent_events(STATUS_EVENT_LIMIT, None)
                .await?,
            uptime: self.started_at.elapsed(),
        })
    }

    /// Status of one live agent; `None` if it is not live.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Store`] if the agent row cannot be read.
    pub async fn agent_status(&self, id: &AgentId) -> Result<Option<AgentStatus>, ManagerError> {
        let snapshot = self.live().get(id).map(|a| AgentStatus {
            id: id.clone(),
            name: a.name.clone(),
            personality: a.personality.clone(),
            current_action: a.executor.current_action(),
            online: !a.runtime.is_finished(),
            position: None,
            stats: AgentStats::default(),
            last_active: None,
        });
        let Some(mut status) = snapshot else {
            return Ok(None);
        };
        if let Some(row) = self.store.agents().get_agent(id).await? {
            status.position = row.position;
            status.stats = row.stats;
            status.last_active = Some(row.last_active);
        }
        Ok(Some(status))
    }

    /// Status of every live agent, in id order.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Store`] if an agent row cannot be read.
    pub async fn all_agent_status(&self) -> Result<Vec<AgentStatus>, ManagerError> {
        let mut out = Vec::new();
        for id in self.live_agents() {
            if let Some(status) = self.agent_status(&id).await? {
                out.push(status);
            }
        }
        Ok(out)
    }
}

async fn stop_agent(agent: LiveAgent) {
    agent.stop.send_replace(true);
    let mut runtime = agent.runtime;
    match tokio::time::timeout(AGENT_STOP_TIMEOUT, &mut runtime).await {
        Ok(Ok(exit)) => debug!(name = %agent.name, ?exit, "Agent runtime joined"),
        Ok(Err(err)) => warn!(name = %agent.name, %err, "Agent runtime panicked"),
        Err(_) => {
            warn!(name = %agent.name, "Agent runtime did not stop in time, aborting");
            runtime.abort();
        }
    }
    disconnect_quietly(&agent.connection).await;
}

async fn disconnect_quietly(connection: &Arc<dyn WorldConnection>) {
    if let Err(err) = connection.disconnect().await {
        debug!(username = connection.username(), %err, "Disconnect failed");
    }
}

async fn tick_loop(
    store: SqliteStore,
    config: CivilizationConfig,
    mut stop: watch::Receiver<bool>,
) {
    let period = config.tick_interval();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = period.as_secs(), "Civilization tick scheduled");

    loop {
        if *stop.borrow() {
            break;
        }
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                match run_civilization_tick(&store, &config).await {
                    Ok(report) => debug!(
                        clusters = report.clusters.len(),
                        formations = report.formations.len(),
                        abandoned = report.abandoned.len(),
                        "Civilization tick complete"
                    ),
                    Err(err) => error!(%err, "Civilization tick failed"),
                }
            }
        }
    }
    debug!("Civilization tick stopped");
}
