//! The per-agent runtime loop.
//!
//! One task per live agent. It consumes the agent's world events, writes
//! position, vitals, memories and relationships into the store, and on a
//! fixed interval starts an autonomous action through the agent's
//! [`ActionExecutor`]. Actions run in their own task so events keep flowing
//! while an action is in flight.

use std::sync::Arc;

use civitas_agents::{ActionExecutor, WorldEvent};
use civitas_db::{DbError, NewEvent, NewGoal, NewMemory, SqliteStore};
use civitas_types::{
    ActionData, ActionRequest, ActionResult, AgentId, AgentStats, DEFAULT_DIMENSION, Emotions,
    EventType, GoalStatus, Personality, Position, memory_types,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::activity::choose_activity;
use crate::config::RuntimeConfig;

/// Affinity added to the listener's edge towards a chatting agent.
pub const CHAT_AFFINITY_DELTA: f64 = 0.05;

/// Trust added to the listener's edge towards a chatting agent.
pub const CHAT_TRUST_DELTA: f64 = 0.02;

/// How long a recovering agent rests.
pub const RECOVERY_REST: Duration = Duration::from_secs(10);

/// How long shutdown waits for an in-flight action to wind down.
const ACTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a runtime loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeExit {
    /// The shutdown signal fired.
    Shutdown,
    /// The world connection closed.
    Disconnected {
        /// The kick reason, if the server kicked the agent.
        kicked: Option<String>,
    },
}

/// Everything an agent's tasks share.
#[derive(Debug)]
pub struct AgentContext {
    /// The agent's id.
    pub agent_id: AgentId,
    /// Display name, also the world username.
    pub name: String,
    /// The shared store.
    pub store: SqliteStore,
    /// The agent's executor.
    pub executor: Arc<ActionExecutor>,
    /// Trait values driving activity choice.
    pub personality: Personality,
    /// Loop settings.
    pub config: RuntimeConfig,
}

/// A running agent loop; consumed by [`AgentRuntime::run`].
#[derive(Debug)]
pub struct AgentRuntime {
    ctx: Arc<AgentContext>,
    events: mpsc::Receiver<WorldEvent>,
    shutdown: watch::Receiver<bool>,
    stats: AgentStats,
    position: Option<Position>,
    in_danger: bool,
    kicked: Option<String>,
    activity: Option<JoinHandle<()>>,
}

enum Step {
    Shutdown,
    Event(Option<WorldEvent>),
    Activity,
}

impl AgentRuntime {
    /// A runtime for `ctx` fed by `events`, stopping when `shutdown` is true.
    pub fn new(
        ctx: Arc<AgentContext>,
        events: mpsc::Receiver<WorldEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            events,
            shutdown,
            stats: AgentStats::default(),
            position: None,
            in_danger: false,
            kicked: None,
            activity: None,
        }
    }

    /// Drive the agent until shutdown or disconnect.
    pub async fn run(mut self) -> RuntimeExit {
        let period = self.ctx.config.activity_interval();
        let mut activity = tokio::time::interval_at(Instant::now() + period, period);
        activity.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let autonomous = self.ctx.config.autonomous;

        info!(agent_id = %self.ctx.agent_id, name = %self.ctx.name, "Agent runtime started");
        let exit = loop {
            if *self.shutdown.borrow() {
                break RuntimeExit::Shutdown;
            }

            let step = tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() { Step::Shutdown } else { continue }
                }
                event = self.events.recv() => Step::Event(event),
                _ = activity.tick(), if autonomous => Step::Activity,
            };

            match step {
                Step::Shutdown => break RuntimeExit::Shutdown,
                Step::Event(None) | Step::Event(Some(WorldEvent::Disconnected)) => {
                    if let Err(err) = self.record_disconnect().await {
                        warn!(agent_id = %self.ctx.agent_id, %err, "Failed to record disconnect");
                    }
                    break RuntimeExit::Disconnected {
                        kicked: self.kicked.take(),
                    };
                }
                Step::Event(Some(event)) => {
                    if let Err(err) = self.handle_event(event).await {
                        warn!(agent_id = %self.ctx.agent_id, %err, "Failed to persist world event");
                    }
                }
                Step::Activity => self.start_activity(),
            }
        };

        self.drain().await;
        info!(agent_id = %self.ctx.agent_id, ?exit, "Agent runtime stopped");
        exit
    }

    async fn handle_event(&mut self, event: WorldEvent) -> Result<(), DbError> {
        let ctx = Arc::clone(&self.ctx);
        match event {
            WorldEvent::Login => {
                debug!(agent_id = %ctx.agent_id, "Logged in");
            }
            WorldEvent::Spawn { position } | WorldEvent::PositionChanged { position } => {
                self.position = Some(position);
                ctx.store
                    .agents()
                    .update_position(&ctx.agent_id, &position, DEFAULT_DIMENSION)
                    .await?;
            }
            WorldEvent::HealthChanged { health, food } => {
                self.stats.health = health;
                self.stats.food = food;
                ctx.store.agents().update_stats(&ctx.agent_id, &self.stats).await?;
                ctx.store
                    .journal()
                    .add_emotion(&ctx.agent_id, &emotions_for(&self.stats))
                    .await?;
                self.check_safety().await?;
            }
            WorldEvent::Death => {
                warn!(agent_id = %ctx.agent_id, "Agent died");
                ctx.executor.cancel_current_action().await;
                self.in_danger = false;
                let mut memory = NewMemory::new(ctx.agent_id.clone(), memory_types::DEATH, "I died")
                    .with_importance(1.0);
                if let Some(position) = self.position {
                    memory = memory.at(position);
                }
                ctx.store.journal().add_memory(&memory).await?;
                ctx.store
                    .events()
                    .log_event(
                        &NewEvent::new(EventType::AgentDied, format!("{} died", ctx.name))
                            .agent(ctx.agent_id.clone()),
                    )
                    .await?;
            }
            WorldEvent::Chat { from, message } => self.hear(&from, &message).await?,
            WorldEvent::Kicked { reason } => {
                warn!(agent_id = %ctx.agent_id, %reason, "Agent kicked");
                ctx.store
                    .events()
                    .log_event(
                        &NewEvent::new(
                            EventType::AgentKicked,
                            format!("{} was kicked: {reason}", ctx.name),
                        )
                        .agent(ctx.agent_id.clone()),
                    )
                    .await?;
                self.kicked = Some(reason);
            }
            WorldEvent::Disconnected => {}
        }
        Ok(())
    }

    async fn hear(&self, from: &str, message: &str) -> Result<(), DbError> {
        let ctx = &self.ctx;
        if from == ctx.name {
            return Ok(());
        }
        let mut memory = NewMemory::new(
            ctx.agent_id.clone(),
            memory_types::CHAT,
            format!("{from} said: {message}"),
        )
        .with_importance(0.3);

        if let Some(speaker) = ctx.store.agents().get_agent_by_name(from).await? {
            if speaker.id != ctx.agent_id {
                let edge = ctx
                    .store
                    .relationships()
                    .update_relationship(
                        &ctx.agent_id,
                        &speaker.id,
                        CHAT_AFFINITY_DELTA,
                        CHAT_TRUST_DELTA,
                    )
                    .await?;
                debug!(
                    agent_id = %ctx.agent_id,
                    other = %speaker.id,
                    affinity = edge.affinity,
                    "Relationship warmed by chat"
                );
                memory = memory.about(speaker.id);
            }
        }
        ctx.store.journal().add_memory(&memory).await?;
        Ok(())
    }

    async fn check_safety(&mut self) -> Result<(), DbError> {
        let threshold = self.ctx.config.safety_health_threshold;
        if self.stats.health >= threshold {
            self.in_danger = false;
            return Ok(());
        }
        if self.in_danger || self.stats.health <= 0.0 {
            return Ok(());
        }
        self.in_danger = true;

        let ctx = Arc::clone(&self.ctx);
        let interrupted = ctx.executor.cancel_current_action().await;
        warn!(
            agent_id = %ctx.agent_id,
            health = self.stats.health,
            ?interrupted,
            "Health critical, retreating to rest"
        );
        let mut memory = NewMemory::new(
            ctx.agent_id.clone(),
            memory_types::DANGER,
            format!("Health dropped to {:.1}", self.stats.health),
        )
        .with_importance(0.8);
        if let Some(position) = self.position {
            memory = memory.at(position);
        }
        ctx.store.journal().add_memory(&memory).await?;

        self.spawn_action(ActionRequest::rest(RECOVERY_REST));
        Ok(())
    }

    fn start_activity(&mut self) {
        if self.in_danger || self.ctx.executor.is_busy() {
            return;
        }
        if self.activity.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let request = choose_activity(&self.ctx.personality, &self.stats, &mut rand::rng());
        self.spawn_action(request);
    }

    fn spawn_action(&mut self, request: ActionRequest) {
        let ctx = Arc::clone(&self.ctx);
        debug!(agent_id = %ctx.agent_id, action = %request.action_type(), "Starting action");
        self.activity = Some(tokio::spawn(async move {
            if let Err(err) = perform(&ctx, request).await {
                warn!(agent_id = %ctx.agent_id, %err, "Failed to record action outcome");
            }
        }));
    }

    async fn record_disconnect(&self) -> Result<(), DbError> {
        let ctx = &self.ctx;
        info!(agent_id = %ctx.agent_id, "World connection closed");
        ctx.store
            .events()
            .log_event(
                &NewEvent::new(
                    EventType::AgentDisconnected,
                    format!("{} disconnected", ctx.name),
                )
                .agent(ctx.agent_id.clone()),
            )
            .await?;
        Ok(())
    }

    async fn drain(&mut self) {
        self.ctx.executor.cancel_current_action().await;
        if let Some(mut task) = self.activity.take() {
            if tokio::time::timeout(ACTION_DRAIN_TIMEOUT, &mut task).await.is_err() {
                warn!(agent_id = %self.ctx.agent_id, "Action did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

/// Run one action and write its outcome to the store.
///
/// # Errors
///
/// Returns [`DbError`] if the outcome cannot be recorded. The action's own
/// failure is recorded, not returned.
pub async fn perform(ctx: &AgentContext, request: ActionRequest) -> Result<ActionResult, DbError> {
    let kind = request.action_type();
    let goal = match &request {
        ActionRequest::BuildStructure(params) => {
            let structure = params.structure.clone().unwrap_or_default();
            let goal = NewGoal::new(
                ctx.agent_id.clone(),
                kind.as_str(),
                format!("Build a {structure}"),
            )
            .with_priority(ctx.personality.ambition)
            .with_metadata(serde_json::json!({ "structure": structure }));
            Some(ctx.store.goals().add_goal(&goal).await?)
        }
        _ => None,
    };

    let result = ctx.executor.execute(request).await;
    let position = ctx.executor.world().position().await.ok().flatten();

    let (content, importance) = match &result {
        Ok(data) => (format!("{kind} succeeded: {}", describe(data)), 0.4),
        Err(failure) => (format!("{kind} failed: {failure}"), 0.5),
    };
    info!(agent_id = %ctx.agent_id, action = %kind, ok = result.is_ok(), "Action finished");

    let mut memory = NewMemory::new(ctx.agent_id.clone(), memory_types::ACTION, content)
        .with_importance(importance);
    if let Some(position) = position {
        memory = memory.at(position);
    }
    ctx.store.journal().add_memory(&memory).await?;

    if let Some(goal_id) = goal {
        let completed = matches!(result, Ok(ActionData::Built { complete: true, .. }));
        let (status, event_type) = if completed {
            (GoalStatus::Completed, EventType::GoalCompleted)
        } else {
            (GoalStatus::Abandoned, EventType::GoalAbandoned)
        };
        ctx.store.goals().update_goal_status(goal_id, status).await?;
        ctx.store
            .events()
            .log_event(
                &NewEvent::new(event_type, format!("{} goal {goal_id}: {status}", ctx.name))
                    .agent(ctx.agent_id.clone()),
            )
            .await?;
    }

    if let Ok(ActionData::Built {
        structure,
        location,
        complete: true,
        ..
    }) = &result
    {
        ctx.store
            .events()
            .log_event(
                &NewEvent::new(
                    EventType::StructureBuilt,
                    format!("{} built a {structure}", ctx.name),
                )
                .agent(ctx.agent_id.clone())
                .metadata(serde_json::json!({ "structure": structure, "location": location })),
            )
            .await?;
    }

    match ctx.executor.world().inventory().await {
        Ok(items) => {
            ctx.store
                .agents()
                .save_inventory_snapshot(&ctx.agent_id, &items)
                .await?;
        }
        Err(err) => debug!(agent_id = %ctx.agent_id, %err, "Inventory unavailable"),
    }
    ctx.store.agents().touch(&ctx.agent_id).await?;
    Ok(result)
}

fn describe(data: &ActionData) -> String {
    match data {
        ActionData::Gathered { item, amount } => format!("gathered {amount} {item}"),
        ActionData::Mined { item } => format!("mined {item}"),
        ActionData::Hunted { target } => format!("hunted a {target}"),
        ActionData::Explored { distance, .. } => format!("explored {distance:.0} blocks"),
        ActionData::Built {
            structure, placed, ..
        } => format!("placed {placed} blocks of a {structure}"),
        ActionData::Crafted { item } => format!("crafted {item}"),
        ActionData::Socialized { message, .. } => format!("said \"{message}\""),
        ActionData::TradeProposed { target } => format!("proposed a trade to {target}"),
        ActionData::Defended { threat } => format!("fought a {threat}"),
        ActionData::Rested { duration_ms } => format!("rested {duration_ms} ms"),
    }
}

fn emotions_for(stats: &AgentStats) -> Emotions {
    let food = f64::from(i32::try_from(stats.food.clamp(0, 20)).unwrap_or(20));
    Emotions {
        hunger: 1.0 - food / 20.0,
        safety: (stats.health / 20.0).clamp(0.0, 1.0),
        stress: (1.0 - stats.health / 20.0).clamp(0.0, 1.0),
        ..Emotions::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn emotions_track_vitals() {
        let calm = emotions_for(&AgentStats::default());
        assert_eq!(calm.hunger, 0.0);
        assert_eq!(calm.safety, 1.0);

        let hurt = emotions_for(&AgentStats {
            health: 5.0,
            food: 5,
            ..AgentStats::default()
        });
        assert_eq!(hurt.hunger, 0.75);
        assert_eq!(hurt.safety, 0.25);
        assert_eq!(hurt.stress, 0.75);
    }

    #[test]
    fn descriptions_name_the_outcome() {
        let text = describe(&ActionData::Gathered {
            item: "oak_log".to_owned(),
            amount: 3,
        });
        assert_eq!(text, "gathered 3 oak_log");
    }
}
