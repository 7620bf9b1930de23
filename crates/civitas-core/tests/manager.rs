//! Orchestrator lifecycle against the sandbox world and a real store.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::indexing_slicing,
    clippy::too_many_lines
)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use civitas_agents::{ActionExecutor, Connector, SimulatedWorld};
use civitas_core::runtime::perform;
use civitas_core::{
    AgentContext, AgentSpec, BotManager, CivitasConfig, PersonalityRegistry, PersonalityTemplate,
    SpawnError, StartupError,
};
use civitas_db::{SqliteConfig, SqliteStore};
use civitas_types::{
    ActionRequest, AgentId, BlockPos, BuildParams, EventType, GoalStatus, Personality, Position,
    memory_types,
};
use tempfile::TempDir;

const POLL: Duration = Duration::from_millis(10);
const POLLS: u32 = 300;

fn config(dir: &Path, names: &[&str]) -> CivitasConfig {
    let mut config = CivitasConfig::default();
    config.store.path = dir.join("civilization.db");
    config.store.backup_dir = dir.join("backups");
    config.spawning.spawn_delay_ms = 0;
    config.runtime.autonomous = false;
    config.agents = names.iter().map(|n| AgentSpec::named(*n)).collect();
    config
}

fn personalities(names: &[&str]) -> PersonalityRegistry {
    names
        .iter()
        .map(|n| {
            PersonalityTemplate::new(
                *n,
                Personality {
                    sociability: 0.9,
                    ..Personality::default()
                },
            )
        })
        .collect()
}

async fn manager(
    names: &[&str],
    templates: PersonalityRegistry,
) -> (TempDir, SimulatedWorld, BotManager) {
    let dir = tempfile::tempdir().expect("tempdir");
    let world = SimulatedWorld::default();
    let connector: Arc<dyn Connector> = Arc::new(world.clone());
    let manager = BotManager::open(config(dir.path(), names), connector, templates)
        .await
        .expect("open manager");
    (dir, world, manager)
}

async fn reopen(
    config: CivitasConfig,
    templates: PersonalityRegistry,
) -> (SimulatedWorld, BotManager) {
    let world = SimulatedWorld::default();
    let connector: Arc<dyn Connector> = Arc::new(world.clone());
    let manager = BotManager::open(config, connector, templates)
        .await
        .expect("open manager");
    (world, manager)
}

async fn count(manager: &BotManager, event_type: EventType) -> i64 {
    manager
        .store()
        .events()
        .count_events(Some(event_type))
        .await
        .unwrap()
}

async fn formations(store: &SqliteStore) -> i64 {
    store
        .events()
        .count_events(Some(EventType::VillageFormationDetected))
        .await
        .unwrap()
}

async fn wait_for_events(manager: &BotManager, event_type: EventType, n: i64) -> bool {
    for _ in 0..POLLS {
        if count(manager, event_type).await >= n {
            return true;
        }
        tokio::time::sleep(POLL).await;
    }
    false
}

async fn wait_for_position(store: &SqliteStore, id: &AgentId) -> Option<Position> {
    for _ in 0..POLLS {
        if let Some(position) = store.agents().get_agent(id).await.unwrap().and_then(|a| a.position)
        {
            return Some(position);
        }
        tokio::time::sleep(POLL).await;
    }
    None
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn spawn_persists_agent_personality_and_event() {
    let (_dir, world, manager) = manager(&[], personalities(&["builder", "explorer"])).await;

    let id = manager
        .spawn_agent(AgentSpec::named("Ash").with_personality("explorer"))
        .await
        .unwrap();

    assert_eq!(manager.live_agents(), vec![id.clone()]);
    assert!(world.is_online("Ash"));
    let row = manager.store().agents().get_agent(&id).await.unwrap().unwrap();
    assert_eq!(row.name, "Ash");
    assert_eq!(row.username, "Ash");
    let traits = manager.store().agents().get_personality(&id).await.unwrap().unwrap();
    assert_eq!(traits.sociability, 0.9);
    assert_eq!(count(&manager, EventType::AgentSpawned).await, 1);

    let status = manager.agent_status(&id).await.unwrap().unwrap();
    assert_eq!(status.personality, "explorer");
    assert!(status.online);

    assert_eq!(
        wait_for_position(manager.store(), &id).await,
        Some(world.spawn_point())
    );
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn spawn_without_type_uses_a_loaded_template() {
    let (_dir, _world, manager) = manager(&[], personalities(&["builder", "explorer"])).await;
    for name in ["A", "B", "C", "D"] {
        let id = manager.spawn_agent(AgentSpec::named(name)).await.unwrap();
        let status = manager.agent_status(&id).await.unwrap().unwrap();
        assert!(["builder", "explorer"].contains(&status.personality.as_str()));
    }
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn spawn_without_personalities_fails_fast() {
    let (_dir, world, manager) = manager(&[], PersonalityRegistry::new()).await;

    let err = manager.spawn_agent(AgentSpec::named("Ash")).await.unwrap_err();

    assert!(matches!(err, SpawnError::NoPersonality));
    assert!(manager.live_agents().is_empty());
    assert!(!world.is_online("Ash"));
    assert_eq!(manager.store().agents().count_agents().await.unwrap(), 0);
}

#[tokio::test]
async fn spawn_retries_transient_connect_failures() {
    let (_dir, world, manager) = manager(&[], personalities(&["builder"])).await;
    world.fail_connects("Ash", 2);

    let id = manager.spawn_agent(AgentSpec::named("Ash")).await.unwrap();
    assert!(manager.live_agents().contains(&id));
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn spawn_gives_up_after_max_attempts() {
    let (_dir, world, manager) = manager(&[], personalities(&["builder"])).await;
    world.fail_connects("Ash", 3);

    let err = manager.spawn_agent(AgentSpec::named("Ash")).await.unwrap_err();
    assert!(matches!(err, SpawnError::ConnectFailed { attempts: 3, .. }));
    assert!(manager.live_agents().is_empty());
}

#[tokio::test]
async fn duplicate_live_id_is_rejected() {
    let (_dir, _world, manager) = manager(&[], personalities(&["builder"])).await;
    let spec = AgentSpec {
        id: Some("agent-1".to_owned()),
        ..AgentSpec::named("Ash")
    };
    manager.spawn_agent(spec.clone()).await.unwrap();
    let err = manager.spawn_agent(spec).await.unwrap_err();
    assert!(matches!(err, SpawnError::AlreadyRunning(_)));
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn unnamed_agents_get_sequential_names() {
    let (_dir, world, manager) = manager(&[], personalities(&["builder"])).await;
    manager.spawn_agent(AgentSpec::default()).await.unwrap();
    manager.spawn_agent(AgentSpec::default()).await.unwrap();
    assert!(world.is_online("Bot_1"));
    assert!(world.is_online("Bot_2"));
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn respawning_a_removed_agent_refreshes_its_row() {
    let (_dir, _world, manager) = manager(&[], personalities(&["builder"])).await;
    let spec = AgentSpec {
        id: Some("agent-1".to_owned()),
        ..AgentSpec::named("Ash")
    };
    let id = manager.spawn_agent(spec.clone()).await.unwrap();
    assert!(manager.remove_agent(&id).await.unwrap());
    manager.spawn_agent(spec).await.unwrap();
    assert_eq!(manager.store().agents().count_agents().await.unwrap(), 1);
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn restart_on_the_same_store_reuses_agents() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["Ash", "Briar"]);

    let (_world, first) = reopen(config.clone(), personalities(&["builder"])).await;
    let before = first.start().await.unwrap().spawned;
    first.shutdown().await.unwrap();

    let (world, second) = reopen(config, personalities(&["builder"])).await;
    let after = second.start().await.unwrap().spawned;

    assert_eq!(before, after);
    assert!(world.is_online("Ash") && world.is_online("Briar"));
    assert_eq!(second.store().agents().count_agents().await.unwrap(), 2);
    assert_eq!(count(&second, EventType::AgentSpawned).await, 4);
    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn default_names_skip_persisted_agents() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &[]);

    let (_world, first) = reopen(config.clone(), personalities(&["builder"])).await;
    first.spawn_agent(AgentSpec::default()).await.unwrap();
    first.shutdown().await.unwrap();

    let (world, second) = reopen(config, personalities(&["builder"])).await;
    second.spawn_agent(AgentSpec::default()).await.unwrap();

    assert!(world.is_online("Bot_2"));
    assert!(!world.is_online("Bot_1"));
    assert_eq!(second.store().agents().count_agents().await.unwrap(), 2);
    second.shutdown().await.unwrap();
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_spawns_every_configured_agent() {
    let (_dir, world, manager) = manager(&["Ash", "Bo", "Cy"], personalities(&["builder"])).await;

    let report = manager.start().await.unwrap();

    assert_eq!(report.spawned.len(), 3);
    assert_eq!(report.failed, 0);
    assert!(["Ash", "Bo", "Cy"].iter().all(|n| world.is_online(n)));
    let status = manager.status().await.unwrap();
    assert_eq!(status.total_agents, 3);
    assert_eq!(status.active_agents, 3);
    assert_eq!(manager.all_agent_status().await.unwrap().len(), 3);
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn start_paces_spawns_by_the_spawn_delay() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), &["Ash", "Bo", "Cy"]);
    config.spawning.spawn_delay_ms = 200;
    let (_world, manager) = reopen(config, personalities(&["builder"])).await;

    let started = Instant::now();
    let report = manager.start().await.unwrap();

    assert_eq!(report.spawned.len(), 3);
    assert!(started.elapsed() >= Duration::from_millis(400));
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn start_schedules_the_periodic_tick_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), &["Ash", "Bo", "Cy"]);
    config.civilization.tick_interval_secs = 1;
    let db_path = config.store.path.clone();
    let (_world, manager) = reopen(config, personalities(&["builder"])).await;

    let started = Instant::now();
    let ids = manager.start().await.unwrap().spawned;
    for id in &ids {
        assert!(wait_for_position(manager.store(), id).await.is_some());
    }
    let social = manager.store().relationships();
    social.update_relationship(&ids[0], &ids[1], 0.8, 0.0).await.unwrap();
    social.update_relationship(&ids[2], &ids[1], 0.8, 0.0).await.unwrap();

    let mut detected = false;
    for _ in 0..500 {
        if count(&manager, EventType::VillageFormationDetected).await >= 1 {
            detected = true;
            break;
        }
        tokio::time::sleep(POLL).await;
    }
    assert!(detected, "no formation event from the scheduled tick");
    assert!(started.elapsed() >= Duration::from_secs(1));
    manager.shutdown().await.unwrap();

    let store = SqliteStore::open_path(&db_path).await.unwrap();
    let settled = formations(&store).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(formations(&store).await, settled);
    store.close().await;
}

#[tokio::test]
async fn start_proceeds_when_some_agents_fail() {
    let (_dir, world, manager) = manager(&["Ash", "Bo", "Cy"], personalities(&["builder"])).await;
    world.fail_connects("Bo", 100);

    let report = manager.start().await.unwrap();

    assert_eq!(report.spawned.len(), 2);
    assert_eq!(report.failed, 1);
    assert_eq!(manager.live_agents().len(), 2);
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn start_fails_when_every_agent_fails() {
    let (_dir, world, manager) = manager(&["Ash", "Bo", "Cy"], personalities(&["builder"])).await;
    for name in ["Ash", "Bo", "Cy"] {
        world.fail_connects(name, 100);
    }

    let err = manager.start().await.unwrap_err();

    assert!(matches!(err, StartupError::AllSpawnsFailed { attempted: 3, .. }));
    assert!(manager.live_agents().is_empty());
    assert_eq!(manager.store().agents().count_agents().await.unwrap(), 0);
}

#[tokio::test]
async fn start_requires_personalities_and_agents() {
    let (_dir, _world, no_templates) = manager(&["Ash"], PersonalityRegistry::new()).await;
    assert!(matches!(
        no_templates.start().await,
        Err(StartupError::Config(_))
    ));

    let (_dir, _world, no_agents) = manager(&[], personalities(&["builder"])).await;
    assert!(matches!(no_agents.start().await, Err(StartupError::Config(_))));
}

// ---------------------------------------------------------------------------
// Removal and shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remove_agent_stops_and_disconnects() {
    let (_dir, world, manager) = manager(&[], personalities(&["builder"])).await;
    let id = manager.spawn_agent(AgentSpec::named("Ash")).await.unwrap();

    assert!(manager.remove_agent(&id).await.unwrap());

    assert!(manager.live_agents().is_empty());
    assert!(!world.is_online("Ash"));
    assert_eq!(count(&manager, EventType::AgentRemoved).await, 1);
    assert!(manager.store().agents().get_agent(&id).await.unwrap().is_some());
    assert!(!manager.remove_agent(&id).await.unwrap());
    assert!(!manager.remove_agent(&AgentId::new("nobody")).await.unwrap());
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_backs_up_and_is_idempotent() {
    let (_dir, world, manager) = manager(&["Ash", "Bo"], personalities(&["builder"])).await;
    manager.start().await.unwrap();

    let backup = manager.shutdown().await.unwrap().expect("final backup");

    assert!(backup.exists());
    let file_name = backup.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("civilization_"));
    assert!(file_name.ends_with(".db"));
    assert!(manager.store().is_closed());
    assert!(manager.live_agents().is_empty());
    assert!(!world.is_online("Ash"));
    assert!(manager.shutdown().await.unwrap().is_none());
    assert!(matches!(
        manager.spawn_agent(AgentSpec::named("Late")).await,
        Err(SpawnError::ShuttingDown)
    ));
}

#[tokio::test]
async fn backup_then_restore_preserves_state() {
    let (dir, world, manager) = manager(&["Ash", "Bo"], personalities(&["builder"])).await;
    let report = manager.start().await.unwrap();
    let (ash, bo) = (&report.spawned[0], &report.spawned[1]);
    manager
        .store()
        .relationships()
        .update_relationship(ash, bo, 0.4, 0.2)
        .await
        .unwrap();
    assert!(world.is_online("Bo"));
    for id in [ash, bo] {
        assert!(wait_for_position(manager.store(), id).await.is_some());
    }

    let first = manager.backup().await.unwrap();
    let second = manager.backup().await.unwrap();
    assert_ne!(first, second);
    let before = manager.store().export().await.unwrap();
    manager.shutdown().await.unwrap();

    let restored = SqliteStore::restore_from(
        &first,
        &SqliteConfig::new(dir.path().join("restored.db")),
    )
    .await
    .unwrap();
    let after = restored.export().await.unwrap();
    assert_eq!(after.agents, before.agents);
    assert_eq!(after.relationships, before.relationships);
    assert_eq!(after.villages, before.villages);
    assert!(after.events.len() >= 2);
    restored.close().await;
}

// ---------------------------------------------------------------------------
// Runtime behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chat_from_a_peer_warms_the_listener() {
    let (_dir, world, manager) = manager(&["Ash", "Bo"], personalities(&["builder"])).await;
    let report = manager.start().await.unwrap();
    let (ash, bo) = (report.spawned[0].clone(), report.spawned[1].clone());

    world.say("Ash", "good morning");

    let mut edge = None;
    for _ in 0..POLLS {
        edge = manager
            .store()
            .relationships()
            .get_relationship(&bo, &ash)
            .await
            .unwrap();
        if edge.is_some() {
            break;
        }
        tokio::time::sleep(POLL).await;
    }
    let edge = edge.expect("relationship from chat");
    assert!(edge.affinity > 0.0);
    assert_eq!(edge.interaction_count, 1);

    let memories = manager
        .store()
        .journal()
        .recent_memories(&bo, 10, Some(memory_types::CHAT))
        .await
        .unwrap();
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].related_agent_id.as_ref(), Some(&ash));
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn low_health_records_danger_and_rests() {
    let (_dir, world, manager) = manager(&[], personalities(&["builder"])).await;
    let id = manager.spawn_agent(AgentSpec::named("Ash")).await.unwrap();
    assert!(wait_for_position(manager.store(), &id).await.is_some());

    world.damage("Ash", 16.0);

    let mut danger = Vec::new();
    for _ in 0..POLLS {
        danger = manager
            .store()
            .journal()
            .recent_memories(&id, 10, Some(memory_types::DANGER))
            .await
            .unwrap();
        if !danger.is_empty() {
            break;
        }
        tokio::time::sleep(POLL).await;
    }
    assert_eq!(danger.len(), 1);
    let row = manager.store().agents().get_agent(&id).await.unwrap().unwrap();
    assert_eq!(row.stats.health, 4.0);
    assert!(
        manager
            .store()
            .journal()
            .latest_emotion(&id)
            .await
            .unwrap()
            .is_some()
    );
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn death_and_kick_are_logged() {
    let (_dir, world, manager) = manager(&[], personalities(&["builder"])).await;
    let id = manager.spawn_agent(AgentSpec::named("Ash")).await.unwrap();

    world.damage("Ash", 25.0);
    assert!(wait_for_events(&manager, EventType::AgentDied, 1).await);

    world.kick("Ash", "flying");
    assert!(wait_for_events(&manager, EventType::AgentKicked, 1).await);
    assert!(wait_for_events(&manager, EventType::AgentDisconnected, 1).await);

    let mut online = true;
    for _ in 0..POLLS {
        online = manager.agent_status(&id).await.unwrap().unwrap().online;
        if !online {
            break;
        }
        tokio::time::sleep(POLL).await;
    }
    assert!(!online);
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn on_demand_tick_reports_formation() {
    let (_dir, world, manager) =
        manager(&["Ash", "Bo", "Cy"], personalities(&["builder"])).await;
    let report = manager.start().await.unwrap();
    let ids = report.spawned;
    for id in &ids {
        assert!(wait_for_position(manager.store(), id).await.is_some());
    }
    let social = manager.store().relationships();
    social.update_relationship(&ids[0], &ids[1], 0.8, 0.0).await.unwrap();
    social.update_relationship(&ids[2], &ids[1], 0.8, 0.0).await.unwrap();
    assert!(world.is_online("Cy"));

    let tick = manager.run_civilization_tick().await.unwrap();
    assert_eq!(tick.formations.len(), 1);
    assert_eq!(count(&manager, EventType::VillageFormationDetected).await, 1);
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn performed_build_records_goal_structure_and_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_path(dir.path().join("civilization.db"))
        .await
        .unwrap();
    let world = SimulatedWorld::default();
    let session = world
        .connect(&CivitasConfig::default().world.profile("Ash"))
        .await
        .unwrap();
    let id = AgentId::new("ash");
    store.agents().create_agent(&id, "Ash", "Ash").await.unwrap();
    world.give("Ash", "oak_planks", 16);

    let ctx = AgentContext {
        agent_id: id.clone(),
        name: "Ash".to_owned(),
        store: store.clone(),
        executor: Arc::new(ActionExecutor::new(session.connection)),
        personality: Personality::default(),
        config: CivitasConfig::default().runtime,
    };
    let request = ActionRequest::BuildStructure(BuildParams {
        position: Some(BlockPos::new(30, 64, 30)),
        ..BuildParams::new("shelter")
    });

    let result = perform(&ctx, request).await.unwrap();
    assert!(result.is_ok());

    let events = store.events();
    assert_eq!(events.count_events(Some(EventType::StructureBuilt)).await.unwrap(), 1);
    assert_eq!(events.count_events(Some(EventType::GoalCompleted)).await.unwrap(), 1);
    let goals = store.goals().all_goals().await.unwrap();
    assert_eq!(goals.len(), 1);
    assert_eq!(goals[0].status, GoalStatus::Completed);
    assert!(goals[0].completed_at.is_some());

    let snapshot = store
        .agents()
        .latest_inventory_snapshot(&id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.items.get("oak_planks").copied().unwrap_or(0), 0);
    let memories = store
        .journal()
        .recent_memories(&id, 10, Some(memory_types::ACTION))
        .await
        .unwrap();
    assert_eq!(memories.len(), 1);
    assert!(memories[0].content.contains("succeeded"));
}

#[tokio::test]
async fn performed_failure_abandons_the_goal() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_path(dir.path().join("civilization.db"))
        .await
        .unwrap();
    let world = SimulatedWorld::default();
    let session = world
        .connect(&CivitasConfig::default().world.profile("Ash"))
        .await
        .unwrap();
    let id = AgentId::new("ash");
    store.agents().create_agent(&id, "Ash", "Ash").await.unwrap();

    let ctx = AgentContext {
        agent_id: id.clone(),
        name: "Ash".to_owned(),
        store: store.clone(),
        executor: Arc::new(ActionExecutor::new(session.connection)),
        personality: Personality::default(),
        config: CivitasConfig::default().runtime,
    };
    let request = ActionRequest::BuildStructure(BuildParams {
        position: Some(BlockPos::new(30, 64, 30)),
        auto_gather: false,
        ..BuildParams::new("shelter")
    });

    let result = perform(&ctx, request).await.unwrap();
    assert!(result.is_err());
    let goals = store.goals().all_goals().await.unwrap();
    assert_eq!(goals[0].status, GoalStatus::Abandoned);
    assert_eq!(
        store
            .events()
            .count_events(Some(EventType::GoalAbandoned))
            .await
            .unwrap(),
        1
    );
}
