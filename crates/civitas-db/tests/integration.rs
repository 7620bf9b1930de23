//! Integration tests for the `civitas-db` store.
//!
//! Every test opens a fresh `SQLite` file inside a temporary directory, so
//! the suite needs no external services.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::indexing_slicing,
    clippy::too_many_lines
)]

use std::time::Duration;

use civitas_db::{
    DbError, NewEvent, NewGoal, NewMemory, NewVillage, SqliteConfig, SqliteStore,
};
use civitas_types::{
    AgentId, AgentStats, EventType, GoalStatus, Inventory, Personality, Position, memory_types,
};
use tempfile::TempDir;

async fn open_temp() -> (TempDir, SqliteStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open_path(dir.path().join("civilization.db"))
        .await
        .expect("open store");
    (dir, store)
}

async fn seed_agent(store: &SqliteStore, id: &str, name: &str) -> AgentId {
    let id = AgentId::new(id);
    store
        .agents()
        .create_agent(&id, name, name)
        .await
        .expect("create agent");
    id
}

// =============================================================================
// Agents
// =============================================================================

#[tokio::test]
async fn agent_rows_take_defaults_and_track_updates() {
    let (_dir, store) = open_temp().await;
    let id = seed_agent(&store, "bot_a", "Ada").await;

    let agent = store.agents().get_agent(&id).await.unwrap().unwrap();
    assert_eq!(agent.name, "Ada");
    assert_eq!(agent.dimension, "overworld");
    assert_eq!(agent.stats, AgentStats::default());
    assert!(agent.position.is_none());

    store
        .agents()
        .update_position(&id, &Position::new(10.5, 64.0, -3.0), "overworld")
        .await
        .unwrap();
    store
        .agents()
        .update_stats(
            &id,
            &AgentStats {
                health: 12.5,
                food: 9,
                level: 2,
                experience: 40,
            },
        )
        .await
        .unwrap();

    let agent = store.agents().get_agent_by_name("Ada").await.unwrap().unwrap();
    assert_eq!(agent.position, Some(Position::new(10.5, 64.0, -3.0)));
    assert_eq!(agent.stats.food, 9);
    assert_eq!(store.agents().count_agents().await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_names_are_rejected() {
    let (_dir, store) = open_temp().await;
    seed_agent(&store, "bot_a", "Ada").await;

    let result = store
        .agents()
        .create_agent(&AgentId::new("bot_b"), "Ada", "Ada")
        .await;
    assert!(matches!(result, Err(DbError::Sqlite(_))));
}

#[tokio::test]
async fn upsert_keeps_position_and_history() {
    let (_dir, store) = open_temp().await;
    let id = seed_agent(&store, "bot_a", "Ada").await;
    store
        .agents()
        .update_position(&id, &Position::new(1.0, 2.0, 3.0), "overworld")
        .await
        .unwrap();

    let agent = store
        .agents()
        .upsert_agent(&id, "Ada", "ada_mc")
        .await
        .unwrap();
    assert_eq!(agent.username, "ada_mc");
    assert_eq!(agent.position, Some(Position::new(1.0, 2.0, 3.0)));
    assert_eq!(store.agents().count_agents().await.unwrap(), 1);
}

#[tokio::test]
async fn updating_a_missing_agent_is_not_found() {
    let (_dir, store) = open_temp().await;
    let result = store.agents().touch(&AgentId::new("bot_ghost")).await;
    assert!(matches!(result, Err(DbError::NotFound { .. })));
}

#[tokio::test]
async fn personality_traits_are_clamped_on_write() {
    let (_dir, store) = open_temp().await;
    let id = seed_agent(&store, "bot_a", "Ada").await;

    let wild = Personality {
        curiosity: 1.7,
        aggression: -0.4,
        ..Personality::default()
    };
    store.agents().set_personality(&id, &wild).await.unwrap();

    let stored = store.agents().get_personality(&id).await.unwrap().unwrap();
    assert_eq!(stored.curiosity, 1.0);
    assert_eq!(stored.aggression, 0.0);
    assert_eq!(stored.sociability, 0.5);
}

#[tokio::test]
async fn latest_inventory_snapshot_wins() {
    let (_dir, store) = open_temp().await;
    let id = seed_agent(&store, "bot_a", "Ada").await;

    let first: Inventory = [("oak_log".to_owned(), 3)].into_iter().collect();
    let second: Inventory = [("oak_log".to_owned(), 1), ("oak_planks".to_owned(), 8)]
        .into_iter()
        .collect();
    store.agents().save_inventory_snapshot(&id, &first).await.unwrap();
    store.agents().save_inventory_snapshot(&id, &second).await.unwrap();

    let latest = store
        .agents()
        .latest_inventory_snapshot(&id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.items, second);
}

// =============================================================================
// Journal
// =============================================================================

#[tokio::test]
async fn recent_memories_filter_by_type_newest_first() {
    let (_dir, store) = open_temp().await;
    let id = seed_agent(&store, "bot_a", "Ada").await;
    let journal = store.journal();

    for i in 0..5 {
        journal
            .add_memory(&NewMemory::new(id.clone(), memory_types::ACTION, format!("act {i}")))
            .await
            .unwrap();
    }
    journal
        .add_memory(
            &NewMemory::new(id.clone(), memory_types::DANGER, "low health")
                .with_importance(3.0)
                .at(Position::new(0.0, 64.0, 0.0)),
        )
        .await
        .unwrap();

    let all = journal.recent_memories(&id, 50, None).await.unwrap();
    assert_eq!(all.len(), 6);
    assert_eq!(all[0].content, "low health");
    assert_eq!(all[0].importance, 1.0);

    let actions = journal
        .recent_memories(&id, 2, Some(memory_types::ACTION))
        .await
        .unwrap();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].content, "act 4");
    assert_eq!(actions[1].content, "act 3");
}

#[tokio::test]
async fn latest_emotion_is_returned() {
    let (_dir, store) = open_temp().await;
    let id = seed_agent(&store, "bot_a", "Ada").await;
    let journal = store.journal();

    assert!(journal.latest_emotion(&id).await.unwrap().is_none());

    let mut emotions = civitas_types::Emotions::default();
    journal.add_emotion(&id, &emotions).await.unwrap();
    emotions.stress = 0.8;
    journal.add_emotion(&id, &emotions).await.unwrap();

    let latest = journal.latest_emotion(&id).await.unwrap().unwrap();
    assert_eq!(latest.emotions.stress, 0.8);
}

// =============================================================================
// Relationships
// =============================================================================

#[tokio::test]
async fn relationship_deltas_accumulate_and_clamp() {
    let (_dir, store) = open_temp().await;
    let a = seed_agent(&store, "bot_a", "Ada").await;
    let b = seed_agent(&store, "bot_b", "Bo").await;
    let rels = store.relationships();

    for _ in 0..30 {
        rels.update_relationship(&a, &b, 0.05, -0.1).await.unwrap();
    }

    let edge = rels.get_relationship(&a, &b).await.unwrap().unwrap();
    assert!((edge.affinity - 1.0).abs() < 1e-9);
    assert!((edge.trust + 1.0).abs() < 1e-9);
    assert_eq!(edge.interaction_count, 30);
    assert!(edge.last_interaction.is_some());

    // Directed: the reverse edge does not exist.
    assert!(rels.get_relationship(&b, &a).await.unwrap().is_none());
}

#[tokio::test]
async fn relationship_to_unknown_agent_is_rejected() {
    let (_dir, store) = open_temp().await;
    let a = seed_agent(&store, "bot_a", "Ada").await;

    let result = store
        .relationships()
        .update_relationship(&a, &AgentId::new("bot_ghost"), 0.1, 0.1)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn relationships_for_lists_strongest_first_with_names() {
    let (_dir, store) = open_temp().await;
    let a = seed_agent(&store, "bot_a", "Ada").await;
    let b = seed_agent(&store, "bot_b", "Bo").await;
    let c = seed_agent(&store, "bot_c", "Cy").await;
    let rels = store.relationships();

    rels.update_relationship(&a, &b, 0.2, 0.0).await.unwrap();
    rels.update_relationship(&a, &c, 0.7, 0.0).await.unwrap();

    let views = rels.relationships_for(&a).await.unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].other_name, "Cy");
    assert_eq!(views[1].other_name, "Bo");
}

#[tokio::test]
async fn concurrent_relationship_updates_are_not_lost() {
    let (_dir, store) = open_temp().await;
    let a = seed_agent(&store, "bot_a", "Ada").await;
    let b = seed_agent(&store, "bot_b", "Bo").await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        let (a, b) = (a.clone(), b.clone());
        handles.push(tokio::spawn(async move {
            store
                .relationships()
                .update_relationship(&a, &b, 0.01, 0.0)
                .await
                .map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let edge = store
        .relationships()
        .get_relationship(&a, &b)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(edge.interaction_count, 10);
    assert!((edge.affinity - 0.1).abs() < 1e-9);
}

// =============================================================================
// Villages
// =============================================================================

#[tokio::test]
async fn population_follows_membership() {
    let (_dir, store) = open_temp().await;
    let a = seed_agent(&store, "bot_a", "Ada").await;
    let b = seed_agent(&store, "bot_b", "Bo").await;
    let villages = store.villages();

    let village = villages
        .create_village(&NewVillage::new("Oakridge", Position::new(0.0, 64.0, 0.0)))
        .await
        .unwrap();
    assert_eq!(village.population, 0);
    assert_eq!(village.radius, 50.0);
    assert_eq!(village.culture, "generic");

    villages.add_member(&village.id, &a, None).await.unwrap();
    villages.add_member(&village.id, &b, Some("builder")).await.unwrap();
    let v = villages.get_village(&village.id).await.unwrap().unwrap();
    assert_eq!(v.population, 2);

    assert!(villages.remove_member(&village.id, &a).await.unwrap());
    assert!(!villages.remove_member(&village.id, &a).await.unwrap());
    let v = villages.get_village(&village.id).await.unwrap().unwrap();
    assert_eq!(v.population, 1);
    assert_eq!(villages.member_count(&village.id).await.unwrap(), 1);

    let members = villages.members(&village.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].agent_name, "Bo");
    assert_eq!(members[0].role, "builder");
}

#[tokio::test]
async fn contributions_accumulate_for_members_only() {
    let (_dir, store) = open_temp().await;
    let a = seed_agent(&store, "bot_a", "Ada").await;
    let villages = store.villages();
    let village = villages
        .create_village(&NewVillage::new("Oakridge", Position::default()))
        .await
        .unwrap();

    let missing = villages.add_contribution(&village.id, &a, 1.0).await;
    assert!(matches!(missing, Err(DbError::NotFound { .. })));

    villages.add_member(&village.id, &a, None).await.unwrap();
    villages.add_contribution(&village.id, &a, 1.5).await.unwrap();
    villages.add_contribution(&village.id, &a, 1.0).await.unwrap();
    let members = villages.members(&village.id).await.unwrap();
    assert_eq!(members[0].contribution_score, 2.5);
}

#[tokio::test]
async fn non_positive_radius_is_rejected() {
    let (_dir, store) = open_temp().await;
    let result = store
        .villages()
        .create_village(&NewVillage::new("Nowhere", Position::default()).with_radius(0.0))
        .await;
    assert!(matches!(result, Err(DbError::Config(_))));
}

// =============================================================================
// Cascades
// =============================================================================

#[tokio::test]
async fn deleting_an_agent_cascades_and_keeps_events() {
    let (_dir, store) = open_temp().await;
    let a = seed_agent(&store, "bot_a", "Ada").await;
    let b = seed_agent(&store, "bot_b", "Bo").await;

    store.agents().set_personality(&a, &Personality::default()).await.unwrap();
    store.relationships().update_relationship(&a, &b, 0.3, 0.1).await.unwrap();
    store.relationships().update_relationship(&b, &a, 0.3, 0.1).await.unwrap();
    store
        .journal()
        .add_memory(&NewMemory::new(b.clone(), memory_types::SOCIAL, "met Ada").about(a.clone()))
        .await
        .unwrap();
    store
        .goals()
        .add_goal(&NewGoal::new(a.clone(), "gather_wood", "chop"))
        .await
        .unwrap();

    let village = store
        .villages()
        .create_village(&NewVillage::new("Oakridge", Position::default()))
        .await
        .unwrap();
    store.villages().add_member(&village.id, &a, None).await.unwrap();
    store.villages().add_member(&village.id, &b, None).await.unwrap();

    let event_id = store
        .events()
        .log_event(&NewEvent::new(EventType::AgentSpawned, "Ada spawned").agent(a.clone()))
        .await
        .unwrap();

    assert!(store.agents().delete_agent(&a).await.unwrap());
    assert!(!store.agents().delete_agent(&a).await.unwrap());

    assert!(store.agents().get_personality(&a).await.unwrap().is_none());
    assert!(store.relationships().all_relationships().await.unwrap().is_empty());
    assert!(store.goals().active_goals(&a).await.unwrap().is_empty());

    let v = store.villages().get_village(&village.id).await.unwrap().unwrap();
    assert_eq!(v.population, 1);

    let memories = store.journal().recent_memories(&b, 10, None).await.unwrap();
    assert_eq!(memories.len(), 1);
    assert!(memories[0].related_agent_id.is_none());

    let events = store.events().recent_events(10, None).await.unwrap();
    let event = events.iter().find(|e| e.id == event_id).unwrap();
    assert!(event.agent_id.is_none());
}

// =============================================================================
// Events and goals
// =============================================================================

#[tokio::test]
async fn events_filter_by_type_and_count() {
    let (_dir, store) = open_temp().await;
    let a = seed_agent(&store, "bot_a", "Ada").await;
    let events = store.events();

    events
        .log_event(&NewEvent::new(EventType::AgentSpawned, "spawned").agent(a.clone()))
        .await
        .unwrap();
    events
        .log_event(
            &NewEvent::new(EventType::VillageFormationDetected, "cluster")
                .metadata(serde_json::json!({"members": ["bot_a"]})),
        )
        .await
        .unwrap();

    assert_eq!(events.count_events(None).await.unwrap(), 2);
    assert_eq!(
        events
            .count_events(Some(EventType::VillageFormationDetected))
            .await
            .unwrap(),
        1
    );

    let formation = events
        .recent_events(100, Some(EventType::VillageFormationDetected))
        .await
        .unwrap();
    assert_eq!(formation.len(), 1);
    assert_eq!(
        formation[0].metadata,
        Some(serde_json::json!({"members": ["bot_a"]}))
    );

    let for_agent = events.events_for_agent(&a, 10).await.unwrap();
    assert_eq!(for_agent.len(), 1);
    assert_eq!(for_agent[0].event_type, EventType::AgentSpawned);
}

#[tokio::test]
async fn goal_completion_sets_timestamp_only_when_completed() {
    let (_dir, store) = open_temp().await;
    let a = seed_agent(&store, "bot_a", "Ada").await;
    let goals = store.goals();

    let low = goals
        .add_goal(&NewGoal::new(a.clone(), "rest", "nap").with_priority(0.1))
        .await
        .unwrap();
    let high = goals
        .add_goal(
            &NewGoal::new(a.clone(), "gather_wood", "logs")
                .with_priority(0.9)
                .with_metadata(serde_json::json!({"amount": 4})),
        )
        .await
        .unwrap();

    let active = goals.active_goals(&a).await.unwrap();
    assert_eq!(active.iter().map(|g| g.id).collect::<Vec<_>>(), vec![high, low]);

    assert!(goals.update_goal_status(low, GoalStatus::Abandoned).await.unwrap());
    assert!(goals.get_goal(low).await.unwrap().unwrap().completed_at.is_none());

    assert!(goals.update_goal_status(high, GoalStatus::Completed).await.unwrap());
    let done = goals.get_goal(high).await.unwrap().unwrap();
    assert_eq!(done.status, GoalStatus::Completed);
    assert!(done.completed_at.is_some());

    assert!(goals.active_goals(&a).await.unwrap().is_empty());
    assert!(!goals.update_goal_status(9999, GoalStatus::Completed).await.unwrap());
}

// =============================================================================
// Backup, restore, export
// =============================================================================

#[tokio::test]
async fn backup_then_restore_preserves_every_entity() {
    let (dir, store) = open_temp().await;
    let a = seed_agent(&store, "bot_a", "Ada").await;
    let b = seed_agent(&store, "bot_b", "Bo").await;
    store.relationships().update_relationship(&a, &b, 0.6, 0.2).await.unwrap();
    let village = store
        .villages()
        .create_village(&NewVillage::new("Oakridge", Position::new(5.0, 64.0, 5.0)))
        .await
        .unwrap();
    store.villages().add_member(&village.id, &a, None).await.unwrap();
    store
        .events()
        .log_event(&NewEvent::new(EventType::VillageFounded, "founded").village(village.id.clone()))
        .await
        .unwrap();

    let before = store.export().await.unwrap();
    let snapshot = dir.path().join("backups").join("civilization_1.db");
    store.backup_to(&snapshot).await.unwrap();

    // A second backup to the same file is refused.
    assert!(matches!(
        store.backup_to(&snapshot).await,
        Err(DbError::Config(_))
    ));

    // Diverge after the backup; the restore must not see this.
    seed_agent(&store, "bot_c", "Cy").await;
    store.close().await;

    let config = SqliteConfig::new(dir.path().join("restored.db"));
    let restored = SqliteStore::restore_from(&snapshot, &config).await.unwrap();
    let after = restored.export().await.unwrap();

    assert_eq!(after.agents, before.agents);
    assert_eq!(after.relationships, before.relationships);
    assert_eq!(after.villages, before.villages);
    assert_eq!(after.village_members, before.village_members);
    assert_eq!(after.events, before.events);
    assert_eq!(after.row_count(), before.row_count());
    restored.close().await;
}

#[tokio::test]
async fn export_serializes_to_json() {
    let (_dir, store) = open_temp().await;
    seed_agent(&store, "bot_a", "Ada").await;

    let export = store.export().await.unwrap();
    let json = serde_json::to_value(&export).unwrap();
    assert_eq!(json["agents"][0]["name"], "Ada");
}

#[tokio::test]
async fn opening_a_corrupt_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.db");
    std::fs::write(&path, vec![0xAB_u8; 8192]).unwrap();

    let config = SqliteConfig::new(&path).with_acquire_timeout(Duration::from_secs(2));
    let result = SqliteStore::open(&config).await;
    assert!(result.is_err());
}
