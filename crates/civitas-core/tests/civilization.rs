//! Civilization tick against a real store: abandoned villages and formation
//! detection.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::indexing_slicing
)]

use civitas_core::config::CivilizationConfig;
use civitas_core::run_civilization_tick;
use civitas_db::{NewVillage, SqliteStore};
use civitas_types::{AgentId, EventType, Position};
use tempfile::TempDir;

async fn open_temp() -> (TempDir, SqliteStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open_path(dir.path().join("civilization.db"))
        .await
        .expect("open store");
    (dir, store)
}

async fn place_agent(store: &SqliteStore, name: &str, x: f64, z: f64) -> AgentId {
    let id = AgentId::new(name);
    store.agents().create_agent(&id, name, name).await.unwrap();
    store
        .agents()
        .update_position(&id, &Position::new(x, 64.0, z), "overworld")
        .await
        .unwrap();
    id
}

async fn befriend(store: &SqliteStore, a: &AgentId, b: &AgentId, affinity: f64) {
    store
        .relationships()
        .update_relationship(a, b, affinity, 0.0)
        .await
        .unwrap();
}

/// Four agents spread over `spacing`, with a-b and c-d strongly bonded.
async fn settle_four(store: &SqliteStore, spacing: f64) -> Vec<AgentId> {
    let mut ids = Vec::new();
    for (i, name) in ["a", "b", "c", "d"].into_iter().enumerate() {
        let offset = spacing * f64::from(u8::try_from(i).unwrap());
        ids.push(place_agent(store, name, offset, offset / 2.0).await);
    }
    befriend(store, &ids[0], &ids[1], 0.7).await;
    befriend(store, &ids[3], &ids[2], 0.6).await;
    befriend(store, &ids[1], &ids[2], 0.3).await;
    ids
}

async fn formation_events(store: &SqliteStore) -> i64 {
    store
        .events()
        .count_events(Some(EventType::VillageFormationDetected))
        .await
        .unwrap()
}

#[tokio::test]
async fn close_bonded_agents_trigger_formation() {
    let (_dir, store) = open_temp().await;
    settle_four(&store, 15.0).await;

    let report = run_civilization_tick(&store, &CivilizationConfig::default())
        .await
        .unwrap();

    assert_eq!(report.agents, 4);
    assert_eq!(report.positioned_agents, 4);
    assert_eq!(report.formations.len(), 1);
    let formation = &report.formations[0];
    assert_eq!(formation.cluster.len(), 4);
    assert_eq!(formation.strong_pairs, 2);
    assert_eq!(formation_events(&store).await, 1);

    let events = store
        .events()
        .recent_events(10, Some(EventType::VillageFormationDetected))
        .await
        .unwrap();
    let metadata = events[0].metadata.as_ref().unwrap();
    assert_eq!(metadata["members"].as_array().unwrap().len(), 4);
    assert_eq!(metadata["strong_pairs"], 2);
    assert!(store.villages().list_villages().await.unwrap().is_empty());
}

#[tokio::test]
async fn scattered_agents_form_nothing() {
    let (_dir, store) = open_temp().await;
    settle_four(&store, 500.0).await;

    let report = run_civilization_tick(&store, &CivilizationConfig::default())
        .await
        .unwrap();

    assert_eq!(report.clusters.len(), 4);
    assert!(report.formations.is_empty());
    assert_eq!(formation_events(&store).await, 0);
}

#[tokio::test]
async fn one_strong_pair_is_not_enough() {
    let (_dir, store) = open_temp().await;
    let a = place_agent(&store, "a", 0.0, 0.0).await;
    let b = place_agent(&store, "b", 5.0, 0.0).await;
    place_agent(&store, "c", 0.0, 5.0).await;
    befriend(&store, &a, &b, 0.9).await;
    befriend(&store, &b, &a, 0.9).await;

    let report = run_civilization_tick(&store, &CivilizationConfig::default())
        .await
        .unwrap();
    assert!(report.formations.is_empty());
    assert_eq!(formation_events(&store).await, 0);
}

#[tokio::test]
async fn clusters_inside_villages_are_ignored() {
    let (_dir, store) = open_temp().await;
    settle_four(&store, 15.0).await;
    let village = store
        .villages()
        .create_village(&NewVillage::new("Oakridge", Position::new(20.0, 64.0, 10.0)))
        .await
        .unwrap();
    let member = AgentId::new("a");
    store
        .villages()
        .add_member(&village.id, &member, None)
        .await
        .unwrap();

    let report = run_civilization_tick(&store, &CivilizationConfig::default())
        .await
        .unwrap();
    assert!(report.formations.is_empty());
    assert!(report.abandoned.is_empty());
}

#[tokio::test]
async fn unpositioned_agents_are_not_clustered() {
    let (_dir, store) = open_temp().await;
    for name in ["x", "y", "z"] {
        let id = AgentId::new(name);
        store.agents().create_agent(&id, name, name).await.unwrap();
    }

    let report = run_civilization_tick(&store, &CivilizationConfig::default())
        .await
        .unwrap();
    assert_eq!(report.agents, 3);
    assert_eq!(report.positioned_agents, 0);
    assert!(report.clusters.is_empty());
}

#[tokio::test]
async fn empty_village_is_reported_once_per_tick() {
    let (_dir, store) = open_temp().await;
    let empty = store
        .villages()
        .create_village(&NewVillage::new("Ghost Hollow", Position::new(0.0, 64.0, 0.0)))
        .await
        .unwrap();
    let lived_in = store
        .villages()
        .create_village(&NewVillage::new("Stonehaven", Position::new(900.0, 64.0, 0.0)))
        .await
        .unwrap();
    let resident = place_agent(&store, "r", 900.0, 0.0).await;
    store
        .villages()
        .add_member(&lived_in.id, &resident, None)
        .await
        .unwrap();

    let config = CivilizationConfig::default();
    for tick in 1..=2 {
        let report = run_civilization_tick(&store, &config).await.unwrap();
        assert_eq!(report.abandoned, vec![empty.id.clone()]);
        assert_eq!(
            store
                .events()
                .count_events(Some(EventType::VillageAbandoned))
                .await
                .unwrap(),
            tick
        );
    }

    let events = store
        .events()
        .recent_events(10, Some(EventType::VillageAbandoned))
        .await
        .unwrap();
    assert!(events.iter().all(|e| e.village_id.as_ref() == Some(&empty.id)));
}

#[tokio::test]
async fn tighter_radius_splits_the_cluster() {
    let (_dir, store) = open_temp().await;
    settle_four(&store, 15.0).await;
    let config = CivilizationConfig {
        cluster_radius: 5.0,
        ..CivilizationConfig::default()
    };

    let report = run_civilization_tick(&store, &config).await.unwrap();
    assert_eq!(report.clusters.len(), 4);
    assert!(report.formations.is_empty());
}
