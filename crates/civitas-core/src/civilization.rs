//! The periodic civilization tick.
//!
//! Each tick reads aggregate state from the store, flags abandoned villages
//! and looks for clusters of well-connected agents settling outside any
//! existing village. Findings are written back as events; no village rows are
//! created here.

use std::collections::BTreeMap;

use civitas_db::{DbError, NewEvent, SqliteStore};
use civitas_types::{AgentId, EventType, Position, VillageId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cluster::{Cluster, single_linkage};
use crate::config::CivilizationConfig;

/// A cluster that qualifies as an emerging village.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationCandidate {
    /// The cluster.
    pub cluster: Cluster,
    /// Unordered member pairs with a strong relationship.
    pub strong_pairs: usize,
}

/// What one tick observed and logged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Persisted agents.
    pub agents: usize,
    /// Agents with a known position.
    pub positioned_agents: usize,
    /// Existing villages.
    pub villages: usize,
    /// Villages with no members, one event logged for each.
    pub abandoned: Vec<VillageId>,
    /// Every cluster found, singletons included.
    pub clusters: Vec<Cluster>,
    /// Clusters logged as `village_formation_detected`.
    pub formations: Vec<FormationCandidate>,
}

/// Run one civilization tick against `store`.
///
/// # Errors
///
/// Returns [`DbError`] if any read or event write fails. Events logged before
/// the failure stay logged.
pub async fn run_civilization_tick(
    store: &SqliteStore,
    config: &CivilizationConfig,
) -> Result<TickReport, DbError> {
    let agents = store.agents().list_agents().await?;
    let villages = store.villages().list_villages().await?;
    info!(agents = agents.len(), villages = villages.len(), "Civilization tick");

    let mut report = TickReport {
        agents: agents.len(),
        villages: villages.len(),
        ..TickReport::default()
    };

    for village in &villages {
        if store.villages().member_count(&village.id).await? == 0 {
            info!(village_id = %village.id, name = %village.name, "Village is abandoned");
            store
                .events()
                .log_event(
                    &NewEvent::new(
                        EventType::VillageAbandoned,
                        format!("Village {} has been abandoned", village.name),
                    )
                    .village(village.id.clone()),
                )
                .await?;
            report.abandoned.push(village.id.clone());
        }
    }

    let points: Vec<(AgentId, Position)> = agents
        .iter()
        .filter_map(|a| a.position.map(|p| (a.id.clone(), p)))
        .collect();
    report.positioned_agents = points.len();
    report.clusters = single_linkage(&points, config.cluster_radius);

    let affinity = affinity_index(store).await?;
    for cluster in &report.clusters {
        if cluster.len() < config.min_cluster_size {
            continue;
        }
        if let Some(village) = villages.iter().find(|v| v.contains(&cluster.center)) {
            debug!(village_id = %village.id, size = cluster.len(), "Cluster lies inside a village");
            continue;
        }

        let strong_pairs = cluster
            .pairs()
            .filter(|(a, b)| is_strong(&affinity, a, b, config.strong_affinity))
            .count();
        if strong_pairs < config.min_strong_pairs {
            debug!(size = cluster.len(), strong_pairs, "Cluster lacks strong relationships");
            continue;
        }

        info!(
            size = cluster.len(),
            strong_pairs,
            x = cluster.center.x,
            z = cluster.center.z,
            "Natural village formation detected"
        );
        store
            .events()
            .log_event(
                &NewEvent::new(
                    EventType::VillageFormationDetected,
                    format!(
                        "{} agents are settling near ({:.0}, {:.0})",
                        cluster.len(),
                        cluster.center.x,
                        cluster.center.z
                    ),
                )
                .metadata(serde_json::json!({
                    "center": cluster.center,
                    "members": cluster.members,
                    "strong_pairs": strong_pairs,
                })),
            )
            .await?;
        report.formations.push(FormationCandidate {
            cluster: cluster.clone(),
            strong_pairs,
        });
    }

    Ok(report)
}

type AffinityIndex = BTreeMap<(AgentId, AgentId), f64>;

async fn affinity_index(store: &SqliteStore) -> Result<AffinityIndex, DbError> {
    Ok(store
        .relationships()
        .all_relationships()
        .await?
        .into_iter()
        .map(|r| ((r.agent_id, r.other_agent_id), r.affinity))
        .collect())
}

fn is_strong(index: &AffinityIndex, a: &AgentId, b: &AgentId, threshold: f64) -> bool {
    let edge = |from: &AgentId, to: &AgentId| {
        index
            .get(&(from.clone(), to.clone()))
            .is_some_and(|affinity| *affinity >= threshold)
    };
    edge(a, b) || edge(b, a)
}
