//! Full-dataset export.

use chrono::{DateTime, Utc};
use civitas_types::{
    Agent, AgentId, EmotionSnapshot, Event, Goal, InventorySnapshot, MemoryEntry, Personality,
    Relationship, Village, VillageMember,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::agent_store::{AgentRow, InventoryRow, PersonalityRow};
use crate::error::DbError;
use crate::event_store::EventStore;
use crate::goal_store::GoalStore;
use crate::journal_store::{EmotionRow, MemoryRow};
use crate::social_store::RelationshipStore;
use crate::village_store::VillageStore;

/// One agent's personality row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityRecord {
    /// Owning agent.
    pub agent_id: AgentId,
    /// The traits.
    pub personality: Personality,
}

/// Every row of every table, serializable as one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreExport {
    /// When the export was taken.
    pub exported_at: DateTime<Utc>,
    /// Agents.
    pub agents: Vec<Agent>,
    /// Personalities.
    pub personalities: Vec<PersonalityRecord>,
    /// Emotion snapshots.
    pub emotions: Vec<EmotionSnapshot>,
    /// Memories.
    pub memories: Vec<MemoryEntry>,
    /// Relationship edges.
    pub relationships: Vec<Relationship>,
    /// Villages.
    pub villages: Vec<Village>,
    /// Village memberships.
    pub village_members: Vec<VillageMember>,
    /// Events.
    pub events: Vec<Event>,
    /// Goals.
    pub goals: Vec<Goal>,
    /// Inventory snapshots.
    pub inventory_snapshots: Vec<InventorySnapshot>,
}

impl StoreExport {
    pub(crate) async fn collect(pool: &SqlitePool) -> Result<Self, DbError> {
        let agents = sqlx::query_as::<_, AgentRow>(
            r"SELECT id, name, username, created_at, last_active,
                     position_x, position_y, position_z, dimension,
                     health, food, level, experience
              FROM agents ORDER BY created_at, id",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(AgentRow::into_agent)
        .collect::<Result<Vec<_>, _>>()?;

        let personalities = sqlx::query_as::<_, PersonalityRow>(
            r"SELECT agent_id, curiosity, sociability, ambition, aggression,
                     empathy, creativity, risk_tolerance, work_ethic
              FROM personalities ORDER BY agent_id",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| PersonalityRecord {
            personality: row.personality(),
            agent_id: AgentId::new(row.agent_id),
        })
        .collect();

        let emotions = sqlx::query_as::<_, EmotionRow>(
            r"SELECT id, agent_id, timestamp, hunger, safety, loneliness, boredom,
                     curiosity, satisfaction, stress
              FROM emotions ORDER BY id",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(EmotionRow::into_snapshot)
        .collect::<Result<Vec<_>, _>>()?;

        let memories = sqlx::query_as::<_, MemoryRow>(
            r"SELECT id, agent_id, timestamp, memory_type, content, importance,
                     related_agent_id, location_x, location_y, location_z
              FROM memories ORDER BY id",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(MemoryRow::into_entry)
        .collect::<Result<Vec<_>, _>>()?;

        let inventory_snapshots = sqlx::query_as::<_, InventoryRow>(
            "SELECT id, agent_id, timestamp, items FROM inventory_snapshots ORDER BY id",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(InventoryRow::into_snapshot)
        .collect::<Result<Vec<_>, _>>()?;

        let villages = VillageStore::new(pool);

        Ok(Self {
            exported_at: Utc::now(),
            agents,
            personalities,
            emotions,
            memories,
            relationships: RelationshipStore::new(pool).all_relationships().await?,
            villages: villages.list_villages().await?,
            village_members: villages.all_members().await?,
            events: EventStore::new(pool).all_events().await?,
            goals: GoalStore::new(pool).all_goals().await?,
            inventory_snapshots,
        })
    }

    /// Total number of rows across all tables.
    pub fn row_count(&self) -> usize {
        [
            self.agents.len(),
            self.personalities.len(),
            self.emotions.len(),
            self.memories.len(),
            self.relationships.len(),
            self.villages.len(),
            self.village_members.len(),
            self.events.len(),
            self.goals.len(),
            self.inventory_snapshots.len(),
        ]
        .iter()
        .sum()
    }
}
