//! Agent identity, vitals, personality and inventory snapshots.
//!
//! The `agents` row is the parent of every per-agent table; deleting it
//! cascades to personality, emotions, memories, relationships (both
//! directions), memberships, goals and inventory snapshots. Events keep
//! their row with a nulled reference.

use civitas_types::{
    Agent, AgentId, AgentStats, Inventory, InventorySnapshot, Personality, Position,
};
use sqlx::SqlitePool;

use crate::codec::{from_millis, now_millis, position};
use crate::error::DbError;

/// Operations on the `agents`, `personalities` and `inventory_snapshots`
/// tables.
pub struct AgentStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AgentStore<'a> {
    /// Create a new agent store bound to a connection pool.
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new agent with default vitals and no position.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the id or name is already taken.
    pub async fn create_agent(
        &self,
        id: &AgentId,
        name: &str,
        username: &str,
    ) -> Result<Agent, DbError> {
        let now = now_millis();
        sqlx::query(
            r"INSERT INTO agents (id, name, username, created_at, last_active)
              VALUES (?1, ?2, ?3, ?4, ?4)",
        )
        .bind(id.as_str())
        .bind(name)
        .bind(username)
        .bind(now)
        .execute(self.pool)
        .await?;

        tracing::debug!(agent_id = %id, name, "Created agent row");
        self.require(id).await
    }

    /// Insert the agent, or refresh name, username and activity time if the
    /// id already has a row. Position, vitals and history are kept.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the name belongs to a different agent.
    pub async fn upsert_agent(
        &self,
        id: &AgentId,
        name: &str,
        username: &str,
    ) -> Result<Agent, DbError> {
        let now = now_millis();
        sqlx::query(
            r"INSERT INTO agents (id, name, username, created_at, last_active)
              VALUES (?1, ?2, ?3, ?4, ?4)
              ON CONFLICT (id) DO UPDATE SET
                  name = excluded.name,
                  username = excluded.username,
                  last_active = excluded.last_active",
        )
        .bind(id.as_str())
        .bind(name)
        .bind(username)
        .bind(now)
        .execute(self.pool)
        .await?;

        self.require(id).await
    }

    /// Fetch an agent by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>, DbError> {
        let row = sqlx::query_as::<_, AgentRow>(
            r"SELECT id, name, username, created_at, last_active,
                     position_x, position_y, position_z, dimension,
                     health, food, level, experience
              FROM agents WHERE id = ?1",
        )
        .bind(id.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(AgentRow::into_agent).transpose()
    }

    /// Fetch an agent by its unique display name.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn get_agent_by_name(&self, name: &str) -> Result<Option<Agent>, DbError> {
        let row = sqlx::query_as::<_, AgentRow>(
            r"SELECT id, name, username, created_at, last_active,
                     position_x, position_y, position_z, dimension,
                     health, food, level, experience
              FROM agents WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        row.map(AgentRow::into_agent).transpose()
    }

    /// Every agent, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn list_agents(&self) -> Result<Vec<Agent>, DbError> {
        let rows = sqlx::query_as::<_, AgentRow>(
            r"SELECT id, name, username, created_at, last_active,
                     position_x, position_y, position_z, dimension,
                     health, food, level, experience
              FROM agents
              ORDER BY last_active DESC, id",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(AgentRow::into_agent).collect()
    }

    /// Number of agent rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn count_agents(&self) -> Result<i64, DbError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM agents")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Record a new position and mark the agent active.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if the agent has no row.
    pub async fn update_position(
        &self,
        id: &AgentId,
        pos: &Position,
        dimension: &str,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r"UPDATE agents
              SET position_x = ?2, position_y = ?3, position_z = ?4,
                  dimension = ?5, last_active = ?6
              WHERE id = ?1",
        )
        .bind(id.as_str())
        .bind(pos.x)
        .bind(pos.y)
        .bind(pos.z)
        .bind(dimension)
        .bind(now_millis())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("agent", id));
        }
        Ok(())
    }

    /// Record new vitals and mark the agent active.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if the agent has no row.
    pub async fn update_stats(&self, id: &AgentId, stats: &AgentStats) -> Result<(), DbError> {
        let result = sqlx::query(
            r"UPDATE agents
              SET health = ?2, food = ?3, level = ?4, experience = ?5, last_active = ?6
              WHERE id = ?1",
        )
        .bind(id.as_str())
        .bind(stats.health)
        .bind(stats.food)
        .bind(stats.level)
        .bind(stats.experience)
        .bind(now_millis())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("agent", id));
        }
        Ok(())
    }

    /// Bump the agent's last-active time.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if the agent has no row.
    pub async fn touch(&self, id: &AgentId) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE agents SET last_active = ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(now_millis())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("agent", id));
        }
        Ok(())
    }

    /// Delete an agent and everything that cascades from it.
    ///
    /// Village populations are kept equal to their membership counts by
    /// triggers on `village_members`, which also fire for cascaded rows.
    /// Returns `false` if there was no such agent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the delete fails.
    pub async fn delete_agent(&self, id: &AgentId) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?1")
            .bind(id.as_str())
            .execute(self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(agent_id = %id, "Deleted agent row");
        }
        Ok(deleted)
    }

    /// Replace the agent's personality. Traits are clamped into `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the agent does not exist.
    pub async fn set_personality(
        &self,
        id: &AgentId,
        personality: &Personality,
    ) -> Result<(), DbError> {
        let p = personality.clamped();
        sqlx::query(
            r"INSERT INTO personalities
                  (agent_id, curiosity, sociability, ambition, aggression,
                   empathy, creativity, risk_tolerance, work_ethic, updated_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
              ON CONFLICT (agent_id) DO UPDATE SET
                  curiosity = excluded.curiosity,
                  sociability = excluded.sociability,
                  ambition = excluded.ambition,
                  aggression = excluded.aggression,
                  empathy = excluded.empathy,
                  creativity = excluded.creativity,
                  risk_tolerance = excluded.risk_tolerance,
                  work_ethic = excluded.work_ethic,
                  updated_at = excluded.updated_at",
        )
        .bind(id.as_str())
        .bind(p.curiosity)
        .bind(p.sociability)
        .bind(p.ambition)
        .bind(p.aggression)
        .bind(p.empathy)
        .bind(p.creativity)
        .bind(p.risk_tolerance)
        .bind(p.work_ethic)
        .bind(now_millis())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// The agent's personality, if one was set.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn get_personality(&self, id: &AgentId) -> Result<Option<Personality>, DbError> {
        let row = sqlx::query_as::<_, PersonalityRow>(
            r"SELECT agent_id, curiosity, sociability, ambition, aggression,
                     empathy, creativity, risk_tolerance, work_ethic
              FROM personalities WHERE agent_id = ?1",
        )
        .bind(id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| r.personality()))
    }

    /// Append a copy of the agent's current inventory.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the agent does not exist.
    pub async fn save_inventory_snapshot(
        &self,
        id: &AgentId,
        items: &Inventory,
    ) -> Result<i64, DbError> {
        let encoded = serde_json::to_string(items)?;
        let result = sqlx::query(
            "INSERT INTO inventory_snapshots (agent_id, timestamp, items) VALUES (?1, ?2, ?3)",
        )
        .bind(id.as_str())
        .bind(now_millis())
        .bind(encoded)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// The most recent inventory snapshot for the agent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails or
    /// [`DbError::Serialization`] if the stored map is malformed.
    pub async fn latest_inventory_snapshot(
        &self,
        id: &AgentId,
    ) -> Result<Option<InventorySnapshot>, DbError> {
        let row = sqlx::query_as::<_, InventoryRow>(
            r"SELECT id, agent_id, timestamp, items
              FROM inventory_snapshots
              WHERE agent_id = ?1
              ORDER BY timestamp DESC, id DESC
              LIMIT 1",
        )
        .bind(id.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(InventoryRow::into_snapshot).transpose()
    }

    async fn require(&self, id: &AgentId) -> Result<Agent, DbError> {
        self.get_agent(id)
            .await?
            .ok_or_else(|| DbError::not_found("agent", id))
    }
}

/// A row from the `agents` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct AgentRow {
    id: String,
    name: String,
    username: String,
    created_at: i64,
    last_active: i64,
    position_x: Option<f64>,
    position_y: Option<f64>,
    position_z: Option<f64>,
    dimension: String,
    health: f64,
    food: i64,
    level: i64,
    experience: i64,
}

impl AgentRow {
    pub(crate) fn into_agent(self) -> Result<Agent, DbError> {
        Ok(Agent {
            id: AgentId::new(self.id),
            name: self.name,
            username: self.username,
            created_at: from_millis(self.created_at)?,
            last_active: from_millis(self.last_active)?,
            position: position(self.position_x, self.position_y, self.position_z),
            dimension: self.dimension,
            stats: AgentStats {
                health: self.health,
                food: self.food,
                level: self.level,
                experience: self.experience,
            },
        })
    }
}

/// A row from the `personalities` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct PersonalityRow {
    pub(crate) agent_id: String,
    curiosity: f64,
    sociability: f64,
    ambition: f64,
    aggression: f64,
    empathy: f64,
    creativity: f64,
    risk_tolerance: f64,
    work_ethic: f64,
}

impl PersonalityRow {
    pub(crate) const fn personality(&self) -> Personality {
        Personality {
            curiosity: self.curiosity,
            sociability: self.sociability,
            ambition: self.ambition,
            aggression: self.aggression,
            empathy: self.empathy,
            creativity: self.creativity,
            risk_tolerance: self.risk_tolerance,
            work_ethic: self.work_ethic,
        }
    }
}

/// A row from the `inventory_snapshots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct InventoryRow {
    id: i64,
    agent_id: String,
    timestamp: i64,
    items: String,
}

impl InventoryRow {
    pub(crate) fn into_snapshot(self) -> Result<InventorySnapshot, DbError> {
        Ok(InventorySnapshot {
            id: self.id,
            agent_id: AgentId::new(self.agent_id),
            timestamp: from_millis(self.timestamp)?,
            items: serde_json::from_str(&self.items)?,
        })
    }
}
