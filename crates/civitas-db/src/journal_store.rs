//! Emotion time series and append-only memories.

use civitas_types::{AgentId, EmotionSnapshot, Emotions, MemoryEntry, Position};
use sqlx::SqlitePool;

use crate::codec::{from_millis, now_millis, position};
use crate::error::DbError;

/// Default number of memories returned by [`JournalStore::recent_memories`].
pub const DEFAULT_MEMORY_LIMIT: u32 = 50;

/// Default memory importance.
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// A memory to append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    /// Owning agent.
    pub agent_id: AgentId,
    /// Category tag (see [`civitas_types::memory_types`]).
    pub memory_type: String,
    /// Free-text content.
    pub content: String,
    /// Importance, clamped into `[0, 1]` on write.
    pub importance: f64,
    /// Another agent the memory is about.
    pub related_agent_id: Option<AgentId>,
    /// Where it happened.
    pub location: Option<Position>,
}

impl NewMemory {
    /// A memory with default importance and no subject or location.
    pub fn new(
        agent_id: AgentId,
        memory_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            agent_id,
            memory_type: memory_type.into(),
            content: content.into(),
            importance: DEFAULT_IMPORTANCE,
            related_agent_id: None,
            location: None,
        }
    }

    /// Set the importance.
    #[must_use]
    pub const fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    /// Record which agent the memory is about.
    #[must_use]
    pub fn about(mut self, other: AgentId) -> Self {
        self.related_agent_id = Some(other);
        self
    }

    /// Record where it happened.
    #[must_use]
    pub const fn at(mut self, location: Position) -> Self {
        self.location = Some(location);
        self
    }
}

/// Operations on the `emotions` and `memories` tables.
pub struct JournalStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> JournalStore<'a> {
    /// Create a new journal store bound to a connection pool.
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an emotion reading.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the agent does not exist.
    pub async fn add_emotion(&self, agent_id: &AgentId, emotions: &Emotions) -> Result<i64, DbError> {
        let result = sqlx::query(
            r"INSERT INTO emotions
                  (agent_id, timestamp, hunger, safety, loneliness, boredom,
                   curiosity, satisfaction, stress)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(agent_id.as_str())
        .bind(now_millis())
        .bind(emotions.hunger)
        .bind(emotions.safety)
        .bind(emotions.loneliness)
        .bind(emotions.boredom)
        .bind(emotions.curiosity)
        .bind(emotions.satisfaction)
        .bind(emotions.stress)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// The most recent emotion reading.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn latest_emotion(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<EmotionSnapshot>, DbError> {
        let row = sqlx::query_as::<_, EmotionRow>(
            r"SELECT id, agent_id, timestamp, hunger, safety, loneliness, boredom,
                     curiosity, satisfaction, stress
              FROM emotions
              WHERE agent_id = ?1
              ORDER BY timestamp DESC, id DESC
              LIMIT 1",
        )
        .bind(agent_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(EmotionRow::into_snapshot).transpose()
    }

    /// Append a memory.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the owning agent does not exist.
    pub async fn add_memory(&self, memory: &NewMemory) -> Result<i64, DbError> {
        let importance = if memory.importance.is_nan() {
            DEFAULT_IMPORTANCE
        } else {
            memory.importance.clamp(0.0, 1.0)
        };
        let result = sqlx::query(
            r"INSERT INTO memories
                  (agent_id, timestamp, memory_type, content, importance,
                   related_agent_id, location_x, location_y, location_z)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(memory.agent_id.as_str())
        .bind(now_millis())
        .bind(&memory.memory_type)
        .bind(&memory.content)
        .bind(importance)
        .bind(memory.related_agent_id.as_ref().map(AgentId::as_str))
        .bind(memory.location.map(|p| p.x))
        .bind(memory.location.map(|p| p.y))
        .bind(memory.location.map(|p| p.z))
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// The agent's most recent memories, newest first, optionally filtered by
    /// type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn recent_memories(
        &self,
        agent_id: &AgentId,
        limit: u32,
        memory_type: Option<&str>,
    ) -> Result<Vec<MemoryEntry>, DbError> {
        let rows = sqlx::query_as::<_, MemoryRow>(
            r"SELECT id, agent_id, timestamp, memory_type, content, importance,
                     related_agent_id, location_x, location_y, location_z
              FROM memories
              WHERE agent_id = ?1 AND (?2 IS NULL OR memory_type = ?2)
              ORDER BY timestamp DESC, id DESC
              LIMIT ?3",
        )
        .bind(agent_id.as_str())
        .bind(memory_type)
        .bind(i64::from(limit))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(MemoryRow::into_entry).collect()
    }
}

/// A row from the `emotions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct EmotionRow {
    id: i64,
    agent_id: String,
    timestamp: i64,
    hunger: f64,
    safety: f64,
    loneliness: f64,
    boredom: f64,
    curiosity: f64,
    satisfaction: f64,
    stress: f64,
}

impl EmotionRow {
    pub(crate) fn into_snapshot(self) -> Result<EmotionSnapshot, DbError> {
        Ok(EmotionSnapshot {
            id: self.id,
            agent_id: AgentId::new(self.agent_id),
            timestamp: from_millis(self.timestamp)?,
            emotions: Emotions {
                hunger: self.hunger,
                safety: self.safety,
                loneliness: self.loneliness,
                boredom: self.boredom,
                curiosity: self.curiosity,
                satisfaction: self.satisfaction,
                stress: self.stress,
            },
        })
    }
}

/// A row from the `memories` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct MemoryRow {
    id: i64,
    agent_id: String,
    timestamp: i64,
    memory_type: String,
    content: String,
    importance: f64,
    related_agent_id: Option<String>,
    location_x: Option<f64>,
    location_y: Option<f64>,
    location_z: Option<f64>,
}

impl MemoryRow {
    pub(crate) fn into_entry(self) -> Result<MemoryEntry, DbError> {
        Ok(MemoryEntry {
            id: self.id,
            agent_id: AgentId::new(self.agent_id),
            timestamp: from_millis(self.timestamp)?,
            memory_type: self.memory_type,
            content: self.content,
            importance: self.importance,
            related_agent_id: self.related_agent_id.map(AgentId::new),
            location: position(self.location_x, self.location_y, self.location_z),
        })
    }
}
