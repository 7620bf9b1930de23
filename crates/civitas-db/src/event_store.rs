//! Append-only global event log.
//!
//! Events are the civilization's audit trail. Nothing updates or deletes an
//! event row; removing an agent or village only nulls its reference.

use civitas_types::{AgentId, Event, EventType, VillageId};
use sqlx::SqlitePool;

use crate::codec::{from_millis, json_to_text, now_millis, text_to_json};
use crate::error::DbError;

/// Default number of events returned by [`EventStore::recent_events`].
pub const DEFAULT_EVENT_LIMIT: u32 = 100;

/// An event to append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Event category.
    pub event_type: EventType,
    /// Human-readable description.
    pub description: String,
    /// Agent involved.
    pub agent_id: Option<AgentId>,
    /// Village involved.
    pub village_id: Option<VillageId>,
    /// Structured payload.
    pub metadata: Option<serde_json::Value>,
}

impl NewEvent {
    /// An event with no references or payload.
    pub fn new(event_type: EventType, description: impl Into<String>) -> Self {
        Self {
            event_type,
            description: description.into(),
            agent_id: None,
            village_id: None,
            metadata: None,
        }
    }

    /// Reference an agent.
    #[must_use]
    pub fn agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Reference a village.
    #[must_use]
    pub fn village(mut self, village_id: VillageId) -> Self {
        self.village_id = Some(village_id);
        self
    }

    /// Attach a JSON payload.
    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Operations on the `events` table.
pub struct EventStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> EventStore<'a> {
    /// Create a new event store bound to a connection pool.
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an event and return its row id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if a referenced agent or village does not
    /// exist.
    pub async fn log_event(&self, event: &NewEvent) -> Result<i64, DbError> {
        let metadata = json_to_text(event.metadata.as_ref())?;
        let result = sqlx::query(
            r"INSERT INTO events (timestamp, event_type, description, agent_id, village_id, metadata)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(now_millis())
        .bind(event.event_type.as_str())
        .bind(&event.description)
        .bind(event.agent_id.as_ref().map(AgentId::as_str))
        .bind(event.village_id.as_ref().map(VillageId::as_str))
        .bind(metadata)
        .execute(self.pool)
        .await?;

        tracing::debug!(
            event_type = %event.event_type,
            description = %event.description,
            "Logged event"
        );
        Ok(result.last_insert_rowid())
    }

    /// The most recent events, newest first, optionally of one type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn recent_events(
        &self,
        limit: u32,
        event_type: Option<EventType>,
    ) -> Result<Vec<Event>, DbError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT id, timestamp, event_type, description, agent_id, village_id, metadata
              FROM events
              WHERE (?1 IS NULL OR event_type = ?1)
              ORDER BY timestamp DESC, id DESC
              LIMIT ?2",
        )
        .bind(event_type.map(EventType::as_str))
        .bind(i64::from(limit))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    /// The most recent events referencing `agent`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn events_for_agent(
        &self,
        agent_id: &AgentId,
        limit: u32,
    ) -> Result<Vec<Event>, DbError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT id, timestamp, event_type, description, agent_id, village_id, metadata
              FROM events
              WHERE agent_id = ?1
              ORDER BY timestamp DESC, id DESC
              LIMIT ?2",
        )
        .bind(agent_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    /// Number of events, optionally of one type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn count_events(&self, event_type: Option<EventType>) -> Result<i64, DbError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM events WHERE (?1 IS NULL OR event_type = ?1)")
                .bind(event_type.map(EventType::as_str))
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }

    /// Every event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn all_events(&self) -> Result<Vec<Event>, DbError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT id, timestamp, event_type, description, agent_id, village_id, metadata
              FROM events
              ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }
}

/// A row from the `events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct EventRow {
    id: i64,
    timestamp: i64,
    event_type: String,
    description: String,
    agent_id: Option<String>,
    village_id: Option<String>,
    metadata: Option<String>,
}

impl EventRow {
    pub(crate) fn into_event(self) -> Result<Event, DbError> {
        let event_type = self
            .event_type
            .parse()
            .map_err(|e: civitas_types::ParseEnumError| DbError::Corrupt(e.to_string()))?;
        Ok(Event {
            id: self.id,
            timestamp: from_millis(self.timestamp)?,
            event_type,
            description: self.description,
            agent_id: self.agent_id.map(AgentId::new),
            village_id: self.village_id.map(VillageId::new),
            metadata: text_to_json(self.metadata.as_deref())?,
        })
    }
}
