//! Directed relationship edges between agents.
//!
//! Each ordered pair has at most one row. Updates are delta-adds applied in a
//! single upsert statement, so concurrent updates from two agent tasks never
//! lose an increment, and both scalars stay clamped to `[-1, 1]`.

use civitas_types::{AgentId, Relationship};
use sqlx::SqlitePool;

use crate::codec::{now_millis, opt_from_millis};
use crate::error::DbError;

/// A relationship together with the other agent's display name.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipView {
    /// The edge itself.
    pub relationship: Relationship,
    /// Display name of `relationship.other_agent_id`.
    pub other_name: String,
}

/// Operations on the `relationships` table.
pub struct RelationshipStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RelationshipStore<'a> {
    /// Create a new relationship store bound to a connection pool.
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Add the deltas to the `agent -> other` edge, creating it at zero if
    /// missing. Returns the edge after the update.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if either endpoint is not a live agent.
    pub async fn update_relationship(
        &self,
        agent_id: &AgentId,
        other_agent_id: &AgentId,
        affinity_delta: f64,
        trust_delta: f64,
    ) -> Result<Relationship, DbError> {
        let row = sqlx::query_as::<_, RelationshipRow>(
            r"INSERT INTO relationships
                  (agent_id, other_agent_id, affinity, trust, last_interaction, interaction_count)
              VALUES (?1, ?2, MAX(-1.0, MIN(1.0, ?3)), MAX(-1.0, MIN(1.0, ?4)), ?5, 1)
              ON CONFLICT (agent_id, other_agent_id) DO UPDATE SET
                  affinity = MAX(-1.0, MIN(1.0, relationships.affinity + ?3)),
                  trust = MAX(-1.0, MIN(1.0, relationships.trust + ?4)),
                  last_interaction = ?5,
                  interaction_count = relationships.interaction_count + 1
              RETURNING agent_id, other_agent_id, affinity, trust,
                        last_interaction, interaction_count",
        )
        .bind(agent_id.as_str())
        .bind(other_agent_id.as_str())
        .bind(finite_or_zero(affinity_delta))
        .bind(finite_or_zero(trust_delta))
        .bind(now_millis())
        .fetch_one(self.pool)
        .await?;

        row.into_relationship()
    }

    /// The `agent -> other` edge, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn get_relationship(
        &self,
        agent_id: &AgentId,
        other_agent_id: &AgentId,
    ) -> Result<Option<Relationship>, DbError> {
        let row = sqlx::query_as::<_, RelationshipRow>(
            r"SELECT agent_id, other_agent_id, affinity, trust, last_interaction, interaction_count
              FROM relationships
              WHERE agent_id = ?1 AND other_agent_id = ?2",
        )
        .bind(agent_id.as_str())
        .bind(other_agent_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(RelationshipRow::into_relationship).transpose()
    }

    /// Every outgoing edge of `agent`, strongest affinity first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn relationships_for(
        &self,
        agent_id: &AgentId,
    ) -> Result<Vec<RelationshipView>, DbError> {
        let rows = sqlx::query_as::<_, RelationshipViewRow>(
            r"SELECT r.agent_id, r.other_agent_id, r.affinity, r.trust,
                     r.last_interaction, r.interaction_count, a.name AS other_name
              FROM relationships r
              JOIN agents a ON a.id = r.other_agent_id
              WHERE r.agent_id = ?1
              ORDER BY r.affinity DESC, r.other_agent_id",
        )
        .bind(agent_id.as_str())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RelationshipView {
                    other_name: row.other_name,
                    relationship: RelationshipRow {
                        agent_id: row.agent_id,
                        other_agent_id: row.other_agent_id,
                        affinity: row.affinity,
                        trust: row.trust,
                        last_interaction: row.last_interaction,
                        interaction_count: row.interaction_count,
                    }
                    .into_relationship()?,
                })
            })
            .collect()
    }

    /// Every edge in the store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn all_relationships(&self) -> Result<Vec<Relationship>, DbError> {
        let rows = sqlx::query_as::<_, RelationshipRow>(
            r"SELECT agent_id, other_agent_id, affinity, trust, last_interaction, interaction_count
              FROM relationships
              ORDER BY agent_id, other_agent_id",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(RelationshipRow::into_relationship)
            .collect()
    }
}

const fn finite_or_zero(delta: f64) -> f64 {
    if delta.is_finite() { delta } else { 0.0 }
}

/// A row from the `relationships` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct RelationshipRow {
    agent_id: String,
    other_agent_id: String,
    affinity: f64,
    trust: f64,
    last_interaction: Option<i64>,
    interaction_count: i64,
}

impl RelationshipRow {
    pub(crate) fn into_relationship(self) -> Result<Relationship, DbError> {
        Ok(Relationship {
            agent_id: AgentId::new(self.agent_id),
            other_agent_id: AgentId::new(self.other_agent_id),
            affinity: self.affinity,
            trust: self.trust,
            last_interaction: opt_from_millis(self.last_interaction)?,
            interaction_count: self.interaction_count,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct RelationshipViewRow {
    agent_id: String,
    other_agent_id: String,
    affinity: f64,
    trust: f64,
    last_interaction: Option<i64>,
    interaction_count: i64,
    other_name: String,
}
