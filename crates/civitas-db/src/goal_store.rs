//! Per-agent goals.

use civitas_types::{AgentId, Goal, GoalStatus};
use sqlx::SqlitePool;

use crate::codec::{from_millis, json_to_text, now_millis, opt_from_millis, text_to_json};
use crate::error::DbError;

/// Default goal priority.
pub const DEFAULT_PRIORITY: f64 = 0.5;

/// A goal to add.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGoal {
    /// Owning agent.
    pub agent_id: AgentId,
    /// Goal kind; action-driven goals use an action name here.
    pub goal_type: String,
    /// Free-text description.
    pub description: String,
    /// Priority, higher first.
    pub priority: f64,
    /// Structured parameters.
    pub metadata: Option<serde_json::Value>,
}

impl NewGoal {
    /// A goal with default priority and no metadata.
    pub fn new(
        agent_id: AgentId,
        goal_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            agent_id,
            goal_type: goal_type.into(),
            description: description.into(),
            priority: DEFAULT_PRIORITY,
            metadata: None,
        }
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Attach structured parameters.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Operations on the `goals` table.
pub struct GoalStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> GoalStore<'a> {
    /// Create a new goal store bound to a connection pool.
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Add an active goal and return its row id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the agent does not exist.
    pub async fn add_goal(&self, goal: &NewGoal) -> Result<i64, DbError> {
        let metadata = json_to_text(goal.metadata.as_ref())?;
        let result = sqlx::query(
            r"INSERT INTO goals (agent_id, created_at, goal_type, description, priority, status, metadata)
              VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6)",
        )
        .bind(goal.agent_id.as_str())
        .bind(now_millis())
        .bind(&goal.goal_type)
        .bind(&goal.description)
        .bind(goal.priority)
        .bind(metadata)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Move a goal to `status`. `completed_at` is set only for
    /// [`GoalStatus::Completed`] and cleared otherwise. Returns `false` if
    /// there is no such goal.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the update fails.
    pub async fn update_goal_status(&self, goal_id: i64, status: GoalStatus) -> Result<bool, DbError> {
        let completed_at = matches!(status, GoalStatus::Completed).then(now_millis);
        let result = sqlx::query("UPDATE goals SET status = ?2, completed_at = ?3 WHERE id = ?1")
            .bind(goal_id)
            .bind(status.as_str())
            .bind(completed_at)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// The agent's active goals, highest priority first, oldest first within
    /// a priority.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn active_goals(&self, agent_id: &AgentId) -> Result<Vec<Goal>, DbError> {
        let rows = sqlx::query_as::<_, GoalRow>(
            r"SELECT id, agent_id, created_at, goal_type, description, priority,
                     status, completed_at, metadata
              FROM goals
              WHERE agent_id = ?1 AND status = 'active'
              ORDER BY priority DESC, created_at, id",
        )
        .bind(agent_id.as_str())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(GoalRow::into_goal).collect()
    }

    /// Fetch a goal by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn get_goal(&self, goal_id: i64) -> Result<Option<Goal>, DbError> {
        let row = sqlx::query_as::<_, GoalRow>(
            r"SELECT id, agent_id, created_at, goal_type, description, priority,
                     status, completed_at, metadata
              FROM goals WHERE id = ?1",
        )
        .bind(goal_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(GoalRow::into_goal).transpose()
    }

    /// Every goal, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn all_goals(&self) -> Result<Vec<Goal>, DbError> {
        let rows = sqlx::query_as::<_, GoalRow>(
            r"SELECT id, agent_id, created_at, goal_type, description, priority,
                     status, completed_at, metadata
              FROM goals ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(GoalRow::into_goal).collect()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct GoalRow {
    id: i64,
    agent_id: String,
    created_at: i64,
    goal_type: String,
    description: String,
    priority: f64,
    status: String,
    completed_at: Option<i64>,
    metadata: Option<String>,
}

impl GoalRow {
    fn into_goal(self) -> Result<Goal, DbError> {
        let status = self
            .status
            .parse()
            .map_err(|e: civitas_types::ParseEnumError| DbError::Corrupt(e.to_string()))?;
        Ok(Goal {
            id: self.id,
            agent_id: AgentId::new(self.agent_id),
            created_at: from_millis(self.created_at)?,
            goal_type: self.goal_type,
            description: self.description,
            priority: self.priority,
            status,
            completed_at: opt_from_millis(self.completed_at)?,
            metadata: text_to_json(self.metadata.as_deref())?,
        })
    }
}
