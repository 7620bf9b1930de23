//! Villages and village membership.
//!
//! `villages.population` is maintained by triggers on `village_members`; the
//! store never writes it directly.

use civitas_types::{AgentId, Position, Village, VillageId, VillageMember};
use sqlx::SqlitePool;

use crate::codec::{from_millis, now_millis};
use crate::error::DbError;

/// Default village footprint radius.
pub const DEFAULT_VILLAGE_RADIUS: f64 = 50.0;

/// Default culture tag.
pub const DEFAULT_CULTURE: &str = "generic";

/// Default member role.
pub const DEFAULT_ROLE: &str = "citizen";

/// A village to create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVillage {
    /// Explicit id; generated when `None`.
    pub id: Option<VillageId>,
    /// Display name.
    pub name: String,
    /// Spatial centre.
    pub center: Position,
    /// Footprint radius.
    pub radius: f64,
    /// Culture tag.
    pub culture: String,
}

impl NewVillage {
    /// A village with the default radius and culture.
    pub fn new(name: impl Into<String>, center: Position) -> Self {
        Self {
            id: None,
            name: name.into(),
            center,
            radius: DEFAULT_VILLAGE_RADIUS,
            culture: DEFAULT_CULTURE.to_owned(),
        }
    }

    /// Use an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: VillageId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the footprint radius.
    #[must_use]
    pub const fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    /// Set the culture tag.
    #[must_use]
    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = culture.into();
        self
    }
}

/// Operations on the `villages` and `village_members` tables.
pub struct VillageStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> VillageStore<'a> {
    /// Create a new village store bound to a connection pool.
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a village with zero population.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] for a non-positive radius and
    /// [`DbError::Sqlite`] if the id is already taken.
    pub async fn create_village(&self, village: &NewVillage) -> Result<Village, DbError> {
        if !(village.radius > 0.0 && village.radius.is_finite()) {
            return Err(DbError::Config(format!(
                "village radius must be positive, got {}",
                village.radius
            )));
        }
        let id = village.id.clone().unwrap_or_else(VillageId::generate);
        sqlx::query(
            r"INSERT INTO villages
                  (id, name, founded_at, center_x, center_y, center_z, radius, population, culture)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
        )
        .bind(id.as_str())
        .bind(&village.name)
        .bind(now_millis())
        .bind(village.center.x)
        .bind(village.center.y)
        .bind(village.center.z)
        .bind(village.radius)
        .bind(&village.culture)
        .execute(self.pool)
        .await?;

        tracing::info!(village_id = %id, name = %village.name, "Created village");
        self.get_village(&id)
            .await?
            .ok_or_else(|| DbError::not_found("village", &id))
    }

    /// Fetch a village by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn get_village(&self, id: &VillageId) -> Result<Option<Village>, DbError> {
        let row = sqlx::query_as::<_, VillageRow>(
            r"SELECT id, name, founded_at, center_x, center_y, center_z, radius, population, culture
              FROM villages WHERE id = ?1",
        )
        .bind(id.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(VillageRow::into_village).transpose()
    }

    /// Every village, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn list_villages(&self) -> Result<Vec<Village>, DbError> {
        let rows = sqlx::query_as::<_, VillageRow>(
            r"SELECT id, name, founded_at, center_x, center_y, center_z, radius, population, culture
              FROM villages
              ORDER BY founded_at, id",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(VillageRow::into_village).collect()
    }

    /// Add `agent` to `village` with the given role (or `citizen`).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if either side does not exist or the agent
    /// is already a member.
    pub async fn add_member(
        &self,
        village_id: &VillageId,
        agent_id: &AgentId,
        role: Option<&str>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO village_members (village_id, agent_id, joined_at, role)
              VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(village_id.as_str())
        .bind(agent_id.as_str())
        .bind(now_millis())
        .bind(role.unwrap_or(DEFAULT_ROLE))
        .execute(self.pool)
        .await?;

        tracing::debug!(village_id = %village_id, agent_id = %agent_id, "Added village member");
        Ok(())
    }

    /// Remove `agent` from `village`. Returns `false` if it was not a member.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the delete fails.
    pub async fn remove_member(
        &self,
        village_id: &VillageId,
        agent_id: &AgentId,
    ) -> Result<bool, DbError> {
        let result =
            sqlx::query("DELETE FROM village_members WHERE village_id = ?1 AND agent_id = ?2")
                .bind(village_id.as_str())
                .bind(agent_id.as_str())
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// The village's members with their display names, earliest joiner first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn members(&self, village_id: &VillageId) -> Result<Vec<VillageMember>, DbError> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r"SELECT m.village_id, m.agent_id, a.name AS agent_name, m.joined_at,
                     m.role, m.contribution_score
              FROM village_members m
              JOIN agents a ON a.id = m.agent_id
              WHERE m.village_id = ?1
              ORDER BY m.joined_at, m.agent_id",
        )
        .bind(village_id.as_str())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(MemberRow::into_member).collect()
    }

    /// Every membership row in the store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn all_members(&self) -> Result<Vec<VillageMember>, DbError> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r"SELECT m.village_id, m.agent_id, a.name AS agent_name, m.joined_at,
                     m.role, m.contribution_score
              FROM village_members m
              JOIN agents a ON a.id = m.agent_id
              ORDER BY m.village_id, m.joined_at, m.agent_id",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(MemberRow::into_member).collect()
    }

    /// Live membership count.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn member_count(&self, village_id: &VillageId) -> Result<i64, DbError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM village_members WHERE village_id = ?1")
                .bind(village_id.as_str())
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }

    /// Add to a member's contribution score.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if the agent is not a member.
    pub async fn add_contribution(
        &self,
        village_id: &VillageId,
        agent_id: &AgentId,
        delta: f64,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r"UPDATE village_members
              SET contribution_score = contribution_score + ?3
              WHERE village_id = ?1 AND agent_id = ?2",
        )
        .bind(village_id.as_str())
        .bind(agent_id.as_str())
        .bind(delta)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(
                "village member",
                format!("{village_id}/{agent_id}"),
            ));
        }
        Ok(())
    }
}

/// A row from the `villages` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct VillageRow {
    id: String,
    name: String,
    founded_at: i64,
    center_x: f64,
    center_y: f64,
    center_z: f64,
    radius: f64,
    population: i64,
    culture: String,
}

impl VillageRow {
    pub(crate) fn into_village(self) -> Result<Village, DbError> {
        Ok(Village {
            id: VillageId::new(self.id),
            name: self.name,
            founded_at: from_millis(self.founded_at)?,
            center: Position::new(self.center_x, self.center_y, self.center_z),
            radius: self.radius,
            population: self.population,
            culture: self.culture,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct MemberRow {
    village_id: String,
    agent_id: String,
    agent_name: String,
    joined_at: i64,
    role: String,
    contribution_score: f64,
}

impl MemberRow {
    fn into_member(self) -> Result<VillageMember, DbError> {
        Ok(VillageMember {
            village_id: VillageId::new(self.village_id),
            agent_id: AgentId::new(self.agent_id),
            agent_name: self.agent_name,
            joined_at: from_millis(self.joined_at)?,
            role: self.role,
            contribution_score: self.contribution_score,
        })
    }
}
