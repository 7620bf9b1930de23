//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] errors with additional context about which operation failed.

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// A schema migration failed.
    #[error("SQLite migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A filesystem operation (directory creation, snapshot copy) failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A point lookup or update targeted a row that does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Which table was queried.
        entity: &'static str,
        /// The identifier that missed.
        id: String,
    },

    /// A stored value could not be mapped back into its domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
