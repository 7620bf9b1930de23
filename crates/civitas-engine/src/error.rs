//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of startup and shutdown so that
//! `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: civitas_core::ConfigError,
    },

    /// Personality templates could not be loaded.
    #[error("personality error: {source}")]
    Personality {
        /// The underlying loader error.
        #[from]
        source: civitas_core::PersonalityError,
    },

    /// The store could not be opened.
    #[error("store error: {source}")]
    Store {
        /// The underlying database error.
        #[from]
        source: civitas_db::DbError,
    },

    /// The civilization failed to start.
    #[error("startup error: {source}")]
    Startup {
        /// The underlying startup error.
        #[from]
        source: civitas_core::StartupError,
    },

    /// A manager operation failed.
    #[error("manager error: {source}")]
    Manager {
        /// The underlying manager error.
        #[from]
        source: civitas_core::ManagerError,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
