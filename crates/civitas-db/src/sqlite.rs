//! `SQLite` connection pool, migrations and snapshot operations.
//!
//! The store runs in WAL mode with full synchronous commits, so a write is
//! durable once its call returns and readers never block writers. Many agent
//! tasks share one pool; `busy_timeout` absorbs short write contention.
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time checked)
//! so builds never need a live database. All queries are parameterized.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::agent_store::AgentStore;
use crate::error::DbError;
use crate::event_store::EventStore;
use crate::export::StoreExport;
use crate::goal_store::GoalStore;
use crate::journal_store::JournalStore;
use crate::social_store::RelationshipStore;
use crate::village_store::VillageStore;

/// Default maximum number of connections in the pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default pool acquire timeout in seconds.
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// Default `SQLite` busy timeout in seconds.
const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;

/// Configuration for the `SQLite` store.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file path. Parent directories are created on open.
    pub path: PathBuf,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// How long to wait for a free pooled connection.
    pub acquire_timeout: Duration,
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl SqliteConfig {
    /// Create a configuration for the database file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            busy_timeout: Duration::from_secs(DEFAULT_BUSY_TIMEOUT_SECS),
        }
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub const fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the pool acquire timeout.
    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the `SQLite` busy timeout.
    #[must_use]
    pub const fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

/// Handle to the civilization database.
///
/// Wraps a [`sqlx::SqlitePool`] and hands out one table-scoped store per
/// concern. Cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if missing) the database and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] if the parent directory cannot be created,
    /// [`DbError::Sqlite`] if the file cannot be opened or is not a database,
    /// and [`DbError::Migration`] if the schema cannot be brought up to date.
    pub async fn open(config: &SqliteConfig) -> Result<Self, DbError> {
        if config.max_connections == 0 {
            return Err(DbError::Config("max_connections must be at least 1".to_owned()));
        }
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            path: config.path.clone(),
        };
        if let Err(e) = store.run_migrations().await {
            store.pool.close().await;
            return Err(e);
        }

        tracing::info!(
            path = %config.path.display(),
            max_connections = config.max_connections,
            "Opened SQLite store"
        );

        Ok(store)
    }

    /// Open the database at `path` with default pool settings.
    ///
    /// # Errors
    ///
    /// See [`SqliteStore::open`].
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self, DbError> {
        Self::open(&SqliteConfig::new(path.as_ref())).await
    }

    /// Run all pending migrations from the `migrations/` directory.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Migration`] if any migration fails.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::debug!("Database migrations completed");
        Ok(())
    }

    /// Return a reference to the underlying [`SqlitePool`].
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The database file this store was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Agents, personalities and inventory snapshots.
    pub const fn agents(&self) -> AgentStore<'_> {
        AgentStore::new(&self.pool)
    }

    /// Emotion snapshots and memories.
    pub const fn journal(&self) -> JournalStore<'_> {
        JournalStore::new(&self.pool)
    }

    /// Directed relationship edges.
    pub const fn relationships(&self) -> RelationshipStore<'_> {
        RelationshipStore::new(&self.pool)
    }

    /// Villages and their memberships.
    pub const fn villages(&self) -> VillageStore<'_> {
        VillageStore::new(&self.pool)
    }

    /// The global event log.
    pub const fn events(&self) -> EventStore<'_> {
        EventStore::new(&self.pool)
    }

    /// Per-agent goals.
    pub const fn goals(&self) -> GoalStore<'_> {
        GoalStore::new(&self.pool)
    }

    /// Write a consistent point-in-time copy of the database to `target`.
    ///
    /// The target file must not exist yet; parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if `target` already exists,
    /// [`DbError::Io`] if its directory cannot be created and
    /// [`DbError::Sqlite`] if the snapshot fails.
    pub async fn backup_to(&self, target: &Path) -> Result<(), DbError> {
        if tokio::fs::try_exists(target).await? {
            return Err(DbError::Config(format!(
                "backup target already exists: {}",
                target.display()
            )));
        }
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // VACUUM cannot run inside a transaction; the pool runs it in
        // autocommit mode on whichever connection it hands out.
        let literal = target.to_string_lossy().replace('\'', "''");
        let sql = format!("VACUUM INTO '{literal}'");
        sqlx::query(&sql).execute(&self.pool).await?;

        tracing::info!(target = %target.display(), "Database backup written");
        Ok(())
    }

    /// Replace the database at `config.path` with a snapshot and open it.
    ///
    /// Any stale WAL files next to the destination are removed first. The
    /// destination must not be open in this process.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] if the snapshot cannot be read or copied and
    /// any error from [`SqliteStore::open`].
    pub async fn restore_from(snapshot: &Path, config: &SqliteConfig) -> Result<Self, DbError> {
        tokio::fs::metadata(snapshot).await?;
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        for suffix in ["", "-wal", "-shm"] {
            let mut stale = config.path.clone().into_os_string();
            stale.push(suffix);
            match tokio::fs::remove_file(&stale).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tokio::fs::copy(snapshot, &config.path).await?;
        tracing::info!(
            snapshot = %snapshot.display(),
            path = %config.path.display(),
            "Restoring database from snapshot"
        );
        Self::open(config).await
    }

    /// Read every table into memory.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if any table cannot be read or decoded.
    pub async fn export(&self) -> Result<StoreExport, DbError> {
        StoreExport::collect(&self.pool).await
    }

    /// Close all connections in the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("SQLite pool closed");
    }

    /// Whether [`SqliteStore::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
