//! # Local Revision Store
//!
//! SQLite-backed, append-only history of paragraph revisions.
//!
//! ## Architecture
//!
//! Revision records are immutable rows in `revisions`. Whether a revision is
//! the head of its path and whether it was deprecated are derived from two
//! separate tables:
//! - **`path_heads`**: the most-recent-by-path index. Replication can leave
//!   several heads for one path; those paths are conflicted.
//! - **`deprecations`**: monotonic; a deprecated revision never becomes live
//!   again.
//!
//! Every mutation goes through a [`StoreScope`], which wraps one SQLite
//! transaction: either all of its writes become visible or none do. After a
//! scope commits, the store publishes [`StoreEvent`]s to subscribers.
//!
//! ## Key Components
//!
//! - `paragraphs.rs`: read queries (`most_recent`, `leaves`, `history_conflicts`)
//! - `scope.rs`: mutation scopes (`commit`, `insert`, `deprecate`, `apply_remote`)
//! - `bindings.rs`: path binding persistence
//! - `live_query.rs`: chapter queries that refresh on change events
//! - `schema.rs`: schema migrations
//!
//! ## Usage
//!
//! ```rust,no_run
//! use parasync::local_db::RevisionStore;
//!
//! # async fn example() -> parasync::shared::Result<()> {
//! let store = RevisionStore::in_memory().await?;
//! let leaves = store.leaves("gen", 1).await?;
//! # Ok(())
//! # }
//! ```

pub mod schema;
pub mod paragraphs;
pub mod scope;
pub mod bindings;
pub mod live_query;

pub use live_query::LiveChapterQuery;
pub use scope::{RemoteOutcome, StoreScope};

use crate::shared::config::{EngineConfig, DEFAULT_EVENT_CAPACITY};
use crate::shared::{Result, StoreEvent};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use std::str::FromStr;
use tokio::sync::broadcast;

/// Revision store handle
///
/// Cheap to clone; clones share the connection pool and the change channel.
#[derive(Debug, Clone)]
pub struct RevisionStore {
    pool: SqlitePool,
    events: broadcast::Sender<StoreEvent>,
    #[cfg(test)]
    faults: std::sync::Arc<FaultInjector>,
}

impl RevisionStore {
    /// Open or create the store's database file
    ///
    /// Uses WAL mode and enforces foreign keys.
    pub async fn open(config: &EngineConfig) -> Result<Self> {
        let db_path = config.resolved_database_path();

        // Ensure directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        tracing::info!("[STORE] Opened revision store at {}", db_path.display());
        Self::with_pool(pool, config.event_capacity).await
    }

    /// Open a private in-memory store
    ///
    /// The pool holds a single connection that never expires, since every
    /// in-memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool, DEFAULT_EVENT_CAPACITY).await
    }

    async fn with_pool(pool: SqlitePool, event_capacity: usize) -> Result<Self> {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let store = Self {
            pool,
            events,
            #[cfg(test)]
            faults: Default::default(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Apply pending schema migrations
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let (current_version,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;
        let current_version = i32::try_from(current_version)?;

        for migration in schema::pending_migrations(current_version) {
            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
            sqlx::query(
                "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?, ?, ?)",
            )
            .bind(migration.version)
            .bind(migration.description)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            tracing::info!(
                "[STORE] Applied schema migration {}: {}",
                migration.version,
                migration.description
            );
        }

        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Begin an atomic mutation scope
    pub async fn begin(&self) -> Result<StoreScope> {
        StoreScope::begin(self.clone()).await
    }

    /// Publish a committed change to subscribers
    pub(crate) fn publish(&self, event: StoreEvent) -> usize {
        match self.events.send(event) {
            Ok(subscriber_count) => {
                tracing::debug!("[STORE] Event delivered to {} subscribers", subscriber_count);
                subscriber_count
            }
            // No subscribers
            Err(_) => 0,
        }
    }

    /// Get store statistics
    pub async fn stats(&self) -> Result<StoreStats> {
        let (revision_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM revisions")
            .fetch_one(&self.pool)
            .await?;

        let (live_leaf_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM path_heads h
             WHERE NOT EXISTS (SELECT 1 FROM deprecations d WHERE d.revision_id = h.revision_id)",
        )
        .fetch_one(&self.pool)
        .await?;

        let (deprecated_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM deprecations")
            .fetch_one(&self.pool)
            .await?;

        let (conflicted_path_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM (
                SELECT h.path_id FROM path_heads h
                WHERE NOT EXISTS (SELECT 1 FROM deprecations d WHERE d.revision_id = h.revision_id)
                GROUP BY h.path_id HAVING COUNT(*) > 1
            )",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            revision_count: u64::try_from(revision_count)?,
            live_leaf_count: u64::try_from(live_leaf_count)?,
            deprecated_count: u64::try_from(deprecated_count)?,
            conflicted_path_count: u64::try_from(conflicted_path_count)?,
        })
    }

    #[cfg(test)]
    pub(crate) fn fail_mutation_after(&self, successes: usize) {
        self.faults.arm(successes);
    }

    #[cfg(test)]
    pub(crate) fn check_fault(&self) -> Result<()> {
        if self.faults.trip() {
            return Err(sqlx::Error::Protocol("injected store fault".to_string()).into());
        }
        Ok(())
    }

    #[cfg(not(test))]
    #[inline]
    pub(crate) fn check_fault(&self) -> Result<()> {
        Ok(())
    }
}

/// Store statistics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    /// Revision records, including superseded and deprecated ones
    pub revision_count: u64,
    /// Non-deprecated head revisions
    pub live_leaf_count: u64,
    /// Deprecated revisions
    pub deprecated_count: u64,
    /// Paths with more than one live leaf
    pub conflicted_path_count: u64,
}

/// Fails the mutation that follows a set number of successful ones
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FaultInjector {
    remaining: std::sync::Mutex<Option<usize>>,
}

#[cfg(test)]
impl FaultInjector {
    fn arm(&self, successes: usize) {
        if let Ok(mut remaining) = self.remaining.lock() {
            *remaining = Some(successes);
        }
    }

    fn trip(&self) -> bool {
        let Ok(mut remaining) = self.remaining.lock() else {
            return false;
        };
        match remaining.as_mut() {
            Some(0) => {
                *remaining = None;
                true
            }
            Some(n) => {
                *n -= 1;
                false
            }
            None => false,
        }
    }
}
