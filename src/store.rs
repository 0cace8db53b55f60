//! Persistent State Store (C3): an opaque KV contract with single-writer
//! semantics and a scheduled wake-up alarm.
//!
//! Grounded on the teacher's functional-core/imperative-shell split in
//! `storage.rs` (pure SQL string generators plus pure mapping functions,
//! wrapped by a thin imperative shell that does the actual I/O) and on
//! `database.rs`'s `DatabasePath`/connection-string handling. This crate
//! persists the whole [`RegistryState`] as one opaque JSON blob per shard
//! rather than a normalized schema — the spec calls the store "an opaque
//! key/value store", and a single-writer, single-shard blob satisfies the
//! "save is a barrier" requirement with one `INSERT OR REPLACE` per write,
//! without the teacher's per-entity table layout (there is exactly one
//! entity here: the shard's `RegistryState`).

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;

use crate::domain::RegistryState;

/// Failures from the persistence layer. Every variant converts into
/// [`crate::error::CoreError::Internal`] at the operator boundary — a
/// store failure is never the caller's fault.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying SQLite driver returned an error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The persisted blob did not deserialize into a [`RegistryState`].
    #[error("corrupt persisted state: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Contract: `load` on initial access, `save` as an atomic barrier write,
/// `schedule_wakeup` to arrange a future Maintenance Loop firing.
///
/// Pure SQL generation (below, in the private `sql` module) is kept
/// separate from the imperative `SqliteStateStore` methods that actually
/// open a connection and run a query, mirroring `storage.rs`'s split.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the shard's persisted state, or a fresh empty one if this is
    /// the first access (spec §3 "Lifecycle").
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backing store is reachable but its
    /// contents cannot be read or parsed.
    async fn load(&self) -> Result<RegistryState, StoreError>;

    /// Atomically persist `state`. Observers see either the entire
    /// pre-state or the entire post-state, never a partial write.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the write could not be committed.
    async fn save(&self, state: &RegistryState) -> Result<(), StoreError>;

    /// Arrange for the runtime to wake the Maintenance Loop at or after
    /// `at_ms`. The default store has no external scheduler to notify and
    /// this is a no-op; a real deployment backs this with whatever alarm
    /// primitive its KV store provides.
    async fn schedule_wakeup(&self, at_ms: i64) -> Result<(), StoreError> {
        let _ = at_ms;
        Ok(())
    }
}

mod sql {
    //! Pure SQL string generators; no connection, no I/O.

    pub fn create_state_table() -> &'static str {
        "CREATE TABLE IF NOT EXISTS shard_state (\
            id INTEGER PRIMARY KEY CHECK (id = 0), \
            state_json TEXT NOT NULL\
        )"
    }

    pub fn upsert_state() -> &'static str {
        "INSERT INTO shard_state (id, state_json) VALUES (0, ?1) \
         ON CONFLICT(id) DO UPDATE SET state_json = excluded.state_json"
    }

    pub fn select_state() -> &'static str {
        "SELECT state_json FROM shard_state WHERE id = 0"
    }
}

/// SQLite-backed [`StateStore`]; one row holds the entire shard state as
/// JSON, written inside a transaction so a crash mid-write leaves the
/// previous row intact (SQLite's own durability guarantees the barrier).
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (creating if absent) the SQLite database at `path`.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the database cannot be opened or the
    /// bookkeeping table cannot be created.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new().max_connections(1).connect(&url).await?;
        sqlx::query(sql::create_state_table()).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self) -> Result<RegistryState, StoreError> {
        let row = sqlx::query(sql::select_state()).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => {
                let json: String = row.try_get("state_json")?;
                Ok(serde_json::from_str(&json)?)
            }
            None => Ok(RegistryState::new()),
        }
    }

    async fn save(&self, state: &RegistryState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(sql::upsert_state()).bind(json).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// An in-memory [`StateStore`] with no durability, used by the
/// development/testing presets and by unit tests that do not want a
/// filesystem dependency.
#[derive(Default)]
pub struct InMemoryStateStore {
    state: tokio::sync::Mutex<Option<RegistryState>>,
}

impl InMemoryStateStore {
    /// A fresh, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self) -> Result<RegistryState, StoreError> {
        let guard = self.state.lock().await;
        Ok(guard.clone().unwrap_or_default())
    }

    async fn save(&self, state: &RegistryState) -> Result<(), StoreError> {
        let mut guard = self.state.lock().await;
        *guard = Some(state.clone());
        Ok(())
    }
}
