//! `SQLite` edge store.
//!
//! This module owns the three edge tables (dependency, group reaction,
//! dispatch). Every operation runs inside an explicit transaction scope,
//! [`EdgeTx`], handed to a closure by [`EdgeStore::write`] or
//! [`EdgeStore::read`]:
//!
//! ```
//! use skein::domain::{IssueId, UserId};
//! use skein::store::{EdgeStore, PairKind, StoreError};
//!
//! let store = EdgeStore::open_in_memory()?;
//! let edge = store.write(|tx| {
//!     tx.insert_pair(PairKind::Dependency, UserId::new(1), IssueId::new(10), IssueId::new(11))
//! })?;
//! assert!(store.read(|tx| tx.pair_exists(PairKind::Dependency, edge.issue_id, edge.other_id))?);
//! # Ok::<(), StoreError>(())
//! ```
//!
//! The closure's `Ok` commits; any `Err`, including an early `?` return,
//! drops the underlying `rusqlite::Transaction`, which rolls back.
//!
//! ## Module Structure
//!
//! - `schema` - Database schema (DDL)
//! - `pairs` - Dependency and group-reaction edge operations
//! - `dispatch` - Dispatch edge operations and cascade purges

mod dispatch;
mod pairs;
mod schema;

pub use dispatch::PurgeReport;
pub use pairs::{PairEdge, PairKind};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use schema::SCHEMA;

/// How long a writer waits for another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised by the edge store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the insert
    #[error("uniqueness constraint violated")]
    Conflict,

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding the connection
    #[error("connection mutex poisoned: {0}")]
    Poisoned(String),
}

impl StoreError {
    /// Classify an insert failure, turning uniqueness violations into `Conflict`.
    pub(crate) fn from_insert(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Self::Conflict
            }
            _ => Self::Database(err),
        }
    }
}

/// `SQLite`-backed store for skein's edge rows.
///
/// The connection sits behind a `Mutex` so that one store can be shared
/// between tasks through an `Arc`. Transactions never span an `.await`.
pub struct EdgeStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for EdgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeStore").finish_non_exhaustive()
    }
}

impl EdgeStore {
    /// Open or create the edge database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        tracing::debug!(path = %path.display(), "Opened edge store");
        Self::init(conn)
    }

    /// Create a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    /// Run `f` inside a write transaction.
    ///
    /// The transaction is started with `BEGIN IMMEDIATE`, so the existence
    /// checks and the write inside `f` see no interleaved writer. It commits
    /// when `f` returns `Ok` and rolls back otherwise.
    ///
    /// # Errors
    ///
    /// Returns `f`'s error, or a [`StoreError`] converted into `E` if the
    /// transaction cannot be started or committed.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&EdgeTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let scope = EdgeTx { tx };

        let value = f(&scope)?;

        scope.tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    /// Run `f` inside a read transaction, giving it a consistent snapshot.
    ///
    /// Nothing is committed; the transaction is rolled back when `f` returns.
    ///
    /// # Errors
    ///
    /// Returns `f`'s error, or a [`StoreError`] converted into `E` if the
    /// transaction cannot be started.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&EdgeTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(StoreError::from)?;
        let scope = EdgeTx { tx };
        f(&scope)
    }
}

/// A transaction scope over the edge tables.
///
/// Obtained only through [`EdgeStore::write`] and [`EdgeStore::read`]; it
/// cannot outlive the closure it is passed to.
pub struct EdgeTx<'conn> {
    tx: rusqlite::Transaction<'conn>,
}

/// Current time as stored in the `*_unix` columns.
fn now_unix() -> i64 {
    Utc::now().timestamp()
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
