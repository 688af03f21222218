//! SQLite persistence for document statuses.
//!
//! One connection per process, shared behind a mutex. The `documents` table
//! is created by [`migrations`] and read and written by [`document_repo`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod document_repo;
pub mod error;
pub mod migrations;

pub use error::DatabaseError;

/// Shared handle to the status database. Clones use the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the database file at `path`, creating its directory and
    /// applying migrations as needed. The journal runs in WAL mode.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| DatabaseError::CreateDir {
                dir: dir.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        let database = Self::prepare(conn)?;

        log::info!("Status database at {}", path.display());
        Ok(database)
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection locked. A read and a write inside one
    /// call are atomic with respect to other callers.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// `~/.docflow/data/docflow.db`, used when the config names no database.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".docflow").join("data").join("docflow.db"))
}
