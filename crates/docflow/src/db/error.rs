//! Failures of the SQLite status database.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The directory holding the database file could not be created.
    #[error("Cannot create database directory '{}': {source}", dir.display())]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A thread panicked while holding the connection.
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}
