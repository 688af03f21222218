//! Document lifecycle status: the durable record external pollers read.

pub mod memory;
pub mod sqlite;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryStatusStore;
pub use sqlite::SqliteStatusStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Processing,
    Complete,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Processing => "processing",
            Status::Complete => "complete",
            Status::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(Status::Processing),
            "complete" => Some(Status::Complete),
            "error" => Some(Status::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Complete | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stored record for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStatus {
    pub document_key: String,
    pub status: Status,
    /// Opaque diagnostic attached to an `error` status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    /// The run that last wrote this record, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentStatus {
    pub fn view(&self) -> StatusView {
        StatusView {
            status: self.status,
            error: self.error.clone(),
        }
    }
}

/// What the status read endpoint returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// `processing` was written.
    Started,
    /// A terminal status already exists and was left untouched.
    AlreadyTerminal(DocumentStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// The terminal status was written.
    Recorded,
    /// Another terminal status was written first and was kept.
    AlreadyTerminal(DocumentStatus),
}

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Status database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Status store lock poisoned")]
    LockPoisoned,

    #[error("Corrupt status record for '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Status store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed status table.
///
/// Writes for different keys never interact. `set_status` is a plain
/// last-writer-wins overwrite; `begin` and `finish` are the conditional
/// writes the orchestrator uses so that a terminal status is never replaced.
pub trait StatusStore: Send + Sync {
    fn set_status(
        &self,
        key: &str,
        status: Status,
        error: Option<&serde_json::Value>,
    ) -> Result<(), StatusError>;

    /// Returns `None` when the key has never been written.
    fn get_status(&self, key: &str) -> Result<Option<DocumentStatus>, StatusError>;

    /// Writes `processing` unless a terminal status exists.
    fn begin(&self, key: &str, run_id: &str) -> Result<BeginOutcome, StatusError>;

    /// Writes a terminal status unless one already exists.
    fn finish(
        &self,
        key: &str,
        run_id: &str,
        status: Status,
        error: Option<&serde_json::Value>,
    ) -> Result<FinishOutcome, StatusError>;
}
