//! Durable status store on top of the SQLite `documents` table.

use chrono::{DateTime, Utc};

use crate::db::document_repo::{self, ConditionalWrite, DocumentRow};
use crate::db::Database;

use super::{BeginOutcome, DocumentStatus, FinishOutcome, Status, StatusError, StatusStore};

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

pub struct SqliteStatusStore {
    db: Database,
}

impl SqliteStatusStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn row(
        key: &str,
        run_id: Option<&str>,
        status: Status,
        error: Option<&serde_json::Value>,
    ) -> DocumentRow {
        let now = format_timestamp(Utc::now());
        DocumentRow {
            document_key: key.to_string(),
            status: status.as_str().to_string(),
            error: error.map(|e| e.to_string()),
            run_id: run_id.map(str::to_string),
            created_at: now.clone(),
            completed_at: status.is_terminal().then(|| now.clone()),
            updated_at: now,
        }
    }

    fn to_status(row: DocumentRow) -> Result<DocumentStatus, StatusError> {
        let status = Status::parse(&row.status).ok_or_else(|| StatusError::Corrupt {
            key: row.document_key.clone(),
            reason: format!("unknown status '{}'", row.status),
        })?;
        let error = match row.error.as_deref() {
            Some(raw) => Some(serde_json::from_str(raw).map_err(|e| StatusError::Corrupt {
                key: row.document_key.clone(),
                reason: format!("error detail is not JSON: {}", e),
            })?),
            None => None,
        };

        Ok(DocumentStatus {
            updated_at: parse_timestamp(&row.updated_at),
            document_key: row.document_key,
            status,
            error,
            run_id: row.run_id,
        })
    }
}

impl StatusStore for SqliteStatusStore {
    fn set_status(
        &self,
        key: &str,
        status: Status,
        error: Option<&serde_json::Value>,
    ) -> Result<(), StatusError> {
        document_repo::upsert(&self.db, &Self::row(key, None, status, error))?;
        Ok(())
    }

    fn get_status(&self, key: &str) -> Result<Option<DocumentStatus>, StatusError> {
        document_repo::find_by_key(&self.db, key)?
            .map(Self::to_status)
            .transpose()
    }

    fn begin(&self, key: &str, run_id: &str) -> Result<BeginOutcome, StatusError> {
        let row = Self::row(key, Some(run_id), Status::Processing, None);
        match document_repo::upsert_unless_terminal(&self.db, &row)? {
            ConditionalWrite::Written => Ok(BeginOutcome::Started),
            ConditionalWrite::Kept(existing) => {
                Ok(BeginOutcome::AlreadyTerminal(Self::to_status(existing)?))
            }
        }
    }

    fn finish(
        &self,
        key: &str,
        run_id: &str,
        status: Status,
        error: Option<&serde_json::Value>,
    ) -> Result<FinishOutcome, StatusError> {
        let row = Self::row(key, Some(run_id), status, error);
        match document_repo::upsert_unless_terminal(&self.db, &row)? {
            ConditionalWrite::Written => Ok(FinishOutcome::Recorded),
            ConditionalWrite::Kept(existing) => {
                Ok(FinishOutcome::AlreadyTerminal(Self::to_status(existing)?))
            }
        }
    }
}
