//! In-process status store.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use super::{BeginOutcome, DocumentStatus, FinishOutcome, Status, StatusError, StatusStore};

/// Status store backed by a `RwLock<HashMap>`.
///
/// Nothing survives a restart; used by tests and by single-shot runs that do
/// not need a database.
#[derive(Default)]
pub struct MemoryStatusStore {
    records: RwLock<HashMap<String, DocumentStatus>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents with a record.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, DocumentStatus>> {
        match self.records.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Status store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, DocumentStatus>> {
        match self.records.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Status store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn record(
    key: &str,
    run_id: Option<&str>,
    status: Status,
    error: Option<&serde_json::Value>,
) -> DocumentStatus {
    DocumentStatus {
        document_key: key.to_string(),
        status,
        error: error.cloned(),
        run_id: run_id.map(str::to_string),
        updated_at: Utc::now(),
    }
}

impl StatusStore for MemoryStatusStore {
    fn set_status(
        &self,
        key: &str,
        status: Status,
        error: Option<&serde_json::Value>,
    ) -> Result<(), StatusError> {
        let mut records = self.write();
        let run_id = records.get(key).and_then(|r| r.run_id.clone());
        records.insert(key.to_string(), record(key, run_id.as_deref(), status, error));
        Ok(())
    }

    fn get_status(&self, key: &str) -> Result<Option<DocumentStatus>, StatusError> {
        Ok(self.read().get(key).cloned())
    }

    fn begin(&self, key: &str, run_id: &str) -> Result<BeginOutcome, StatusError> {
        let mut records = self.write();
        if let Some(existing) = records.get(key) {
            if existing.status.is_terminal() {
                return Ok(BeginOutcome::AlreadyTerminal(existing.clone()));
            }
        }
        records.insert(
            key.to_string(),
            record(key, Some(run_id), Status::Processing, None),
        );
        Ok(BeginOutcome::Started)
    }

    fn finish(
        &self,
        key: &str,
        run_id: &str,
        status: Status,
        error: Option<&serde_json::Value>,
    ) -> Result<FinishOutcome, StatusError> {
        let mut records = self.write();
        if let Some(existing) = records.get(key) {
            if existing.status.is_terminal() {
                return Ok(FinishOutcome::AlreadyTerminal(existing.clone()));
            }
        }
        records.insert(key.to_string(), record(key, Some(run_id), status, error));
        Ok(FinishOutcome::Recorded)
    }
}
