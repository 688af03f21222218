//! Wiring a loaded [`Config`] into a ready orchestrator backed by the local
//! object store.

use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};

use crate::collaborator::local::{
    LocalAggregator, LocalImageProcessor, LocalPartitioner, LocalTextProcessor,
};
use crate::config::Config;
use crate::db::{self, Database};
use crate::error::Result;
use crate::status::{MemoryStatusStore, SqliteStatusStore, StatusStore};
use crate::storage::LocalObjectStore;
use crate::trigger::{TriggerRouter, UploadWatcher};
use crate::workflow::{Collaborators, Orchestrator, WorkflowConfig};

/// `database_path` value that selects the in-memory status store.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

pub struct App {
    pub config: Config,
    pub store: LocalObjectStore,
    pub status: Arc<dyn StatusStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl App {
    pub fn from_config(config: Config) -> Result<Self> {
        let store = LocalObjectStore::new(&config.storage_root);
        let status = open_status_store(&config)?;
        let orchestrator = Arc::new(Orchestrator::new(
            &WorkflowConfig::from_config(&config),
            Arc::clone(&status),
            local_collaborators(&config, &store),
        ));

        Ok(Self {
            config,
            store,
            status,
            orchestrator,
        })
    }

    pub fn router(&self) -> TriggerRouter {
        TriggerRouter::from_config(&self.config.upload)
    }

    pub fn watcher(&self) -> UploadWatcher {
        UploadWatcher::new(self.store.clone(), self.config.upload.bucket.clone())
    }
}

/// Opens the configured status store: SQLite at `database_path` (or the
/// default path), or an in-memory store for `":memory:"`.
pub fn open_status_store(config: &Config) -> Result<Arc<dyn StatusStore>> {
    let path = match config.database_path.as_deref() {
        Some(IN_MEMORY_DATABASE) => {
            info!("Using in-memory status store");
            return Ok(Arc::new(MemoryStatusStore::new()));
        }
        Some(path) => PathBuf::from(path),
        None => match db::default_database_path() {
            Some(path) => path,
            None => {
                warn!("No home directory found, status will not be persisted");
                return Ok(Arc::new(MemoryStatusStore::new()));
            }
        },
    };

    let database = Database::open(&path)?;
    Ok(Arc::new(SqliteStatusStore::new(database)))
}

pub fn local_collaborators(config: &Config, store: &LocalObjectStore) -> Collaborators {
    Collaborators {
        partitioner: Arc::new(LocalPartitioner::new(
            store.clone(),
            config.derived_bucket.clone(),
        )),
        text_processor: Arc::new(LocalTextProcessor::new(store.clone())),
        image_processor: Arc::new(LocalImageProcessor::new(store.clone())),
        aggregator: Arc::new(LocalAggregator::new(
            store.clone(),
            config.artifact_bucket.clone(),
        )),
    }
}
