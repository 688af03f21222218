pub mod app;
pub mod collaborator;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod sanitize;
pub mod status;
pub mod storage;
pub mod trigger;
pub mod workflow;

pub use app::App;
pub use collaborator::{Aggregator, ChunkProcessor, CollaboratorError, Partitioner};
pub use config::{load_config, Config};
pub use error::{ConfigError, DocflowError, Result, StorageError, WorkerError};
pub use model::{ChunkId, ChunkKind, ChunkRef, ObjectLocation, PartitionResult, ProcessedChunk};
pub use status::{DocumentStatus, MemoryStatusStore, SqliteStatusStore, Status, StatusStore, StatusView};
pub use trigger::{TriggerRouter, UploadEvent};
pub use workflow::{ErrorDetail, Orchestrator, RunReport, RunRequest, Stage, WorkflowConfig};
