//! Capability traits for the heavy external stages.
//!
//! The orchestrator only ever sees these traits. `local` holds filesystem
//! implementations used by the binary; tests substitute deterministic fakes.

pub mod local;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ChunkRef, ObjectLocation, PartitionResult, ProcessedChunk};

/// Opaque failure reported by a collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CollaboratorError {
    pub message: String,
}

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<crate::error::StorageError> for CollaboratorError {
    fn from(e: crate::error::StorageError) -> Self {
        Self::new(e.to_string())
    }
}

/// Splits a raw document into ordered text and image chunk references.
#[async_trait]
pub trait Partitioner: Send + Sync {
    async fn partition(&self, source: &ObjectLocation) -> Result<PartitionResult, CollaboratorError>;
}

/// Transforms one chunk. The returned result must carry the id of `chunk`.
#[async_trait]
pub trait ChunkProcessor: Send + Sync {
    async fn process(&self, chunk: &ChunkRef) -> Result<ProcessedChunk, CollaboratorError>;
}

/// Builds and persists the final artifact from a complete result set.
#[async_trait]
pub trait Aggregator: Send + Sync {
    async fn aggregate(
        &self,
        document_key: &str,
        chunks: &[ProcessedChunk],
    ) -> Result<(), CollaboratorError>;
}
