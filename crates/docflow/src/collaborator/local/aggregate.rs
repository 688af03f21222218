use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborator::{Aggregator, CollaboratorError};
use crate::model::{ChunkId, ChunkKind, ObjectLocation, ProcessedChunk};
use crate::storage::LocalObjectStore;

use super::run_blocking;

/// The final per-document artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub document_key: String,
    pub created_at: DateTime<Utc>,
    pub texts: Vec<ArtifactText>,
    pub images: Vec<ArtifactImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactText {
    pub chunk_id: ChunkId,
    pub location: ObjectLocation,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactImage {
    pub chunk_id: ChunkId,
    pub location: ObjectLocation,
}

/// Writes `<artifact bucket>/<document key>.json`.
#[derive(Clone)]
pub struct LocalAggregator {
    store: LocalObjectStore,
    artifact_bucket: String,
}

impl LocalAggregator {
    pub fn new(store: LocalObjectStore, artifact_bucket: impl Into<String>) -> Self {
        Self {
            store,
            artifact_bucket: artifact_bucket.into(),
        }
    }

    pub fn artifact_location(&self, document_key: &str) -> ObjectLocation {
        ObjectLocation::new(
            self.artifact_bucket.clone(),
            format!("{}.json", document_key),
        )
    }

    /// Reads back a previously written artifact.
    pub fn load(&self, document_key: &str) -> Result<Artifact, CollaboratorError> {
        let content = self.store.get(&self.artifact_location(document_key))?;
        serde_json::from_slice(&content)
            .map_err(|e| CollaboratorError::new(format!("Invalid artifact: {}", e)))
    }

    fn build(
        &self,
        document_key: &str,
        chunks: &[ProcessedChunk],
    ) -> Result<Artifact, CollaboratorError> {
        let mut texts = Vec::new();
        let mut images = Vec::new();

        for chunk in chunks {
            match chunk.kind {
                ChunkKind::Text => texts.push(ArtifactText {
                    chunk_id: chunk.chunk_id.clone(),
                    location: chunk.output.clone(),
                    text: self.store.get_string(&chunk.output)?,
                }),
                ChunkKind::Image => images.push(ArtifactImage {
                    chunk_id: chunk.chunk_id.clone(),
                    location: chunk.output.clone(),
                }),
            }
        }

        Ok(Artifact {
            document_key: document_key.to_string(),
            created_at: Utc::now(),
            texts,
            images,
        })
    }
}

#[async_trait]
impl Aggregator for LocalAggregator {
    async fn aggregate(
        &self,
        document_key: &str,
        chunks: &[ProcessedChunk],
    ) -> Result<(), CollaboratorError> {
        let aggregator = self.clone();
        let document_key = document_key.to_string();
        let chunks = chunks.to_vec();

        run_blocking("aggregator.local", move || {
            let artifact = aggregator.build(&document_key, &chunks)?;
            let json = serde_json::to_vec_pretty(&artifact).map_err(|e| {
                CollaboratorError::new(format!("Failed to serialize artifact: {}", e))
            })?;

            let location = aggregator.artifact_location(&document_key);
            aggregator.store.put(&location, &json)?;
            tracing::debug!(chunks = chunks.len(), "Wrote artifact {}", location);
            Ok(())
        })
        .await
    }
}
