use async_trait::async_trait;

use crate::collaborator::{ChunkProcessor, CollaboratorError};
use crate::model::{ChunkKind, ChunkRef, ProcessedChunk};
use crate::storage::LocalObjectStore;

use super::{processed_location, run_blocking};

/// Normalizes whitespace in a text chunk.
pub struct LocalTextProcessor {
    store: LocalObjectStore,
}

impl LocalTextProcessor {
    pub fn new(store: LocalObjectStore) -> Self {
        Self { store }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl ChunkProcessor for LocalTextProcessor {
    async fn process(&self, chunk: &ChunkRef) -> Result<ProcessedChunk, CollaboratorError> {
        if chunk.kind != ChunkKind::Text {
            return Err(CollaboratorError::new(format!(
                "chunk {} is not a text chunk",
                chunk.id
            )));
        }

        let store = self.store.clone();
        let location = chunk.location.clone();
        let output = processed_location(&chunk.location, "txt");
        let target = output.clone();

        run_blocking("processor.text", move || {
            let text = store.get_string(&location)?;
            store.put(&target, normalize_whitespace(&text).as_bytes())?;
            Ok(())
        })
        .await?;

        Ok(ProcessedChunk {
            chunk_id: chunk.id.clone(),
            kind: ChunkKind::Text,
            output,
        })
    }
}
