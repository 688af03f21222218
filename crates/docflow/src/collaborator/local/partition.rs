use async_trait::async_trait;
use tracing::debug;

use crate::collaborator::{CollaboratorError, Partitioner};
use crate::model::{ChunkRef, ObjectLocation, PartitionResult};
use crate::storage::LocalObjectStore;

use super::run_blocking;

/// Splits text documents into paragraphs and treats an image upload as a
/// single image chunk.
#[derive(Clone)]
pub struct LocalPartitioner {
    store: LocalObjectStore,
    derived_bucket: String,
}

impl LocalPartitioner {
    pub fn new(store: LocalObjectStore, derived_bucket: impl Into<String>) -> Self {
        Self {
            store,
            derived_bucket: derived_bucket.into(),
        }
    }

    fn derived(&self, document_key: &str, rest: &str) -> ObjectLocation {
        ObjectLocation::new(
            self.derived_bucket.clone(),
            format!("{}/{}", document_key, rest),
        )
    }

    fn partition_stored(&self, source: &ObjectLocation) -> Result<PartitionResult, CollaboratorError> {
        let content = self.store.get(source)?;
        let mime = mime_guess::from_path(&source.key).first();

        let result = match mime {
            Some(m) if m.type_() == mime_guess::mime::TEXT => self.partition_text(source, &content),
            Some(m) if m.type_() == mime_guess::mime::IMAGE => {
                self.partition_image(source, &content)
            }
            Some(m) => Err(CollaboratorError::new(format!(
                "unsupported document type '{}'",
                m
            ))),
            None => Err(CollaboratorError::new(format!(
                "unsupported document type for '{}'",
                source.key
            ))),
        }?;

        debug!(
            texts = result.texts.len(),
            images = result.images.len(),
            "Partitioned {}",
            source
        );
        Ok(result)
    }

    fn partition_text(
        &self,
        source: &ObjectLocation,
        content: &[u8],
    ) -> Result<PartitionResult, CollaboratorError> {
        let text = String::from_utf8_lossy(content);
        let mut texts = Vec::new();

        for (index, paragraph) in split_paragraphs(&text).into_iter().enumerate() {
            let n = index + 1;
            let location = self.derived(&source.key, &format!("text/{}.txt", n));
            self.store.put(&location, paragraph.as_bytes())?;
            texts.push(ChunkRef::text(&format!("t{}", n), location));
        }

        Ok(PartitionResult {
            texts,
            images: vec![],
        })
    }

    fn partition_image(
        &self,
        source: &ObjectLocation,
        content: &[u8],
    ) -> Result<PartitionResult, CollaboratorError> {
        let extension = source
            .key
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_else(|| "img".to_string());
        let location = self.derived(&source.key, &format!("image/1.{}", extension));
        self.store.put(&location, content)?;

        Ok(PartitionResult {
            texts: vec![],
            images: vec![ChunkRef::image("i1", location)],
        })
    }
}

/// Groups consecutive non-blank lines into trimmed paragraphs.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[async_trait]
impl Partitioner for LocalPartitioner {
    async fn partition(&self, source: &ObjectLocation) -> Result<PartitionResult, CollaboratorError> {
        let partitioner = self.clone();
        let source = source.clone();
        run_blocking("partitioner.local", move || partitioner.partition_stored(&source)).await
    }
}
