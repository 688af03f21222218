//! Document and chunk references passed between the orchestrator and its
//! collaborators. Everything here is a pointer into the object store, never
//! content.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A `{bucket, key}` pointer into the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(pub String);

impl ChunkId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Text,
    Image,
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkKind::Text => write!(f, "text"),
            ChunkKind::Image => write!(f, "image"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub id: ChunkId,
    pub kind: ChunkKind,
    pub location: ObjectLocation,
}

impl ChunkRef {
    pub fn text(id: &str, location: ObjectLocation) -> Self {
        Self {
            id: ChunkId::from(id),
            kind: ChunkKind::Text,
            location,
        }
    }

    pub fn image(id: &str, location: ObjectLocation) -> Self {
        Self {
            id: ChunkId::from(id),
            kind: ChunkKind::Image,
            location,
        }
    }
}

/// Output of the partitioner. Order within each list is the document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionResult {
    pub texts: Vec<ChunkRef>,
    pub images: Vec<ChunkRef>,
}

impl PartitionResult {
    pub fn chunk_count(&self) -> usize {
        self.texts.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count() == 0
    }

    /// Returns the first chunk id that appears more than once across both
    /// lists.
    pub fn duplicate_id(&self) -> Option<&ChunkId> {
        let mut seen = HashSet::with_capacity(self.chunk_count());
        self.texts
            .iter()
            .chain(self.images.iter())
            .map(|chunk| &chunk.id)
            .find(|id| !seen.insert(*id))
    }

    /// Returns the first chunk filed under the wrong list.
    pub fn misfiled(&self) -> Option<&ChunkRef> {
        self.texts
            .iter()
            .find(|c| c.kind != ChunkKind::Text)
            .or_else(|| self.images.iter().find(|c| c.kind != ChunkKind::Image))
    }
}

/// Successful output of a chunk processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedChunk {
    pub chunk_id: ChunkId,
    pub kind: ChunkKind,
    pub output: ObjectLocation,
}
