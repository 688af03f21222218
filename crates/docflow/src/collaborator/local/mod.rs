//! Filesystem-backed collaborators over a [`LocalObjectStore`].
//!
//! Layout inside the derived bucket for a document `K`:
//! `K/text/<n>.txt` and `K/image/<n>.<ext>` for partitioned chunks, and
//! `<chunk stem>.processed.<ext>` beside each chunk for processor output.
//! The aggregator writes `K.json` into the artifact bucket.
//!
//! [`LocalObjectStore`]: crate::storage::LocalObjectStore

pub mod aggregate;
pub mod image;
pub mod partition;
pub mod text;

pub use aggregate::{Artifact, LocalAggregator};
pub use image::LocalImageProcessor;
pub use partition::LocalPartitioner;
pub use text::LocalTextProcessor;

use crate::collaborator::CollaboratorError;
use crate::model::ObjectLocation;

/// Runs store work on the blocking pool so a stage timeout can still fire
/// while a read or write is stuck.
pub(crate) async fn run_blocking<T, F>(task: &'static str, f: F) -> Result<T, CollaboratorError>
where
    F: FnOnce() -> Result<T, CollaboratorError> + Send + 'static,
    T: Send + 'static,
{
    let span = tracing::info_span!("collaborator.local", task);
    tokio::task::spawn_blocking(move || span.in_scope(f))
        .await
        .map_err(|e| CollaboratorError::new(format!("{} task failed: {}", task, e)))?
}

/// Location of a processor's output for the chunk at `chunk`.
fn processed_location(chunk: &ObjectLocation, extension: &str) -> ObjectLocation {
    let (dir, file) = match chunk.key.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, chunk.key.as_str()),
    };
    let stem = file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file);
    let name = format!("{}.processed.{}", stem, extension);
    let key = match dir {
        Some(dir) => format!("{}/{}", dir, name),
        None => name,
    };
    ObjectLocation::new(chunk.bucket.clone(), key)
}
