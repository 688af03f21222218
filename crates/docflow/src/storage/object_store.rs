use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::model::ObjectLocation;
use crate::sanitize;

/// Object store laid out as `root/<bucket>/<key>` on the local filesystem.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never observes a half-written object and the latest write wins.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        if !sanitize::is_safe_segment(bucket) {
            return Err(StorageError::InvalidKey {
                key: bucket.to_string(),
                reason: "bucket must be a single path segment".to_string(),
            });
        }
        Ok(self.root.join(bucket))
    }

    /// Maps a location onto the filesystem, rejecting keys that would escape
    /// the bucket directory.
    pub fn path_of(&self, location: &ObjectLocation) -> Result<PathBuf, StorageError> {
        sanitize::check_key(&location.key).map_err(|reason| StorageError::InvalidKey {
            key: location.key.clone(),
            reason: reason.to_string(),
        })?;
        let mut path = self.bucket_dir(&location.bucket)?;
        for segment in location.key.split('/') {
            path.push(segment);
        }
        Ok(path)
    }

    /// Inverse of `path_of` for files inside `bucket`.
    pub fn key_for(&self, bucket: &str, path: &Path) -> Option<String> {
        let bucket_dir = self.bucket_dir(bucket).ok()?;
        let relative = path.strip_prefix(&bucket_dir).ok()?;
        let segments: Option<Vec<&str>> = relative.iter().map(|s| s.to_str()).collect();
        let key = segments?.join("/");
        sanitize::is_safe_key(&key).then_some(key)
    }

    pub fn exists(&self, location: &ObjectLocation) -> bool {
        self.path_of(location).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, StorageError> {
        let path = self.path_of(location)?;
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    bucket: location.bucket.clone(),
                    key: location.key.clone(),
                }
            } else {
                StorageError::ReadFile { path, source: e }
            }
        })
    }

    pub fn get_string(&self, location: &ObjectLocation) -> Result<String, StorageError> {
        let bytes = self.get(location)?;
        String::from_utf8(bytes).map_err(|e| StorageError::ReadFile {
            path: self.root.join(&location.bucket).join(&location.key),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })
    }

    pub fn put(&self, location: &ObjectLocation, content: &[u8]) -> Result<(), StorageError> {
        let path = self.path_of(location)?;
        let parent = path.parent().unwrap_or(&self.root).to_path_buf();
        std::fs::create_dir_all(&parent).map_err(|e| StorageError::CreateDirectory {
            path: parent.clone(),
            source: e,
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let staging = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        std::fs::write(&staging, content).map_err(|e| StorageError::WriteFile {
            path: staging.clone(),
            source: e,
        })?;
        std::fs::rename(&staging, &path).map_err(|e| {
            let _ = std::fs::remove_file(&staging);
            StorageError::WriteFile {
                path: path.clone(),
                source: e,
            }
        })?;

        log::debug!("Stored object {}", location);
        Ok(())
    }
}

/// Returns `true` for the staging files `put` leaves behind while writing.
pub fn is_staging_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n.ends_with(".tmp"))
        .unwrap_or(false)
}
