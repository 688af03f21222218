//! Turning upload notifications into workflow runs.

pub mod dispatcher;
pub mod watcher;

pub use dispatcher::{DispatchReport, RunDispatcher};
pub use watcher::UploadWatcher;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::UploadConfig;
use crate::sanitize;
use crate::workflow::RunRequest;

/// Object-created notification: `{"bucket": "...", "object": {"key": "..."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEvent {
    pub bucket: String,
    pub object: UploadedObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedObject {
    pub key: String,
}

impl UploadEvent {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: UploadedObject { key: key.into() },
        }
    }

    pub fn key(&self) -> &str {
        &self.object.key
    }
}

/// Accepts uploads into one bucket under one key prefix.
///
/// Repeated deliveries of the same event are routed every time.
#[derive(Debug, Clone)]
pub struct TriggerRouter {
    bucket: String,
    prefix: String,
}

impl TriggerRouter {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.bucket.clone(), config.prefix.clone())
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn route(&self, event: &UploadEvent) -> Option<RunRequest> {
        let key = event.key();

        if event.bucket != self.bucket {
            debug!("Ignoring upload to bucket '{}'", event.bucket);
            return None;
        }
        if !key.starts_with(&self.prefix) {
            debug!("Ignoring upload outside prefix: {}", sanitize::redact_key(key));
            return None;
        }
        if !sanitize::is_safe_key(key) {
            debug!("Ignoring upload with unsafe key: {}", sanitize::hash_key(key));
            return None;
        }

        Some(RunRequest::new(event.bucket.clone(), key))
    }
}
