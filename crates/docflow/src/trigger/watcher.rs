use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use notify::{Config as NotifyConfig, PollWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer_opt, Config as DebouncerConfig, DebouncedEventKind};
use walkdir::WalkDir;

use crate::error::WorkerError;
use crate::storage::{is_staging_file, LocalObjectStore};

use super::UploadEvent;

/// Produces upload events for objects landing in the upload bucket of a
/// [`LocalObjectStore`].
pub struct UploadWatcher {
    store: LocalObjectStore,
    bucket: String,
    poll_interval: Duration,
}

impl UploadWatcher {
    pub fn new(store: LocalObjectStore, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn bucket_dir(&self) -> Result<PathBuf, WorkerError> {
        self.store
            .bucket_dir(&self.bucket)
            .map_err(|e| WorkerError::WatchError(e.to_string()))
    }

    fn event_for(&self, path: &Path) -> Option<UploadEvent> {
        if !path.is_file() || is_staging_file(path) {
            return None;
        }
        self.store
            .key_for(&self.bucket, path)
            .map(|key| UploadEvent::new(self.bucket.clone(), key))
    }

    /// Lists every object already in the bucket, in key order.
    pub fn scan(&self) -> Result<Vec<UploadEvent>, WorkerError> {
        let dir = self.bucket_dir()?;
        if !dir.exists() {
            debug!("Upload bucket {} does not exist yet", dir.display());
            return Ok(vec![]);
        }

        let mut events = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(WorkerError::ScanFailed {
                        path: dir.clone(),
                        source: e,
                    })
                }
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if let Some(event) = self.event_for(entry.path()) {
                debug!("Found object: {}", entry.path().display());
                events.push(event);
            }
        }

        info!("Scanned {} objects in {}", events.len(), dir.display());
        Ok(events)
    }

    /// Blocks until `shutdown` is set, calling `callback` for every object
    /// created or modified in the bucket.
    ///
    /// Objects already in the bucket are reported once the watch is in
    /// place, so nothing uploaded during startup is missed. An object may be
    /// reported twice; the status store turns the second run into a skip.
    pub fn watch<F>(&self, callback: F, shutdown: Arc<AtomicBool>) -> Result<(), WorkerError>
    where
        F: Fn(UploadEvent) + Send + 'static,
    {
        let dir = self.bucket_dir()?;
        std::fs::create_dir_all(&dir).map_err(|e| WorkerError::WatchError(e.to_string()))?;

        // Polling works on network and container mounts
        let poll_config = NotifyConfig::default().with_poll_interval(self.poll_interval);
        let debouncer_config = DebouncerConfig::default()
            .with_timeout(Duration::from_millis(500))
            .with_notify_config(poll_config);

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer_opt::<_, PollWatcher>(debouncer_config, tx)
            .map_err(|e| WorkerError::WatchError(e.to_string()))?;
        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::Recursive)
            .map_err(|e| WorkerError::WatchError(e.to_string()))?;

        info!("Watching upload bucket: {}", dir.display());

        for upload in self.scan()? {
            callback(upload);
        }

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Upload watcher shutting down...");
                break;
            }

            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(Ok(events)) => {
                    for event in events {
                        if !matches!(event.kind, DebouncedEventKind::Any) {
                            continue;
                        }
                        if let Some(upload) = self.event_for(&event.path) {
                            info!("New object detected: {}", event.path.display());
                            callback(upload);
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!("Watch error: {:?}", e);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watch channel disconnected");
                    break;
                }
            }
        }

        Ok(())
    }
}
