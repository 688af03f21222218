//! Harnesses wiring fakes or the local collaborators into an orchestrator.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use docflow::model::PartitionResult;
use docflow::status::{MemoryStatusStore, StatusStore};
use docflow::workflow::{
    Collaborators, NoopProgress, Orchestrator, RetryPolicy, RunReport, RunRequest,
    WorkflowConfig,
};
use docflow::{load_config, App};

use super::fakes::{RecordingAggregator, ScriptedPartitioner, ScriptedProcessor};

pub const UPLOAD_BUCKET: &str = "uploads";

/// Orchestrator over scripted collaborators and an in-memory status store.
pub struct WorkflowHarness {
    pub status: Arc<dyn StatusStore>,
    pub partitioner: Arc<ScriptedPartitioner>,
    pub text: Arc<ScriptedProcessor>,
    pub image: Arc<ScriptedProcessor>,
    pub aggregator: Arc<RecordingAggregator>,
    pub config: WorkflowConfig,
}

impl WorkflowHarness {
    pub fn new(partitioner: ScriptedPartitioner) -> Self {
        Self {
            status: Arc::new(MemoryStatusStore::new()),
            partitioner: Arc::new(partitioner),
            text: Arc::new(ScriptedProcessor::new()),
            image: Arc::new(ScriptedProcessor::new()),
            aggregator: Arc::new(RecordingAggregator::new()),
            config: WorkflowConfig {
                stage_timeout: Duration::from_secs(5),
                chunk_concurrency: 4,
                retry: RetryPolicy::none(),
            },
        }
    }

    /// Harness for a partition that always returns `partition`.
    pub fn returning(partition: PartitionResult) -> Self {
        Self::new(ScriptedPartitioner::returning(partition))
    }

    pub fn with_text(mut self, text: ScriptedProcessor) -> Self {
        self.text = Arc::new(text);
        self
    }

    pub fn with_image(mut self, image: ScriptedProcessor) -> Self {
        self.image = Arc::new(image);
        self
    }

    pub fn with_aggregator(mut self, aggregator: RecordingAggregator) -> Self {
        self.aggregator = Arc::new(aggregator);
        self
    }

    pub fn with_status(mut self, status: Arc<dyn StatusStore>) -> Self {
        self.status = status;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.stage_timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.chunk_concurrency = concurrency;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            partitioner: self.partitioner.clone(),
            text_processor: self.text.clone(),
            image_processor: self.image.clone(),
            aggregator: self.aggregator.clone(),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(&self.config, Arc::clone(&self.status), self.collaborators())
    }

    /// Runs one document to completion with a fresh orchestrator.
    pub async fn run(&self, key: &str) -> RunReport {
        self.orchestrator()
            .run(RunRequest::new(UPLOAD_BUCKET, key), &NoopProgress)
            .await
            .expect("status store should accept writes")
    }
}

/// A temporary storage root with a config file pointing into it.
pub struct LocalHarness {
    pub temp_dir: TempDir,
}

impl LocalHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        Self { temp_dir }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn storage_root(&self) -> PathBuf {
        self.root().join("objects")
    }

    pub fn database_path(&self) -> PathBuf {
        self.root().join("status.db")
    }

    /// Writes a config file using SQLite under the temp dir and returns its path.
    pub fn write_config(&self) -> PathBuf {
        let config = serde_json::json!({
            "version": "1.0",
            "storage_root": self.storage_root().to_string_lossy(),
            "database_path": self.database_path().to_string_lossy(),
            "upload": { "bucket": UPLOAD_BUCKET },
            "derived_bucket": "derived",
            "artifact_bucket": "artifacts",
            "workflow": {
                "stage_timeout_secs": 30,
                "chunk_concurrency": 2
            }
        });
        let path = self.root().join("config.json");
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap())
            .expect("Failed to write config");
        path
    }

    pub fn app(&self) -> App {
        let config = load_config(&self.write_config()).expect("config should load");
        App::from_config(config).expect("app should start")
    }

    /// Places an object in the upload bucket.
    pub fn upload(&self, key: &str, content: &[u8]) {
        let path = self.storage_root().join(UPLOAD_BUCKET).join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.storage_root().join(bucket).join(key)
    }
}

impl Default for LocalHarness {
    fn default() -> Self {
        Self::new()
    }
}
