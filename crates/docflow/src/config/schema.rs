use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub storage_root: String,
    pub upload: UploadConfig,
    #[serde(default = "default_derived_bucket")]
    pub derived_bucket: String,
    #[serde(default = "default_artifact_bucket")]
    pub artifact_bucket: String,
    /// SQLite status database. `None` falls back to `~/.docflow/data/docflow.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub workflow: WorkflowSettings,
}

fn default_derived_bucket() -> String {
    "derived".to_string()
}

fn default_artifact_bucket() -> String {
    "artifacts".to_string()
}

/// Which upload notifications start a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSettings {
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    #[serde(default = "default_chunk_concurrency")]
    pub chunk_concurrency: usize,
    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_stage_timeout_secs() -> u64 {
    900
}

fn default_chunk_concurrency() -> usize {
    num_cpus::get()
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout_secs(),
            chunk_concurrency: default_chunk_concurrency(),
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}
