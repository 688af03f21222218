use std::time::Duration;

use crate::config::Config;

use super::invoke::RetryPolicy;

/// Runtime knobs of the orchestrator, projected from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub stage_timeout: Duration,
    pub chunk_concurrency: usize,
    pub retry: RetryPolicy,
}

impl WorkflowConfig {
    pub fn from_config(config: &Config) -> Self {
        let workflow = &config.workflow;
        Self {
            stage_timeout: Duration::from_secs(workflow.stage_timeout_secs),
            chunk_concurrency: workflow.chunk_concurrency.max(1),
            retry: RetryPolicy::from(&workflow.retry),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(900),
            chunk_concurrency: num_cpus::get().max(1),
            retry: RetryPolicy::default(),
        }
    }
}
