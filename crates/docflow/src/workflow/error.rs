use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ChunkId, ChunkKind};
use crate::status::StatusError;

use super::state::StateName;

/// The externally visible stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Partition,
    TextProcessing,
    ImageProcessing,
    Aggregate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Partition => "partition",
            Stage::TextProcessing => "text_processing",
            Stage::ImageProcessing => "image_processing",
            Stage::Aggregate => "aggregate",
        }
    }

    /// The processing branch that handles chunks of `kind`.
    pub fn for_kind(kind: ChunkKind) -> Self {
        match kind {
            ChunkKind::Text => Stage::TextProcessing,
            ChunkKind::Image => Stage::ImageProcessing,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The collaborator returned an error.
    Failed(String),
    /// The invocation did not finish within the stage timeout.
    TimedOut(Duration),
    /// A processor returned a result for a different chunk.
    Mismatched { returned: ChunkId },
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Failed(message) => f.write_str(message),
            FailureKind::TimedOut(after) => write!(f, "timed out after {}s", after.as_secs_f64()),
            FailureKind::Mismatched { returned } => {
                write!(f, "processor returned a result for chunk {}", returned)
            }
        }
    }
}

/// A failed stage invocation, or the first failure of a fan-out branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError {
    pub stage: Stage,
    pub chunk_id: Option<ChunkId>,
    pub kind: FailureKind,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.chunk_id {
            Some(id) => write!(f, "{} failed for chunk {}: {}", self.stage, id, self.kind),
            None => write!(f, "{} failed: {}", self.stage, self.kind),
        }
    }
}

impl std::error::Error for StageError {}

impl StageError {
    pub fn failed(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            chunk_id: None,
            kind: FailureKind::Failed(message.into()),
        }
    }

    pub fn timed_out(stage: Stage, after: Duration) -> Self {
        Self {
            stage,
            chunk_id: None,
            kind: FailureKind::TimedOut(after),
        }
    }

    pub fn mismatched(stage: Stage, expected: ChunkId, returned: ChunkId) -> Self {
        Self {
            stage,
            chunk_id: Some(expected),
            kind: FailureKind::Mismatched { returned },
        }
    }

    pub fn with_chunk(mut self, chunk_id: ChunkId) -> Self {
        self.chunk_id = Some(chunk_id);
        self
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, FailureKind::TimedOut(_))
    }

    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            stage: self.stage,
            message: self.kind.to_string(),
            chunk_id: self.chunk_id.clone(),
        }
    }
}

/// Diagnostic stored with an `error` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub stage: Stage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<ChunkId>,
}

impl ErrorDetail {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Reads a detail back from a stored status. Returns `None` for
    /// diagnostics written by something else.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Status write failed for '{key}': {source}")]
    Status {
        key: String,
        #[source]
        source: StatusError,
    },

    #[error("Illegal state transition from {from} to {to}")]
    IllegalTransition { from: StateName, to: StateName },
}
