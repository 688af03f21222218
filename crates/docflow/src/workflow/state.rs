use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::ErrorDetail;

/// Completion counters for one fan-out branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchProgress {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BranchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            failed: 0,
        }
    }

    pub fn record(&mut self, succeeded: bool) {
        if succeeded {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Every chunk has returned, one way or the other.
    pub fn is_settled(&self) -> bool {
        self.succeeded + self.failed >= self.total
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.succeeded == self.total
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Processing,
    Partitioning,
    ParallelProcessing {
        text: BranchProgress,
        image: BranchProgress,
    },
    Aggregating,
    Complete,
    Error {
        detail: ErrorDetail,
    },
}

/// Payload-free name of a [`RunState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateName {
    Processing,
    Partitioning,
    ParallelProcessing,
    Aggregating,
    Complete,
    Error,
}

impl StateName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateName::Processing => "processing",
            StateName::Partitioning => "partitioning",
            StateName::ParallelProcessing => "parallel_processing",
            StateName::Aggregating => "aggregating",
            StateName::Complete => "complete",
            StateName::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StateName::Complete | StateName::Error)
    }

    /// The transition table.
    pub fn can_transition_to(&self, next: StateName) -> bool {
        use StateName::*;
        matches!(
            (*self, next),
            (Processing, Partitioning)
                | (Partitioning, ParallelProcessing)
                | (Partitioning, Error)
                | (ParallelProcessing, Aggregating)
                | (ParallelProcessing, Error)
                | (Aggregating, Complete)
                | (Aggregating, Error)
        )
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RunState {
    pub fn name(&self) -> StateName {
        match self {
            RunState::Processing => StateName::Processing,
            RunState::Partitioning => StateName::Partitioning,
            RunState::ParallelProcessing { .. } => StateName::ParallelProcessing,
            RunState::Aggregating => StateName::Aggregating,
            RunState::Complete => StateName::Complete,
            RunState::Error { .. } => StateName::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.name().is_terminal()
    }
}
