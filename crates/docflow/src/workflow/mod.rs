//! The document workflow: an explicit state machine over partition, parallel
//! chunk processing and aggregation.

pub mod config;
pub mod error;
pub mod invoke;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod run;
pub mod state;

pub use config::WorkflowConfig;
pub use error::{ErrorDetail, FailureKind, Stage, StageError, WorkflowError};
pub use invoke::{Invoker, RetryPolicy};
pub use orchestrator::{Collaborators, Orchestrator};
pub use pool::{BranchOutcome, ChunkPool};
pub use progress::{
    log_events, BroadcastProgress, NoopProgress, ProgressReporter, RunEvent, RunEventBroadcaster,
};
pub use run::{RunOutcome, RunReport, RunRequest, WorkflowRun};
pub use state::{BranchProgress, RunState, StateName};
