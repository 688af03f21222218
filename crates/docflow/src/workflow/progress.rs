//! Run progress events for live observers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::ChunkId;

use super::error::ErrorDetail;
use super::run::WorkflowRun;
use super::state::{BranchProgress, RunState, StateName};

/// Progress event for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub run_id: String,
    pub document_key: String,
    /// State the run is in when the event is emitted.
    pub state: StateName,
    pub timestamp: DateTime<Utc>,
    /// Set on chunk completion events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<ChunkId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_succeeded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<BranchProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<BranchProgress>,
    /// Set when the run enters `Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl RunEvent {
    /// Event for entering the run's current state.
    pub fn entered(run: &WorkflowRun) -> Self {
        let mut event = Self::base(run);
        match run.state() {
            RunState::ParallelProcessing { text, image } => {
                event.text = Some(*text);
                event.image = Some(*image);
            }
            RunState::Error { detail } => event.error = Some(detail.clone()),
            _ => {}
        }
        event
    }

    /// Event for one chunk settling, with the live branch counters.
    pub fn chunk_settled(
        run: &WorkflowRun,
        chunk_id: Option<&ChunkId>,
        succeeded: bool,
        text: BranchProgress,
        image: BranchProgress,
    ) -> Self {
        let mut event = Self::base(run);
        event.chunk_id = chunk_id.cloned();
        event.chunk_succeeded = Some(succeeded);
        event.text = Some(text);
        event.image = Some(image);
        event
    }

    fn base(run: &WorkflowRun) -> Self {
        Self {
            run_id: run.run_id().to_string(),
            document_key: run.document_key().to_string(),
            state: run.state().name(),
            timestamp: Utc::now(),
            chunk_id: None,
            chunk_succeeded: None,
            text: None,
            image: None,
            error: None,
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: RunEvent);
}

/// No-op reporter.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: RunEvent) {}
}

/// Forwards events to a broadcast channel.
#[derive(Clone)]
pub struct BroadcastProgress {
    sender: Arc<broadcast::Sender<RunEvent>>,
}

impl BroadcastProgress {
    pub fn new(sender: Arc<broadcast::Sender<RunEvent>>) -> Self {
        Self { sender }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: RunEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }
}

/// Owns the broadcast channel run events are published on.
pub struct RunEventBroadcaster {
    sender: Arc<broadcast::Sender<RunEvent>>,
}

impl RunEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn reporter(&self) -> BroadcastProgress {
        BroadcastProgress::new(Arc::clone(&self.sender))
    }
}

impl Default for RunEventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Logs every event from `events` at debug level until all reporters are
/// gone. Returns how many events were logged.
pub async fn log_events(mut events: broadcast::Receiver<RunEvent>) -> usize {
    let mut logged = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                tracing::debug!(
                    run_id = %event.run_id,
                    state = %event.state,
                    chunk = event.chunk_id.as_ref().map(|id| id.as_str()),
                    "Run event for {}",
                    crate::sanitize::redact_key(&event.document_key)
                );
                logged += 1;
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Run event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => return logged,
        }
    }
}
