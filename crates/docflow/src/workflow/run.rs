use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ObjectLocation;
use crate::status::DocumentStatus;

use super::error::{ErrorDetail, WorkflowError};
use super::state::{BranchProgress, RunState, StateName};

/// Input to one workflow run: the uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub bucket: String,
    pub document_key: String,
}

impl RunRequest {
    pub fn new(bucket: impl Into<String>, document_key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            document_key: document_key.into(),
        }
    }

    pub fn source(&self) -> ObjectLocation {
        ObjectLocation::new(self.bucket.clone(), self.document_key.clone())
    }
}

/// A state the run entered and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub state: StateName,
    pub at: DateTime<Utc>,
}

impl StateEntry {
    fn now(state: StateName) -> Self {
        Self {
            state,
            at: Utc::now(),
        }
    }
}

/// One execution of the workflow for one document.
#[derive(Debug)]
pub struct WorkflowRun {
    run_id: String,
    request: RunRequest,
    state: RunState,
    history: Vec<StateEntry>,
    started: Instant,
}

impl WorkflowRun {
    pub fn new(request: RunRequest) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            request,
            state: RunState::Processing,
            history: vec![StateEntry::now(StateName::Processing)],
            started: Instant::now(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn request(&self) -> &RunRequest {
        &self.request
    }

    pub fn document_key(&self) -> &str {
        &self.request.document_key
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[StateEntry] {
        &self.history
    }

    pub fn transition(&mut self, next: RunState) -> Result<(), WorkflowError> {
        let from = self.state.name();
        let to = next.name();
        if !from.can_transition_to(to) {
            return Err(WorkflowError::IllegalTransition { from, to });
        }
        tracing::debug!(from = %from, to = %to, "State transition");
        self.state = next;
        self.history.push(StateEntry::now(to));
        Ok(())
    }

    /// Replaces the branch counters while in `ParallelProcessing`.
    pub fn set_branch_progress(&mut self, text: BranchProgress, image: BranchProgress) {
        if let RunState::ParallelProcessing {
            text: current_text,
            image: current_image,
        } = &mut self.state
        {
            *current_text = text;
            *current_image = image;
        }
    }

    pub fn report(self, outcome: RunOutcome, status_recorded: bool) -> RunReport {
        RunReport {
            elapsed: self.started.elapsed(),
            run_id: self.run_id,
            document_key: self.request.document_key,
            outcome,
            status_recorded,
            history: self.history,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed { chunks: usize },
    Failed { detail: ErrorDetail },
    /// A terminal status already existed, so nothing ran.
    Skipped { existing: DocumentStatus },
}

/// Summary returned to the caller of a run, for logging.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub document_key: String,
    pub outcome: RunOutcome,
    /// False when another run had already written a terminal status and this
    /// run's terminal status was discarded.
    pub status_recorded: bool,
    pub history: Vec<StateEntry>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, RunOutcome::Skipped { .. })
    }

    /// The state names from `history`, without timestamps.
    pub fn states(&self) -> Vec<StateName> {
        self.history.iter().map(|entry| entry.state).collect()
    }

    pub fn error_detail(&self) -> Option<&ErrorDetail> {
        match &self.outcome {
            RunOutcome::Failed { detail } => Some(detail),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::error::{Stage, StageError};

    fn run() -> WorkflowRun {
        WorkflowRun::new(RunRequest::new("raw", "doc1.pdf"))
    }

    #[test]
    fn test_new_run_starts_processing() {
        let run = run();
        assert_eq!(run.state(), &RunState::Processing);
        assert_eq!(run.history().len(), 1);
        assert_eq!(run.history()[0].state, StateName::Processing);
        assert_eq!(run.request().source(), ObjectLocation::new("raw", "doc1.pdf"));
        assert!(!run.run_id().is_empty());
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut run = run();
        let err = run.transition(RunState::Aggregating).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::IllegalTransition {
                from: StateName::Processing,
                to: StateName::Aggregating
            }
        ));
        assert_eq!(run.state(), &RunState::Processing);
        assert_eq!(run.history().len(), 1);
    }

    #[test]
    fn test_history_and_branch_progress() {
        let mut run = run();
        run.transition(RunState::Partitioning).unwrap();
        run.transition(RunState::ParallelProcessing {
            text: BranchProgress::new(2),
            image: BranchProgress::new(1),
        })
        .unwrap();

        let mut text = BranchProgress::new(2);
        text.record(true);
        run.set_branch_progress(text, BranchProgress::new(1));
        assert!(matches!(
            run.state(),
            RunState::ParallelProcessing { text, .. } if text.succeeded == 1
        ));

        run.transition(RunState::Aggregating).unwrap();
        run.transition(RunState::Complete).unwrap();

        let report = run.report(RunOutcome::Completed { chunks: 3 }, true);
        assert!(report.is_completed());
        assert_eq!(
            report.states(),
            vec![
                StateName::Processing,
                StateName::Partitioning,
                StateName::ParallelProcessing,
                StateName::Aggregating,
                StateName::Complete
            ]
        );
    }

    #[test]
    fn test_history_timestamps_are_monotonic() {
        let before = Utc::now();
        let mut run = run();
        run.transition(RunState::Partitioning).unwrap();
        let detail = StageError::failed(Stage::Partition, "boom").detail();
        run.transition(RunState::Error {
            detail: detail.clone(),
        })
        .unwrap();
        let after = Utc::now();

        let history = run.history();
        assert_eq!(history.len(), 3);
        assert!(history[0].at >= before);
        assert!(history.windows(2).all(|pair| pair[0].at <= pair[1].at));
        assert!(history[2].at <= after);

        let report = run.report(RunOutcome::Failed { detail }, true);
        let json = serde_json::to_value(&report.history).unwrap();
        assert_eq!(json[2]["state"], "error");
        assert!(json[2]["at"].is_string());
    }

    #[test]
    fn test_no_transition_out_of_terminal() {
        let mut run = run();
        run.transition(RunState::Partitioning).unwrap();
        run.transition(RunState::Complete).unwrap_err();
        run.transition(RunState::ParallelProcessing {
            text: BranchProgress::new(0),
            image: BranchProgress::new(0),
        })
        .unwrap();
        run.transition(RunState::Aggregating).unwrap();
        run.transition(RunState::Complete).unwrap();

        assert!(run.transition(RunState::Partitioning).is_err());
    }
}
