use std::sync::{Arc, Mutex};

use futures_util::future;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::collaborator::{Aggregator, ChunkProcessor, Partitioner};
use crate::model::{ChunkId, ChunkKind, PartitionResult, ProcessedChunk};
use crate::sanitize;
use crate::status::{BeginOutcome, FinishOutcome, Status, StatusStore};

use super::config::WorkflowConfig;
use super::error::{Stage, StageError, WorkflowError};
use super::invoke::Invoker;
use super::pool::{BranchOutcome, ChunkPool};
use super::progress::{ProgressReporter, RunEvent};
use super::run::{RunOutcome, RunReport, RunRequest, WorkflowRun};
use super::state::{BranchProgress, RunState};

/// The external stages a run delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub partitioner: Arc<dyn Partitioner>,
    pub text_processor: Arc<dyn ChunkProcessor>,
    pub image_processor: Arc<dyn ChunkProcessor>,
    pub aggregator: Arc<dyn Aggregator>,
}

/// Drives one document through partition, parallel processing and
/// aggregation, recording the lifecycle in the status store.
///
/// A single orchestrator serves every run; its chunk pool bounds chunk work
/// across all of them.
pub struct Orchestrator {
    status: Arc<dyn StatusStore>,
    collaborators: Collaborators,
    pool: ChunkPool,
    invoker: Invoker,
}

type BranchCounters = Mutex<(BranchProgress, BranchProgress)>;

impl Orchestrator {
    pub fn new(
        config: &WorkflowConfig,
        status: Arc<dyn StatusStore>,
        collaborators: Collaborators,
    ) -> Self {
        Self::with_pool(
            config,
            status,
            collaborators,
            ChunkPool::new(config.chunk_concurrency),
        )
    }

    pub fn with_pool(
        config: &WorkflowConfig,
        status: Arc<dyn StatusStore>,
        collaborators: Collaborators,
        pool: ChunkPool,
    ) -> Self {
        Self {
            status,
            collaborators,
            pool,
            invoker: Invoker::new(config.stage_timeout, config.retry),
        }
    }

    pub fn pool(&self) -> &ChunkPool {
        &self.pool
    }

    pub fn status_store(&self) -> &Arc<dyn StatusStore> {
        &self.status
    }

    /// Runs the workflow for one uploaded document.
    ///
    /// Stage failures end the run in `Error` and are reported through the
    /// returned [`RunReport`]; `Err` is reserved for status write failures
    /// and illegal transitions.
    pub async fn run(
        &self,
        request: RunRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport, WorkflowError> {
        let run = WorkflowRun::new(request);
        let span = info_span!("run",
            run_id = %run.run_id(),
            document = %sanitize::redact_key(run.document_key()),
        );
        self.drive(run, progress).instrument(span).await
    }

    async fn drive(
        &self,
        mut run: WorkflowRun,
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport, WorkflowError> {
        let key = run.document_key().to_string();

        // Start
        let begin = self.status.begin(&key, run.run_id()).map_err(|source| {
            error!("Failed to record processing status: {}", source);
            WorkflowError::Status {
                key: key.clone(),
                source,
            }
        })?;
        if let BeginOutcome::AlreadyTerminal(existing) = begin {
            info!(status = %existing.status, "Document already finished, skipping run");
            return Ok(run.report(RunOutcome::Skipped { existing }, false));
        }
        progress.report(RunEvent::entered(&run));

        // Partition
        run.transition(RunState::Partitioning)?;
        progress.report(RunEvent::entered(&run));
        let partition = match self.partition(&run).await {
            Ok(partition) => partition,
            Err(e) => return self.fail(run, e, progress),
        };

        // Parallel processing
        run.transition(RunState::ParallelProcessing {
            text: BranchProgress::new(partition.texts.len()),
            image: BranchProgress::new(partition.images.len()),
        })?;
        progress.report(RunEvent::entered(&run));
        let processed = match self.process_branches(&mut run, &partition, progress).await {
            Ok(processed) => processed,
            Err(e) => return self.fail(run, e, progress),
        };

        // Aggregate
        run.transition(RunState::Aggregating)?;
        progress.report(RunEvent::entered(&run));
        let aggregated = self
            .invoker
            .call(Stage::Aggregate, None, || {
                self.collaborators.aggregator.aggregate(&key, &processed)
            })
            .instrument(info_span!("aggregate", chunks = processed.len()))
            .await;
        if let Err(e) = aggregated {
            return self.fail(run, e, progress);
        }

        // Complete
        run.transition(RunState::Complete)?;
        progress.report(RunEvent::entered(&run));
        let recorded = self.finish(&run, Status::Complete, None)?;
        info!(chunks = processed.len(), "Run complete");

        Ok(run.report(
            RunOutcome::Completed {
                chunks: processed.len(),
            },
            recorded,
        ))
    }

    async fn partition(&self, run: &WorkflowRun) -> Result<PartitionResult, StageError> {
        let source = run.request().source();
        let partition = self
            .invoker
            .call(Stage::Partition, None, || {
                self.collaborators.partitioner.partition(&source)
            })
            .instrument(info_span!("partition"))
            .await?;

        if let Some(id) = partition.duplicate_id() {
            return Err(StageError::failed(
                Stage::Partition,
                format!("duplicate chunk id {}", id),
            ));
        }
        if let Some(chunk) = partition.misfiled() {
            return Err(StageError::failed(
                Stage::Partition,
                format!("{} chunk {} listed with the wrong kind", chunk.kind, chunk.id),
            ));
        }

        debug!(
            texts = partition.texts.len(),
            images = partition.images.len(),
            "Partitioned document"
        );
        Ok(partition)
    }

    /// Runs both branches to completion. On success the results are the text
    /// results followed by the image results, each in partition order.
    async fn process_branches(
        &self,
        run: &mut WorkflowRun,
        partition: &PartitionResult,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<ProcessedChunk>, StageError> {
        let counters: BranchCounters = Mutex::new((
            BranchProgress::new(partition.texts.len()),
            BranchProgress::new(partition.images.len()),
        ));

        let (text_outcome, image_outcome) = {
            let observed: &WorkflowRun = run;
            let counters = &counters;
            let on_text = move |id: Option<&ChunkId>, ok: bool| {
                record_settled(observed, counters, ChunkKind::Text, id, ok, progress)
            };
            let on_image = move |id: Option<&ChunkId>, ok: bool| {
                record_settled(observed, counters, ChunkKind::Image, id, ok, progress)
            };

            future::join(
                self.pool
                    .run_branch(
                        Stage::for_kind(ChunkKind::Text),
                        &partition.texts,
                        Arc::clone(&self.collaborators.text_processor),
                        self.invoker,
                        on_text,
                    )
                    .instrument(info_span!("text_processing", chunks = partition.texts.len())),
                self.pool
                    .run_branch(
                        Stage::for_kind(ChunkKind::Image),
                        &partition.images,
                        Arc::clone(&self.collaborators.image_processor),
                        self.invoker,
                        on_image,
                    )
                    .instrument(info_span!("image_processing", chunks = partition.images.len())),
            )
            .await
        };

        let (text, image) = counters
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !(text.is_settled() && image.is_settled()) {
            warn!(?text, ?image, "Branches joined before every chunk settled");
        }
        debug!(
            text_ok = text.is_success(),
            image_ok = image.is_success(),
            "Branches settled"
        );
        run.set_branch_progress(text, image);

        // Text failures take precedence when both branches fail.
        match (text_outcome, image_outcome) {
            (BranchOutcome::Succeeded(mut results), BranchOutcome::Succeeded(images)) => {
                results.extend(images);
                Ok(results)
            }
            (BranchOutcome::Failed(e), _) | (_, BranchOutcome::Failed(e)) => Err(e),
        }
    }

    fn fail(
        &self,
        mut run: WorkflowRun,
        err: StageError,
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport, WorkflowError> {
        warn!(stage = %err.stage, "Run failed: {}", err);
        let detail = err.detail();

        run.transition(RunState::Error {
            detail: detail.clone(),
        })?;
        progress.report(RunEvent::entered(&run));
        let recorded = self.finish(&run, Status::Error, Some(&detail.to_value()))?;

        Ok(run.report(RunOutcome::Failed { detail }, recorded))
    }

    /// Records the terminal status. Returns `false` when another run got
    /// there first and its status was kept.
    fn finish(
        &self,
        run: &WorkflowRun,
        status: Status,
        error: Option<&serde_json::Value>,
    ) -> Result<bool, WorkflowError> {
        match self
            .status
            .finish(run.document_key(), run.run_id(), status, error)
        {
            Ok(FinishOutcome::Recorded) => Ok(true),
            Ok(FinishOutcome::AlreadyTerminal(existing)) => {
                warn!(
                    kept = %existing.status,
                    discarded = %status,
                    "Terminal status already recorded by another run"
                );
                Ok(false)
            }
            Err(source) => {
                error!("Failed to record {} status: {}", status, source);
                Err(WorkflowError::Status {
                    key: run.document_key().to_string(),
                    source,
                })
            }
        }
    }
}

fn record_settled(
    run: &WorkflowRun,
    counters: &BranchCounters,
    kind: ChunkKind,
    chunk_id: Option<&ChunkId>,
    succeeded: bool,
    progress: &dyn ProgressReporter,
) {
    let (text, image) = {
        let mut guard = counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match kind {
            ChunkKind::Text => guard.0.record(succeeded),
            ChunkKind::Image => guard.1.record(succeeded),
        }
        *guard
    };
    progress.report(RunEvent::chunk_settled(run, chunk_id, succeeded, text, image));
}
