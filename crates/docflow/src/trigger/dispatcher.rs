use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::WorkerError;
use crate::sanitize;
use crate::workflow::{Orchestrator, ProgressReporter, RunOutcome, RunReport, WorkflowError};

use super::{TriggerRouter, UploadEvent};

/// What the dispatcher did with an event.
#[derive(Debug)]
pub enum DispatchReport {
    /// The event did not match the router.
    Ignored { event: UploadEvent },
    /// A run was spawned for the document.
    Started { document_key: String },
    /// A run ended.
    Finished {
        document_key: String,
        result: Result<RunReport, WorkflowError>,
    },
}

/// Routes upload events and runs one workflow per accepted event.
///
/// Runs for different documents proceed in parallel. Closing the queue lets
/// every in-flight run finish before [`RunDispatcher::shutdown`] returns.
pub struct RunDispatcher {
    sender: mpsc::Sender<UploadEvent>,
    handle: JoinHandle<()>,
}

impl RunDispatcher {
    pub fn start(
        orchestrator: Arc<Orchestrator>,
        router: TriggerRouter,
        progress: Arc<dyn ProgressReporter>,
        queue_capacity: usize,
    ) -> (Self, mpsc::UnboundedReceiver<DispatchReport>) {
        let (sender, events) = mpsc::channel(queue_capacity.max(1));
        let (report_tx, report_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(dispatch_loop(
            events,
            orchestrator,
            router,
            progress,
            report_tx,
        ));

        (Self { sender, handle }, report_rx)
    }

    /// A sender for producers such as the upload watcher. Shutdown waits
    /// until every clone has been dropped.
    pub fn sender(&self) -> mpsc::Sender<UploadEvent> {
        self.sender.clone()
    }

    pub async fn submit(&self, event: UploadEvent) -> Result<(), WorkerError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Stops accepting events and waits for in-flight runs.
    pub async fn shutdown(self) {
        info!("Shutting down dispatcher...");
        drop(self.sender);
        if let Err(e) = self.handle.await {
            error!("Dispatcher task failed: {}", e);
        }
    }
}

async fn dispatch_loop(
    mut events: mpsc::Receiver<UploadEvent>,
    orchestrator: Arc<Orchestrator>,
    router: TriggerRouter,
    progress: Arc<dyn ProgressReporter>,
    reports: mpsc::UnboundedSender<DispatchReport>,
) {
    let mut runs = JoinSet::new();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let Some(request) = router.route(&event) else {
                    let _ = reports.send(DispatchReport::Ignored { event });
                    continue;
                };

                let document_key = request.document_key.clone();
                debug!("Starting run for {}", sanitize::redact_key(&document_key));
                let _ = reports.send(DispatchReport::Started {
                    document_key: document_key.clone(),
                });

                let orchestrator = Arc::clone(&orchestrator);
                let progress = Arc::clone(&progress);
                let reports = reports.clone();
                runs.spawn(async move {
                    let result = orchestrator.run(request, progress.as_ref()).await;
                    log_result(&document_key, &result);
                    let _ = reports.send(DispatchReport::Finished { document_key, result });
                });
            }
            Some(joined) = runs.join_next(), if !runs.is_empty() => {
                if let Err(e) = joined {
                    error!("Run task panicked: {}", e);
                }
            }
        }
    }

    if !runs.is_empty() {
        info!("Waiting for {} in-flight runs", runs.len());
    }
    while let Some(joined) = runs.join_next().await {
        if let Err(e) = joined {
            error!("Run task panicked: {}", e);
        }
    }
    info!("Dispatcher stopped");
}

fn log_result(document_key: &str, result: &Result<RunReport, WorkflowError>) {
    let name = sanitize::redact_key(document_key);
    match result {
        Ok(report) => match &report.outcome {
            RunOutcome::Completed { chunks } => info!(
                "Completed {} ({} chunks) in {:?}",
                name, chunks, report.elapsed
            ),
            RunOutcome::Failed { detail } => warn!(
                "Failed {} at {}: {}",
                name, detail.stage, detail.message
            ),
            RunOutcome::Skipped { existing } => info!(
                "Skipped {}: already {}",
                name, existing.status
            ),
        },
        Err(e) => error!("Run for {} aborted: {}", name, e),
    }
}
