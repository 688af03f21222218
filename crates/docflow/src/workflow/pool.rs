use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::collaborator::ChunkProcessor;
use crate::model::{ChunkId, ChunkRef, ProcessedChunk};

use super::error::{Stage, StageError};
use super::invoke::Invoker;

/// Index reported for a chunk task that panicked; sorts after every real chunk.
const UNKNOWN_INDEX: usize = usize::MAX;

/// Result of one fan-out branch once every chunk has settled.
#[derive(Debug, Clone, PartialEq)]
pub enum BranchOutcome {
    /// One result per chunk, in partition order.
    Succeeded(Vec<ProcessedChunk>),
    /// The failure of the lowest-index failing chunk.
    Failed(StageError),
}

/// Bounded pool that caps how many chunk invocations run at once.
///
/// Clones share the same permits, so one pool bounds every run and both
/// branches of each run.
#[derive(Debug, Clone)]
pub struct ChunkPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl ChunkPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held by a running chunk.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Processes every chunk and waits for all of them, successful or not.
    /// Siblings of a failed chunk are never cancelled.
    ///
    /// `on_settled` is called once per chunk as it settles, with `None` as
    /// the id of a task that panicked.
    pub async fn run_branch<F>(
        &self,
        stage: Stage,
        chunks: &[ChunkRef],
        processor: Arc<dyn ChunkProcessor>,
        invoker: Invoker,
        on_settled: F,
    ) -> BranchOutcome
    where
        F: Fn(Option<&ChunkId>, bool),
    {
        if chunks.is_empty() {
            return BranchOutcome::Succeeded(vec![]);
        }

        let mut tasks = JoinSet::new();
        for (index, chunk) in chunks.iter().cloned().enumerate() {
            let permits = Arc::clone(&self.permits);
            let processor = Arc::clone(&processor);

            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let err = StageError::failed(stage, "chunk pool closed").with_chunk(chunk.id);
                        return (index, Err(err));
                    }
                };

                let result = invoker
                    .call(stage, Some(&chunk.id), || processor.process(&chunk))
                    .await
                    .and_then(|processed| {
                        if processed.chunk_id == chunk.id {
                            Ok(processed)
                        } else {
                            Err(StageError::mismatched(
                                stage,
                                chunk.id.clone(),
                                processed.chunk_id,
                            ))
                        }
                    });
                (index, result)
            });
        }

        let mut results: HashMap<ChunkId, ProcessedChunk> = HashMap::with_capacity(chunks.len());
        let mut first_failure: Option<(usize, StageError)> = None;

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(settled) => settled,
                Err(e) => {
                    error!(stage = %stage, "Chunk task failed: {}", e);
                    on_settled(None, false);
                    let err = StageError::failed(stage, format!("chunk task failed: {}", e));
                    (UNKNOWN_INDEX, Err(err))
                }
            };

            match result {
                Ok(processed) => {
                    on_settled(Some(&processed.chunk_id), true);
                    results.insert(processed.chunk_id.clone(), processed);
                }
                Err(err) => {
                    if index != UNKNOWN_INDEX {
                        debug!(stage = %stage, "Chunk {} failed: {}", chunks[index].id, err);
                        on_settled(Some(&chunks[index].id), false);
                    }
                    let lower = first_failure
                        .as_ref()
                        .map(|(current, _)| index < *current)
                        .unwrap_or(true);
                    if lower {
                        first_failure = Some((index, err));
                    }
                }
            }
        }

        if let Some((_, err)) = first_failure {
            return BranchOutcome::Failed(err);
        }

        let mut ordered = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match results.remove(&chunk.id) {
                Some(processed) => ordered.push(processed),
                None => {
                    return BranchOutcome::Failed(
                        StageError::failed(stage, "no result collected").with_chunk(chunk.id.clone()),
                    )
                }
            }
        }
        BranchOutcome::Succeeded(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::CollaboratorError;
    use crate::model::{ChunkKind, ObjectLocation};
    use crate::workflow::invoke::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echoes chunks back, failing ids listed in `fail`, and tracks the peak
    /// number of concurrent calls.
    struct CountingProcessor {
        fail: Vec<&'static str>,
        active: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl CountingProcessor {
        fn new(fail: Vec<&'static str>) -> Self {
            Self {
                fail,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay: Duration::from_millis(5),
            }
        }
    }

    #[async_trait]
    impl ChunkProcessor for CountingProcessor {
        async fn process(&self, chunk: &ChunkRef) -> Result<ProcessedChunk, CollaboratorError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            // Later chunks finish first so collection order differs from input order.
            let index: u64 = chunk.id.as_str()[1..].parse().unwrap_or(1);
            tokio::time::sleep(self.delay * (10 - index.min(9)) as u32).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail.contains(&chunk.id.as_str()) {
                return Err(CollaboratorError::new(format!("{} exploded", chunk.id)));
            }
            Ok(ProcessedChunk {
                chunk_id: chunk.id.clone(),
                kind: chunk.kind,
                output: ObjectLocation::new("derived", format!("{}.out", chunk.id)),
            })
        }
    }

    struct WrongId;

    #[async_trait]
    impl ChunkProcessor for WrongId {
        async fn process(&self, chunk: &ChunkRef) -> Result<ProcessedChunk, CollaboratorError> {
            Ok(ProcessedChunk {
                chunk_id: ChunkId::from("other"),
                kind: chunk.kind,
                output: chunk.location.clone(),
            })
        }
    }

    fn texts(n: usize) -> Vec<ChunkRef> {
        (1..=n)
            .map(|i| ChunkRef::text(&format!("t{}", i), ObjectLocation::new("derived", format!("t{}", i))))
            .collect()
    }

    fn invoker() -> Invoker {
        Invoker::new(Duration::from_secs(5), RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_results_follow_partition_order() {
        let pool = ChunkPool::new(4);
        let outcome = pool
            .run_branch(Stage::TextProcessing, &texts(5), Arc::new(CountingProcessor::new(vec![])), invoker(), |_, _| {})
            .await;

        let BranchOutcome::Succeeded(results) = outcome else {
            panic!("expected success");
        };
        let ids: Vec<&str> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3", "t4", "t5"]);
        assert!(results.iter().all(|r| r.kind == ChunkKind::Text));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = ChunkPool::new(2);
        let processor = Arc::new(CountingProcessor::new(vec![]));

        pool.run_branch(Stage::TextProcessing, &texts(8), processor.clone(), invoker(), |_, _| {})
            .await;

        assert!(processor.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_lowest_index_failure_is_reported_and_all_settle() {
        let pool = ChunkPool::new(8);
        let settled = Mutex::new(Vec::new());

        let outcome = pool
            .run_branch(
                Stage::TextProcessing,
                &texts(6),
                Arc::new(CountingProcessor::new(vec!["t5", "t2"])),
                invoker(),
                |id, ok| settled.lock().unwrap().push((id.cloned(), ok)),
            )
            .await;

        let BranchOutcome::Failed(err) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(err.chunk_id, Some(ChunkId::from("t2")));
        assert_eq!(err.detail().message, "t2 exploded");

        let settled = settled.into_inner().unwrap();
        assert_eq!(settled.len(), 6);
        assert_eq!(settled.iter().filter(|(_, ok)| !ok).count(), 2);
    }

    #[tokio::test]
    async fn test_mismatched_result_fails_the_chunk() {
        let pool = ChunkPool::new(2);
        let outcome = pool
            .run_branch(Stage::ImageProcessing, &texts(1), Arc::new(WrongId), invoker(), |_, _| {})
            .await;

        let BranchOutcome::Failed(err) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(err.stage, Stage::ImageProcessing);
        assert_eq!(err.chunk_id, Some(ChunkId::from("t1")));
        assert!(err.detail().message.contains("other"));
    }

    #[tokio::test]
    async fn test_empty_branch_succeeds() {
        let pool = ChunkPool::new(1);
        let outcome = pool
            .run_branch(Stage::ImageProcessing, &[], Arc::new(WrongId), invoker(), |_, _| {})
            .await;
        assert_eq!(outcome, BranchOutcome::Succeeded(vec![]));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(ChunkPool::new(0).capacity(), 1);
    }
}
