//! Deterministic collaborators and stores for driving the orchestrator.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use docflow::collaborator::{Aggregator, ChunkProcessor, CollaboratorError, Partitioner};
use docflow::model::{ChunkId, ChunkRef, ObjectLocation, PartitionResult, ProcessedChunk};
use docflow::status::{
    BeginOutcome, DocumentStatus, FinishOutcome, MemoryStatusStore, Status, StatusError,
    StatusStore,
};
use docflow::workflow::{ProgressReporter, RunEvent};

pub fn location(key: &str) -> ObjectLocation {
    ObjectLocation::new("derived", key)
}

/// `{texts: [t1, t2], images: [i1]}`.
pub fn doc1_partition() -> PartitionResult {
    PartitionResult {
        texts: vec![
            ChunkRef::text("t1", location("doc1/t1.txt")),
            ChunkRef::text("t2", location("doc1/t2.txt")),
        ],
        images: vec![ChunkRef::image("i1", location("doc1/i1.png"))],
    }
}

pub fn text_chunks(n: usize) -> Vec<ChunkRef> {
    (1..=n)
        .map(|i| ChunkRef::text(&format!("t{}", i), location(&format!("t{}.txt", i))))
        .collect()
}

enum Script {
    Return(PartitionResult),
    Fail(String),
    Panic,
    Hang,
}

pub struct ScriptedPartitioner {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedPartitioner {
    pub fn returning(result: PartitionResult) -> Self {
        Self::with(Script::Return(result))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(Script::Fail(message.to_string()))
    }

    pub fn panicking() -> Self {
        Self::with(Script::Panic)
    }

    /// Never returns.
    pub fn hanging() -> Self {
        Self::with(Script::Hang)
    }

    fn with(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Partitioner for ScriptedPartitioner {
    async fn partition(&self, _source: &ObjectLocation) -> Result<PartitionResult, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Return(result) => Ok(result.clone()),
            Script::Fail(message) => Err(CollaboratorError::new(message.clone())),
            Script::Panic => panic!("partitioner crashed"),
            Script::Hang => {
                std::future::pending::<()>().await;
                Err(CollaboratorError::new("unreachable"))
            }
        }
    }
}

/// Echoes chunks back unless told otherwise, recording every call.
#[derive(Default)]
pub struct ScriptedProcessor {
    fail: HashSet<String>,
    mismatch: HashSet<String>,
    delays: HashMap<String, Duration>,
    /// Remaining failures before the chunk succeeds.
    flaky: Mutex<HashMap<String, usize>>,
    default_delay: Duration,
    calls: Mutex<Vec<ChunkId>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, id: &str) -> Self {
        self.fail.insert(id.to_string());
        self
    }

    pub fn mismatch_on(mut self, id: &str) -> Self {
        self.mismatch.insert(id.to_string());
        self
    }

    pub fn delay(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn flaky(self, id: &str, failures: usize) -> Self {
        if let Ok(mut flaky) = self.flaky.lock() {
            flaky.insert(id.to_string(), failures);
        }
        self
    }

    pub fn calls(&self) -> Vec<ChunkId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkProcessor for ScriptedProcessor {
    async fn process(&self, chunk: &ChunkRef) -> Result<ProcessedChunk, CollaboratorError> {
        let id = chunk.id.as_str().to_string();
        self.calls.lock().unwrap().push(chunk.id.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let delay = self.delays.get(&id).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(&id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(CollaboratorError::new(format!("{} flaked", id)));
                }
            }
        }
        if self.fail.contains(&id) {
            return Err(CollaboratorError::new(format!("{} failed", id)));
        }

        let chunk_id = if self.mismatch.contains(&id) {
            ChunkId::from("someone-else")
        } else {
            chunk.id.clone()
        };
        Ok(ProcessedChunk {
            chunk_id,
            kind: chunk.kind,
            output: location(&format!("processed/{}", id)),
        })
    }
}

#[derive(Default)]
pub struct RecordingAggregator {
    fail: bool,
    panic: bool,
    calls: Mutex<Vec<(String, Vec<ChunkId>)>>,
}

impl RecordingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, Vec<ChunkId>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Aggregator for RecordingAggregator {
    async fn aggregate(
        &self,
        document_key: &str,
        chunks: &[ProcessedChunk],
    ) -> Result<(), CollaboratorError> {
        self.calls.lock().unwrap().push((
            document_key.to_string(),
            chunks.iter().map(|c| c.chunk_id.clone()).collect(),
        ));
        if self.panic {
            panic!("aggregator crashed");
        }
        if self.fail {
            return Err(CollaboratorError::new("artifact store rejected write"));
        }
        Ok(())
    }
}

/// A memory store whose writes can be switched off.
#[derive(Default)]
pub struct FlakyStatusStore {
    inner: MemoryStatusStore,
    fail_begin: AtomicBool,
    fail_finish: AtomicBool,
}

impl FlakyStatusStore {
    pub fn failing_begin() -> Self {
        let store = Self::default();
        store.fail_begin.store(true, Ordering::SeqCst);
        store
    }

    pub fn failing_finish() -> Self {
        let store = Self::default();
        store.fail_finish.store(true, Ordering::SeqCst);
        store
    }
}

impl StatusStore for FlakyStatusStore {
    fn set_status(
        &self,
        key: &str,
        status: Status,
        error: Option<&serde_json::Value>,
    ) -> Result<(), StatusError> {
        self.inner.set_status(key, status, error)
    }

    fn get_status(&self, key: &str) -> Result<Option<DocumentStatus>, StatusError> {
        self.inner.get_status(key)
    }

    fn begin(&self, key: &str, run_id: &str) -> Result<BeginOutcome, StatusError> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(StatusError::Unavailable("begin rejected".to_string()));
        }
        self.inner.begin(key, run_id)
    }

    fn finish(
        &self,
        key: &str,
        run_id: &str,
        status: Status,
        error: Option<&serde_json::Value>,
    ) -> Result<FinishOutcome, StatusError> {
        if self.fail_finish.load(Ordering::SeqCst) {
            return Err(StatusError::Unavailable("finish rejected".to_string()));
        }
        self.inner.finish(key, run_id, status, error)
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: RunEvent) {
        self.events.lock().unwrap().push(event);
    }
}
