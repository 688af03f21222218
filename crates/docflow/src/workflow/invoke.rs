//! Timeout and retry around a single collaborator call.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tracing::{error, warn};

use crate::collaborator::CollaboratorError;
use crate::config::RetrySettings;
use crate::model::ChunkId;

use super::error::{Stage, StageError};

/// Uniform retry policy applied to every invocation.
///
/// `max_attempts = 1` disables retries. Backoff doubles after every failed
/// attempt and is capped at `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

/// Runs collaborator calls under the stage timeout and retry policy.
#[derive(Debug, Clone, Copy)]
pub struct Invoker {
    timeout: Duration,
    retry: RetryPolicy,
}

impl Invoker {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }

    /// Each attempt gets its own timeout. The last failure is returned once
    /// attempts run out. A panic inside the collaborator counts as a failed
    /// attempt.
    pub async fn call<T, F, Fut>(
        &self,
        stage: Stage,
        chunk_id: Option<&ChunkId>,
        mut op: F,
    ) -> Result<T, StageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let attempt_fut = AssertUnwindSafe(op()).catch_unwind();
            let err = match tokio::time::timeout(self.timeout, attempt_fut).await {
                Ok(Ok(Ok(value))) => return Ok(value),
                Ok(Ok(Err(e))) => StageError::failed(stage, e.message),
                Ok(Err(panic)) => {
                    let reason = panic_message(panic.as_ref());
                    error!(stage = %stage, "Collaborator panicked: {}", reason);
                    StageError::failed(stage, format!("collaborator panicked: {}", reason))
                }
                Err(_) => StageError::timed_out(stage, self.timeout),
            };
            let err = match chunk_id {
                Some(id) => err.with_chunk(id.clone()),
                None => err,
            };

            if attempt >= max_attempts {
                return Err(err);
            }

            let delay = self.retry.backoff_for(attempt);
            warn!(
                stage = %stage,
                attempt,
                max_attempts,
                "Invocation failed, retrying in {:?}: {}",
                delay,
                err
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
