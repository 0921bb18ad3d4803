//! Bounded-concurrency fleet orchestrator.
//!
//! Drives one unit of work per key with a fixed degree of parallelism,
//! isolating per-key failures (including panics) and fanning completions
//! into a single collecting task that exclusively owns the result map.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::{Error, Stage};

pub const DEFAULT_CONCURRENCY: usize = 10;

/// Per-key result of one orchestrated job.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failed(FailureDetail),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(payload) => Some(payload),
            Outcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureDetail> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failed(detail) => Some(detail),
        }
    }
}

/// Captured error text and the pipeline stage it was attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDetail {
    pub stage: Stage,
    pub message: String,
}

impl FailureDetail {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl From<Error> for FailureDetail {
    fn from(err: Error) -> Self {
        Self {
            stage: err.stage(),
            message: err.to_string(),
        }
    }
}

/// Runs `worker` once per key with at most `concurrency` invocations in
/// flight. The returned map is total: every key appears exactly once,
/// successful or failed. Keys are expected to be distinct.
pub async fn run<K, T, F, Fut>(
    keys: Vec<K>,
    concurrency: usize,
    worker: F,
) -> HashMap<K, Outcome<T>>
where
    K: Clone + Eq + Hash + Send + 'static,
    T: Send + 'static,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T, FailureDetail>> + Send + 'static,
{
    run_until(keys, concurrency, worker, std::future::pending::<()>()).await
}

/// Like [`run`], but stops collecting when `shutdown` resolves. In-flight
/// workers are abandoned (they finish detached); the partial map returned
/// holds a valid outcome for every key collected before the interruption.
pub async fn run_until<K, T, F, Fut, S>(
    keys: Vec<K>,
    concurrency: usize,
    worker: F,
    shutdown: S,
) -> HashMap<K, Outcome<T>>
where
    K: Clone + Eq + Hash + Send + 'static,
    T: Send + 'static,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T, FailureDetail>> + Send + 'static,
    S: Future<Output = ()>,
{
    let concurrency = concurrency.max(1);
    let gate = Arc::new(Semaphore::new(concurrency));
    let mut in_flight = FuturesUnordered::new();

    for key in keys {
        let gate = Arc::clone(&gate);
        // The future is constructed eagerly but does no work until the
        // spawned task holds a permit.
        let unit = worker(key.clone());
        let handle = tokio::spawn(async move {
            let _permit = gate.acquire_owned().await.expect("semaphore is never closed");
            unit.await
        });
        in_flight.push(async move { (key, handle.await) });
    }

    let mut outcomes = HashMap::with_capacity(in_flight.len());
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            completed = in_flight.next() => match completed {
                Some((key, joined)) => {
                    let outcome = match joined {
                        Ok(Ok(payload)) => Outcome::Success(payload),
                        Ok(Err(detail)) => Outcome::Failed(detail),
                        Err(join_err) => Outcome::Failed(FailureDetail::new(
                            Stage::Internal,
                            format!("worker panicked: {join_err}"),
                        )),
                    };
                    outcomes.insert(key, outcome);
                }
                None => break,
            },
            _ = &mut shutdown => {
                warn!(
                    collected = outcomes.len(),
                    abandoned = in_flight.len(),
                    "run interrupted; keeping partial results"
                );
                break;
            }
        }
    }

    outcomes
}
