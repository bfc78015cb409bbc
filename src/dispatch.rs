//! Bounded, timeout-aware task dispatch.
//!
//! Tasks are validated up front, then run on the tokio runtime with at most
//! `concurrency` invocations in flight. Every task yields exactly one
//! outcome and the output keeps the input order.

use crate::error::{ConfigError, DispatchError};
use crate::models::{Task, WorkerOutcome};
use crate::workers::WorkerRegistry;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Validated concurrency and timeout settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchLimits {
    concurrency: usize,
    task_timeout: Duration,
}

impl DispatchLimits {
    pub fn new(concurrency: usize, task_timeout: Duration) -> Result<Self, ConfigError> {
        if concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if concurrency > Semaphore::MAX_PERMITS {
            return Err(ConfigError::ConcurrencyTooHigh {
                requested: concurrency,
                max: Semaphore::MAX_PERMITS,
            });
        }
        if task_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(Self {
            concurrency,
            task_timeout,
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }
}

/// Slot in the output sequence.
enum Slot {
    /// Rejected by validation; no worker was invoked.
    Done(WorkerOutcome),
    Running(JoinHandle<WorkerOutcome>),
}

pub struct Dispatcher {
    registry: WorkerRegistry,
    limits: DispatchLimits,
}

impl Dispatcher {
    pub fn new(registry: WorkerRegistry, limits: DispatchLimits) -> Self {
        Self { registry, limits }
    }

    pub fn limits(&self) -> DispatchLimits {
        self.limits
    }

    /// Runs every task and returns one outcome per task, in input order.
    ///
    /// Only duplicate task ids are an error; worker failures, panics and
    /// timeouts all come back as `failed` outcomes.
    pub async fn dispatch(&self, tasks: &[Task]) -> Result<Vec<WorkerOutcome>, DispatchError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        for task in tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(DispatchError::DuplicateTaskId(task.id.clone()));
            }
        }

        info!(
            "Dispatching {} tasks (concurrency {}, timeout {}s)",
            tasks.len(),
            self.limits.concurrency,
            self.limits.task_timeout.as_secs_f64()
        );

        let semaphore = Arc::new(Semaphore::new(self.limits.concurrency));
        let timeout = self.limits.task_timeout;

        let slots: Vec<Slot> = tasks
            .iter()
            .map(|task| {
                let worker = self.registry.get(task.worker);
                if let Err(e) = worker.validate(task) {
                    warn!("Task {} rejected: {}", task.id, e);
                    return Slot::Done(WorkerOutcome::failure(task, e.to_string(), Duration::ZERO));
                }

                let semaphore = Arc::clone(&semaphore);
                let task = task.clone();
                Slot::Running(tokio::spawn(async move {
                    // The semaphore is never closed, so acquire only fails if
                    // that invariant is broken; run unbounded in that case.
                    let _permit = semaphore.acquire_owned().await.ok();
                    debug!("Task {} admitted", task.id);

                    let start = Instant::now();
                    match tokio::time::timeout(timeout, worker.run(&task)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(
                                "Task {} timed out after {:.1}s",
                                task.id,
                                start.elapsed().as_secs_f64()
                            );
                            WorkerOutcome::timed_out(&task, timeout)
                        }
                    }
                }))
            })
            .collect();

        let outcomes = join_all(slots.into_iter().zip(tasks).map(|(slot, task)| async move {
            match slot {
                Slot::Done(outcome) => outcome,
                Slot::Running(handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!("Task {} aborted: {}", task.id, e);
                        let reason = if e.is_panic() {
                            "worker panicked"
                        } else {
                            "worker cancelled"
                        };
                        WorkerOutcome::failure(task, reason, Duration::ZERO)
                    }
                },
            }
        }))
        .await;

        debug!("All {} tasks finished", outcomes.len());
        Ok(outcomes)
    }
}
