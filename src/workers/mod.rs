//! Domain workers.
//!
//! Every worker implements [`Worker`]: a cheap synchronous `validate` that
//! never touches the network, and an async `run` that always produces a
//! [`WorkerOutcome`]. Workers hold no mutable state and may be invoked
//! concurrently for different tasks.

pub mod clinical;
pub mod http;
pub mod literature;
pub mod market;
pub mod patent;
pub mod sources;

pub use clinical::ClinicalWorker;
pub use literature::LiteratureWorker;
pub use market::MarketWorker;
pub use patent::PatentWorker;

use crate::config::SourcesConfig;
use crate::error::{ConfigError, ValidationError, WorkerError};
use crate::models::{Analysis, Task, WorkerKind, WorkerOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The contract every domain analyzer implements.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Which worker this is.
    fn kind(&self) -> WorkerKind;

    /// Parameters that must be present and non-empty.
    fn required_params(&self) -> &'static [&'static str];

    /// Rejects a task before any external call is made.
    fn validate(&self, task: &Task) -> Result<(), ValidationError> {
        if task.worker != self.kind() {
            return Err(ValidationError::WrongWorker {
                task: task.worker,
                worker: self.kind(),
            });
        }
        if task.description.trim().is_empty() {
            return Err(ValidationError::EmptyDescription);
        }
        for &key in self.required_params() {
            if task.param(key).is_none() {
                return Err(ValidationError::MissingParameter(key));
            }
        }
        Ok(())
    }

    /// Performs the domain analysis.
    async fn analyze(&self, task: &Task) -> Result<Analysis, WorkerError>;

    /// Runs the task. Never fails: errors become a `failed` outcome.
    async fn run(&self, task: &Task) -> WorkerOutcome {
        let start = Instant::now();
        match self.analyze(task).await {
            Ok(analysis) => {
                debug!("{} worker finished task {}", self.kind(), task.id);
                WorkerOutcome::from_analysis(task, analysis, start.elapsed())
            }
            Err(e) => {
                warn!("{} worker failed task {}: {}", self.kind(), task.id, e);
                WorkerOutcome::failure(task, e.to_string(), start.elapsed())
            }
        }
    }
}

/// Exhaustive mapping from worker kind to implementation.
///
/// Every kind has exactly one worker, so routing a task can never miss.
#[derive(Clone)]
pub struct WorkerRegistry {
    clinical: Arc<dyn Worker>,
    patent: Arc<dyn Worker>,
    market: Arc<dyn Worker>,
    literature: Arc<dyn Worker>,
}

impl WorkerRegistry {
    /// Builds a registry, checking that each slot holds the matching worker.
    pub fn new(
        clinical: Arc<dyn Worker>,
        patent: Arc<dyn Worker>,
        market: Arc<dyn Worker>,
        literature: Arc<dyn Worker>,
    ) -> Result<Self, ConfigError> {
        for (slot, worker) in [
            (WorkerKind::Clinical, &clinical),
            (WorkerKind::Patent, &patent),
            (WorkerKind::Market, &market),
            (WorkerKind::Literature, &literature),
        ] {
            if worker.kind() != slot {
                return Err(ConfigError::WorkerMismatch {
                    slot,
                    actual: worker.kind(),
                });
            }
        }

        Ok(Self {
            clinical,
            patent,
            market,
            literature,
        })
    }

    /// Builds the network-backed workers from source settings.
    pub fn from_sources(config: &SourcesConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(concat!("repurpose/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        let trials = http::ClinicalTrialsGov::new(
            client.clone(),
            &config.clinical_trials_url,
            config.max_results,
        );
        let pubmed = http::PubMed::new(client.clone(), &config.pubmed_url, config.max_results);
        let patents = http::PatentEndpoint::new(client.clone(), config.patent_url.clone());
        let market = http::MarketEndpoint::new(client, config.market_url.clone());

        let registry = Self::new(
            Arc::new(ClinicalWorker::new(Arc::new(trials))),
            Arc::new(PatentWorker::new(Arc::new(patents))),
            Arc::new(MarketWorker::new(Arc::new(market))),
            Arc::new(LiteratureWorker::new(Arc::new(pubmed))),
        )?;
        Ok(registry)
    }

    /// Returns the worker for a kind.
    pub fn get(&self, kind: WorkerKind) -> Arc<dyn Worker> {
        match kind {
            WorkerKind::Clinical => Arc::clone(&self.clinical),
            WorkerKind::Patent => Arc::clone(&self.patent),
            WorkerKind::Market => Arc::clone(&self.market),
            WorkerKind::Literature => Arc::clone(&self.literature),
        }
    }
}

/// Rounds to two decimals, the precision every score is reported at.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::models::{OutcomeStatus, TaskParams, PARAM_CONDITION};

    fn task(kind: WorkerKind, params: &[(&str, &str)]) -> Task {
        let params: TaskParams = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Task::new(kind, "Analyze", params)
    }

    #[test]
    fn test_registry_rejects_mismatched_slot() {
        let clinical: Arc<dyn Worker> = Arc::new(StubWorker::succeed(WorkerKind::Clinical, 0.5));
        let market: Arc<dyn Worker> = Arc::new(StubWorker::succeed(WorkerKind::Market, 0.5));
        let result = WorkerRegistry::new(
            clinical.clone(),
            market.clone(),
            market,
            clinical,
        );
        assert_eq!(
            result.err(),
            Some(ConfigError::WorkerMismatch {
                slot: WorkerKind::Patent,
                actual: WorkerKind::Market
            })
        );
    }

    #[test]
    fn test_registry_routes_every_kind() {
        let registry = registry_with(Vec::new());
        for kind in WorkerKind::ALL {
            assert_eq!(registry.get(kind).kind(), kind);
        }
    }

    #[test]
    fn test_validate_missing_parameter() {
        let mut stub = StubWorker::succeed(WorkerKind::Clinical, 0.5);
        stub.required = &[PARAM_CONDITION];

        let err = stub.validate(&task(WorkerKind::Clinical, &[])).unwrap_err();
        assert_eq!(err, ValidationError::MissingParameter(PARAM_CONDITION));
        assert!(stub
            .validate(&task(WorkerKind::Clinical, &[(PARAM_CONDITION, "Asthma")]))
            .is_ok());
    }

    #[test]
    fn test_validate_wrong_worker_and_empty_description() {
        let stub = StubWorker::succeed(WorkerKind::Clinical, 0.5);
        assert!(matches!(
            stub.validate(&task(WorkerKind::Patent, &[])),
            Err(ValidationError::WrongWorker { .. })
        ));

        let mut blank = task(WorkerKind::Clinical, &[]);
        blank.description = "   ".to_string();
        assert_eq!(
            stub.validate(&blank),
            Err(ValidationError::EmptyDescription)
        );
    }

    #[tokio::test]
    async fn test_run_converts_errors_to_failed_outcome() {
        let stub = StubWorker::new(WorkerKind::Market, Behavior::Fail("bad payload"));
        let t = task(WorkerKind::Market, &[]);
        let outcome = stub.run(&t).await;

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.task_id, t.id);
        assert!(outcome.error.unwrap().contains("bad payload"));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(2.004), 2.0);
        assert_eq!(round2(7.0), 7.0);
    }
}
