//! End-to-end coordination of a query run.
//!
//! `Pending -> Decomposing -> Dispatching -> Aggregating -> Completed`, with
//! `Failed` reachable from any non-terminal state. Worker failures never
//! fail a run; only a query with nothing to act on does.

use crate::analysis::aggregate;
use crate::decompose::{build_tasks, QueryDecomposer};
use crate::dispatch::{DispatchLimits, Dispatcher};
use crate::error::RunError;
use crate::llm::{DecompositionClient, NarrativeBrief, NarrativeClient};
use crate::models::{
    AggregatedResult, Decomposition, Narrative, Task, WorkerKind, WorkerOutcome, PARAM_REGION,
};
use crate::workers::WorkerRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Lifecycle state of a [`QueryRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Decomposing,
    Dispatching,
    Aggregating,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    fn can_advance_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Pending, Decomposing)
            | (Decomposing, Dispatching)
            | (Dispatching, Aggregating)
            | (Aggregating, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Pending => "pending",
            RunState::Decomposing => "decomposing",
            RunState::Dispatching => "dispatching",
            RunState::Aggregating => "aggregating",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One end-to-end processing of a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRun {
    pub id: String,
    pub query: String,
    pub state: RunState,
    pub decomposition: Option<Decomposition>,
    pub tasks: Vec<Task>,
    pub outcomes: Vec<WorkerOutcome>,
    pub aggregate: Option<AggregatedResult>,
    pub narrative: Option<Narrative>,
    /// Why the run failed, when it did.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl QueryRun {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.into(),
            state: RunState::Pending,
            decomposition: None,
            tasks: Vec::new(),
            outcomes: Vec::new(),
            aggregate: None,
            narrative: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to the next state, rejecting transitions the lifecycle forbids.
    pub fn advance(&mut self, next: RunState) -> Result<(), RunError> {
        if !self.state.can_advance_to(next) {
            return Err(RunError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    fn fail(&mut self, err: &RunError) {
        error!("Run {} failed: {}", self.id, err);
        self.error = Some(err.to_string());
        if let Err(e) = self.advance(RunState::Failed) {
            warn!("Run {} could not be marked failed: {}", self.id, e);
        }
    }

    /// Wall-clock duration, once finished.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// Drives decomposition, dispatch, aggregation and narrative synthesis.
pub struct Orchestrator {
    decomposer: QueryDecomposer,
    dispatcher: Dispatcher,
    narrator: Arc<dyn NarrativeClient>,
    /// When set, only these workers are ever dispatched.
    allowed_workers: Option<BTreeSet<WorkerKind>>,
    /// Overrides whatever region decomposition produced.
    region: Option<String>,
}

impl Orchestrator {
    /// `limits` is validated when it is built, so a constructed
    /// orchestrator always has a usable configuration.
    pub fn new(
        registry: WorkerRegistry,
        limits: DispatchLimits,
        decomposition: Arc<dyn DecompositionClient>,
        narrator: Arc<dyn NarrativeClient>,
    ) -> Self {
        Self {
            decomposer: QueryDecomposer::new(decomposition),
            dispatcher: Dispatcher::new(registry, limits),
            narrator,
            allowed_workers: None,
            region: None,
        }
    }

    /// Restrict runs to a subset of workers.
    pub fn with_allowed_workers(mut self, workers: BTreeSet<WorkerKind>) -> Self {
        self.allowed_workers = Some(workers);
        self
    }

    /// Pin the market region for every run.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Process a query to a terminal state. Never returns an error: a
    /// failed run carries its reason in [`QueryRun::error`].
    pub async fn run(&self, query: &str) -> QueryRun {
        let mut run = QueryRun::new(query);
        info!("Starting run {} for query: {}", run.id, query);

        if let Err(e) = self.drive(&mut run).await {
            run.fail(&e);
        }
        run
    }

    async fn drive(&self, run: &mut QueryRun) -> Result<(), RunError> {
        run.advance(RunState::Decomposing)?;
        let mut decomposition = self.decomposer.decompose(&run.query).await?;
        if let Some(allowed) = &self.allowed_workers {
            decomposition.required_workers = decomposition
                .required_workers
                .intersection(allowed)
                .copied()
                .collect();
        }
        if let Some(region) = &self.region {
            decomposition
                .parameters
                .insert(PARAM_REGION.to_string(), region.clone());
        }

        let tasks = build_tasks(&decomposition);
        run.decomposition = Some(decomposition);
        if tasks.is_empty() {
            return Err(RunError::NoTasks);
        }
        run.tasks = tasks;

        run.advance(RunState::Dispatching)?;
        run.outcomes = self.dispatcher.dispatch(&run.tasks).await?;

        run.advance(RunState::Aggregating)?;
        let result = aggregate(&run.outcomes);
        info!(
            "Run {}: {} succeeded, {} failed, confidence {:.1}/10",
            run.id, result.succeeded, result.failed, result.overall_confidence
        );

        if let Some(decomposition) = &run.decomposition {
            let brief = NarrativeBrief::new(&run.query, decomposition, &result);
            run.narrative = match self.narrator.narrate(&brief).await {
                Ok(narrative) => Some(narrative),
                Err(e) => {
                    warn!("Narrative synthesis failed, omitting narrative: {}", e);
                    None
                }
            };
        }
        run.aggregate = Some(result);

        run.advance(RunState::Completed)?;
        info!(
            "Run {} completed in {:.1}s",
            run.id,
            run.duration_seconds().unwrap_or_default()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::llm::Disabled;
    use crate::models::{DecompositionMethod, OutcomeStatus, RiskBucket};
    use crate::workers::testing::{registry_with, Behavior, StubWorker};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedNarrative;

    #[async_trait]
    impl NarrativeClient for FixedNarrative {
        async fn narrate(&self, brief: &NarrativeBrief) -> Result<Narrative, CollaboratorError> {
            Ok(Narrative {
                executive_summary: format!("Summary for {}", brief.condition),
                recommendation: Some("Proceed".to_string()),
            })
        }
    }

    fn orchestrator(registry: WorkerRegistry, narrator: Arc<dyn NarrativeClient>) -> Orchestrator {
        let limits = DispatchLimits::new(2, Duration::from_millis(300)).unwrap();
        Orchestrator::new(registry, limits, Arc::new(Disabled), narrator)
    }

    #[test]
    fn test_state_transitions() {
        let mut run = QueryRun::new("q");
        assert!(run.advance(RunState::Dispatching).is_err());
        run.advance(RunState::Decomposing).unwrap();
        run.advance(RunState::Dispatching).unwrap();
        run.advance(RunState::Aggregating).unwrap();
        run.advance(RunState::Completed).unwrap();
        assert!(run.finished_at.is_some());

        assert_eq!(
            run.advance(RunState::Failed),
            Err(RunError::InvalidTransition {
                from: "completed".to_string(),
                to: "failed".to_string()
            })
        );
    }

    #[test]
    fn test_failed_reachable_from_any_non_terminal_state() {
        for state in [
            RunState::Pending,
            RunState::Decomposing,
            RunState::Dispatching,
            RunState::Aggregating,
        ] {
            assert!(state.can_advance_to(RunState::Failed));
        }
        assert!(!RunState::Failed.can_advance_to(RunState::Failed));
        assert!(!RunState::Completed.can_advance_to(RunState::Pending));
    }

    #[tokio::test]
    async fn test_fallback_decomposition_reaches_completed() {
        let orchestrator = orchestrator(registry_with(Vec::new()), Arc::new(FixedNarrative));
        let run = orchestrator.run("Can metformin help Alzheimer's patients?").await;

        assert_eq!(run.state, RunState::Completed);
        let decomposition = run.decomposition.as_ref().unwrap();
        assert_eq!(decomposition.method, DecompositionMethod::Keyword);
        assert_eq!(run.tasks.len(), 4);
        assert_eq!(run.outcomes.len(), 4);
        assert_eq!(
            run.narrative.as_ref().map(|n| n.executive_summary.as_str()),
            Some("Summary for Alzheimer")
        );
        assert!(run.error.is_none());
        assert!(run.duration_seconds().is_some());
    }

    #[tokio::test]
    async fn test_all_workers_failing_still_completes() {
        let registry = registry_with(
            WorkerKind::ALL
                .iter()
                .map(|kind| StubWorker::new(*kind, Behavior::Fail("down")))
                .collect(),
        );
        let run = orchestrator(registry, Arc::new(Disabled))
            .run("metformin for diabetes")
            .await;

        assert_eq!(run.state, RunState::Completed);
        let result = run.aggregate.unwrap();
        assert_eq!(result.failed, 4);
        assert_eq!(result.overall_confidence, 0.0);
        assert_eq!(result.risk.overall, RiskBucket::Incomplete);
        assert!(run
            .outcomes
            .iter()
            .all(|o| o.status == OutcomeStatus::Failed));
    }

    #[tokio::test]
    async fn test_nothing_extractable_fails_run() {
        let run = orchestrator(registry_with(Vec::new()), Arc::new(FixedNarrative))
            .run("what now?")
            .await;

        assert_eq!(run.state, RunState::Failed);
        assert!(run.tasks.is_empty());
        assert!(run.outcomes.is_empty());
        assert_eq!(
            run.error.as_deref(),
            Some("no actionable parameters could be extracted from the query")
        );
        assert!(run.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_narrative_failure_leaves_narrative_empty() {
        let run = orchestrator(registry_with(Vec::new()), Arc::new(Disabled))
            .run("metformin for cancer")
            .await;
        assert_eq!(run.state, RunState::Completed);
        assert!(run.narrative.is_none());
        assert!(run.aggregate.is_some());
    }

    #[tokio::test]
    async fn test_allowed_workers_restrict_tasks() {
        let orchestrator = orchestrator(registry_with(Vec::new()), Arc::new(Disabled))
            .with_allowed_workers([WorkerKind::Clinical].into_iter().collect());
        let run = orchestrator.run("metformin for diabetes").await;

        assert_eq!(run.state, RunState::Completed);
        assert_eq!(run.tasks.len(), 1);
        assert_eq!(run.tasks[0].worker, WorkerKind::Clinical);
    }

    #[tokio::test]
    async fn test_region_override_reaches_tasks() {
        let orchestrator =
            orchestrator(registry_with(Vec::new()), Arc::new(Disabled)).with_region("Europe");
        let run = orchestrator.run("metformin market for diabetes").await;

        assert_eq!(run.state, RunState::Completed);
        assert!(run
            .tasks
            .iter()
            .all(|t| t.param(PARAM_REGION) == Some("Europe")));
    }

    #[tokio::test]
    async fn test_disjoint_worker_restriction_fails_run() {
        let orchestrator = orchestrator(registry_with(Vec::new()), Arc::new(Disabled))
            .with_allowed_workers([WorkerKind::Clinical].into_iter().collect());
        let run = orchestrator.run("imatinib patents").await;

        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.error.as_deref(), Some("decomposition produced no tasks"));
    }
}
