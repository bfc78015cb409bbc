//! Data models for the research orchestrator.
//!
//! This module contains the core data structures shared by the workers,
//! the dispatcher, the aggregator and the report generator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Parameter key for the medical condition.
pub const PARAM_CONDITION: &str = "condition";
/// Parameter key for the drug or compound name.
pub const PARAM_DRUG_NAME: &str = "drug_name";
/// Parameter key for the kind of analysis requested.
pub const PARAM_ANALYSIS_TYPE: &str = "analysis_type";
/// Parameter key for the geographic region.
pub const PARAM_REGION: &str = "region";

/// Error string carried by outcomes synthesized for timed-out tasks.
pub const TIMEOUT_ERROR: &str = "timeout";

/// Task parameters. Keys are unique by construction.
pub type TaskParams = BTreeMap<String, String>;

/// The closed set of domain workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    /// Clinical trial analysis
    Clinical,
    /// Patent landscape analysis
    Patent,
    /// Market intelligence
    Market,
    /// Published literature analysis
    Literature,
}

impl WorkerKind {
    /// Every worker kind, in report order.
    pub const ALL: [WorkerKind; 4] = [
        WorkerKind::Clinical,
        WorkerKind::Patent,
        WorkerKind::Market,
        WorkerKind::Literature,
    ];

    /// Lowercase tag used in configs, prompts and findings.
    pub fn tag(&self) -> &'static str {
        match self {
            WorkerKind::Clinical => "clinical",
            WorkerKind::Patent => "patent",
            WorkerKind::Market => "market",
            WorkerKind::Literature => "literature",
        }
    }

    /// Human-readable section title.
    pub fn title(&self) -> &'static str {
        match self {
            WorkerKind::Clinical => "Clinical Intelligence",
            WorkerKind::Patent => "Patent Landscape",
            WorkerKind::Market => "Market Intelligence",
            WorkerKind::Literature => "Literature Intelligence",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Returned when a worker tag is not part of the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown worker type: {0}")]
pub struct UnknownWorkerKind(pub String);

impl FromStr for WorkerKind {
    type Err = UnknownWorkerKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clinical" => Ok(WorkerKind::Clinical),
            "patent" => Ok(WorkerKind::Patent),
            "market" => Ok(WorkerKind::Market),
            "literature" | "web" => Ok(WorkerKind::Literature),
            other => Err(UnknownWorkerKind(other.to_string())),
        }
    }
}

/// One unit of work assigned to exactly one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier, unique within a run.
    pub id: String,
    /// Worker that executes this task.
    pub worker: WorkerKind,
    /// Free-text description.
    pub description: String,
    /// Structured parameters (condition, drug_name, region, ...).
    pub parameters: TaskParams,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Creates a task with a fresh identifier.
    pub fn new(worker: WorkerKind, description: impl Into<String>, parameters: TaskParams) -> Self {
        Self {
            id: format!("{}-{}", worker, Uuid::new_v4().simple()),
            worker,
            description: description.into(),
            parameters,
            created_at: Utc::now(),
        }
    }

    /// Overrides the generated identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Returns a non-empty parameter value.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Terminal status of a worker invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Partial,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::Failed => write!(f, "failed"),
            OutcomeStatus::Partial => write!(f, "partial"),
        }
    }
}

/// How a worker's headline score relates to risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    /// Higher score means higher risk.
    Risk,
    /// Higher score means better opportunity, so lower risk.
    Opportunity,
}

/// A 0-10 headline score exposed by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainScore {
    pub kind: ScoreKind,
    pub value: f64,
}

impl DomainScore {
    pub fn risk(value: f64) -> Self {
        Self {
            kind: ScoreKind::Risk,
            value,
        }
    }

    pub fn opportunity(value: f64) -> Self {
        Self {
            kind: ScoreKind::Opportunity,
            value,
        }
    }

    /// The score expressed on the 0-10 risk axis.
    pub fn risk_value(&self) -> f64 {
        let value = self.value.clamp(0.0, 10.0);
        match self.kind {
            ScoreKind::Risk => value,
            ScoreKind::Opportunity => 10.0 - value,
        }
    }
}

/// What a worker produces when its analysis succeeds.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// Domain-specific payload.
    pub data: Value,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Headline score, if the worker exposes one.
    pub score: Option<DomainScore>,
    /// Top-level textual findings.
    pub findings: Vec<String>,
    /// Data-source identifiers consulted.
    pub sources: Vec<String>,
    /// Non-fatal problems; any warning makes the outcome `partial`.
    pub warnings: Vec<String>,
}

/// Terminal result of executing one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub worker: WorkerKind,
    pub task_id: String,
    pub status: OutcomeStatus,
    /// Domain-specific payload.
    #[serde(default)]
    pub data: Value,
    /// Present iff status is not `success`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
    /// Confidence in [0, 1].
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<DomainScore>,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl WorkerOutcome {
    /// Builds a `success` or `partial` outcome from a finished analysis.
    pub fn from_analysis(task: &Task, analysis: Analysis, elapsed: Duration) -> Self {
        let (status, error) = if analysis.warnings.is_empty() {
            (OutcomeStatus::Success, None)
        } else {
            (OutcomeStatus::Partial, Some(analysis.warnings.join("; ")))
        };

        Self {
            worker: task.worker,
            task_id: task.id.clone(),
            status,
            data: analysis.data,
            error,
            elapsed_ms: elapsed.as_millis() as u64,
            confidence: analysis.confidence.clamp(0.0, 1.0),
            score: analysis.score,
            findings: analysis.findings,
            sources: analysis.sources,
            completed_at: Utc::now(),
        }
    }

    /// Builds a `failed` outcome.
    pub fn failure(task: &Task, error: impl Into<String>, elapsed: Duration) -> Self {
        Self::failed_for(task.worker, &task.id, error, elapsed)
    }

    /// Builds a `failed` outcome from a worker kind and task id.
    pub fn failed_for(
        worker: WorkerKind,
        task_id: &str,
        error: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            worker,
            task_id: task_id.to_string(),
            status: OutcomeStatus::Failed,
            data: Value::Null,
            error: Some(error.into()),
            elapsed_ms: elapsed.as_millis() as u64,
            confidence: 0.0,
            score: None,
            findings: Vec::new(),
            sources: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    /// Builds the outcome synthesized when a task exceeds its budget.
    pub fn timed_out(task: &Task, timeout: Duration) -> Self {
        Self::failure(task, TIMEOUT_ERROR, timeout)
    }

    /// Whether this outcome carries usable data.
    pub fn is_usable(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success | OutcomeStatus::Partial)
    }

    pub fn is_timeout(&self) -> bool {
        self.status == OutcomeStatus::Failed && self.error.as_deref() == Some(TIMEOUT_ERROR)
    }

    /// Confidence on the 0-10 scale.
    pub fn confidence_score(&self) -> f64 {
        (self.confidence * 10.0).clamp(0.0, 10.0)
    }
}

/// Risk bucket for a worker or for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBucket {
    Low,
    Moderate,
    High,
    /// No assessment was possible (worker failed or timed out).
    Incomplete,
}

impl RiskBucket {
    /// Buckets a value on the 0-10 risk axis.
    pub fn from_risk_value(value: f64) -> Self {
        if value >= 7.0 {
            RiskBucket::High
        } else if value >= 4.0 {
            RiskBucket::Moderate
        } else {
            RiskBucket::Low
        }
    }

    pub fn is_assessed(&self) -> bool {
        !matches!(self, RiskBucket::Incomplete)
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            RiskBucket::Low => "🟢",
            RiskBucket::Moderate => "🟡",
            RiskBucket::High => "🔴",
            RiskBucket::Incomplete => "⚪",
        }
    }
}

impl fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskBucket::Low => write!(f, "low"),
            RiskBucket::Moderate => write!(f, "moderate"),
            RiskBucket::High => write!(f, "high"),
            RiskBucket::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// Per-worker and overall risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub per_worker: BTreeMap<WorkerKind, RiskBucket>,
    /// Workers that could not be assessed.
    pub incomplete: Vec<WorkerKind>,
    pub overall: RiskBucket,
}

/// The merged, confidence-weighted view of a run's outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// First outcome seen for each worker kind.
    pub by_worker: BTreeMap<WorkerKind, WorkerOutcome>,
    /// Mean confidence of usable outcomes, 0-10.
    pub overall_confidence: f64,
    pub total: usize,
    pub succeeded: usize,
    /// Includes timed-out tasks.
    pub failed: usize,
    pub timed_out: usize,
    /// Subset of `succeeded` that finished with warnings.
    pub partial: usize,
    pub findings: Vec<String>,
    pub risk: RiskAssessment,
    pub data_sources: Vec<String>,
    pub total_elapsed_ms: u64,
}

/// How the query parameters were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecompositionMethod {
    Llm,
    Keyword,
}

impl fmt::Display for DecompositionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecompositionMethod::Llm => write!(f, "llm"),
            DecompositionMethod::Keyword => write!(f, "keyword"),
        }
    }
}

/// Structured parameters extracted from a free-text query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub condition: String,
    pub drug_name: Option<String>,
    pub analysis_type: String,
    pub required_workers: BTreeSet<WorkerKind>,
    /// Extra parameters such as `region`.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    pub method: DecompositionMethod,
}

impl Decomposition {
    /// Base parameter map shared by every task.
    pub fn task_params(&self) -> TaskParams {
        let mut params = self.parameters.clone();
        params.insert(PARAM_CONDITION.to_string(), self.condition.clone());
        if let Some(ref drug) = self.drug_name {
            params.insert(PARAM_DRUG_NAME.to_string(), drug.clone());
        }
        params.insert(PARAM_ANALYSIS_TYPE.to_string(), self.analysis_type.clone());
        params
    }
}

/// LLM-generated prose for the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub executive_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

/// Metadata about a research report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub run_id: String,
    pub run_state: String,
    pub analysis_date: DateTime<Utc>,
    pub decomposition_method: Option<DecompositionMethod>,
    pub tasks_dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub duration_seconds: f64,
}

/// One per-worker section of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub worker: WorkerKind,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// The complete research report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub title: String,
    pub query: String,
    pub condition: Option<String>,
    pub drug_name: Option<String>,
    pub metadata: ReportMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executive_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    pub overall_confidence: f64,
    pub sections: Vec<ReportSection>,
    pub key_findings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAssessment>,
    pub next_steps: Vec<String>,
    pub data_sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
