//! Error taxonomy.
//!
//! Failures are contained at the smallest boundary and turned into data
//! (outcome status fields) once they cross it. Only configuration errors,
//! dispatcher misuse and a query with nothing to act on surface as errors.

use crate::models::WorkerKind;
use thiserror::Error;

/// A task was rejected before any external call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("task description is empty")]
    EmptyDescription,

    #[error("task for {task} routed to {worker} worker")]
    WrongWorker { task: WorkerKind, worker: WorkerKind },
}

/// Failure inside a worker's analysis. Converted to a `failed` outcome at
/// the worker boundary.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("request to {source_name} failed: {message}")]
    Request {
        source_name: &'static str,
        message: String,
    },

    #[error("{source_name} returned HTTP {status}")]
    Status {
        source_name: &'static str,
        status: u16,
    },

    #[error("malformed response from {source_name}: {message}")]
    Malformed {
        source_name: &'static str,
        message: String,
    },

    #[error("{0} data source is not configured")]
    NotConfigured(&'static str),
}

/// An external LLM collaborator failed. Always degrades to a fallback.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("collaborator is disabled")]
    Disabled,

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unparsable response: {0}")]
    Unparsable(String),
}

/// Invalid orchestration configuration, caught at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,

    #[error("concurrency limit {requested} exceeds the maximum of {max}")]
    ConcurrencyTooHigh { requested: usize, max: usize },

    #[error("per-task timeout must be greater than zero")]
    ZeroTimeout,

    #[error("{slot} slot was given a {actual} worker")]
    WorkerMismatch { slot: WorkerKind, actual: WorkerKind },
}

/// Caller error detected before dispatching anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),
}

/// Run-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("no actionable parameters could be extracted from the query")]
    NothingExtractable,

    #[error("decomposition produced no tasks")]
    NoTasks,

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
