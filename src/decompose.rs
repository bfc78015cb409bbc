//! Query decomposition.
//!
//! The LLM collaborator is tried first. If it fails, parameters are pulled
//! out of the text with fixed keyword rules. Only a query with neither a
//! condition nor a drug in it fails outright.

use crate::error::RunError;
use crate::llm::DecompositionClient;
use crate::models::{Decomposition, DecompositionMethod, Task, WorkerKind, PARAM_REGION};
use crate::workers::market::DEFAULT_REGION;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Condition keywords, checked in order against the lowercased query.
const CONDITION_KEYWORDS: [&str; 5] = ["disease", "cancer", "diabetes", "alzheimer", "parkinson"];

/// Common generic-name stems.
const DRUG_SUFFIXES: [&str; 12] = [
    "formin", "mab", "nib", "statin", "pril", "sartan", "olol", "azole", "cycline", "vir",
    "prazole", "tide",
];

/// Words that hint at which workers a query needs.
const WORKER_HINTS: [(WorkerKind, &[&str]); 4] = [
    (
        WorkerKind::Clinical,
        &["trial", "clinical", "efficacy", "phase", "evidence"],
    ),
    (
        WorkerKind::Patent,
        &["patent", "ip", "freedom to operate", "exclusivity"],
    ),
    (
        WorkerKind::Market,
        &["market", "commercial", "competition", "pricing", "sales"],
    ),
    (
        WorkerKind::Literature,
        &["literature", "publication", "research", "pubmed", "papers", "studies"],
    ),
];

pub struct QueryDecomposer {
    client: Arc<dyn DecompositionClient>,
}

impl QueryDecomposer {
    pub fn new(client: Arc<dyn DecompositionClient>) -> Self {
        Self { client }
    }

    /// Decompose a query, falling back to keyword extraction.
    pub async fn decompose(&self, query: &str) -> Result<Decomposition, RunError> {
        match self.client.decompose(query).await {
            Ok(decomposition) => {
                info!(
                    "Decomposed query: condition={}, drug={:?}, workers={}",
                    decomposition.condition,
                    decomposition.drug_name,
                    decomposition.required_workers.len()
                );
                Ok(decomposition)
            }
            Err(e) => {
                warn!("LLM decomposition failed, using keyword fallback: {}", e);
                keyword_decomposition(query)
            }
        }
    }
}

/// Rule-based parameter extraction.
pub fn keyword_decomposition(query: &str) -> Result<Decomposition, RunError> {
    let lower = query.to_lowercase();
    let words: Vec<&str> = query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '\''))
        .filter(|w| !w.is_empty())
        .collect();

    let drug_name = extract_drug(&words);

    let condition = CONDITION_KEYWORDS
        .iter()
        .find(|k| lower.contains(*k))
        .map(|k| capitalize(k))
        .or_else(|| {
            words
                .iter()
                .find(|w| {
                    w.chars().next().is_some_and(char::is_uppercase)
                        && w.chars().count() > 3
                        && !drug_name
                            .as_deref()
                            .is_some_and(|d| d.eq_ignore_ascii_case(w))
                })
                .map(|w| w.to_string())
        });

    let condition = match (condition, &drug_name) {
        (Some(condition), _) => condition,
        (None, Some(_)) => "Unknown condition".to_string(),
        (None, None) => return Err(RunError::NothingExtractable),
    };

    let mut required_workers = infer_workers(&lower);
    if required_workers.is_empty() {
        required_workers = WorkerKind::ALL.into_iter().collect();
    }

    let mut parameters = BTreeMap::new();
    parameters.insert(PARAM_REGION.to_string(), DEFAULT_REGION.to_string());

    info!(
        "Keyword decomposition: condition={}, drug={:?}",
        condition, drug_name
    );

    Ok(Decomposition {
        condition,
        drug_name,
        analysis_type: "repurposing".to_string(),
        required_workers,
        parameters,
        method: DecompositionMethod::Keyword,
    })
}

fn extract_drug(words: &[&str]) -> Option<String> {
    words
        .iter()
        .find(|w| {
            let lower = w.to_lowercase();
            lower.len() > 4 && DRUG_SUFFIXES.iter().any(|s| lower.ends_with(s))
        })
        .map(|w| capitalize(w))
}

fn infer_workers(lower: &str) -> BTreeSet<WorkerKind> {
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    WORKER_HINTS
        .iter()
        .filter(|(_, hints)| {
            hints.iter().any(|hint| {
                if hint.contains(' ') {
                    lower.contains(hint)
                } else {
                    tokens.iter().any(|t| t.starts_with(hint))
                }
            })
        })
        .map(|(kind, _)| *kind)
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// One task per required worker, sharing the decomposed parameters.
pub fn build_tasks(decomposition: &Decomposition) -> Vec<Task> {
    let params = decomposition.task_params();
    let drug = decomposition.drug_name.as_deref().unwrap_or("the candidate drug");

    decomposition
        .required_workers
        .iter()
        .map(|kind| {
            let description = match kind {
                WorkerKind::Clinical => format!(
                    "Analyze clinical trials for {} with {}",
                    decomposition.condition, drug
                ),
                WorkerKind::Patent => format!("Analyze patent landscape for {}", drug),
                WorkerKind::Market => {
                    format!("Analyze market opportunity for {}", decomposition.condition)
                }
                WorkerKind::Literature => format!(
                    "Review published literature on {} and {}",
                    drug, decomposition.condition
                ),
            };
            Task::new(*kind, description, params.clone())
        })
        .collect()
}
