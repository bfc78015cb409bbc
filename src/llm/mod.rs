//! LLM collaborators.
//!
//! Query decomposition and narrative synthesis are optional: every caller
//! has a deterministic fallback for when these return an error.

pub mod ollama;

pub use ollama::{OllamaClient, OllamaConfig};

use crate::error::CollaboratorError;
use crate::models::{AggregatedResult, Decomposition, Narrative, RiskBucket, WorkerKind};
use async_trait::async_trait;

/// Turns free text into structured query parameters.
#[async_trait]
pub trait DecompositionClient: Send + Sync {
    async fn decompose(&self, query: &str) -> Result<Decomposition, CollaboratorError>;
}

/// Writes prose for the report from the deterministic results.
#[async_trait]
pub trait NarrativeClient: Send + Sync {
    async fn narrate(&self, brief: &NarrativeBrief) -> Result<Narrative, CollaboratorError>;
}

/// Digest of a finished run handed to the narrative collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeBrief {
    pub query: String,
    pub condition: String,
    pub drug_name: Option<String>,
    pub overall_confidence: f64,
    pub overall_risk: RiskBucket,
    pub recommendations: Vec<(WorkerKind, String)>,
    pub findings: Vec<String>,
}

impl NarrativeBrief {
    pub fn new(query: &str, decomposition: &Decomposition, result: &AggregatedResult) -> Self {
        let recommendations = result
            .by_worker
            .iter()
            .filter(|(_, outcome)| outcome.is_usable())
            .filter_map(|(kind, outcome)| {
                outcome.data["recommendation"]
                    .as_str()
                    .map(|r| (*kind, r.to_string()))
            })
            .collect();

        Self {
            query: query.to_string(),
            condition: decomposition.condition.clone(),
            drug_name: decomposition.drug_name.clone(),
            overall_confidence: result.overall_confidence,
            overall_risk: result.risk.overall,
            recommendations,
            findings: result.findings.clone(),
        }
    }

    /// Render as the user message of a chat prompt.
    pub fn to_prompt(&self) -> String {
        let mut prompt = String::new();
        prompt.push_str("Generate a concise executive summary for a drug repurposing analysis.\n\n");
        prompt.push_str(&format!("Query: {}\n", self.query));
        prompt.push_str(&format!("Condition: {}\n", self.condition));
        prompt.push_str(&format!(
            "Drug: {}\n",
            self.drug_name.as_deref().unwrap_or("Not specified")
        ));
        prompt.push_str(&format!(
            "Overall confidence: {:.1}/10\nOverall risk: {}\n\n",
            self.overall_confidence, self.overall_risk
        ));

        if !self.recommendations.is_empty() {
            prompt.push_str("Worker recommendations:\n");
            for (kind, recommendation) in &self.recommendations {
                prompt.push_str(&format!("- {}: {}\n", kind, recommendation));
            }
            prompt.push('\n');
        }

        if !self.findings.is_empty() {
            prompt.push_str("Key findings:\n");
            for finding in &self.findings {
                prompt.push_str(&format!("- {}\n", finding));
            }
            prompt.push('\n');
        }

        prompt.push_str(
            "Provide a 3-4 sentence executive summary highlighting key opportunities and risks, \
             and a one-sentence overall recommendation.",
        );
        prompt
    }
}

/// Collaborator used when LLM calls are turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disabled;

#[async_trait]
impl DecompositionClient for Disabled {
    async fn decompose(&self, _query: &str) -> Result<Decomposition, CollaboratorError> {
        Err(CollaboratorError::Disabled)
    }
}

#[async_trait]
impl NarrativeClient for Disabled {
    async fn narrate(&self, _brief: &NarrativeBrief) -> Result<Narrative, CollaboratorError> {
        Err(CollaboratorError::Disabled)
    }
}
