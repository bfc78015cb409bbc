//! Clinical trial evidence analysis.

use super::sources::{ClinicalStudy, ClinicalTrialsSource};
use super::{round2, Worker};
use crate::error::WorkerError;
use crate::models::{Analysis, DomainScore, Task, WorkerKind, PARAM_CONDITION, PARAM_DRUG_NAME};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Phases counted in the phase distribution.
const PHASES: [&str; 5] = ["EARLY_PHASE1", "PHASE1", "PHASE2", "PHASE3", "PHASE4"];

/// Number of key trials included in the payload.
const KEY_TRIALS: usize = 5;

pub struct ClinicalWorker {
    source: Arc<dyn ClinicalTrialsSource>,
}

impl ClinicalWorker {
    pub fn new(source: Arc<dyn ClinicalTrialsSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Worker for ClinicalWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Clinical
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[PARAM_CONDITION]
    }

    async fn analyze(&self, task: &Task) -> Result<Analysis, WorkerError> {
        let condition = task.param(PARAM_CONDITION).unwrap_or_default();
        let drug_name = task.param(PARAM_DRUG_NAME);
        info!(
            "Analyzing clinical trials for {} with {}",
            condition,
            drug_name.unwrap_or("any intervention")
        );

        let studies = self.source.search_studies(condition, drug_name).await?;
        let evidence = evidence_score(&studies);

        let mut data = json!({
            "condition": condition,
            "drug_name": drug_name,
            "total_trials": studies.len(),
            "trials_by_status": count_by_status(&studies),
            "phase_analysis": phase_distribution(&studies),
            "evidence_score": evidence,
            "key_trials": key_trials(&studies, drug_name),
            "recommendation": recommendation(studies.len(), evidence),
        });
        if drug_name.is_some() {
            data["outcomes_analysis"] = outcomes_analysis(&studies);
        }

        Ok(Analysis {
            data,
            confidence: evidence / 10.0,
            score: Some(DomainScore::opportunity(evidence)),
            findings: vec![format!(
                "{} trials found with evidence score {}/10",
                studies.len(),
                evidence
            )],
            sources: vec!["ClinicalTrials.gov".to_string()],
            warnings: Vec::new(),
        })
    }
}

/// Evidence strength, 0-10.
///
/// Up to 3 points for trial volume, 3 for completed trials and 4 for
/// late-phase trials.
pub fn evidence_score(studies: &[ClinicalStudy]) -> f64 {
    if studies.is_empty() {
        return 0.0;
    }

    let total = studies.len() as f64;
    let completed = studies.iter().filter(|s| s.status == "COMPLETED").count() as f64;
    let phase3 = studies.iter().filter(|s| s.has_phase("PHASE3")).count() as f64;
    let phase4 = studies.iter().filter(|s| s.has_phase("PHASE4")).count() as f64;

    let score = (total / 10.0).min(3.0)
        + (completed / 5.0).min(3.0)
        + ((phase3 * 1.5 + phase4 * 2.0) / 5.0).min(4.0);

    round2(score.min(10.0))
}

fn count_by_status(studies: &[ClinicalStudy]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for study in studies {
        *counts.entry(study.status.as_str()).or_insert(0) += 1;
    }
    counts
}

fn phase_distribution(studies: &[ClinicalStudy]) -> BTreeMap<&'static str, usize> {
    let mut counts: BTreeMap<&'static str, usize> = PHASES.iter().map(|p| (*p, 0)).collect();
    for study in studies {
        for phase in &study.phases {
            let normalized = phase.to_uppercase().replace(' ', "_");
            if let Some(count) = PHASES
                .iter()
                .find(|p| **p == normalized)
                .and_then(|p| counts.get_mut(p))
            {
                *count += 1;
            }
        }
    }
    counts
}

/// Completed-trial summary for a specific drug.
///
/// Studies without a reported enrollment add nothing to the total.
fn outcomes_analysis(studies: &[ClinicalStudy]) -> Value {
    let completed: Vec<ClinicalStudy> = studies
        .iter()
        .filter(|s| s.status == "COMPLETED")
        .cloned()
        .collect();
    let total_enrollment: u64 = completed.iter().filter_map(|s| s.enrollment).sum();

    json!({
        "completed_studies": completed.len(),
        "phase_distribution": phase_distribution(&completed),
        "total_enrollment": total_enrollment,
    })
}

fn relevance(study: &ClinicalStudy, drug_name: Option<&str>) -> u32 {
    let mut score = 0;
    if study.status == "COMPLETED" {
        score += 3;
    }
    if study.has_phase("PHASE3") || study.has_phase("PHASE4") {
        score += 2;
    }
    if let Some(drug) = drug_name {
        let drug = drug.to_lowercase();
        if study
            .interventions
            .iter()
            .any(|i| i.to_lowercase().contains(&drug))
        {
            score += 2;
        }
    }
    score
}

/// Most relevant trials first; ties keep search order.
fn key_trials(studies: &[ClinicalStudy], drug_name: Option<&str>) -> Vec<Value> {
    let mut ranked: Vec<(u32, &ClinicalStudy)> = studies
        .iter()
        .map(|s| (relevance(s, drug_name), s))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    ranked
        .into_iter()
        .take(KEY_TRIALS)
        .map(|(score, study)| {
            json!({
                "nct_id": study.nct_id,
                "title": study.title,
                "status": study.status,
                "phases": study.phases,
                "relevance_score": score,
            })
        })
        .collect()
}

fn recommendation(total_trials: usize, evidence: f64) -> &'static str {
    if total_trials == 0 {
        "No clinical trials found. Further research needed."
    } else if evidence >= 7.0 {
        "Strong clinical evidence. Multiple trials with advanced phases."
    } else if evidence >= 4.0 {
        "Moderate clinical evidence. Some trials in progress or completed."
    } else {
        "Limited clinical evidence. Early-stage or few trials available."
    }
}
