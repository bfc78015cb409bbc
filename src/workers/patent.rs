//! Patent landscape and freedom-to-operate analysis.

use super::sources::{PatentRecord, PatentSource};
use super::{round2, Worker};
use crate::error::WorkerError;
use crate::models::{Analysis, DomainScore, Task, WorkerKind, PARAM_CONDITION, PARAM_DRUG_NAME};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

const KEY_PATENTS: usize = 5;

/// Patent data is curated, so confidence does not depend on the result.
const PATENT_CONFIDENCE: f64 = 0.8;

pub struct PatentWorker {
    source: Arc<dyn PatentSource>,
}

impl PatentWorker {
    pub fn new(source: Arc<dyn PatentSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Worker for PatentWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Patent
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[PARAM_DRUG_NAME]
    }

    async fn analyze(&self, task: &Task) -> Result<Analysis, WorkerError> {
        let drug_name = task.param(PARAM_DRUG_NAME).unwrap_or_default();
        let condition = task.param(PARAM_CONDITION);
        info!("Analyzing patent landscape for {}", drug_name);

        let patents = self.source.search_patents(drug_name, condition).await?;
        let active = patents.iter().filter(|p| p.is_active()).count();
        let risk = risk_score(active);
        let barrier = BarrierLevel::from_active(active);

        let data = json!({
            "drug_name": drug_name,
            "condition": condition,
            "total_patents": patents.len(),
            "active_patents": active,
            "expired_patents": patents.len() - active,
            "ip_assessment": {
                "barrier_level": barrier.label(),
                "description": barrier.description(),
                "active_patent_count": active,
                "mitigation_strategies": mitigation_strategies(active),
            },
            "key_patents": key_patents(&patents),
            "risk_score": risk,
            "recommendation": recommendation(risk, barrier),
        });

        Ok(Analysis {
            data,
            confidence: PATENT_CONFIDENCE,
            score: Some(DomainScore::risk(risk)),
            findings: vec![format!(
                "{} active patents, IP risk score {}/10",
                active, risk
            )],
            sources: vec!["USPTO Patent Database".to_string()],
            warnings: Vec::new(),
        })
    }
}

/// IP risk, 0-10: half a point per active patent.
pub fn risk_score(active_patents: usize) -> f64 {
    round2((active_patents as f64 / 2.0).min(10.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BarrierLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl BarrierLevel {
    fn from_active(active: usize) -> Self {
        match active {
            0 => BarrierLevel::Low,
            1..=5 => BarrierLevel::Moderate,
            6..=15 => BarrierLevel::High,
            _ => BarrierLevel::VeryHigh,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            BarrierLevel::Low => "Low",
            BarrierLevel::Moderate => "Moderate",
            BarrierLevel::High => "High",
            BarrierLevel::VeryHigh => "Very High",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            BarrierLevel::Low => "No active patent barriers identified",
            BarrierLevel::Moderate => {
                "Some active patents exist, but landscape is relatively clear"
            }
            BarrierLevel::High => {
                "Significant patent barriers present, careful navigation required"
            }
            BarrierLevel::VeryHigh => "Extensive patent protection, high risk of infringement",
        }
    }
}

fn mitigation_strategies(active: usize) -> Vec<&'static str> {
    let mut strategies = if active > 10 {
        vec![
            "Consider licensing agreements with key patent holders",
            "Explore alternative formulations or delivery methods",
            "Conduct comprehensive freedom-to-operate analysis",
        ]
    } else if active > 5 {
        vec![
            "Review patent claims for potential design-around opportunities",
            "Monitor patent expiration dates",
        ]
    } else {
        vec!["Standard patent clearance procedures should suffice"]
    };
    strategies.push("Consult with patent attorney for detailed analysis");
    strategies
}

fn importance(patent: &PatentRecord) -> f64 {
    let mut score = if patent.is_active() { 3.0 } else { 0.0 };
    score += (patent.citations as f64 / 5.0).min(2.0);
    score += (patent.claims_count as f64 / 20.0).min(2.0);
    score
}

fn key_patents(patents: &[PatentRecord]) -> Vec<Value> {
    let mut ranked: Vec<(f64, &PatentRecord)> = patents.iter().map(|p| (importance(p), p)).collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    ranked
        .into_iter()
        .take(KEY_PATENTS)
        .map(|(score, patent)| {
            json!({
                "patent_number": patent.patent_number,
                "title": patent.title,
                "status": patent.status,
                "assignee": patent.assignee,
                "filing_date": patent.filing_date,
                "importance_score": round2(score),
            })
        })
        .collect()
}

fn recommendation(risk: f64, barrier: BarrierLevel) -> String {
    if risk <= 3.0 {
        format!(
            "Low IP risk ({}). Favorable patent landscape for development.",
            barrier.label()
        )
    } else if risk <= 6.0 {
        format!(
            "Moderate IP risk ({}). Patent clearance recommended before proceeding.",
            barrier.label()
        )
    } else {
        format!(
            "High IP risk ({}). Significant patent barriers. Detailed FTO analysis essential.",
            barrier.label()
        )
    }
}
