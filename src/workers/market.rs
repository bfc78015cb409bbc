//! Market size and commercial viability analysis.

use super::sources::{Competition, MarketSize, MarketSource, PRICING_SOURCE};
use super::{round2, Worker};
use crate::error::WorkerError;
use crate::models::{
    Analysis, DomainScore, Task, WorkerKind, PARAM_CONDITION, PARAM_DRUG_NAME, PARAM_REGION,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Region used when the task does not name one.
pub const DEFAULT_REGION: &str = "Global";

const MARKET_CONFIDENCE: f64 = 0.75;

pub struct MarketWorker {
    source: Arc<dyn MarketSource>,
}

impl MarketWorker {
    pub fn new(source: Arc<dyn MarketSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Worker for MarketWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Market
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[PARAM_CONDITION]
    }

    async fn analyze(&self, task: &Task) -> Result<Analysis, WorkerError> {
        let condition = task.param(PARAM_CONDITION).unwrap_or_default();
        let drug_name = task.param(PARAM_DRUG_NAME);
        let region = task.param(PARAM_REGION).unwrap_or(DEFAULT_REGION);
        info!("Analyzing market for {} in {}", condition, region);

        let (size, competition) = futures::try_join!(
            self.source.market_size(condition, region),
            self.source.competition(condition)
        )?;

        let mut sources = vec!["IQVIA".to_string(), "Market Reports".to_string()];
        let mut warnings = Vec::new();

        // Pricing is optional; a failed lookup leaves the rest of the analysis intact.
        let pricing = match drug_name {
            Some(drug) => match self.source.pricing(drug, region).await {
                Ok(pricing) => {
                    sources.push(PRICING_SOURCE.to_string());
                    Some(pricing)
                }
                Err(e) => {
                    warn!("Pricing lookup for {} failed: {}", drug, e);
                    warnings.push(format!("pricing data unavailable: {}", e));
                    None
                }
            },
            None => None,
        };

        let attractiveness = attractiveness_score(&size, &competition);
        let mut data = json!({
            "condition": condition,
            "drug_name": drug_name,
            "region": region,
            "market_size": size,
            "competitive_landscape": {
                "approved_drugs": competition.approved_drugs,
                "pipeline_drugs": competition.pipeline_drugs,
                "top_3_market_share": round2(competition.top_3_share()),
            },
            "attractiveness_score": attractiveness,
            "viability_assessment": viability(&size, &competition, attractiveness),
            "recommendation": recommendation(attractiveness, &size),
        });
        if let Some(pricing) = pricing {
            data["pricing_data"] = json!(pricing);
        }

        Ok(Analysis {
            data,
            confidence: MARKET_CONFIDENCE,
            score: Some(DomainScore::opportunity(attractiveness)),
            findings: vec![format!(
                "${:.1}B market in {} growing {}% a year, attractiveness {}/10",
                size.market_size_usd / 1e9,
                region,
                size.projected_cagr,
                attractiveness
            )],
            sources,
            warnings,
        })
    }
}

/// Market attractiveness, 0-10: size (max 4), growth (max 3) and
/// fragmentation of the top three competitors (max 3).
pub fn attractiveness_score(size: &MarketSize, competition: &Competition) -> f64 {
    let size_factor = match size.market_size_usd {
        s if s > 20e9 => 4.0,
        s if s > 10e9 => 3.0,
        s if s > 5e9 => 2.0,
        _ => 1.0,
    };

    let growth = match size.projected_cagr {
        g if g > 10.0 => 3.0,
        g if g > 7.0 => 2.0,
        g if g > 4.0 => 1.0,
        _ => 0.0,
    };

    let concentration = match competition.top_3_share() {
        share if share < 50.0 => 3.0,
        share if share < 70.0 => 2.0,
        _ => 1.0,
    };

    round2(f64::min(size_factor + growth + concentration, 10.0))
}

fn entry_barrier(approved: usize) -> &'static str {
    match approved {
        0..=2 => "Low",
        3..=6 => "Moderate",
        _ => "High",
    }
}

fn viability(size: &MarketSize, competition: &Competition, attractiveness: f64) -> Value {
    let approved = competition.approved_drugs.len();
    let untreated = size.patient_population * (1.0 - size.treatment_rate.clamp(0.0, 1.0));

    let (level, description) = if attractiveness >= 7.0 {
        ("High", "Attractive market with strong growth potential")
    } else if attractiveness >= 4.0 {
        ("Moderate", "Reasonable market opportunity with some challenges")
    } else {
        ("Low", "Limited market potential or high competition")
    };

    let mut factors = Vec::new();
    if size.projected_cagr > 8.0 {
        factors.push("Strong market growth supports new entrants");
    }
    if approved < 5 {
        factors.push("Limited competition creates opportunities");
    }
    factors.extend([
        "Differentiated value proposition essential",
        "Strong clinical data required for market access",
        "Favorable pricing and reimbursement critical",
    ]);

    json!({
        "viability_level": level,
        "description": description,
        "untreated_patient_population": untreated.round() as u64,
        "market_entry_barrier": entry_barrier(approved),
        "competitive_intensity": if approved > 5 { "High" } else { "Moderate" },
        "key_success_factors": factors,
    })
}

fn recommendation(attractiveness: f64, size: &MarketSize) -> String {
    let billions = size.market_size_usd / 1e9;
    let cagr = size.projected_cagr;
    if attractiveness >= 7.0 {
        format!(
            "Highly attractive market (${:.1}B, {}% CAGR). Strong commercial opportunity.",
            billions, cagr
        )
    } else if attractiveness >= 4.0 {
        format!(
            "Moderately attractive market (${:.1}B, {}% CAGR). Competitive but viable.",
            billions, cagr
        )
    } else {
        format!(
            "Limited market attractiveness (${:.1}B, {}% CAGR). High competition or slow growth.",
            billions, cagr
        )
    }
}
