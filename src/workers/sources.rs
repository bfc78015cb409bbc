//! Data-source collaborators used by the workers.
//!
//! Each worker talks to its source through one of these traits so the
//! scoring logic can be exercised with in-memory fixtures.

use crate::error::WorkerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A registered clinical study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalStudy {
    pub nct_id: String,
    pub title: String,
    /// Overall status, e.g. `COMPLETED` or `RECRUITING`.
    pub status: String,
    /// Phase tags, e.g. `PHASE3`.
    #[serde(default)]
    pub phases: Vec<String>,
    #[serde(default)]
    pub interventions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment: Option<u64>,
}

impl ClinicalStudy {
    /// Whether any phase tag matches, ignoring case and spaces.
    pub fn has_phase(&self, phase: &str) -> bool {
        self.phases
            .iter()
            .any(|p| p.to_uppercase().replace([' ', '_'], "") == phase)
    }
}

#[async_trait]
pub trait ClinicalTrialsSource: Send + Sync {
    async fn search_studies(
        &self,
        condition: &str,
        drug_name: Option<&str>,
    ) -> Result<Vec<ClinicalStudy>, WorkerError>;
}

/// A granted or pending patent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatentRecord {
    pub patent_number: String,
    pub title: String,
    /// `Active` or `Expired`.
    pub status: String,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub filing_date: String,
    #[serde(default)]
    pub claims_count: u32,
    #[serde(default)]
    pub citations: u32,
}

impl PatentRecord {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}

#[async_trait]
pub trait PatentSource: Send + Sync {
    async fn search_patents(
        &self,
        drug_name: &str,
        condition: Option<&str>,
    ) -> Result<Vec<PatentRecord>, WorkerError>;
}

/// Market size estimate for a condition and region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSize {
    pub market_size_usd: f64,
    /// Projected compound annual growth rate, in percent.
    pub projected_cagr: f64,
    #[serde(default)]
    pub patient_population: f64,
    /// Fraction of patients currently treated, 0-1.
    #[serde(default)]
    pub treatment_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    pub drug_name: String,
    #[serde(default)]
    pub manufacturer: String,
    /// Market share in percent.
    pub market_share: f64,
}

/// Competitive landscape for a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub approved_drugs: Vec<Competitor>,
    #[serde(default)]
    pub pipeline_drugs: usize,
}

impl Competition {
    /// Combined share of the three largest competitors.
    pub fn top_3_share(&self) -> f64 {
        let mut shares: Vec<f64> = self.approved_drugs.iter().map(|c| c.market_share).collect();
        shares.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        shares.iter().take(3).sum()
    }
}

/// Source name reported for pricing data.
pub const PRICING_SOURCE: &str = "Drug Pricing Database";

/// Price and reimbursement data for one drug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingData {
    /// Average wholesale price per unit.
    pub average_wholesale_price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub pricing_model: String,
    #[serde(default)]
    pub reimbursement_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_out_of_pocket: Option<f64>,
    #[serde(default)]
    pub price_trend: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn market_size(&self, condition: &str, region: &str) -> Result<MarketSize, WorkerError>;

    async fn competition(&self, condition: &str) -> Result<Competition, WorkerError>;

    async fn pricing(&self, drug_name: &str, region: &str) -> Result<PricingData, WorkerError>;
}

/// A published article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub pmid: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub journal: String,
    /// Free-form publication date, e.g. `2021 Mar 4`.
    #[serde(default)]
    pub pub_date: String,
    #[serde(default)]
    pub pub_types: Vec<String>,
}

impl Article {
    /// First four-digit run in the publication date.
    pub fn year(&self) -> Option<u32> {
        let bytes = self.pub_date.as_bytes();
        bytes
            .windows(4)
            .find(|w| w.iter().all(u8::is_ascii_digit))
            .and_then(|w| std::str::from_utf8(w).ok())
            .and_then(|s| s.parse().ok())
    }
}

#[async_trait]
pub trait LiteratureSource: Send + Sync {
    async fn search_articles(
        &self,
        drug_name: &str,
        condition: &str,
    ) -> Result<Vec<Article>, WorkerError>;
}
