//! Published literature and research momentum analysis.

use super::sources::{Article, LiteratureSource};
use super::{round2, Worker};
use crate::error::WorkerError;
use crate::models::{Analysis, DomainScore, Task, WorkerKind, PARAM_CONDITION, PARAM_DRUG_NAME};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const LITERATURE_CONFIDENCE: f64 = 0.85;

/// Publications from this year on count as recent activity.
const RECENT_YEAR: u32 = 2020;

const KEY_ARTICLES: usize = 5;

pub struct LiteratureWorker {
    source: Arc<dyn LiteratureSource>,
}

impl LiteratureWorker {
    pub fn new(source: Arc<dyn LiteratureSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Worker for LiteratureWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Literature
    }

    fn required_params(&self) -> &'static [&'static str] {
        &[PARAM_CONDITION, PARAM_DRUG_NAME]
    }

    async fn analyze(&self, task: &Task) -> Result<Analysis, WorkerError> {
        let condition = task.param(PARAM_CONDITION).unwrap_or_default();
        let drug_name = task.param(PARAM_DRUG_NAME).unwrap_or_default();
        info!("Gathering literature for {} and {}", drug_name, condition);

        let articles = self.source.search_articles(drug_name, condition).await?;
        let years = year_distribution(&articles);
        let trend = Trend::from_years(&years);
        let momentum = momentum_score(articles.len(), trend, &years);

        let undated = articles.iter().filter(|a| a.year().is_none()).count();
        let mut warnings = Vec::new();
        if undated > 0 {
            warnings.push(format!(
                "publication date unavailable for {} of {} articles",
                undated,
                articles.len()
            ));
        }

        let data = json!({
            "condition": condition,
            "drug_name": drug_name,
            "total_publications": articles.len(),
            "trend_analysis": {
                "publication_trend": trend.label(),
                "year_distribution": years,
            },
            "research_momentum_score": momentum,
            "research_themes": research_themes(&articles),
            "key_findings": key_articles(&articles),
            "recommendation": recommendation(momentum, trend, articles.len()),
        });

        Ok(Analysis {
            data,
            confidence: LITERATURE_CONFIDENCE,
            score: Some(DomainScore::opportunity(momentum)),
            findings: vec![format!(
                "{} publications, {} trend, research momentum {}/10",
                articles.len(),
                trend.label().to_lowercase(),
                momentum
            )],
            sources: vec!["PubMed".to_string(), "NCBI".to_string()],
            warnings,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Increasing,
    Stable,
}

impl Trend {
    /// Increasing when publications span more than two years and the
    /// latest year out-publishes the earliest.
    fn from_years(years: &BTreeMap<u32, usize>) -> Self {
        let earliest = years.values().next();
        let latest = years.values().next_back();
        match (earliest, latest) {
            (Some(first), Some(last)) if years.len() > 2 && last > first => Trend::Increasing,
            _ => Trend::Stable,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Trend::Increasing => "Increasing",
            Trend::Stable => "Stable",
        }
    }
}

fn year_distribution(articles: &[Article]) -> BTreeMap<u32, usize> {
    let mut years = BTreeMap::new();
    for year in articles.iter().filter_map(Article::year) {
        *years.entry(year).or_insert(0) += 1;
    }
    years
}

/// Research momentum, 0-10: volume (max 4), trend (max 3) and recent
/// publications (max 3).
pub fn momentum_score(total: usize, trend: Trend, years: &BTreeMap<u32, usize>) -> f64 {
    let volume = match total {
        0 => 0.0,
        1..=10 => 1.0,
        11..=20 => 2.0,
        21..=50 => 3.0,
        _ => 4.0,
    };

    let direction = match trend {
        Trend::Increasing => 3.0,
        Trend::Stable => 1.5,
    };

    let recent: usize = years.range(RECENT_YEAR..).map(|(_, count)| count).sum();
    let recent = (recent as f64 / 10.0).min(3.0);

    round2(f64::min(volume + direction + recent, 10.0))
}

fn research_themes(articles: &[Article]) -> Vec<&'static str> {
    let has_type = |needle: &str| {
        articles
            .iter()
            .flat_map(|a| a.pub_types.iter())
            .any(|t| t.contains(needle))
    };

    let mut themes = Vec::new();
    if has_type("Clinical Trial") {
        themes.push("Clinical research");
    }
    if has_type("Review") {
        themes.push("Literature reviews");
    }
    if has_type("Meta-Analysis") {
        themes.push("Meta-analyses");
    }
    if themes.is_empty() {
        themes = vec!["Basic research", "Preclinical studies"];
    }
    themes
}

fn key_articles(articles: &[Article]) -> Vec<Value> {
    articles
        .iter()
        .take(KEY_ARTICLES)
        .map(|article| {
            json!({
                "title": article.title,
                "authors": article.authors.iter().take(2).cloned().collect::<Vec<_>>().join(", "),
                "journal": article.journal,
                "year": article.year(),
                "pmid": article.pmid,
            })
        })
        .collect()
}

fn recommendation(momentum: f64, trend: Trend, total: usize) -> String {
    let trend = trend.label();
    if momentum >= 7.0 {
        format!(
            "Strong research momentum ({} trend, {} publications). Active research area.",
            trend, total
        )
    } else if momentum >= 4.0 {
        format!(
            "Moderate research activity ({} trend, {} publications). Some scientific support.",
            trend, total
        )
    } else {
        format!(
            "Limited research activity ({} trend, {} publications). Emerging or niche area.",
            trend, total
        )
    }
}
