//! HTTP-backed data sources.
//!
//! ClinicalTrials.gov and PubMed are public APIs. Patent and market data
//! come from licensed providers, so they are read from a configurable JSON
//! endpoint instead.

use crate::error::WorkerError;
use crate::workers::sources::{
    Article, ClinicalStudy, ClinicalTrialsSource, Competition, LiteratureSource, MarketSize,
    MarketSource, PatentRecord, PatentSource, PricingData, PRICING_SOURCE,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

/// Study statuses included in clinical searches.
const STUDY_STATUSES: &str = "COMPLETED,RECRUITING,ACTIVE_NOT_RECRUITING";

/// GET a URL and decode the JSON body.
async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    source_name: &'static str,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, WorkerError> {
    debug!("GET {} {:?}", url, query);

    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| WorkerError::Request {
            source_name,
            message: if e.is_timeout() {
                "request timed out".to_string()
            } else if e.is_connect() {
                format!("cannot connect to {}", url)
            } else {
                e.to_string()
            },
        })?;

    if !response.status().is_success() {
        return Err(WorkerError::Status {
            source_name,
            status: response.status().as_u16(),
        });
    }

    response.json().await.map_err(|e| WorkerError::Malformed {
        source_name,
        message: e.to_string(),
    })
}

/// ClinicalTrials.gov v2 API.
pub struct ClinicalTrialsGov {
    client: reqwest::Client,
    base_url: String,
    max_results: usize,
}

impl ClinicalTrialsGov {
    pub fn new(client: reqwest::Client, base_url: &str, max_results: usize) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_results,
        }
    }
}

#[async_trait]
impl ClinicalTrialsSource for ClinicalTrialsGov {
    async fn search_studies(
        &self,
        condition: &str,
        drug_name: Option<&str>,
    ) -> Result<Vec<ClinicalStudy>, WorkerError> {
        info!("Searching ClinicalTrials.gov for: {}", condition);

        let mut query = vec![
            ("query.cond", condition.to_string()),
            ("filter.overallStatus", STUDY_STATUSES.to_string()),
            ("pageSize", self.max_results.min(100).to_string()),
            ("format", "json".to_string()),
        ];
        if let Some(drug) = drug_name {
            query.push(("query.intr", drug.to_string()));
        }

        let url = format!("{}/studies", self.base_url);
        let body: Value = get_json(&self.client, "ClinicalTrials.gov", &url, &query).await?;
        let studies = parse_studies(&body)?;

        info!("Found {} clinical trials", studies.len());
        Ok(studies)
    }
}

/// Extract studies from a ClinicalTrials.gov `/studies` response.
pub fn parse_studies(body: &Value) -> Result<Vec<ClinicalStudy>, WorkerError> {
    let studies = body["studies"]
        .as_array()
        .ok_or_else(|| WorkerError::Malformed {
            source_name: "ClinicalTrials.gov",
            message: "missing `studies` array".to_string(),
        })?;

    Ok(studies
        .iter()
        .map(|study| {
            let protocol = &study["protocolSection"];
            let design = &protocol["designModule"];
            let strings = |v: &Value| -> Vec<String> {
                v.as_array()
                    .map(|a| a.iter().filter_map(|s| s.as_str().map(String::from)).collect())
                    .unwrap_or_default()
            };

            ClinicalStudy {
                nct_id: protocol["identificationModule"]["nctId"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                title: protocol["identificationModule"]["briefTitle"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                status: protocol["statusModule"]["overallStatus"]
                    .as_str()
                    .unwrap_or("UNKNOWN")
                    .to_string(),
                phases: strings(&design["phases"]),
                interventions: protocol["armsInterventionsModule"]["interventions"]
                    .as_array()
                    .map(|a| {
                        a.iter()
                            .filter_map(|i| i["name"].as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default(),
                enrollment: design["enrollmentInfo"]["count"].as_u64(),
            }
        })
        .collect())
}

/// NCBI E-utilities (PubMed).
pub struct PubMed {
    client: reqwest::Client,
    base_url: String,
    max_results: usize,
}

impl PubMed {
    pub fn new(client: reqwest::Client, base_url: &str, max_results: usize) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_results,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[async_trait]
impl LiteratureSource for PubMed {
    async fn search_articles(
        &self,
        drug_name: &str,
        condition: &str,
    ) -> Result<Vec<Article>, WorkerError> {
        let term = format!("{} AND {}", drug_name, condition);
        info!("Searching PubMed for: {}", term);

        let search: ESearchResponse = get_json(
            &self.client,
            "PubMed",
            &format!("{}/esearch.fcgi", self.base_url),
            &[
                ("db", "pubmed".to_string()),
                ("term", term),
                ("retmax", self.max_results.to_string()),
                ("retmode", "json".to_string()),
                ("sort", "relevance".to_string()),
            ],
        )
        .await?;

        let ids = search.esearchresult.idlist;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let summary: Value = get_json(
            &self.client,
            "PubMed",
            &format!("{}/esummary.fcgi", self.base_url),
            &[
                ("db", "pubmed".to_string()),
                ("id", ids.join(",")),
                ("retmode", "json".to_string()),
            ],
        )
        .await?;

        Ok(parse_summaries(&ids, &summary))
    }
}

/// Extract articles from an `esummary` response, in search order.
pub fn parse_summaries(ids: &[String], body: &Value) -> Vec<Article> {
    let result = &body["result"];

    ids.iter()
        .filter_map(|pmid| {
            let article = result.get(pmid)?;
            Some(Article {
                pmid: pmid.clone(),
                title: article["title"].as_str().unwrap_or_default().to_string(),
                authors: article["authors"]
                    .as_array()
                    .map(|a| {
                        a.iter()
                            .take(3)
                            .filter_map(|au| au["name"].as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default(),
                journal: article["fulljournalname"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                pub_date: article["pubdate"].as_str().unwrap_or_default().to_string(),
                pub_types: article["pubtype"]
                    .as_array()
                    .map(|a| a.iter().filter_map(|t| t.as_str().map(String::from)).collect())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Patent provider exposing `GET {base}/patents`.
pub struct PatentEndpoint {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl PatentEndpoint {
    pub fn new(client: reqwest::Client, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PatentsResponse {
    patents: Vec<PatentRecord>,
}

#[async_trait]
impl PatentSource for PatentEndpoint {
    async fn search_patents(
        &self,
        drug_name: &str,
        condition: Option<&str>,
    ) -> Result<Vec<PatentRecord>, WorkerError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or(WorkerError::NotConfigured("patent"))?;

        let mut query = vec![("drug_name", drug_name.to_string())];
        if let Some(condition) = condition {
            query.push(("condition", condition.to_string()));
        }

        let response: PatentsResponse = get_json(
            &self.client,
            "USPTO Patent Database",
            &format!("{}/patents", base),
            &query,
        )
        .await?;
        Ok(response.patents)
    }
}

/// Market data provider exposing `GET {base}/market-size` and
/// `GET {base}/competition`.
pub struct MarketEndpoint {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl MarketEndpoint {
    pub fn new(client: reqwest::Client, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    fn base(&self) -> Result<&str, WorkerError> {
        self.base_url
            .as_deref()
            .ok_or(WorkerError::NotConfigured("market"))
    }
}

#[async_trait]
impl MarketSource for MarketEndpoint {
    async fn market_size(&self, condition: &str, region: &str) -> Result<MarketSize, WorkerError> {
        let url = format!("{}/market-size", self.base()?);
        get_json(
            &self.client,
            "IQVIA",
            &url,
            &[
                ("condition", condition.to_string()),
                ("region", region.to_string()),
            ],
        )
        .await
    }

    async fn competition(&self, condition: &str) -> Result<Competition, WorkerError> {
        let url = format!("{}/competition", self.base()?);
        get_json(
            &self.client,
            "Market Reports",
            &url,
            &[("condition", condition.to_string())],
        )
        .await
    }

    async fn pricing(&self, drug_name: &str, region: &str) -> Result<PricingData, WorkerError> {
        let url = format!("{}/pricing", self.base()?);
        get_json(
            &self.client,
            PRICING_SOURCE,
            &url,
            &[
                ("drug_name", drug_name.to_string()),
                ("region", region.to_string()),
            ],
        )
        .await
    }
}
