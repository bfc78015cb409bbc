//! Ollama chat API client.
//!
//! Both collaborators ask for JSON output (`"format": "json"`) and parse
//! the message content leniently: code fences and surrounding prose are
//! stripped before decoding.

use super::{DecompositionClient, NarrativeBrief, NarrativeClient};
use crate::error::CollaboratorError;
use crate::models::{Decomposition, DecompositionMethod, Narrative, WorkerKind, PARAM_REGION};
use crate::workers::market::DEFAULT_REGION;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection settings for the Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.2,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

pub struct OllamaClient {
    config: OllamaConfig,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, CollaboratorError> {
        info!(
            "Using Ollama model {} at {}",
            config.model_name, config.ollama_url
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CollaboratorError::Request(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Send a two-message chat and return the assistant's content.
    async fn chat(&self, system: &str, user: &str) -> Result<String, CollaboratorError> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: self.config.model_name.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            stream: false,
            format: Some("json"),
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollaboratorError::Timeout(self.config.timeout_seconds)
                } else if e.is_connect() {
                    CollaboratorError::Connect(self.config.ollama_url.clone())
                } else {
                    CollaboratorError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api { status, body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Unparsable(e.to_string()))?;

        debug!("Ollama replied with {} chars", chat_response.message.content.len());
        Ok(chat_response.message.content)
    }
}

#[async_trait]
impl DecompositionClient for OllamaClient {
    async fn decompose(&self, query: &str) -> Result<Decomposition, CollaboratorError> {
        let content = self.chat(DECOMPOSITION_SYSTEM_PROMPT, query).await?;
        parse_decomposition(&content)
    }
}

#[async_trait]
impl NarrativeClient for OllamaClient {
    async fn narrate(&self, brief: &NarrativeBrief) -> Result<Narrative, CollaboratorError> {
        let content = self.chat(NARRATIVE_SYSTEM_PROMPT, &brief.to_prompt()).await?;
        parse_narrative(&content)
    }
}

/// The outermost `{...}` in a model reply.
fn json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (start < end).then(|| &content[start..=end])
}

fn non_empty(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Decode a decomposition reply.
///
/// A missing worker list means every worker. An unknown worker tag or a
/// missing condition rejects the whole reply, and the caller falls back
/// to keyword decomposition.
pub fn parse_decomposition(content: &str) -> Result<Decomposition, CollaboratorError> {
    let json = json_object(content)
        .ok_or_else(|| CollaboratorError::Unparsable("no JSON object in reply".to_string()))?;
    let value: Value =
        serde_json::from_str(json).map_err(|e| CollaboratorError::Unparsable(e.to_string()))?;

    let condition = non_empty(&value["condition"])
        .ok_or_else(|| CollaboratorError::Unparsable("missing condition".to_string()))?;

    let workers = value
        .get("required_workers")
        .or_else(|| value.get("required_agents"))
        .and_then(Value::as_array);

    let required_workers: BTreeSet<WorkerKind> = match workers {
        Some(tags) if !tags.is_empty() => tags
            .iter()
            .map(|tag| {
                tag.as_str()
                    .ok_or_else(|| CollaboratorError::Unparsable(format!("bad worker tag {}", tag)))?
                    .parse::<WorkerKind>()
                    .map_err(|e| CollaboratorError::Unparsable(e.to_string()))
            })
            .collect::<Result<_, _>>()?,
        _ => WorkerKind::ALL.into_iter().collect(),
    };

    let mut parameters: BTreeMap<String, String> = value["parameters"]
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| non_empty(v).map(|v| (k.clone(), v)))
                .collect()
        })
        .unwrap_or_default();
    parameters
        .entry(PARAM_REGION.to_string())
        .or_insert_with(|| DEFAULT_REGION.to_string());

    Ok(Decomposition {
        condition,
        drug_name: non_empty(&value["drug_name"]),
        analysis_type: non_empty(&value["analysis_type"]).unwrap_or_else(|| "repurposing".to_string()),
        required_workers,
        parameters,
        method: DecompositionMethod::Llm,
    })
}

/// Decode a narrative reply. Plain prose is accepted as the summary.
pub fn parse_narrative(content: &str) -> Result<Narrative, CollaboratorError> {
    if let Some(json) = json_object(content) {
        match serde_json::from_str::<Value>(json) {
            Ok(value) => {
                if let Some(summary) = non_empty(&value["executive_summary"]) {
                    return Ok(Narrative {
                        executive_summary: summary,
                        recommendation: non_empty(&value["recommendation"]),
                    });
                }
            }
            Err(e) => warn!("Narrative reply is not valid JSON: {}", e),
        }
    }

    let text = content.trim();
    if text.is_empty() || text.starts_with('{') {
        return Err(CollaboratorError::Unparsable(
            "reply has no executive summary".to_string(),
        ));
    }
    Ok(Narrative {
        executive_summary: text.to_string(),
        recommendation: None,
    })
}

const DECOMPOSITION_SYSTEM_PROMPT: &str = r#"You are an expert in drug repurposing research.
Analyze the user's query and extract:
1. The medical condition or disease
2. The drug name, if one is mentioned
3. The type of analysis needed
4. Which workers should be involved: clinical, patent, market, literature

Respond with a single JSON object and nothing else:
{"condition": "...", "drug_name": "... or null", "analysis_type": "repurposing", "required_workers": ["clinical", "patent", "market", "literature"], "parameters": {"region": "Global"}}"#;

const NARRATIVE_SYSTEM_PROMPT: &str = r#"You are a pharmaceutical strategy analyst writing for executives.
Use only the facts you are given. Do not invent numbers.

Respond with a single JSON object and nothing else:
{"executive_summary": "3-4 sentences", "recommendation": "one sentence"}"#;
