//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.repurpose.toml` files.

use crate::cli::{Args, OutputFormat};
use crate::dispatch::DispatchLimits;
use crate::error::ConfigError;
use crate::llm::OllamaConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".repurpose.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Dispatch settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// LLM collaborator settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// External data sources.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "repurpose_report.md".to_string()
}

/// Concurrency and per-task budget for worker dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum tasks running at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Budget for a single task, in seconds.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_seconds: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            task_timeout_seconds: default_task_timeout(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_task_timeout() -> u64 {
    300
}

/// Ollama settings for query decomposition and narrative synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// When false, keyword decomposition is used and no narrative is written.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ollama_url: default_ollama_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_llm_timeout() -> u64 {
    60
}

/// Endpoints of the data sources the workers call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// ClinicalTrials.gov API v2 base URL.
    #[serde(default = "default_clinical_trials_url")]
    pub clinical_trials_url: String,

    /// NCBI E-utilities base URL.
    #[serde(default = "default_pubmed_url")]
    pub pubmed_url: String,

    /// Patent search endpoint. The patent worker fails without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patent_url: Option<String>,

    /// Market data endpoint. The market worker fails without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_url: Option<String>,

    /// Timeout for each HTTP request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Maximum records fetched per source.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            clinical_trials_url: default_clinical_trials_url(),
            pubmed_url: default_pubmed_url(),
            patent_url: None,
            market_url: None,
            request_timeout_seconds: default_request_timeout(),
            max_results: default_max_results(),
        }
    }
}

fn default_clinical_trials_url() -> String {
    "https://clinicaltrials.gov/api/v2".to_string()
}

fn default_pubmed_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_results() -> usize {
    30
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Embed each worker's raw payload in its section.
    #[serde(default = "default_true")]
    pub include_payloads: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            include_payloads: true,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence, but only when given explicitly.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(concurrency) = args.concurrency {
            self.orchestrator.concurrency = concurrency;
        }
        if let Some(timeout) = args.timeout {
            self.orchestrator.task_timeout_seconds = timeout;
        }

        if let Some(ref model) = args.model {
            self.llm.model = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.llm.ollama_url = url.clone();
        }
        if args.no_llm {
            self.llm.enabled = false;
        }

        if let Some(format) = args.format {
            self.report.format = format;
        }
    }

    /// Validate the dispatch settings.
    pub fn dispatch_limits(&self) -> Result<DispatchLimits, ConfigError> {
        DispatchLimits::new(
            self.orchestrator.concurrency,
            Duration::from_secs(self.orchestrator.task_timeout_seconds),
        )
    }

    /// Connection settings for the Ollama collaborators.
    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            ollama_url: self.llm.ollama_url.clone(),
            model_name: self.llm.model.clone(),
            temperature: self.llm.temperature,
            timeout_seconds: self.llm.timeout_seconds,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.orchestrator.concurrency, 4);
        assert_eq!(config.orchestrator.task_timeout_seconds, 300);
        assert_eq!(config.llm.model, "llama3.2:latest");
        assert!(config.llm.enabled);
        assert_eq!(config.sources.clinical_trials_url, "https://clinicaltrials.gov/api/v2");
        assert!(config.sources.patent_url.is_none());
        assert_eq!(config.report.format, OutputFormat::Markdown);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "alzheimer.json"
verbose = true

[orchestrator]
concurrency = 2

[llm]
model = "mistral:7b"
temperature = 0.5

[sources]
patent_url = "http://localhost:8080"

[report]
format = "json"
include_payloads = false
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "alzheimer.json");
        assert!(config.general.verbose);
        assert_eq!(config.orchestrator.concurrency, 2);
        assert_eq!(config.orchestrator.task_timeout_seconds, 300);
        assert_eq!(config.llm.model, "mistral:7b");
        assert_eq!(config.llm.temperature, 0.5);
        assert_eq!(config.sources.patent_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.sources.max_results, 30);
        assert_eq!(config.report.format, OutputFormat::Json);
        assert!(!config.report.include_payloads);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator]\ntask_timeout_seconds = 45").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.orchestrator.task_timeout_seconds, 45);
        assert_eq!(config.orchestrator.concurrency, 4);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator]\nconcurrency = \"many\"").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_merge_with_args() {
        let args = Args::parse_from([
            "repurpose",
            "metformin for alzheimer",
            "--concurrency",
            "8",
            "--timeout",
            "20",
            "--no-llm",
            "--format",
            "json",
        ]);

        let mut config = Config::default();
        config.llm.model = "from-file".to_string();
        config.merge_with_args(&args);

        assert_eq!(config.orchestrator.concurrency, 8);
        assert_eq!(config.orchestrator.task_timeout_seconds, 20);
        assert!(!config.llm.enabled);
        assert_eq!(config.llm.model, "from-file");
        assert_eq!(config.report.format, OutputFormat::Json);
    }

    #[test]
    fn test_dispatch_limits_validated() {
        let mut config = Config::default();
        let limits = config.dispatch_limits().unwrap();
        assert_eq!(limits.concurrency(), 4);
        assert_eq!(limits.task_timeout(), Duration::from_secs(300));

        config.orchestrator.concurrency = 0;
        assert_eq!(config.dispatch_limits(), Err(ConfigError::ZeroConcurrency));

        config.orchestrator.concurrency = 1;
        config.orchestrator.task_timeout_seconds = 0;
        assert_eq!(config.dispatch_limits(), Err(ConfigError::ZeroTimeout));

        config.orchestrator.task_timeout_seconds = 30;
        config.orchestrator.concurrency = usize::MAX;
        assert!(matches!(
            config.dispatch_limits(),
            Err(ConfigError::ConcurrencyTooHigh { requested: usize::MAX, .. })
        ));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[orchestrator]"));
        assert!(toml_str.contains("[llm]"));
        assert!(toml_str.contains("[sources]"));
        assert!(toml_str.contains("format = \"markdown\""));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.orchestrator.concurrency, 4);
        assert!(reparsed.sources.market_url.is_none());
    }
}
