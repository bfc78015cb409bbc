//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::{RiskBucket, WorkerKind};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// repurpose - multi-worker drug repurposing research
///
/// Fans a research question out to clinical, patent, market and
/// literature workers and merges their results into one report.
///
/// Examples:
///   repurpose "Can metformin be repurposed for Alzheimer's?"
///   repurpose "imatinib for asthma" --workers clinical,literature --format json
///   repurpose "metformin market in diabetes" --region Europe --no-llm
///   repurpose "atorvastatin for cancer" --fail-on-risk high
///   repurpose --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Free-text research question
    #[arg(value_name = "QUERY", required_unless_present = "init_config")]
    pub query: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .repurpose.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Maximum number of workers running at once
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Per-task timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Ollama model used for decomposition and summaries
    #[arg(short, long, env = "REPURPOSE_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Skip the LLM: keyword decomposition, no executive summary
    #[arg(long)]
    pub no_llm: bool,

    /// Only run these workers (comma-separated)
    ///
    /// Example: --workers clinical,patent
    #[arg(long, value_name = "WORKERS", value_delimiter = ',')]
    pub workers: Option<Vec<WorkerKind>>,

    /// Market region passed to the market worker
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,

    /// Fail if the overall risk is at or above this level
    ///
    /// Useful in pipelines. Exit code 2 when the threshold is reached.
    #[arg(long, value_name = "LEVEL")]
    pub fail_on_risk: Option<FailOnRisk>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .repurpose.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Risk level for --fail-on-risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnRisk {
    Low,
    Moderate,
    High,
}

impl FailOnRisk {
    /// Whether an overall risk bucket reaches this threshold.
    ///
    /// An unassessed run never does.
    pub fn is_reached_by(self, overall: RiskBucket) -> bool {
        let threshold = match self {
            FailOnRisk::Low => RiskBucket::Low,
            FailOnRisk::Moderate => RiskBucket::Moderate,
            FailOnRisk::High => RiskBucket::High,
        };
        overall.is_assessed() && overall >= threshold
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The trimmed query, empty when absent.
    pub fn query_text(&self) -> &str {
        self.query.as_deref().unwrap_or("").trim()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.query_text().is_empty() {
            return Err("Query must not be empty".to_string());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let Some(ref workers) = self.workers {
            if workers.is_empty() {
                return Err("--workers needs at least one worker".to_string());
            }
        }

        if let Some(ref region) = self.region {
            if region.trim().is_empty() {
                return Err("Region must not be empty".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `--quiet` wins over a config file asking for verbose output.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
