//! repurpose - multi-worker drug repurposing research
//!
//! A CLI tool that decomposes a research question, fans it out to
//! clinical, patent, market and literature workers, and writes one
//! merged report.
//!
//! Exit codes:
//!   0 - Success (risk below threshold, or no --fail-on-risk set)
//!   1 - Runtime error or failed run (config, nothing to research, etc.)
//!   2 - Overall risk at or above the --fail-on-risk threshold

mod analysis;
mod cli;
mod config;
mod decompose;
mod dispatch;
mod error;
mod llm;
mod models;
mod orchestrator;
mod report;
mod workers;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use llm::{DecompositionClient, Disabled, NarrativeClient, OllamaClient};
use orchestrator::{Orchestrator, RunState};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;
use workers::WorkerRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Read before logging starts so `[general] verbose` picks the level.
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(args.log_level(config.general.verbose))?;

    info!("repurpose v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    match run_research(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Research failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .repurpose.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set data source endpoints, limits, and the model.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Run one query end to end. Returns the exit code.
async fn run_research(args: Args, mut config: Config) -> Result<i32> {
    config.merge_with_args(&args);

    let query = args.query_text();

    // Limits are validated once, before anything runs.
    let limits = config
        .dispatch_limits()
        .context("Invalid [orchestrator] settings")?;
    let registry = WorkerRegistry::from_sources(&config.sources)?;

    let (decomposer, narrator): (Arc<dyn DecompositionClient>, Arc<dyn NarrativeClient>) =
        if config.llm.enabled {
            let client = Arc::new(
                OllamaClient::new(config.ollama_config())
                    .context("Failed to create Ollama client")?,
            );
            println!("🤖 LLM collaborator:");
            println!("   Model: {}", config.llm.model);
            println!("   Ollama: {}", config.llm.ollama_url);
            (
                client.clone() as Arc<dyn DecompositionClient>,
                client as Arc<dyn NarrativeClient>,
            )
        } else {
            println!("🤖 LLM disabled: keyword decomposition, no executive summary");
            (
                Arc::new(Disabled) as Arc<dyn DecompositionClient>,
                Arc::new(Disabled) as Arc<dyn NarrativeClient>,
            )
        };

    let mut orchestrator = Orchestrator::new(registry, limits, decomposer, narrator);
    if let Some(ref workers) = args.workers {
        orchestrator = orchestrator.with_allowed_workers(workers.iter().copied().collect());
    }
    if let Some(ref region) = args.region {
        orchestrator = orchestrator.with_region(region.trim());
    }

    println!("\n🔬 Researching: {}", query);
    println!(
        "   Concurrency: {} | Task timeout: {}s",
        limits.concurrency(),
        limits.task_timeout().as_secs()
    );

    let spinner = start_spinner(args.quiet);
    let run = orchestrator.run(query).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    println!("\n📝 Generating report...");
    let report = report::build_report(&run, config.report.include_payloads);
    let output = match config.report.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    let output_path = Path::new(&config.general.output);
    std::fs::write(output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    if run.state == RunState::Failed {
        eprintln!(
            "\n❌ Run failed: {}",
            run.error.as_deref().unwrap_or("unknown error")
        );
        println!("   Report saved to: {}", output_path.display());
        return Ok(1);
    }

    if let Some(ref result) = run.aggregate {
        println!("\n📊 Research Summary:");
        for line in analysis::summary_text(result).lines() {
            println!("   {}", line);
        }
    }
    println!(
        "   Duration: {:.1}s",
        run.duration_seconds().unwrap_or_default()
    );
    println!(
        "\n✅ Research complete! Report saved to: {}",
        output_path.display()
    );

    // Check --fail-on-risk threshold
    if let (Some(threshold), Some(result)) = (args.fail_on_risk, run.aggregate.as_ref()) {
        if threshold.is_reached_by(result.risk.overall) {
            eprintln!(
                "\n⛔ Overall risk is {} (threshold {:?}). Failing (exit code 2).",
                result.risk.overall, threshold
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Spinner shown while the run is in flight.
fn start_spinner(quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    match ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        Ok(style) => pb.set_style(style),
        Err(e) => debug!("Falling back to default spinner style: {}", e),
    }
    pb.set_message("Running workers...");
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

/// Load configuration from file or use defaults.
///
/// Runs before the tracing subscriber exists, so problems go to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load {}: {:#}. Using defaults.", CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}
