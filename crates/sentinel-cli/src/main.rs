use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sentinel_core::{detect, EvidenceChunk, EvidenceGate};
use sentinel_runtime::{
    AskResponse, LlmProvider, PipelineOrchestrator, PipelineRequest, ProviderRegistry,
    RuntimeConfig, ScriptedProvider, StaticRetriever,
};

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Grounded answers to policy questions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over a pre-retrieved evidence file
    Ask {
        #[arg(long, short)]
        question: String,

        /// JSON array of chunks, or an object with a `chunks` array
        #[arg(long, short)]
        evidence: PathBuf,

        #[arg(long, short)]
        config: Option<PathBuf>,

        #[arg(long)]
        top_k: Option<usize>,

        /// Overrides `model.chat_model`
        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        trace_id: Option<String>,

        /// Use a provider with no output, so every stage falls back
        #[arg(long)]
        offline: bool,

        /// Print the full request-boundary response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the evidence gate decision
    Gate {
        #[arg(long, short)]
        evidence: PathBuf,

        #[arg(long)]
        min_chunks: Option<usize>,

        #[arg(long)]
        min_score: Option<f64>,
    },

    /// Print the cross-source conflict assessment
    Conflicts {
        #[arg(long, short)]
        evidence: PathBuf,
    },

    /// Validate and print the effective configuration
    Config {
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ask {
            question,
            evidence,
            config,
            top_k,
            model,
            trace_id,
            offline,
            json,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(model) = model {
                config.model.chat_model = model;
            } else if offline && config.model.chat_model.trim().is_empty() {
                config.model.chat_model = "offline".to_string();
            }

            let provider: Arc<dyn LlmProvider> = if offline {
                Arc::new(ScriptedProvider::offline())
            } else {
                ProviderRegistry::with_defaults()
                    .create(&config.provider.provider_type, &config.provider.settings)
                    .context("Failed to create provider")?
            };
            let retriever = StaticRetriever::from_json_file(&evidence)
                .with_context(|| format!("Failed to load evidence from {}", evidence.display()))?;

            let orchestrator = PipelineOrchestrator::builder()
                .provider(provider)
                .retriever(Arc::new(retriever))
                .config(config)
                .build()
                .context("Failed to build pipeline")?;

            let mut request = PipelineRequest::new(question);
            request.top_k = top_k;
            request.trace_id = trace_id;
            let result = orchestrator.process_request(request).await;
            let response = AskResponse::from(&result);

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
        }

        Commands::Gate {
            evidence,
            min_chunks,
            min_score,
        } => {
            let chunks = load_chunks(&evidence)?;
            let defaults = EvidenceGate::default();
            let gate = EvidenceGate::new(
                min_chunks.unwrap_or(defaults.min_chunks),
                min_score.unwrap_or(defaults.min_score),
            );
            println!("{}", serde_json::to_string_pretty(&gate.check(&chunks))?);
        }

        Commands::Conflicts { evidence } => {
            let chunks = load_chunks(&evidence)?;
            println!("{}", serde_json::to_string_pretty(&detect(&chunks))?);
        }

        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            config.validate().context("Invalid configuration")?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}

/// YAML file (or defaults), then environment overrides.
fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let mut config = match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)?,
        None => RuntimeConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

fn load_chunks(path: &Path) -> Result<Vec<EvidenceChunk>> {
    let retriever = StaticRetriever::from_json_file(path)
        .with_context(|| format!("Failed to load evidence from {}", path.display()))?;
    if retriever.chunks().iter().any(|c| !c.score.is_finite()) {
        bail!("Evidence in {} contains a non-finite score", path.display());
    }
    Ok(retriever.chunks().to_vec())
}

fn print_response(response: &AskResponse) {
    println!("Status: {}", response.status.as_str());
    if let Some(reason) = &response.gating_reason {
        println!("Reason: {}", reason);
    }
    println!("Confidence: {:.2}", response.confidence);
    println!();
    println!("{}", response.answer);

    if !response.action_items.is_empty() {
        println!();
        println!("Action items:");
        for item in &response.action_items {
            println!("  - {}", item);
        }
    }

    if !response.citations.is_empty() {
        println!();
        println!("Citations:");
        for citation in &response.citations {
            match citation.page {
                Some(page) => println!("  - {} p.{}", citation.source, page),
                None => println!("  - {}", citation.source),
            }
        }
    }

    println!();
    println!("Trace {}:", response.trace_id);
    for entry in &response.agent_trace {
        println!(
            "  {}. {} [{}] {}ms risk={}",
            entry.execution_order,
            entry.agent_name,
            entry.status,
            entry.latency_ms,
            entry.risk_flag.as_str()
        );
    }
}
