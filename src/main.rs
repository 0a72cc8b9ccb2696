use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use insight_engine::dataset::{loader, InMemoryDatasetStore};
use insight_engine::llm::{LanguageModel, OpenAiClient};
use insight_engine::retrieval::{knowledge, Embedder, HashingEmbedder, InMemoryVectorIndex, OpenAiEmbedder, VectorIndex};
use insight_engine::{AnswerResponse, EngineConfig, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Parser)]
#[command(name = "insight")]
#[command(about = "Answer business questions about tabular data")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one question
    Ask {
        /// The question in natural language
        query: String,

        #[command(flatten)]
        sources: Sources,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the dataset, knowledge index and language model
    Ready {
        #[command(flatten)]
        sources: Sources,
    },
}

#[derive(clap::Args)]
struct Sources {
    /// CSV or Parquet tables; the first one is the primary table
    #[arg(short, long = "data", required = true)]
    data: Vec<PathBuf>,

    /// Plain-text knowledge file; paragraphs become retrieval chunks and `[kind]` lines label them
    #[arg(short, long)]
    knowledge: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Ask { query, sources, json } => {
            if config.provider.api_key.is_none() {
                bail!("OPENAI_API_KEY is not set; a language model is required to answer questions");
            }
            let orchestrator = build(&sources, &config).await?;
            let response = orchestrator.handle(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_answer(&response);
            }
        }
        Command::Ready { sources } => {
            let orchestrator = build(&sources, &config).await?;
            let report = orchestrator.readiness().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

async fn build(sources: &Sources, config: &EngineConfig) -> Result<Orchestrator> {
    let mut tables = Vec::with_capacity(sources.data.len());
    for path in &sources.data {
        tables.push(loader::load_table(path).with_context(|| format!("loading {}", path.display()))?);
    }
    let primary = match tables.first() {
        Some((name, _)) => name.clone(),
        None => bail!("at least one --data table is required"),
    };
    let store = Arc::new(InMemoryDatasetStore::new(&primary, tables)?);

    let embedder: Arc<dyn Embedder> = match &config.provider.api_key {
        Some(key) => Arc::new(OpenAiEmbedder::new(
            key.clone(),
            config.provider.base_url.clone(),
            EMBEDDING_MODEL.to_string(),
            config.retrieval.timeout,
        )),
        None => Arc::new(HashingEmbedder::default()),
    };
    let index: Arc<dyn VectorIndex> = match &sources.knowledge {
        Some(path) => Arc::new(
            knowledge::index_file(path, embedder.as_ref())
                .await
                .with_context(|| format!("indexing {}", path.display()))?,
        ),
        None => {
            info!("No knowledge file given, retrieval will return no context");
            Arc::new(InMemoryVectorIndex::new(embedder.dimension()))
        }
    };

    let model: Arc<dyn LanguageModel> = match OpenAiClient::from_config(&config.provider, config.synthesis.timeout) {
        Some(client) => Arc::new(client),
        None => Arc::new(OpenAiClient::new(
            String::new(),
            config.provider.base_url.clone(),
            config.provider.model.clone(),
            config.synthesis.timeout,
        )),
    };

    Ok(Orchestrator::from_config(store, index, embedder, model, config))
}

fn print_answer(response: &AnswerResponse) {
    if let Some(query_type) = &response.query_type {
        println!("[{}]", query_type);
    }
    println!("{}", response.narrative);
    if let Some(data) = &response.data {
        println!("\n{}", insight_engine::synthesis::narrative::render_for_prompt(data));
    }
    for chart in &response.visualizations {
        println!("\nchart: {:?} \"{}\" ({} series)", chart.chart_type, chart.title, chart.datasets.len());
    }
}
