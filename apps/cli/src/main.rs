use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use taskforge_core::WorkflowIr;
use taskforge_executor::{DagExecutor, NullToolRegistry};
use taskforge_guard::ToolSchemas;
use taskforge_model_provider::{resolve_llm_endpoint, OpenAiCompatibleClient};
use taskforge_planner::{Planner, PlannerConfig};
use taskforge_retriever::{OpenAiEmbeddingClient, RetrieverMode, ToolCatalog};

#[derive(Parser)]
#[command(name = "taskforge", about = "Plan a task into a workflow DAG, or execute one")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Turn a natural-language task into a validated, guard-injected workflow IR.
    Plan {
        /// The task description to plan.
        task: String,
        /// Path to a JSON file holding the available tool catalog ({name: {description, input_schema}}).
        #[arg(long)]
        tools: PathBuf,
        /// Where to write the resulting workflow IR as JSON. Defaults to stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Execute a previously planned workflow IR against a (currently null) tool registry.
    Run {
        /// Path to a workflow IR JSON file ({nodes, edges}).
        workflow: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn load_tool_catalog(path: &PathBuf) -> Result<ToolCatalog> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading tool catalog at {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing tool catalog at {}", path.display()))
}

fn load_workflow_ir(path: &PathBuf) -> Result<WorkflowIr> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading workflow IR at {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing workflow IR at {}", path.display()))
}

async fn run_plan(task: String, tools_path: PathBuf, out: Option<PathBuf>) -> Result<()> {
    let tools_definition = load_tool_catalog(&tools_path)?;

    let endpoint = resolve_llm_endpoint(None);
    let model = endpoint.model.clone();
    let client = OpenAiCompatibleClient::shared(endpoint);

    let config = PlannerConfig::from_env();
    let retriever_mode = RetrieverMode::from_env();
    let embedding_provider = match retriever_mode {
        RetrieverMode::Semantic => OpenAiEmbeddingClient::from_env().map(|c| Arc::new(c) as Arc<dyn taskforge_retriever::EmbeddingProvider>),
        RetrieverMode::Bm25 => None,
    };
    let embedding_cache_path = std::env::var("EMBEDDING_CACHE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".taskforge/embedding_cache.json"));

    let planner = Planner::new(
        client,
        model,
        tools_definition,
        config,
        retriever_mode,
        embedding_provider,
        embedding_cache_path,
        Some(tools_path),
    );

    let (ir, last_run) = planner.plan(&task).await?;
    let serialized = serde_json::to_string_pretty(&ir)?;

    match out {
        Some(path) => {
            std::fs::write(&path, &serialized).with_context(|| format!("writing workflow IR to {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote workflow IR");
        }
        None => println!("{serialized}"),
    }

    if let Some(queries) = last_run.stage1_missing_tool_queries.get(0) {
        tracing::info!(example_missing_capability = %queries, "planner flagged capability gaps during drafting");
    }

    Ok(())
}

async fn run_execute(workflow_path: PathBuf) -> Result<()> {
    let ir = load_workflow_ir(&workflow_path)?;

    let registry = Arc::new(NullToolRegistry);
    let tool_schemas: ToolSchemas = HashMap::new();
    let executor = DagExecutor::new(registry, tool_schemas);

    let (state, trace) = executor.run(&ir).await;

    let result = serde_json::json!({
        "outputs": state.outputs,
        "error": state.error,
        "trace": trace,
    });
    println!("{}", serde_json::to_string_pretty(&result)?);

    if state.error.is_some() {
        std::process::exit(1);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Plan { task, tools, out } => run_plan(task, tools, out).await,
        Command::Run { workflow } => run_execute(workflow).await,
    }
}
