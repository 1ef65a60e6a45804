//! Benchmark driver CLI: runs the agent over a task collection, or serves
//! the tool server standalone so several runs can share its worker pools.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use querybench::config::{load_config, BenchConfig};
use querybench::model::{
    ModelClient, ModelConfig, OpenAiCompatClient, RetryPolicy, RetryingModel, SamplingParams,
};
use querybench::prompt;
use querybench::server::{serve, HttpToolClient, ToolDispatch, ToolServer, ToolServerConfig};
use querybench::task::load_tasks;
use querybench::tools::{
    DocumentListTool, DocumentReadTool, ExecutionLimits, PlanTool, SqlTool, ToolRegistry,
    WarehouseConfig,
};
use querybench::{ResultStore, RolloutConfig, RolloutManager, SessionConfig};

#[derive(Parser, Debug)]
#[command(
    name = "querybench",
    version,
    about = "Benchmark harness for LLM-driven data-analysis agents"
)]
struct Cli {
    /// Path to the TOML credentials/config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the standalone tool server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Root directory of task documents
        #[arg(long)]
        documents: Option<PathBuf>,
        #[arg(long)]
        workers_per_tool: Option<usize>,
    },
    /// Run the benchmark over a task collection
    Run {
        /// Ordered task collection (JSON array or JSON lines)
        #[arg(long)]
        tasks: PathBuf,
        /// Directory receiving one result file per (task, rollout)
        #[arg(long)]
        output: PathBuf,
        /// File holding the system prompt; built-in prompt when omitted
        #[arg(long)]
        system_prompt: Option<PathBuf>,
        /// Root directory of task documents
        #[arg(long)]
        documents: Option<PathBuf>,
        /// Base URL of an external tool server; in-process pools when omitted
        #[arg(long)]
        tool_server: Option<String>,
        #[arg(long, short = 'm')]
        model: Option<String>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        top_p: Option<f32>,
        #[arg(long)]
        max_output_tokens: Option<u32>,
        #[arg(long, default_value_t = 15)]
        max_rounds: usize,
        #[arg(long, default_value_t = 8)]
        num_threads: usize,
        #[arg(long, default_value_t = 1)]
        rollout_number: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("loading config")?;

    match cli.command {
        Command::Serve {
            host,
            port,
            documents,
            workers_per_tool,
        } => run_serve(config, host, port, documents, workers_per_tool).await,
        Command::Run {
            tasks,
            output,
            system_prompt,
            documents,
            tool_server,
            model,
            temperature,
            top_p,
            max_output_tokens,
            max_rounds,
            num_threads,
            rollout_number,
        } => {
            run_benchmark(RunArgs {
                config,
                tasks,
                output,
                system_prompt,
                documents,
                tool_server,
                model,
                temperature,
                top_p,
                max_output_tokens,
                max_rounds,
                num_threads,
                rollout_number,
            })
            .await
        }
    }
}

fn build_registry(config: &BenchConfig, documents: Option<&Path>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    if let Some(base_url) = &config.warehouse.base_url {
        registry.register(Arc::new(SqlTool::new(
            WarehouseConfig {
                base_url: base_url.clone(),
                token: config.warehouse.token.clone().unwrap_or_default(),
                role: config.warehouse.role.clone(),
                warehouse: config.warehouse.warehouse.clone(),
                statement_timeout_secs: config.warehouse.statement_timeout_secs,
            },
            None,
        )));
    } else {
        log::warn!("no warehouse configured; execute_sql is unavailable");
    }

    if let Some(root) = documents {
        registry.register(Arc::new(DocumentReadTool::new(root)));
        registry.register(Arc::new(DocumentListTool::new(root)));
    }

    registry.register(Arc::new(PlanTool));
    registry
}

fn build_tool_server(config: &BenchConfig, registry: ToolRegistry) -> ToolServer {
    ToolServer::new(
        registry,
        ToolServerConfig {
            workers_per_tool: config.server.workers_per_tool,
            worker_overrides: HashMap::new(),
            queue_limit: config.server.queue_limit,
            limits: ExecutionLimits {
                timeout: Duration::from_secs(config.server.tool_timeout_secs),
                max_output_chars: config.server.max_output_chars,
            },
        },
    )
}

async fn run_serve(
    mut config: BenchConfig,
    host: Option<String>,
    port: Option<u16>,
    documents: Option<PathBuf>,
    workers_per_tool: Option<usize>,
) -> anyhow::Result<()> {
    if let Some(workers) = workers_per_tool {
        config.server.workers_per_tool = workers;
    }
    let registry = build_registry(&config, documents.as_deref());
    let server = Arc::new(build_tool_server(&config, registry));

    let addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| config.server.host.clone()),
        port.unwrap_or(config.server.port)
    );
    serve(server, &addr)
        .await
        .with_context(|| format!("tool server failed to start on {addr}"))
}

struct RunArgs {
    config: BenchConfig,
    tasks: PathBuf,
    output: PathBuf,
    system_prompt: Option<PathBuf>,
    documents: Option<PathBuf>,
    tool_server: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_output_tokens: Option<u32>,
    max_rounds: usize,
    num_threads: usize,
    rollout_number: usize,
}

async fn run_benchmark(args: RunArgs) -> anyhow::Result<()> {
    let tasks = load_tasks(&args.tasks)
        .with_context(|| format!("reading task collection {}", args.tasks.display()))?;
    log::info!("loaded {} tasks from {}", tasks.len(), args.tasks.display());

    let registry = build_registry(&args.config, args.documents.as_deref());
    let system_prompt = match &args.system_prompt {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading system prompt {}", path.display()))?,
        None => prompt::system_prompt(&registry),
    };

    let tools: Arc<dyn ToolDispatch> = match &args.tool_server {
        Some(base_url) => {
            // Client timeout padded past the server-side tool timeout.
            let timeout = args.config.server.tool_timeout_secs + 30;
            Arc::new(HttpToolClient::new(base_url.clone(), Some(timeout))?)
        }
        None => Arc::new(build_tool_server(&args.config, registry)),
    };

    let sampling = SamplingParams {
        model: args
            .model
            .unwrap_or_else(|| args.config.model.model.clone()),
        temperature: args.temperature,
        top_p: args.top_p,
        max_output_tokens: args.max_output_tokens,
    };
    let client = OpenAiCompatClient::new(ModelConfig {
        api_key: args.config.model.api_key.clone().unwrap_or_default(),
        base_url: args.config.model.base_url.clone(),
        sampling,
        timeout_seconds: Some(args.config.model.timeout_seconds),
    })?;
    let model: Arc<dyn ModelClient> =
        Arc::new(RetryingModel::new(Box::new(client), RetryPolicy::defaults()));

    let store = ResultStore::new(&args.output)
        .with_context(|| format!("preparing output directory {}", args.output.display()))?;
    let manager = RolloutManager::new(
        model,
        tools,
        store,
        RolloutConfig {
            num_threads: args.num_threads,
            rollout_number: args.rollout_number,
            session: SessionConfig {
                max_rounds: args.max_rounds,
                system_prompt,
            },
        },
    );

    let summary = manager.run(&tasks).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
