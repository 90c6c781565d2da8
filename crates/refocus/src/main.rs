//! Run coding agents with focus-based context compression.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # One task, focus strategy, in a scratch copy of the project
//! refocus run --task "Fix the off-by-one in src/range.rs" --workdir ./project --scratch
//!
//! # Baseline strategy, trajectory written for plotting
//! refocus run --task-file task.md --strategy baseline --trajectory-out run.json
//!
//! # Every task in a list under both strategies, 8 runs at a time
//! refocus compare --tasks tasks.json --concurrency 8 --out comparison.json
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use refocus::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Run coding agents with focus-based context compression.
#[derive(Parser)]
#[command(name = "refocus", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run one task under one strategy.
    Run(RunArgs),
    /// Run every task in a list under both strategies.
    Compare(CompareArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Task text.
    #[arg(long, conflicts_with = "task_file", required_unless_present = "task_file")]
    task: Option<String>,

    /// Read the task text from a file.
    #[arg(long)]
    task_file: Option<PathBuf>,

    /// Workspace directory.
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Work on a temporary copy of the workspace instead of in place.
    #[arg(long)]
    scratch: bool,

    #[arg(long, value_enum, default_value_t = StrategyArg::Focus)]
    strategy: StrategyArg,

    /// Write the RunResult (with trajectory) as JSON to this path.
    #[arg(long)]
    trajectory_out: Option<PathBuf>,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args)]
struct CompareArgs {
    /// JSON file: `[{"id": ..., "prompt": ..., "workdir": ...}]`.
    #[arg(long)]
    tasks: PathBuf,

    /// Runs in flight at once.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Write the comparison JSON here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args)]
struct ModelArgs {
    /// Model to use for completions.
    #[arg(long, default_value = refocus::DEFAULT_MODEL)]
    model: String,

    /// Inference calls before giving up.
    #[arg(long, default_value_t = 200)]
    max_steps: usize,

    /// Maximum tokens per model response.
    #[arg(long, default_value_t = 4096)]
    max_tokens: u32,

    #[arg(long, default_value_t = 0.0)]
    temperature: f32,

    /// Wall-clock limit per run.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Transport retries per inference call.
    #[arg(long, default_value_t = 3)]
    retries: u32,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Baseline,
    Focus,
}

impl From<StrategyArg> for StrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Baseline => StrategyKind::Baseline,
            StrategyArg::Focus => StrategyKind::Focus,
        }
    }
}

impl ModelArgs {
    fn run_config(&self, strategy: StrategyKind) -> RunConfig {
        let config = RunConfig::for_strategy(strategy, &self.model)
            .with_max_steps(self.max_steps)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);
        match self.timeout_secs {
            Some(secs) => config.with_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }

    fn client(&self) -> Retrying<OpenRouterClient> {
        let api_key = match std::env::var("OPENROUTER_KEY") {
            Ok(key) => key,
            Err(_) => fail("OPENROUTER_KEY environment variable is not set"),
        };
        let client = match OpenRouterClient::new(api_key) {
            Ok(c) => c,
            Err(e) => fail(&format!("failed to create API client: {e}")),
        };
        Retrying::new(client, RetryConfig::with_retries(self.retries))
    }
}

// ── Comparison file types ──────────────────────────────────────────

#[derive(Deserialize)]
struct TaskEntry {
    id: String,
    prompt: String,
    /// Seed directory copied for each run. Runs start empty without one.
    #[serde(default)]
    workdir: Option<PathBuf>,
}

#[derive(Serialize)]
struct Comparison {
    generated_at: String,
    model: String,
    runs: Vec<ComparedRun>,
}

#[derive(Serialize)]
struct ComparedRun {
    task_id: String,
    strategy: StrategyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<RunResult>,
    /// Set when the workspace could not be prepared.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// ── Commands ───────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Compare(args) => compare(args).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "refocus=debug" } else { "refocus=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(args: RunArgs) {
    let task = match (&args.task, &args.task_file) {
        (Some(task), _) => task.clone(),
        (None, Some(path)) => match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => fail(&format!("failed to read task file {}: {e}", path.display())),
        },
        (None, None) => fail("either --task or --task-file is required"),
    };

    let provider: Box<dyn WorkspaceProvider> = if args.scratch {
        Box::new(ScratchCopy::of(&args.workdir))
    } else {
        Box::new(ExistingDir::new(&args.workdir))
    };
    let workspace = match provider.prepare() {
        Ok(ws) => ws,
        Err(e) => fail(&e.to_string()),
    };

    let client = args.model.client();
    let config = args.model.run_config(args.strategy.into());
    let tools = config.build_tool_set(workspace.path());

    let result = RunLoop::new(&client, &tools, config)
        .with_event_handler(&LoggingHandler)
        .run(&task, workspace.path())
        .await;

    print_summary(&result);
    if let Some(path) = &args.trajectory_out {
        write_json(path, &result);
        info!("Wrote run result to {}", path.display());
    }
    if !result.success {
        process::exit(2);
    }
}

async fn compare(args: CompareArgs) {
    let tasks: Vec<TaskEntry> = match std::fs::read_to_string(&args.tasks)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
    {
        Ok(tasks) => tasks,
        Err(e) => fail(&format!("failed to load {}: {e}", args.tasks.display())),
    };

    let client = args.model.client();
    let jobs: Vec<(&TaskEntry, StrategyKind)> = tasks
        .iter()
        .flat_map(|task| [(task, StrategyKind::Baseline), (task, StrategyKind::Focus)])
        .collect();
    info!(
        "Comparing {} task(s), {} run(s), concurrency={}",
        tasks.len(),
        jobs.len(),
        args.concurrency
    );

    let model = &args.model;
    let client = &client;
    let runs = run_pool(
        jobs,
        PoolConfig::with_concurrency(args.concurrency),
        |(task, strategy)| async move {
            let provider = match &task.workdir {
                Some(dir) => ScratchCopy::of(dir),
                None => ScratchCopy::empty(),
            };
            let workspace = match prepare_blocking(provider).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("Task {} ({strategy}): {e}", task.id);
                    return ComparedRun {
                        task_id: task.id.clone(),
                        strategy,
                        result: None,
                        error: Some(e.to_string()),
                    };
                }
            };

            let config = model.run_config(strategy);
            let tools = config.build_tool_set(workspace.path());
            let result = RunLoop::new(client, &tools, config)
                .with_event_handler(&LoggingHandler)
                .run(&task.prompt, workspace.path())
                .await;
            info!(
                "Task {} ({strategy}): {} in {} step(s), {} token(s)",
                task.id,
                result.outcome,
                result.metrics.inference_calls,
                result.metrics.total_tokens()
            );

            ComparedRun {
                task_id: task.id.clone(),
                strategy,
                result: Some(result),
                error: None,
            }
        },
    )
    .await;

    let comparison = Comparison {
        generated_at: chrono::Utc::now().to_rfc3339(),
        model: args.model.model.clone(),
        runs,
    };
    match &args.out {
        Some(path) => {
            write_json(path, &comparison);
            info!("Wrote comparison to {}", path.display());
        }
        None => match serde_json::to_string_pretty(&comparison) {
            Ok(json) => println!("{json}"),
            Err(e) => fail(&format!("failed to serialize comparison: {e}")),
        },
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn print_summary(result: &RunResult) {
    let m = &result.metrics;
    println!("Outcome:      {} (trace {})", result.outcome, result.trace_id);
    println!("Steps:        {} inference, {} action", m.inference_calls, m.action_calls);
    println!("Tokens:       {} in / {} out", m.input_tokens, m.output_tokens);
    println!(
        "Compressions: {} ({} turns discarded, {} knowledge entries)",
        m.compressions, m.turns_discarded, m.knowledge_entries
    );
    println!("Buffer:       {} turns at end", m.final_buffer_len);
    println!("Cost:         ${:.4}", m.estimated_cost_usd);
    println!("Wall clock:   {:.1}s", m.wall_clock_secs);
    if let Some(error) = &result.error {
        println!("Error:        {error}");
    }
    if !result.final_text.is_empty() {
        println!("\n{}", result.final_text);
    }
}

fn write_json(path: &Path, value: &impl Serialize) {
    let json = match serde_json::to_string_pretty(value) {
        Ok(json) => json,
        Err(e) => fail(&format!("failed to serialize: {e}")),
    };
    if let Err(e) = std::fs::write(path, json) {
        fail(&format!("failed to write {}: {e}", path.display()));
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    process::exit(1);
}
