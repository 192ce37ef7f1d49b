use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use dagrun::config::Config;
use dagrun::core::{ExecutionPlanner, Subtask, SubtaskGraph};
use dagrun::orchestration::{Orchestrator, SimulatedExecutor, SubtaskExecutor};
use dagrun::{dlog, Error, Result};

/// Dagrun - dependency-aware subtask planning and execution engine
#[derive(Parser, Debug)]
#[command(name = "dagrun")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    DAGRUN_DEBUG=1    Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.dagrun/dagrun.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Planning and execution commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Level a subtask file into an execution plan without running it
    Plan {
        /// Path to a JSON file holding an array of subtasks
        file: PathBuf,
    },

    /// Plan and execute a subtask file with the simulated executor
    Run {
        /// Path to a JSON file holding an array of subtasks
        file: PathBuf,

        /// Override the configured within-level parallelism bound
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Override the configured per-subtask timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Simulate a failure for this subtask id (repeatable)
        #[arg(long = "fail")]
        fail: Vec<String>,

        /// Simulated per-subtask execution delay in milliseconds
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,

        /// Dispatch one subtask at a time within each level
        #[arg(long)]
        sequential: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    dagrun::log::init_with_debug(cli.debug);

    match cli.command {
        Command::Plan { file } => run_plan(&file),
        Command::Run {
            file,
            max_parallel,
            timeout_ms,
            fail,
            delay_ms,
            sequential,
        } => run_execute(&file, max_parallel, timeout_ms, fail, delay_ms, sequential),
        Command::Config => run_config(),
    }
}

fn load_subtasks(path: &Path) -> Result<Vec<Subtask>> {
    let raw = std::fs::read_to_string(path)?;
    let subtasks: Vec<Subtask> = serde_json::from_str(&raw)?;
    dlog!("Loaded {} subtasks from {}", subtasks.len(), path.display());
    Ok(subtasks)
}

fn run_plan(file: &Path) -> Result<()> {
    let subtasks = load_subtasks(file)?;
    let graph = SubtaskGraph::build(subtasks)?;
    let plan = ExecutionPlanner::plan(&graph)?;

    println!("{}", serde_json::to_string_pretty(&plan)?);
    eprintln!(
        "Planned {} subtasks into {} levels, estimated {}ms",
        plan.total_subtasks(),
        plan.total_levels(),
        plan.estimated_duration_ms
    );
    Ok(())
}

fn run_execute(
    file: &Path,
    max_parallel: Option<usize>,
    timeout_ms: Option<u64>,
    fail: Vec<String>,
    delay_ms: u64,
    sequential: bool,
) -> Result<()> {
    let subtasks = load_subtasks(file)?;

    let mut config = Config::load()?;
    if let Some(max_parallel) = max_parallel {
        config.max_parallel_tasks = max_parallel;
    }
    if let Some(timeout_ms) = timeout_ms {
        config.subtask_timeout_ms = timeout_ms;
    }
    if sequential {
        config.enable_parallel_execution = false;
    }

    let mut executor = SimulatedExecutor::new().with_delay(Duration::from_millis(delay_ms));
    for subtask_id in fail {
        executor = executor.failing(subtask_id);
    }
    let executor: Arc<dyn SubtaskExecutor> = Arc::new(executor);

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(execute_with_progress(config, subtasks, executor))?;

    println!();
    if result.all_successful {
        println!(
            "Execution {} completed: {}/{} subtasks succeeded in {}ms",
            result.execution_id.short(),
            result.successful_tasks,
            result.total_tasks,
            result.total_execution_time_ms
        );
    } else {
        println!(
            "Execution {} finished with failures: {} succeeded, {} failed of {} in {}ms",
            result.execution_id.short(),
            result.successful_tasks,
            result.failed_tasks,
            result.total_tasks,
            result.total_execution_time_ms
        );
        for failed in result.results.iter().filter(|r| !r.success) {
            println!(
                "  {} ({}): {}",
                failed.subtask_id,
                failed.status,
                failed.error_message.as_deref().unwrap_or("no error recorded")
            );
        }
    }
    println!(
        "  success rate {:.1}%, average subtask time {:.0}ms",
        result.statistics.success_rate, result.statistics.average_task_time_ms
    );

    if !result.all_successful {
        std::process::exit(1);
    }
    Ok(())
}

/// Run the subtasks while echoing tracker progress to stdout.
async fn execute_with_progress(
    config: Config,
    subtasks: Vec<Subtask>,
    executor: Arc<dyn SubtaskExecutor>,
) -> Result<dagrun::TaskExecutionResult> {
    let interval = Duration::from_millis(config.progress_update_interval_ms.max(10));
    let orchestrator = Arc::new(Orchestrator::new(config));

    let runner = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.execute_subtasks(subtasks, executor).await })
    };

    while !runner.is_finished() {
        tokio::time::sleep(interval).await;
        let Some(execution_id) = orchestrator.active_executions().await.first().copied() else {
            continue;
        };
        if let Ok(snapshot) = orchestrator.progress_for_execution(&execution_id).await {
            println!(
                "[{:>5.1}%] {} completed, {} failed, {} in flight, {} pending",
                snapshot.tracker.progress_percentage(),
                snapshot.tracker.completed_count(),
                snapshot.tracker.failed_count(),
                snapshot.tracker.in_progress_count(),
                snapshot.tracker.pending_count()
            );
        }
    }

    runner.await.map_err(|e| Error::TaskJoin(e.to_string()))?
}

fn run_config() -> Result<()> {
    let config = Config::load()?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
