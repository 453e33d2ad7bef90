//! TaskWeave CLI - analyze, decompose and simulate scheduling of tasks.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taskweave_core::{Task, Worker};
use taskweave_decomposer::{ComplexityAnalyzer, Decomposer, DecompositionStrategy};
use taskweave_scheduler::{AllocationStrategy, Scheduler};

mod config;

use config::FileConfig;

/// Strategy name that picks the analyzer's recommendation.
const AUTO_STRATEGY: &str = "auto";

/// TaskWeave CLI - task scheduling and decomposition tool
#[derive(Parser)]
#[command(name = "taskweave")]
#[command(about = "Analyze, decompose and schedule tasks", long_about = None)]
struct Cli {
    /// TOML config file with [scheduler] and [decomposer] tables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the complexity report for a task
    Analyze {
        /// Task JSON file
        file: PathBuf,
    },

    /// Decompose a task into subtasks
    Decompose {
        /// Task JSON file
        file: PathBuf,

        /// dependency, priority, capability, hybrid or auto
        #[arg(short, long)]
        strategy: Option<String>,

        /// Split even when the task scores Simple
        #[arg(long)]
        no_analysis: bool,
    },

    /// Register workers, submit tasks and assign them in queue order
    Simulate {
        /// JSON array of workers
        #[arg(short, long)]
        workers: PathBuf,

        /// JSON array of tasks
        #[arg(short, long)]
        tasks: PathBuf,

        /// capability, load_balance, priority or round_robin
        #[arg(short, long)]
        strategy: Option<String>,

        /// Decompose each task before submitting
        #[arg(short, long)]
        decompose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = FileConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze { file } => {
            analyze(&file)?;
        }
        Commands::Decompose {
            file,
            strategy,
            no_analysis,
        } => {
            decompose(config, &file, strategy.as_deref(), no_analysis)?;
        }
        Commands::Simulate {
            workers,
            tasks,
            strategy,
            decompose,
        } => {
            simulate(config, &workers, &tasks, strategy.as_deref(), decompose).await?;
        }
    }

    Ok(())
}

/// `--verbose` forces debug; otherwise `RUST_LOG`, falling back to info.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn analyze(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let task: Task = read_json(file)?;
    let report = ComplexityAnalyzer::new().report(&task);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn decompose(
    config: FileConfig,
    file: &Path,
    strategy: Option<&str>,
    no_analysis: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let task: Task = read_json(file)?;

    let mut decomposer_config = config.decomposer;
    if no_analysis {
        decomposer_config.complexity_analysis = false;
    }
    let decomposer = Decomposer::new(decomposer_config);

    let strategy = match strategy {
        Some(name) if name.eq_ignore_ascii_case(AUTO_STRATEGY) => {
            decomposer.analyzer().recommended_strategy(&task)
        }
        Some(name) => name.parse::<DecompositionStrategy>()?,
        None => decomposer.config().strategy,
    };

    let result = decomposer.decompose_with_strategy(&task, strategy)?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    println!();
    println!("Parallel groups:");
    for (level, group) in result.parallel_groups().iter().enumerate() {
        let ids: Vec<&str> = group.iter().map(|id| id.as_str()).collect();
        println!("  level {level}: {}", ids.join(", "));
    }
    Ok(())
}

async fn simulate(
    config: FileConfig,
    workers_file: &Path,
    tasks_file: &Path,
    strategy: Option<&str>,
    decompose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let workers: Vec<Worker> = read_json(workers_file)?;
    let tasks: Vec<Task> = read_json(tasks_file)?;

    let mut scheduler_config = config.scheduler;
    if let Some(name) = strategy {
        scheduler_config.allocation_strategy = name.parse::<AllocationStrategy>()?;
    }
    let scheduler = Scheduler::new(scheduler_config);
    let decomposer = Decomposer::new(config.decomposer);

    for worker in workers {
        scheduler.register_worker(worker).await?;
    }

    for task in tasks {
        if decompose {
            for sub in decomposer.decompose(&task)?.into_tasks() {
                scheduler.submit_task(sub).await?;
            }
        } else {
            scheduler.submit_task(task).await?;
        }
    }

    let queued = scheduler.queue().list().await;
    info!(tasks = queued.len(), "Assigning queued tasks");

    println!("{:<36}  {:<20}  {:<8}  {}", "TASK", "TYPE", "PRIORITY", "WORKER");
    println!("{}", "-".repeat(80));
    for task in queued {
        let worker = match scheduler.assign_task(&task.id).await {
            Ok(worker_id) => worker_id.to_string(),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Task left unassigned");
                format!("- ({e})")
            }
        };
        println!(
            "{:<36}  {:<20}  {:<8}  {}",
            task.id.as_str(),
            task.task_type,
            task.priority,
            worker
        );
    }

    println!();
    println!("Statistics:");
    println!("{}", serde_json::to_string_pretty(&scheduler.statistics().await)?);
    Ok(())
}
