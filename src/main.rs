use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use crew::config::Config;
use crew::core::{check_dependencies, infer_role, load_tasks, resolve_dependencies};
use crew::orchestration::{Orchestrator, OrchestratorEvent};
use crew::subagent::{ClaudeBackend, Signal, SubagentResult};
use crew::{zlog, Result};

/// Crew - dependency-aware parallel subagent orchestrator
#[derive(Parser, Debug)]
#[command(name = "crew")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CREW_DEBUG=1    Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.crew/crew.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Execute a task file, running independent tasks in parallel
    Run {
        /// JSON task list: an array, or an object with a `tasks` array
        tasks: PathBuf,

        /// Override the maximum number of concurrent subagents
        #[arg(long)]
        max_agents: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a task file and print its execution batches
    Plan {
        tasks: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Print the role that would be inferred for a description
    Infer { description: String },
}

impl Command {
    /// Only `run` reads `~/.crew/crew.toml`.
    fn reads_config(&self) -> bool {
        matches!(self, Command::Run { .. })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = if cli.command.reads_config() {
        Some(Config::load()?)
    } else {
        None
    };
    let verbose = config.as_ref().is_some_and(|c| c.orchestrator.verbose);
    crew::log::init_with_debug(cli.debug || verbose);
    zlog!("crew starting: {:?}", cli.command);

    match cli.command {
        Command::Run {
            tasks,
            max_agents,
            json,
        } => {
            let all_succeeded = run_tasks(config.unwrap_or_default(), &tasks, max_agents, json)?;
            if !all_succeeded {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Plan { tasks, json } => run_plan(&tasks, json),
        Command::Infer { description } => {
            println!("{}", infer_role(&description));
            Ok(())
        }
    }
}

/// Execute a task file. Returns whether every task succeeded.
fn run_tasks(
    mut config: Config,
    path: &Path,
    max_agents: Option<usize>,
    json: bool,
) -> Result<bool> {
    let tasks = load_tasks(path)?;
    if let Some(max) = max_agents {
        config.orchestrator.max_concurrent_agents = max;
    }

    let backend = ClaudeBackend::from_command(config.effective_command())?
        .with_cwd(std::env::current_dir()?)
        .with_timeout(config.orchestrator.default_timeout());
    let orchestrator = Orchestrator::with_backend(config.orchestrator.clone(), Arc::new(backend));

    let rt = tokio::runtime::Runtime::new()?;
    let results = rt.block_on(async {
        let progress = (!json).then(|| tokio::spawn(print_events(orchestrator.subscribe())));
        let results = orchestrator.execute_parallel(&tasks).await;
        orchestrator.terminate_all().await;
        if let Some(handle) = progress {
            handle.abort();
        }
        results
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }

    let stats = orchestrator.get_stats();
    zlog!(
        "Run finished: {}/{} succeeded, avg {:?}",
        stats.successful,
        stats.total,
        stats.average_execution_time
    );
    Ok(results.iter().all(|r| r.success))
}

/// Stream progress to stderr until the channel closes or the task is aborted.
async fn print_events(mut rx: tokio::sync::broadcast::Receiver<OrchestratorEvent>) {
    loop {
        match rx.recv().await {
            Ok(OrchestratorEvent::BatchStarted { index, task_ids }) => {
                eprintln!("batch {}: {}", index, task_ids.join(", "));
            }
            Ok(OrchestratorEvent::Signal { id, signal }) => match signal {
                Signal::Started { task_id } => eprintln!("  [{}] started {}", id.short(), task_id),
                Signal::Completed { result } => {
                    eprintln!("  [{}] completed {}", id.short(), result.task_id)
                }
                Signal::Failed { task_id, error } => {
                    eprintln!("  [{}] failed {}: {}", id.short(), task_id, error)
                }
                _ => {}
            },
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => eprintln!("  ({} events dropped)", n),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_results(results: &[SubagentResult]) {
    println!();
    for result in results {
        let mark = if result.success {
            "\x1b[32m✓\x1b[0m"
        } else {
            "\x1b[31m✗\x1b[0m"
        };
        println!(
            "{} {:<12} {:<14} {:>8.1}s",
            mark,
            result.task_id,
            result.role.as_str(),
            result.execution_time.as_secs_f64()
        );
        match &result.error {
            Some(error) => println!("    {}", error),
            None => {
                for line in result.output.lines().take(3) {
                    println!("    {}", line);
                }
            }
        }
    }
    let failed = results.iter().filter(|r| !r.success).count();
    println!();
    println!("{} tasks, {} failed", results.len(), failed);
}

fn run_plan(path: &Path, json: bool) -> Result<()> {
    let tasks = load_tasks(path)?;
    check_dependencies(&tasks)?;
    let batches = resolve_dependencies(&tasks);

    if json {
        println!("{}", serde_json::to_string_pretty(&batches)?);
        return Ok(());
    }

    for (index, batch) in batches.iter().enumerate() {
        println!("batch {}:", index);
        for id in batch {
            if let Some(task) = tasks.iter().find(|t| &t.id == id) {
                println!(
                    "  {:<12} {:<14} {}",
                    task.id,
                    task.effective_role().as_str(),
                    task.description
                );
            }
        }
    }
    Ok(())
}
