//! TaskMon CLI - run a synthetic task under a progress monitor.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use taskmon_core::{Outcome, Problem, TaskError, TaskResult};
use taskmon_progress::{Monitor, MonitorNode, ProgressReporter, ReporterConfig};
use taskmon_work::TaskExecutor;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskmon")]
#[command(about = "Monitored task execution with hierarchical progress", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic task and report its progress
    Run(RunArgs),
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Steps taken directly by the root task
    #[arg(long, default_value = "20")]
    steps: u64,

    /// Number of sub-tasks run after the root steps
    #[arg(long, default_value = "2")]
    subtasks: u64,

    /// Root work units each sub-task is worth
    #[arg(long, default_value = "5")]
    weight: u64,

    /// Steps inside each sub-task
    #[arg(long, default_value = "10")]
    subtask_steps: u64,

    /// Delay between two steps, in milliseconds
    #[arg(long, default_value = "50")]
    step_delay_ms: u64,

    /// Progress report interval, in milliseconds
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Cancel the task after this many milliseconds
    #[arg(long)]
    cancel_after_ms: Option<u64>,

    /// Fail the task when the root reaches this step
    #[arg(long)]
    fail_at: Option<u64>,

    /// Step sub-tasks without declaring their total
    #[arg(long)]
    uncertain: bool,

    /// Print the outcome and final progress tree as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let root = MonitorNode::named("synthetic");
    let monitor: Arc<dyn Monitor> = Arc::new(root.clone());

    let config = ReporterConfig::default().with_interval(Duration::from_millis(args.interval_ms));
    let mut reporter = ProgressReporter::for_monitor(Arc::clone(&monitor), config)?;

    let timer = args.cancel_after_ms.map(|ms| {
        let root = root.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            info!(after_ms = ms, "requesting cancellation");
            root.cancel();
        })
    });

    let plan = args.clone();
    let task = TaskExecutor::new().spawn(
        move |monitor| synthetic_task(&plan, monitor),
        Some(monitor),
    );
    let outcome = TaskExecutor::join(task).await;

    if let Some(timer) = timer {
        timer.abort();
    }
    reporter.finish()?;

    let snapshot = root.snapshot();
    if args.json {
        let report = serde_json::json!({
            "outcome": outcome,
            "progress": snapshot,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", snapshot.render_tree());
        match outcome.value() {
            Some(units) => println!("completed: {} units", units),
            None if outcome.is_canceled() => println!("canceled"),
            None => println!("failed"),
        }
        for problem in outcome.problems() {
            println!("  {}", problem);
        }
    }

    Ok(ExitCode::from(exit_status(&outcome)))
}

/// 0 on success, 2 when canceled, 1 on any other failure.
fn exit_status<T>(outcome: &Outcome<T>) -> u8 {
    if outcome.is_success() {
        0
    } else if outcome.is_canceled() {
        2
    } else {
        1
    }
}

/// Steps the root, then runs each sub-task. Returns the number of units stepped.
fn synthetic_task(args: &RunArgs, monitor: &dyn Monitor) -> TaskResult<Outcome<u64>> {
    let delay = Duration::from_millis(args.step_delay_ms);
    let total = args
        .subtasks
        .checked_mul(args.weight)
        .and_then(|delegated| delegated.checked_add(args.steps))
        .ok_or_else(|| TaskError::failed("total work does not fit in 64 bits"))?;
    monitor.set_total_work(total)?;

    let mut units = 0;
    for step in 1..=args.steps {
        if args.fail_at == Some(step) {
            return Err(TaskError::failed(format!("synthetic failure at step {}", step)));
        }
        std::thread::sleep(delay);
        monitor.step()?;
        units += 1;
    }

    for part in 1..=args.subtasks {
        let child = monitor.sub_task(args.weight);
        child.set_task_name(&format!("part {}", part));
        if !args.uncertain {
            child.set_total_work(args.subtask_steps)?;
        }
        for _ in 0..args.subtask_steps {
            std::thread::sleep(delay);
            if args.uncertain {
                child.uncertain_step()?;
            } else {
                child.step()?;
            }
            units += 1;
        }
        child.done();
    }

    let mut outcome = Outcome::success(units);
    if args.uncertain && args.subtasks > 0 {
        outcome = outcome.with_problem(Problem::info("sub-task totals were discovered while stepping"));
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_args() -> RunArgs {
        RunArgs {
            steps: 4,
            subtasks: 2,
            weight: 3,
            subtask_steps: 2,
            step_delay_ms: 0,
            interval_ms: 1000,
            cancel_after_ms: None,
            fail_at: None,
            uncertain: false,
            json: false,
        }
    }

    #[test]
    fn test_synthetic_task_completes_tree() {
        let root = MonitorNode::new();
        let args = quick_args();
        let outcome = TaskExecutor::new().run(|m| synthetic_task(&args, m), Some(&root));

        assert_eq!(outcome.value(), Some(&8));
        assert_eq!(root.total_work(), 10);
        assert_eq!(root.children().len(), 2);
        assert!(root.children().iter().all(|child| child.is_done()));
        assert!(root.is_done());
        assert_eq!(exit_status(&outcome), 0);
    }

    #[test]
    fn test_synthetic_task_failure() {
        let args = RunArgs {
            fail_at: Some(3),
            ..quick_args()
        };
        let root = MonitorNode::new();
        let outcome = TaskExecutor::new().run(|m| synthetic_task(&args, m), Some(&root));

        assert!(outcome.is_failure());
        assert_eq!(root.current_work(), 10);
        assert_eq!(exit_status(&outcome), 1);
    }

    #[test]
    fn test_synthetic_task_canceled() {
        let root = MonitorNode::new();
        root.cancel();
        let outcome = TaskExecutor::new().run(|m| synthetic_task(&quick_args(), m), Some(&root));
        assert!(outcome.is_canceled());
        assert_eq!(exit_status(&outcome), 2);
    }

    #[test]
    fn test_uncertain_subtasks_report_info() {
        let args = RunArgs {
            uncertain: true,
            ..quick_args()
        };
        let outcome = TaskExecutor::new().run(|m| synthetic_task(&args, m), None);
        assert!(outcome.is_success());
        assert_eq!(outcome.problems().len(), 1);
    }

    #[test]
    fn test_oversized_plan_fails_instead_of_panicking() {
        let args = RunArgs {
            subtasks: u64::MAX,
            weight: 2,
            ..quick_args()
        };
        let root = MonitorNode::new();
        let outcome = TaskExecutor::new().run(|m| synthetic_task(&args, m), Some(&root));

        assert!(outcome.is_failure());
        assert!(matches!(outcome.cause(), Some(TaskError::Failed(_))));
        assert_eq!(root.total_work(), 0);
        assert_eq!(exit_status(&outcome), 1);
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::parse_from(["taskmon", "run", "--steps", "3", "--cancel-after-ms", "10", "--json"]);
        let Commands::Run(args) = cli.command;
        assert_eq!(args.steps, 3);
        assert_eq!(args.cancel_after_ms, Some(10));
        assert!(args.json);
        assert!(!args.uncertain);
    }
}
