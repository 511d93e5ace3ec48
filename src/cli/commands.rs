//! CLI command definitions for bugbench.
//!
//! `run` scans the codebase, runs the configured agents and writes the
//! report; `score` evaluates a single saved response without running agents.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::evaluation::{evaluate_response, EvaluationResult, RunStats};
use crate::report::Report;
use crate::runner::{agents, Harness, HarnessConfig};
use crate::scanner::BugRecord;

/// Benchmark bug-hunting agents against a codebase with seeded bugs.
#[derive(Parser)]
#[command(name = "bugbench")]
#[command(about = "Benchmark bug-hunting agents against seeded `# BUG:` comments")]
#[command(version)]
#[command(
    long_about = "bugbench scans a codebase for seeded `# BUG:` comments, asks each configured agent to find them, and scores every free-text answer by recall.\n\nExample usage:\n  bugbench run --config bugbench.yaml\n  bugbench run --scan-only --codebase ./test_codebase\n  bugbench score --response answer.txt"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the configured agents and score their answers.
    Run(RunArgs),

    /// Score one saved agent response against the codebase.
    Score(ScoreArgs),
}

/// Arguments for `bugbench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Run only this agent (e.g. `langchain` or `langchain_example.py`).
    #[arg(short, long)]
    pub agent: Option<String>,

    /// Print the ground-truth bug list and exit without running agents.
    #[arg(long)]
    pub scan_only: bool,

    /// Codebase to analyze.
    #[arg(long)]
    pub codebase: Option<PathBuf>,

    /// Path to save the report.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// YAML config file (default: ./bugbench.yaml if present).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Per-agent timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum number of agents running at once.
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// API key for chat agents, overriding each agent's `api_key_env`.
    #[arg(long, env = "BUGBENCH_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Print the full report as JSON instead of the summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `bugbench score`.
#[derive(Parser, Debug)]
pub struct ScoreArgs {
    /// File holding the agent response, or `-` for stdin.
    #[arg(short, long)]
    pub response: String,

    /// Codebase holding the ground truth.
    #[arg(long)]
    pub codebase: Option<PathBuf>,

    /// YAML config file (default: ./bugbench.yaml if present).
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Parse CLI arguments without running any command.
///
/// Use this to access CLI options (like log level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_run_command(args).await,
        Commands::Score(args) => run_score_command(args).await,
    }
}

// ============================================================================
// Run Command Implementation
// ============================================================================

/// What a `run` invocation produced.
enum RunOutcome {
    /// `--scan-only`: the ground truth. No agent ran and no report was written.
    ScanOnly(Vec<BugRecord>),
    /// Every selected agent ran and the report was saved.
    Completed { report: Report, output_path: PathBuf },
}

async fn run_run_command(args: RunArgs) -> anyhow::Result<()> {
    let config = HarnessConfig::load(args.config.as_deref())?;

    match execute_run(config, &args, |key| std::env::var(key).ok()).await? {
        RunOutcome::ScanOnly(bugs) => print!("{}", format_bug_list(&bugs)),
        RunOutcome::Completed { report, .. } if args.json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        RunOutcome::Completed {
            report,
            output_path,
        } => {
            println!("\n{}", report.render_summary());
            println!("Results saved to {}", output_path.display());
        }
    }
    Ok(())
}

/// Applies `args` to `config` and carries out the run.
///
/// Configuration errors (bad values, missing codebase, unknown agent,
/// missing credentials) are returned before any agent is invoked.
async fn execute_run<F>(
    config: HarnessConfig,
    args: &RunArgs,
    lookup_env: F,
) -> anyhow::Result<RunOutcome>
where
    F: Fn(&str) -> Option<String>,
{
    let config = apply_run_overrides(config, args);
    config.validate()?;

    if args.scan_only {
        let outcome = config.scanner()?.scan(&config.codebase_path)?;
        return Ok(RunOutcome::ScanOnly(outcome.bugs));
    }

    let roster = agents::build_roster(
        &config.agents,
        args.agent.as_deref(),
        args.api_key.as_deref(),
        lookup_env,
    )?;

    let output_path = config.output_path.clone();
    let mut harness = Harness::new(config, roster)?;
    let report = harness.run().await?;
    harness
        .save(&report)
        .with_context(|| format!("Failed to save results to {}", output_path.display()))?;

    Ok(RunOutcome::Completed {
        report,
        output_path,
    })
}

/// Applies CLI flags on top of file and environment configuration.
fn apply_run_overrides(mut config: HarnessConfig, args: &RunArgs) -> HarnessConfig {
    if let Some(codebase) = &args.codebase {
        config = config.with_codebase(codebase);
    }
    if let Some(output) = &args.output {
        config = config.with_output(output);
    }
    if let Some(timeout) = args.timeout {
        config = config.with_timeout_secs(timeout);
    }
    if let Some(parallelism) = args.parallelism {
        config = config.with_parallelism(parallelism);
    }
    config
}

fn format_bug_list(bugs: &[BugRecord]) -> String {
    let mut out = format!("Found {} bugs in codebase:\n", bugs.len());
    for (i, bug) in bugs.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, bug));
    }
    out
}

// ============================================================================
// Score Command Implementation
// ============================================================================

async fn run_score_command(args: ScoreArgs) -> anyhow::Result<()> {
    let mut config = HarnessConfig::load(args.config.as_deref())?;
    if let Some(codebase) = &args.codebase {
        config = config.with_codebase(codebase);
    }
    config.validate()?;

    let response = read_response(&args.response).await?;
    let result = score_response(&config, &response)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn read_response(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut response = String::new();
        tokio::io::stdin()
            .read_to_string(&mut response)
            .await
            .context("Failed to read response from stdin")?;
        Ok(response)
    } else {
        tokio::fs::read_to_string(Path::new(source))
            .await
            .with_context(|| format!("Failed to read response file {}", source))
    }
}

/// Scans the configured codebase and scores `response` against it.
fn score_response(config: &HarnessConfig, response: &str) -> anyhow::Result<EvaluationResult> {
    let outcome = config.scanner()?.scan(&config.codebase_path)?;
    let matcher = config.matcher()?;
    let mut stats = RunStats::default();

    let result = evaluate_response(response, &outcome.bugs, &matcher, &mut stats);
    info!(
        bugs = outcome.bugs.len(),
        paragraphs = stats.paragraphs_segmented,
        claims = stats.claims_emitted,
        recall = result.recall,
        "Scored response"
    );
    Ok(result)
}
