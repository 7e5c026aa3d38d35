// Recon Orchestrator - CLI entry point

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use recon_core::CoreError;
use recon_orchestrator::logging::init_logging;
use recon_orchestrator::utils::paths::{log_path, DEFAULT_OUTPUT_DIR};
use recon_orchestrator::{clear_state, Orchestrator, OrchestratorConfig, RunOptions};
use recon_pipeline::ScanDepth;
use tokio_util::sync::CancellationToken;

/// Critical tool abort.
const EXIT_ABORTED: u8 = 1;
/// Startup or configuration failure.
const EXIT_STARTUP: u8 = 2;
/// Interrupted by Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "recon-orchestrator",
    version,
    about = "Phased, resumable orchestration of external recon tools"
)]
struct Cli {
    /// Config file (TOML or JSON); defaults to ~/.recon-orchestrator/config.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the recon workflow against a target
    Run(RunArgs),
    /// List registered tools and whether their binaries are on PATH
    Tools,
    /// Print the summary stored in a target's checkpoint
    Summary(TargetArgs),
    /// Delete a target's checkpoint
    ClearState(TargetArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Domain to scan
    #[arg(short, long, value_name = "DOMAIN")]
    target: String,

    /// Scan depth: light, deep, deeper or custom
    #[arg(short, long, default_value = "light")]
    depth: ScanDepth,

    /// Comma-separated tool selection (implies --depth custom)
    #[arg(long, value_delimiter = ',', value_name = "TOOLS")]
    tools: Vec<String>,

    /// Continue from the saved checkpoint, skipping recorded tools
    #[arg(long)]
    resume: bool,

    /// With --resume, re-attempt tools whose last status is not ok
    #[arg(long)]
    retry_failed: bool,

    /// Maximum tools running at once in a phase
    #[arg(short, long, value_name = "N")]
    concurrency: Option<usize>,

    /// Default per-tool timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Artifact and checkpoint directory
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR, value_name = "DIR")]
    output_dir: PathBuf,

    /// Log file (defaults to <output-dir>/orchestrator.log)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Domain the checkpoint belongs to
    #[arg(short, long, value_name = "DOMAIN")]
    target: String,

    /// Artifact and checkpoint directory
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR, value_name = "DIR")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Run(args) => run(args, cli.config).await,
        Commands::Tools => {
            init_logging(None)?;
            let config = OrchestratorConfig::load(cli.config.as_deref())
                .context("failed to load configuration")?;
            print_inventory(&Orchestrator::new(config));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Summary(args) => {
            init_logging(None)?;
            let config = OrchestratorConfig::load(cli.config.as_deref())
                .context("failed to load configuration")?;
            match Orchestrator::new(config).summary(&args.output_dir, args.target.trim())? {
                Some(summary) => {
                    print!("{}", summary);
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!(
                        "no checkpoint for '{}' in {}",
                        args.target,
                        args.output_dir.display()
                    );
                    Ok(ExitCode::from(EXIT_STARTUP))
                }
            }
        }
        Commands::ClearState(args) => {
            init_logging(None)?;
            if clear_state(&args.output_dir, args.target.trim())? {
                println!("cleared checkpoint for '{}'", args.target);
            } else {
                println!("no checkpoint for '{}'", args.target);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(args: RunArgs, config_path: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| log_path(&args.output_dir));
    init_logging(Some(&log_file)).context("failed to initialise logging")?;

    let config = OrchestratorConfig::load(config_path.as_deref())
        .context("failed to load configuration")?;

    let mut depth = args.depth;
    if !args.tools.is_empty() && depth != ScanDepth::Custom {
        tracing::info!(requested = %depth, "tool selection given, using custom depth");
        depth = ScanDepth::Custom;
    }
    if args.retry_failed && !args.resume {
        tracing::warn!("--retry-failed has no effect without --resume");
    }

    let options = RunOptions {
        target: args.target.trim().to_string(),
        depth,
        tools: args.tools.iter().map(|t| t.trim().to_string()).collect(),
        resume: args.resume,
        retry_failed: args.retry_failed,
        concurrency: args.concurrency,
        timeout_secs: args.timeout,
        output_dir: args.output_dir,
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping running tools");
            trigger.cancel();
        }
    });

    let orchestrator = Orchestrator::new(config).with_cancellation(cancel);
    let outcome = orchestrator.run(&options).await.context("run failed")?;

    print!("{}", outcome.summary);
    if outcome.checkpoint_failures > 0 {
        eprintln!(
            "warning: {} checkpoint write(s) failed; --resume may repeat finished tools",
            outcome.checkpoint_failures
        );
    }

    Ok(match &outcome.stopped_by {
        None => ExitCode::SUCCESS,
        Some(CoreError::Cancelled) => ExitCode::from(EXIT_INTERRUPTED),
        Some(_) => ExitCode::from(EXIT_ABORTED),
    })
}

fn print_inventory(orchestrator: &Orchestrator) {
    println!(
        "{:<14} {:<9} {:<7} {:>8} {:<9} {}",
        "TOOL", "GROUP", "STAGE", "TIMEOUT", "CRITICAL", "BINARY"
    );
    for tool in orchestrator.inventory() {
        let location = match &tool.resolved_path {
            Some(path) => path.display().to_string(),
            None => format!("{} (not found)", tool.binary),
        };
        println!(
            "{:<14} {:<9} {:<7} {:>7}s {:<9} {}",
            tool.name,
            tool.group.to_string(),
            tool.stage.to_string(),
            tool.timeout_secs,
            if tool.critical { "yes" } else { "no" },
            location
        );
    }
}
