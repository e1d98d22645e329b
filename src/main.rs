#![forbid(unsafe_code)]

//! Host binary for the `command-gate` command-execution gateway.
//!
//! Evaluates commands against the project policy, runs approved ones under
//! supervision, and recovers orphaned process records after a crash.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use command_gate::approval::ApprovalService;
use command_gate::models::approval::ApprovedCommandRecord;
use command_gate::models::command::{CommandDecision, CommandSpec, DecisionReason};
use command_gate::process::{ProcessManager, SpawnOptions};
use command_gate::{AppError, GatewayConfig, Result};

/// Exit code used when a command is denied or needs approval.
const NOT_APPROVED_EXIT: u8 = 2;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "command-gate", about = "Local command-execution gateway", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, conflicts_with = "project")]
    config: Option<PathBuf>,

    /// Project root to use with default settings (defaults to the current directory).
    #[arg(long)]
    project: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: GateCommand,
}

#[derive(Debug, Subcommand)]
enum GateCommand {
    /// Classify a command and print the decision as JSON.
    Evaluate {
        /// JSON file of approved command records.
        #[arg(long)]
        approved: Option<PathBuf>,
        /// Working directory used to resolve relative commands.
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Command and arguments.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Run a command if, and only if, it is approved.
    Run {
        /// JSON file of approved command records.
        #[arg(long)]
        approved: Option<PathBuf>,
        /// Working directory for resolution and for the child.
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Terminate the command after this many milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Run correlation identifier.
        #[arg(long)]
        run_id: Option<String>,
        /// Node correlation identifier.
        #[arg(long)]
        node_id: Option<String>,
        /// Command and arguments.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Print and clear process records left by an unclean shutdown.
    Orphans,
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<ExitCode> {
    let config = load_config(&args)?;
    info!(project = %config.project_root.display(), "configuration loaded");

    match args.command {
        GateCommand::Evaluate {
            approved,
            cwd,
            command,
        } => {
            let decision = evaluate(&config, approved.as_deref(), cwd, &command).await?;
            print_json(&[decision])?;
            Ok(ExitCode::SUCCESS)
        }
        GateCommand::Run {
            approved,
            cwd,
            timeout_ms,
            run_id,
            node_id,
            command,
        } => {
            let decision = evaluate(&config, approved.as_deref(), cwd.clone(), &command).await?;
            if !decision.is_approved() {
                print_json(&[&decision])?;
                warn!(
                    status = ?decision.status,
                    reason = decision.reason.map(DecisionReason::as_str),
                    "command not approved, refusing to run"
                );
                return Ok(ExitCode::from(NOT_APPROVED_EXIT));
            }

            // Run the exact file that was verified, not whatever the raw
            // name resolves to later.
            let mut options = SpawnOptions::new(
                decision.resolved_path.to_string_lossy().into_owned(),
                decision.spec.args.clone(),
            );
            options.cwd = cwd;
            options.timeout_ms = timeout_ms;
            options.run_id = run_id;
            options.node_id = node_id;

            supervise(&config, options).await
        }
        GateCommand::Orphans => {
            let manager = ProcessManager::new(config.registry_path());
            let orphans = manager.list_orphaned().await?;
            print_json(&orphans)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn evaluate(
    config: &GatewayConfig,
    approved_path: Option<&Path>,
    cwd: Option<PathBuf>,
    command: &[String],
) -> Result<CommandDecision> {
    let Some((program, args)) = command.split_first() else {
        return Err(AppError::CommandEmpty("a command is required".into()));
    };
    let approved = load_approved(approved_path)?;
    let spec = CommandSpec {
        command: program.clone(),
        args: args.to_vec(),
        cwd,
    };

    let service = ApprovalService::new(config.approval_policy());
    service
        .evaluate(std::slice::from_ref(&spec), &approved)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Io("evaluation returned no decision".into()))
}

async fn supervise(config: &GatewayConfig, options: SpawnOptions) -> Result<ExitCode> {
    let manager = ProcessManager::from_config(config)?;
    let handle = manager.spawn_process(options).await?;
    handle.close_stdin().await;

    let exit = tokio::select! {
        exit = handle.wait() => exit?,
        () = shutdown_signal() => {
            info!(pid = handle.pid(), "interrupt received, cancelling");
            handle.cancel();
            handle.wait().await?
        }
    };

    print!("{}", handle.stdout());
    eprint!("{}", handle.stderr());

    Ok(exit
        .exit_code
        .and_then(|code| u8::try_from(code).ok())
        .map_or(ExitCode::FAILURE, ExitCode::from))
}

fn load_config(args: &Cli) -> Result<GatewayConfig> {
    if let Some(path) = &args.config {
        return GatewayConfig::load_from_path(path);
    }
    let root = match &args.project {
        Some(root) => root.clone(),
        None => std::env::current_dir()
            .map_err(|err| AppError::Config(format!("cannot read working directory: {err}")))?,
    };
    GatewayConfig::for_project(root)
}

/// Read approved records from a JSON array file; a missing file means none.
fn load_approved(path: Option<&Path>) -> Result<Vec<ApprovedCommandRecord>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(AppError::Config(format!(
                "cannot read approved records {}: {err}",
                path.display()
            )))
        }
    };
    serde_json::from_str(&raw).map_err(|err| {
        AppError::Config(format!(
            "invalid approved records {}: {err}",
            path.display()
        ))
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(format!("cannot serialize output: {err}")))?;
    println!("{json}");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
