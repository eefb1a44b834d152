use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use devup::config::BootstrapConfig;
use devup::doctor;
use devup::orchestrator::Orchestrator;
use devup::plan::bootstrap_plan;
use devup::prompt::InteractiveTokens;

#[derive(Parser)]
#[command(
    name = "devup",
    about = "One command from fresh machine to working development environment",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Data directory for the token file, session log, and diagnostics
    #[arg(long, env = "DEVUP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level for the diagnostic log (trace, debug, info, warn, error)
    #[arg(long, env = "DEVUP_LOG")]
    log: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bootstrap sequence (default when no subcommand given).
    ///
    /// Every step is idempotent: steps whose effect already holds are
    /// skipped, so rerunning after a failure picks up where the last run
    /// stopped.
    ///
    /// Examples:
    ///   devup
    ///   devup run
    Run,
    /// Show which steps would run, without running any.
    ///
    /// Examples:
    ///   devup doctor
    ///   devup doctor --json
    Doctor {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match BootstrapConfig::new(args.data_dir) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("devup: {err:#}");
            std::process::exit(2);
        }
    };

    // Init once, before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();

    match args.command {
        Some(Command::Doctor { json }) => {
            // Doctor performs no writes; diagnostics go to stderr.
            stderr_logging(&log_level);
            let reports = doctor::run_checks(&config);
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                doctor::print_report(&reports);
            }
            std::process::exit(if doctor::all_satisfied(&reports) { 0 } else { 1 });
        }
        None | Some(Command::Run) => {
            if let Err(err) = config.ensure_data_dir() {
                eprintln!("devup: {err:#}");
                std::process::exit(2);
            }
            let _file_guard = setup_logging(&log_level, &config.diagnostic_log());

            let cancel = CancellationToken::new();
            spawn_signal_handler(cancel.clone());

            let plan = bootstrap_plan(&config);
            let orchestrator = Orchestrator::new(config, Arc::new(InteractiveTokens), cancel);
            if let Err(err) = orchestrator.run(&plan).await {
                eprintln!("devup: {err:#}");
                std::process::exit(err.exit_code());
            }
        }
    }

    Ok(())
}

/// Cancel the token on the first shutdown signal. The orchestrator kills the
/// in-flight child and unwinds cleanly from there.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("interrupt received, stopping after cleanup");
        cancel.cancel();
    });
}

/// Resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

/// Initialize the tracing subscriber writing to the diagnostic log file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// The terminal belongs to the step display, so diagnostics only fall back
/// to stderr when the log file cannot be created at all.
fn setup_logging(
    log_level: &str,
    log_file: &Path,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let dir = log_file.parent().unwrap_or_else(|| Path::new("."));
    let filename = log_file
        .file_name()
        .unwrap_or_else(|| OsStr::new("devup.log"));

    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!(
            "warn: could not create log directory '{}': {err}; logging to stderr",
            dir.display()
        );
        stderr_logging(log_level);
        return None;
    }

    let appender = tracing_appender::rolling::never(dir, filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();
    Some(guard)
}

fn stderr_logging(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
