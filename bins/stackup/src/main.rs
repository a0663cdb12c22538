use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stackup_orchestrator::{FailureReason, StackConfig, StartupOrchestrator};
use stackup_supervisor::{api, ControlCommand, ControlInterface, ProcessStatus, ProcessSupervisor};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

mod client;

use client::ControlClient;

const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_STARTUP_FAILED: u8 = 2;

/// stackup - bring a process stack up in dependency order and keep it running
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE", default_value = "stackup.yaml", global = true)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Shut down after this many seconds instead of waiting for a signal
    #[arg(long, value_name = "SECONDS")]
    run_duration: Option<u64>,

    /// Control API address used by the status/start/stop/restart commands
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:7070", global = true)]
    control_addr: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bring the stack up and supervise it (default)
    Up,
    /// Show the status of one or all processes
    Status { name: Option<String> },
    /// Start a process
    Start { name: String },
    /// Stop a process
    Stop { name: String },
    /// Stop a process, reset its restart counter and start it again
    Restart { name: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    initialize_logging(args.debug);

    let result = match args.command {
        None | Some(Command::Up) => run_up(&args).await,
        Some(Command::Status { ref name }) => run_status(&args.control_addr, name.as_deref()).await,
        Some(Command::Start { ref name }) => {
            run_control(&args.control_addr, ControlCommand::Start, name).await
        }
        Some(Command::Stop { ref name }) => {
            run_control(&args.control_addr, ControlCommand::Stop, name).await
        }
        Some(Command::Restart { ref name }) => {
            run_control(&args.control_addr, ControlCommand::Restart, name).await
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

async fn run_up(args: &Args) -> Result<ExitCode> {
    info!("Starting stackup");
    info!("Config file: {}", args.config.display());

    let config = StackConfig::load_from_file(&args.config)?;
    info!(
        "Loaded configuration: {} processes, {} external services, {} groups",
        config.processes.len(),
        config.external_services.len(),
        config.groups.len()
    );

    let supervisor = ProcessSupervisor::new(config.supervisor_config())
        .context("Failed to create supervisor")?;

    if let Some(ref control) = config.supervisor.control {
        let listener = TcpListener::bind(&control.listen)
            .await
            .with_context(|| format!("Failed to bind control API to {}", control.listen))?;
        let control = ControlInterface::new(supervisor.clone());
        let shutdown = supervisor.shutdown_token();
        tokio::spawn(async move {
            if let Err(e) = api::serve(control, listener, shutdown).await {
                error!("Control API stopped: {}", e);
            }
        });
    }

    // cancelled by a signal, or when the supervisor shuts down
    let cancel = supervisor.shutdown_token().child_token();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let orchestrator = StartupOrchestrator::from_config(&config, supervisor.clone())
        .with_cancellation(cancel.clone());

    match orchestrator.bring_up(&config.groups).await {
        Ok(report) => {
            info!(
                "Stack is up: {} groups in {:?}",
                report.groups.len(),
                report.elapsed()
            );
        }
        Err(failure) => {
            if let Err(e) = supervisor.shutdown().await {
                error!("Shutdown after failed startup was incomplete: {}", e);
            }
            if matches!(failure.reason, FailureReason::Cancelled { .. }) {
                warn!("Startup interrupted in group {}", failure.group);
            }
            eprint!("{}", failure);
            return Ok(ExitCode::from(EXIT_STARTUP_FAILED));
        }
    }

    // processes outside every group start after the gated ones
    let ungrouped = config.ungrouped_processes();
    if !ungrouped.is_empty() {
        if let Err(e) = supervisor.launch_selected(&ungrouped).await {
            warn!("{}", e);
        }
    }

    match args.run_duration {
        Some(seconds) => {
            info!("Running for {} seconds", seconds);
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
            }
        }
        None => cancel.cancelled().await,
    }

    info!("Shutting down...");
    supervisor.shutdown().await.context("Shutdown failed")?;
    info!("Stack shut down");
    Ok(ExitCode::SUCCESS)
}

async fn run_status(control_addr: &str, name: Option<&str>) -> Result<ExitCode> {
    let client = ControlClient::new(control_addr);
    let statuses = match name {
        Some(name) => vec![client.execute(ControlCommand::Status, name).await?],
        None => client.status_all().await?,
    };
    print_statuses(&statuses);
    Ok(ExitCode::SUCCESS)
}

async fn run_control(control_addr: &str, command: ControlCommand, name: &str) -> Result<ExitCode> {
    let status = ControlClient::new(control_addr).execute(command, name).await?;
    print_statuses(&[status]);
    Ok(ExitCode::SUCCESS)
}

fn print_statuses(statuses: &[ProcessStatus]) {
    println!(
        "{:<20} {:<13} {:>8} {:>8} {:>10}  {}",
        "NAME", "STATE", "PID", "RESTARTS", "UPTIME", "LAST EXIT"
    );
    for status in statuses {
        let pid = status.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        let uptime = status
            .uptime()
            .map(|u| format!("{}s", u.as_secs()))
            .unwrap_or_else(|| "-".to_string());
        let last_exit = status
            .last_exit
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<13} {:>8} {:>8} {:>10}  {}",
            status.name,
            status.state.to_string(),
            pid,
            status.restart_count,
            uptime,
            last_exit
        );
        if let Some(ref error) = status.last_error {
            println!("{:<20} last error: {}", "", error);
        }
    }
}

fn initialize_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        use signal::unix::{signal as unix_signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            unix_signal(SignalKind::terminate()),
            unix_signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                warn!("Failed to install signal handlers, falling back to Ctrl+C");
                let _ = signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM signal"),
            _ = sigint.recv() => info!("Received SIGINT signal"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
