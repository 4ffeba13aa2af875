//! `coyoted` command line: start, stop and status.
//!
//! ```bash
//! # Start the daemon (foreground)
//! coyoted start
//!
//! # Start the daemon (background/daemonized)
//! coyoted start -d
//!
//! # Stop the daemon
//! coyoted stop
//!
//! # Check daemon status
//! coyoted status
//!
//! # Override the owner cap and device port
//! OWNER_MAX_POWER=40 COYOTE_WS_PORT=5000 coyoted start
//!
//! # Enable debug logging
//! RUST_LOG=coyoted=debug coyoted start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::DaemonConfig;
use crate::daemon::Daemon;

/// Coyote daemon - DG-Lab Coyote pairing and pulse queue
#[derive(Parser, Debug)]
#[command(name = "coyoted", version, about)]
struct Args {
    /// Config file (default: <config dir>/coyote/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

/// Returns the per-user state directory.
fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("coyote")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("coyoted.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("coyoted.log")
}

/// Reads the PID from the PID file, if it exists.
fn read_pid(path: &Path) -> Option<u32> {
    let mut file = File::open(path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Writes the current PID to the PID file.
fn write_pid(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file(path: &Path) {
    let _ = fs::remove_file(path);
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Returns the daemon PID if one is running, cleaning up a stale file.
fn is_daemon_running(path: &Path) -> Option<u32> {
    if let Some(pid) = read_pid(path) {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file(path);
    }
    None
}

/// Sends SIGTERM to the daemon process.
fn stop_daemon(pid: u32) -> Result<()> {
    let pid = i32::try_from(pid).context("PID out of range")?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result != 0 {
        bail!("Failed to send SIGTERM to process {pid}");
    }
    Ok(())
}

/// Entry point shared by the `coyoted` binaries.
pub fn run() -> Result<()> {
    let args = Args::parse();
    let pid_path = pid_file_path();

    // Default to 'start' if no subcommand given
    let command = args.command.unwrap_or(Command::Start { daemon: false });

    match command {
        Command::Start { daemon } => {
            if let Some(pid) = is_daemon_running(&pid_path) {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'coyoted stop' to stop it first.");
                process::exit(1);
            }

            // Fail before forking so config errors reach the terminal.
            let config = DaemonConfig::load(args.config.as_deref())
                .context("Failed to load configuration")?;

            if daemon {
                daemonize()?;
            }

            write_pid(&pid_path)?;
            let result = run_daemon(config);
            remove_pid_file(&pid_path);

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running(&pid_path) {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running(&pid_path) {
                println!("Daemon is running (PID {pid})");

                if let Ok(config) = DaemonConfig::load(args.config.as_deref()) {
                    if config.socket_path.exists() {
                        println!("Socket: {}", config.socket_path.display());
                    }
                    println!("Device port: {}", config.device.port);
                }

                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

/// Daemonizes the current process.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Builds the runtime and blocks on the daemon.
fn run_daemon(config: DaemonConfig) -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?
        .block_on(serve(config))
}

/// Runs the daemon (async entry point).
async fn serve(config: DaemonConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("coyoted=info".parse()?)
                .add_directive("coyote_core=info".parse()?)
                .add_directive("coyote_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Coyote daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let daemon = Daemon::bind(&config, cancel_token).await?;
    info!(
        socket = %daemon.socket_path().display(),
        pairing_url = %daemon.pairing().url,
        "Starting servers"
    );

    if let Err(e) = daemon.run().await {
        error!(error = %e, "Daemon error");
        return Err(e.into());
    }

    info!("Coyote daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_start_daemon_flag() {
        let args = Args::try_parse_from(["coyoted", "start", "-d"]).unwrap();
        assert!(matches!(args.command, Some(Command::Start { daemon: true })));
    }

    #[test]
    fn test_pid_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("coyoted.pid");

        write_pid(&path).unwrap();
        assert_eq!(read_pid(&path), Some(process::id()));
        assert_eq!(is_daemon_running(&path), Some(process::id()));

        remove_pid_file(&path);
        assert_eq!(read_pid(&path), None);
    }

    #[test]
    fn test_stale_pid_file_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coyoted.pid");
        fs::write(&path, "999999999").unwrap();

        assert_eq!(is_daemon_running(&path), None);
        assert!(!path.exists());
    }
}
