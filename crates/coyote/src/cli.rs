//! `coyote` command line.
//!
//! ```text
//! coyote shock A 25 20 5   # pulse A, 25% @20Hz, 5 x 100ms
//! coyote shock B 30        # default freq and copies
//! coyote status            # device, owner cap, queue depth
//! coyote pair              # pairing payload for the DG-Lab app
//! coyote set-max 40        # change the owner cap
//! coyote watch             # stream device events
//! ```
//!
//! The socket defaults to `/tmp/coyote.sock`; override it with `--socket`
//! or `COYOTE_SOCKET`.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use coyote_protocol::{parse_shock_args, usage};

use crate::client::{ClientConfig, DaemonClient, ShockOutcome, DEFAULT_SOCKET_PATH};
use crate::render;

// ============================================================================
// CLI Arguments
// ============================================================================

/// Coyote - send pulses to a paired DG-Lab Coyote through coyoted
#[derive(Parser, Debug)]
#[command(name = "coyote", version, about)]
struct Args {
    /// Control socket of the daemon [env: COYOTE_SOCKET]
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// More logging on stderr (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Queue a pulse: <channel> <amp> [freq] [copies]
    Shock {
        #[arg(num_args = 0.., allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Show device and queue status
    Status,
    /// Print the pairing payload to scan in the DG-Lab app
    Pair,
    /// Change the owner amplitude cap (0..100)
    SetMax {
        #[arg(allow_hyphen_values = true)]
        value: i64,
    },
    /// Stream device events until interrupted
    Watch,
}

/// Socket from the flag, then `COYOTE_SOCKET`, then the default.
fn socket_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env::var_os("COYOTE_SOCKET").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point shared by the `coyote` binaries.
pub fn run() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = ClientConfig {
        socket_path: socket_path(args.socket),
        ..ClientConfig::default()
    };
    debug!(socket = %config.socket_path.display(), "Using daemon socket");

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?
        .block_on(execute(args.command, config))
}

async fn execute(command: Command, config: ClientConfig) -> Result<ExitCode> {
    match command {
        Command::Shock { args } => shock(&args, &config).await,
        Command::Status => {
            let mut client = DaemonClient::connect(&config).await?;
            let status = client.status().await?;
            println!("{}", render::status(&status));
            client.disconnect().await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Pair => {
            let mut client = DaemonClient::connect(&config).await?;
            let url = client.pairing().await?;
            client.disconnect().await?;
            match url {
                Some(url) => {
                    println!("{url}");
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("The daemon has no device listener yet.");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::SetMax { value } => {
            let mut client = DaemonClient::connect(&config).await?;
            let value = client
                .set_owner_max(value)
                .await
                .context("Failed to set owner max")?;
            println!("Owner max power set to {value}");
            client.disconnect().await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch => watch(&config).await,
    }
}

async fn shock(args: &[String], config: &ClientConfig) -> Result<ExitCode> {
    let parsed = match parse_shock_args(args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{e}\n{}", usage());
            return Ok(ExitCode::from(2));
        }
    };

    for note in &parsed.notes {
        println!("{note}");
    }

    let mut client = DaemonClient::connect(config).await?;
    let outcome = client.shock(&parsed.request).await?;
    client.disconnect().await?;

    match &outcome {
        ShockOutcome::Sent(_) => {
            println!("{}", render::shock(&outcome));
            Ok(ExitCode::SUCCESS)
        }
        ShockOutcome::Failed { .. } => {
            eprintln!("{}", render::shock(&outcome));
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn watch(config: &ClientConfig) -> Result<ExitCode> {
    let mut client = DaemonClient::connect(config).await?;
    let status = client.subscribe().await?;
    println!("{}", render::status(&status));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                client.disconnect().await?;
                return Ok(ExitCode::SUCCESS);
            }

            event = client.next_event() => {
                match event? {
                    Some(event) => println!("{}", render::event(&event)),
                    None => {
                        eprintln!("Daemon closed the connection.");
                        return Ok(ExitCode::FAILURE);
                    }
                }
            }
        }
    }
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
    fn test_shock_collects_free_args() {
        let args = Args::try_parse_from(["coyote", "shock", "A", "25", "20", "5"]).unwrap();
        match args.command {
            Command::Shock { args } => assert_eq!(args, vec!["A", "25", "20", "5"]),
            other => panic!("expected Shock, got {other:?}"),
        }
    }

    #[test]
    fn test_shock_accepts_negative_numbers_for_the_parser() {
        let args = Args::try_parse_from(["coyote", "shock", "A", "20", "-5"]).unwrap();
        assert!(matches!(args.command, Command::Shock { ref args } if args.len() == 3));
    }

    #[test]
    fn test_set_max_and_socket_flag() {
        let args =
            Args::try_parse_from(["coyote", "--socket", "/run/c.sock", "set-max", "40"]).unwrap();
        assert!(matches!(args.command, Command::SetMax { value: 40 }));
        assert_eq!(socket_path(args.socket), PathBuf::from("/run/c.sock"));
    }

    #[test]
    fn test_verbose_counts() {
        let args = Args::try_parse_from(["coyote", "-vv", "status"]).unwrap();
        assert_eq!(args.verbose, 2);
    }
}
