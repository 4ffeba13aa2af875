//! Coyote CLI - command-line client for the Coyote daemon
//!
//! This library backs the `coyote` binary:
//! - `client` - one connection to the daemon's control socket
//! - `render` - plain-text output for replies and device events
//! - `cli` - argument parsing and the subcommands
//!
//! Every subcommand opens a fresh connection, performs the `connect`
//! handshake, sends one request and prints the reply. `watch` stays
//! subscribed and prints device events until interrupted.

pub mod cli;
pub mod client;
pub mod error;
pub mod render;

// Re-export commonly used types
pub use client::{ClientConfig, DaemonClient, DaemonStatus, ShockOutcome};
pub use error::{CliError, Result};
