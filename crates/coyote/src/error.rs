//! Error types for the Coyote CLI.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// CLI Error Type
// ============================================================================

/// Errors talking to the daemon.
///
/// Connection errors name the socket so the user can check that `coyoted`
/// is running and listening where the CLI expects.
#[derive(Error, Debug)]
pub enum CliError {
    /// Could not reach the control socket.
    #[error("Failed to connect to daemon at {path}: {source} (is coyoted running?)")]
    DaemonConnection {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Protocol version mismatch with daemon
    #[error("Protocol version mismatch (client: {client_version}, daemon: {daemon_version})")]
    VersionMismatch {
        client_version: String,
        daemon_version: String,
    },

    /// The daemon answered with something we did not ask for.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The daemon reported an error for the request.
    #[error("Daemon error: {message}")]
    Daemon {
        message: String,
        code: Option<String>,
    },

    /// The daemon closed the connection before replying.
    #[error("Daemon closed the connection")]
    Disconnected,

    /// No reply within the configured time.
    #[error("Timed out waiting for the daemon")]
    Timeout,

    /// I/O error passthrough.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON parse error passthrough.
    #[error("Failed to parse message: {0}")]
    ParseError(#[from] serde_json::Error),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Convenience Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;
