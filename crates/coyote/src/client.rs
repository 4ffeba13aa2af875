//! Daemon connection client for the Coyote CLI.
//!
//! This module provides the `DaemonClient` which handles:
//! - Connection to the daemon via Unix socket
//! - The `connect` handshake and protocol version check
//! - One request, one reply exchanges for commands
//! - Reading pushed device events after `subscribe`
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, info};

use coyote_core::{PulseErrorCode, PulseReceipt, PulseRequest, SessionInfo};
use coyote_protocol::{ClientMessage, DaemonMessage, DeviceEvent, ProtocolVersion};

use crate::error::{CliError, Result};

/// Socket used when neither `--socket` nor `COYOTE_SOCKET` is set.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/coyote.sock";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the daemon client.
///
/// # Example
///
/// ```rust
/// use coyote_cli::client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     socket_path: std::path::PathBuf::from("/run/coyote.sock"),
///     reply_timeout: Duration::from_secs(2),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path to the Unix socket where the daemon listens.
    pub socket_path: PathBuf,

    /// Time allowed for the connect handshake.
    pub connect_timeout: Duration,

    /// Time allowed for replies to status, pairing and owner cap requests.
    ///
    /// Shock requests wait for execution and are not bounded by this.
    pub reply_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            connect_timeout: Duration::from_secs(5),
            reply_timeout: Duration::from_secs(10),
        }
    }
}

// ============================================================================
// Replies
// ============================================================================

/// Outcome of a `shock` request as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShockOutcome {
    Sent(PulseReceipt),
    Failed { code: PulseErrorCode, message: String },
}

/// Snapshot returned by `status` and on `subscribe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatus {
    pub device: Option<SessionInfo>,
    pub owner_max: u8,
    pub pending: usize,
    pub pairing_url: Option<String>,
}

// ============================================================================
// Daemon Client
// ============================================================================

/// A connected, handshaken control connection.
///
/// # Example
///
/// ```rust,ignore
/// use coyote_cli::client::{ClientConfig, DaemonClient};
/// use coyote_core::PulseRequest;
///
/// let mut client = DaemonClient::connect(&ClientConfig::default()).await?;
/// let outcome = client.shock(&PulseRequest::new("A", 20, 20, 5)).await?;
/// ```
pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    client_id: String,
    reply_timeout: Duration,
}

impl DaemonClient {
    /// Connects to the daemon and performs the handshake.
    ///
    /// # Errors
    ///
    /// * `CliError::DaemonConnection` - socket missing or refusing
    /// * `CliError::VersionMismatch` - daemon speaks another major version
    /// * `CliError::Timeout` - no handshake reply in time
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        debug!(socket_path = %config.socket_path.display(), "Connecting to daemon");

        let stream = timeout(config.connect_timeout, UnixStream::connect(&config.socket_path))
            .await
            .map_err(|_| CliError::Timeout)?
            .map_err(|source| CliError::DaemonConnection {
                path: config.socket_path.clone(),
                source,
            })?;

        let (reader, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
            client_id: String::new(),
            reply_timeout: config.reply_timeout,
        };

        let client_id = format!("coyote-cli-{}", std::process::id());
        client.send(&ClientMessage::connect(Some(client_id))).await?;

        let response = timeout(config.connect_timeout, client.next_message())
            .await
            .map_err(|_| CliError::Timeout)??;

        match response {
            DaemonMessage::Connected {
                protocol_version,
                client_id,
            } => {
                if !ProtocolVersion::CURRENT.is_compatible_with(&protocol_version) {
                    return Err(CliError::VersionMismatch {
                        client_version: ProtocolVersion::CURRENT.to_string(),
                        daemon_version: protocol_version.to_string(),
                    });
                }
                info!(client_id = %client_id, protocol_version = %protocol_version, "Handshake complete");
                client.client_id = client_id;
                Ok(client)
            }
            DaemonMessage::Rejected {
                protocol_version, ..
            } => Err(CliError::VersionMismatch {
                client_version: ProtocolVersion::CURRENT.to_string(),
                daemon_version: protocol_version.to_string(),
            }),
            other => Err(CliError::ProtocolError(format!(
                "Unexpected response to connect: {other:?}"
            ))),
        }
    }

    /// Id the daemon assigned to this connection.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Submits a pulse and waits until the daemon has executed it.
    pub async fn shock(&mut self, request: &PulseRequest) -> Result<ShockOutcome> {
        self.send(&ClientMessage::shock(request)).await?;

        // Execution waits behind every earlier pulse, so no reply timeout.
        match self.next_message().await? {
            DaemonMessage::ShockResult { receipt } => Ok(ShockOutcome::Sent(receipt)),
            DaemonMessage::ShockFailed { code, message } => {
                Ok(ShockOutcome::Failed { code, message })
            }
            other => Err(unexpected("shock", other)),
        }
    }

    pub async fn status(&mut self) -> Result<DaemonStatus> {
        match self.request(&ClientMessage::status()).await? {
            DaemonMessage::Status {
                device,
                owner_max,
                pending,
                pairing_url,
            } => Ok(DaemonStatus {
                device,
                owner_max,
                pending,
                pairing_url,
            }),
            other => Err(unexpected("status", other)),
        }
    }

    /// Pairing payload to render as a QR code in the DG-Lab app.
    pub async fn pairing(&mut self) -> Result<Option<String>> {
        match self.request(&ClientMessage::pairing()).await? {
            DaemonMessage::Pairing { url } => Ok(url),
            other => Err(unexpected("pairing", other)),
        }
    }

    /// Changes the owner cap and returns the value now in force.
    pub async fn set_owner_max(&mut self, value: i64) -> Result<u8> {
        match self.request(&ClientMessage::set_owner_max(value)).await? {
            DaemonMessage::OwnerMaxUpdated { value } => Ok(value),
            other => Err(unexpected("set_owner_max", other)),
        }
    }

    /// Subscribes to device events and returns the initial status.
    pub async fn subscribe(&mut self) -> Result<DaemonStatus> {
        match self.request(&ClientMessage::subscribe()).await? {
            DaemonMessage::Status {
                device,
                owner_max,
                pending,
                pairing_url,
            } => Ok(DaemonStatus {
                device,
                owner_max,
                pending,
                pairing_url,
            }),
            other => Err(unexpected("subscribe", other)),
        }
    }

    /// Waits for the next pushed device event.
    ///
    /// Returns `Ok(None)` when the daemon closes the connection.
    pub async fn next_event(&mut self) -> Result<Option<DeviceEvent>> {
        loop {
            match self.next_message().await {
                Ok(DaemonMessage::DeviceEvent { event }) => return Ok(Some(event)),
                Ok(other) => debug!(message = ?other, "Ignoring non-event message"),
                Err(CliError::Disconnected) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    /// Tells the daemon we are leaving.
    pub async fn disconnect(mut self) -> Result<()> {
        self.send(&ClientMessage::disconnect()).await
    }

    /// Sends a request and waits for its reply within the reply timeout.
    ///
    /// A daemon `error` reply becomes `CliError::Daemon`.
    async fn request(&mut self, message: &ClientMessage) -> Result<DaemonMessage> {
        self.send(message).await?;
        let reply = timeout(self.reply_timeout, self.next_message())
            .await
            .map_err(|_| CliError::Timeout)??;
        match reply {
            DaemonMessage::Error { message, code } => Err(CliError::Daemon { message, code }),
            other => Ok(other),
        }
    }

    /// Serializes the message to JSON and writes it followed by a newline.
    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        debug!(message_type = ?message.message, "Sent message to daemon");
        Ok(())
    }

    /// Reads one JSON line from the daemon.
    async fn next_message(&mut self) -> Result<DaemonMessage> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(CliError::Disconnected);
        }
        Ok(serde_json::from_str(line.trim())?)
    }
}

fn unexpected(request: &str, reply: DaemonMessage) -> CliError {
    match reply {
        DaemonMessage::Error { message, code } => CliError::Daemon { message, code },
        other => CliError::ProtocolError(format!("Unexpected reply to {request}: {other:?}")),
    }
}
