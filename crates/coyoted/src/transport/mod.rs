//! Device transport - the WebSocket endpoint the DG-Lab app connects to.
//!
//! # Connection Lifecycle
//!
//! 1. `TransportListener::bind` - bind the TCP port and build the pairing URL
//! 2. The app scans the QR payload and connects to `ws://host:port/<local id>`
//! 3. The connection reserves the registry slot and runs the bind handshake
//! 4. While bound: heartbeats out, strength/feedback telemetry in
//! 5. Peer close, read/write error, idle timeout or shutdown frees the slot
//!
//! A second app connecting while the slot is taken is answered with bind
//! code `400` and closed; the existing session is left untouched.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Upgrade, handshake and bound loop for one socket |
//! | `link` | WebSocket write half behind the `DeviceLink` seam |
//! | `pairing` | Pairing payload and LAN address guessing |

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use coyote_core::SessionId;

use crate::session::SessionRegistry;

mod connection;
mod link;
mod pairing;

use connection::DeviceConnection;
pub use link::WsLink;
pub use pairing::{advertised_host, guess_lan_ip, PairingInfo};

// ============================================================================
// Configuration
// ============================================================================

/// Device listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind (0 picks a free port)
    pub port: u16,
    /// Host advertised in the pairing URL instead of the guessed LAN IP
    pub public_host: Option<String>,
    /// Interval between heartbeats to a bound app
    pub heartbeat: Duration,
    /// Time allowed between accept and a completed bind
    pub handshake_timeout: Duration,
    /// Close a bound session after this long without any frame from the app
    pub idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4567,
            public_host: None,
            heartbeat: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ============================================================================
// Listener
// ============================================================================

/// Accepts app connections until cancelled.
pub struct TransportListener {
    listener: TcpListener,
    config: TransportConfig,
    registry: SessionRegistry,
    pairing: PairingInfo,
    cancel_token: CancellationToken,
}

impl TransportListener {
    /// Binds the listener and prepares the pairing payload.
    ///
    /// A fresh local client id is generated on every start, so an old QR
    /// code stops working after a restart.
    pub async fn bind(
        config: TransportConfig,
        registry: SessionRegistry,
        cancel_token: CancellationToken,
    ) -> Result<Self, TransportError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let bound = listener.local_addr()?;
        let host = advertised_host(config.public_host.as_deref(), bound);
        let pairing = PairingInfo::new(SessionId::generate(), &host, bound.port());

        info!(addr = %bound, ws_url = %pairing.ws_url, "Device listener bound");

        Ok(Self {
            listener,
            config,
            registry,
            pairing,
            cancel_token,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn pairing(&self) -> &PairingInfo {
        &self.pairing
    }

    /// Accept loop. Returns when the cancellation token fires.
    pub async fn run(self) -> Result<(), TransportError> {
        info!(pairing_url = %self.pairing.url, "Scan this payload as a QR code in the DG-Lab app");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Device listener shutting down");
                    break;
                }

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(peer = %peer, "Device socket accepted");
                            let connection = DeviceConnection::new(
                                self.registry.clone(),
                                self.pairing.local_id.clone(),
                                self.config.clone(),
                                self.cancel_token.child_token(),
                                peer,
                            );
                            tokio::spawn(connection.run(stream));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept device connection");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
