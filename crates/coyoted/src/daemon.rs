//! Wiring of the daemon's long-running parts.
//!
//! `Daemon::bind` builds the registry, queue, device listener and control
//! server; `Daemon::run` drives them until the cancellation token fires.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use coyote_protocol::dglab::code;

use crate::config::{ConfigError, DaemonConfig};
use crate::queue::{spawn_queue, CommandQueue};
use crate::server::{DaemonServer, ServerError};
use crate::session::{CloseReason, SessionRegistry};
use crate::transport::{PairingInfo, TransportError, TransportListener};

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// A bound, not yet running daemon.
pub struct Daemon {
    registry: SessionRegistry,
    queue: CommandQueue,
    listener: TransportListener,
    server: DaemonServer,
    cancel_token: CancellationToken,
}

impl Daemon {
    /// Binds the device port and prepares the control server.
    pub async fn bind(
        config: &DaemonConfig,
        cancel_token: CancellationToken,
    ) -> Result<Self, DaemonError> {
        let registry = SessionRegistry::new();
        let queue = spawn_queue(registry.clone(), config.owner_cap()?);
        info!(owner_max = queue.owner_cap().get(), "Command queue started");

        let listener =
            TransportListener::bind(config.transport(), registry.clone(), cancel_token.clone())
                .await?;

        let server = DaemonServer::new(
            &config.socket_path,
            queue.clone(),
            registry.clone(),
            cancel_token.clone(),
        )
        .with_pairing_url(listener.pairing().url.clone());

        Ok(Self {
            registry,
            queue,
            listener,
            server,
            cancel_token,
        })
    }

    pub fn pairing(&self) -> &PairingInfo {
        self.listener.pairing()
    }

    pub fn device_addr(&self) -> Result<SocketAddr, DaemonError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.server.socket_path().to_path_buf()
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Runs until cancelled, then closes any device session.
    pub async fn run(self) -> Result<(), DaemonError> {
        let listener_task = tokio::spawn(self.listener.run());

        let result = self.server.run().await;

        // A server error must still bring the listener down.
        self.cancel_token.cancel();
        match listener_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Device listener stopped with error"),
            Err(e) => warn!(error = %e, "Device listener task failed"),
        }

        if let Some(session) = self.registry.current().await {
            session.close(Some(code::PEER_DISCONNECTED)).await;
            self.registry
                .release(session.id(), CloseReason::Shutdown)
                .await;
        }

        info!(pending = self.queue.pending(), "Daemon stopped");
        result.map_err(Into::into)
    }
}
