//! Unix socket control server for the Coyote daemon.
//!
//! The server:
//! - Listens on a Unix socket for control clients (CLI, bots, scripts)
//! - Spawns a ConnectionHandler for each client
//! - Forwards device events to subscribed clients
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   DaemonServer  │
//! │                 │
//! │  UnixListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐ submit ┌─────────────────┐
//! │ConnectionHandler│───────▶│  CommandQueue   │
//! │   (per client)  │        └─────────────────┘
//! └─────────────────┘
//!         ▲
//!         │ device_event
//! ┌───────┴─────────┐  SessionEvent  ┌─────────────────┐
//! │ Event broadcast │◀───────────────│ SessionRegistry │
//! └─────────────────┘                └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, Subscriber, SubscriberWriter, SubscribersMap};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use coyote_protocol::{DaemonMessage, DeviceEvent};

use crate::queue::CommandQueue;
use crate::session::{SessionEvent, SessionRegistry};

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/coyote.sock";

/// Maximum number of concurrent event subscribers
pub const MAX_SUBSCRIBERS: usize = 10;

/// Shared state every connection handler needs.
#[derive(Clone)]
pub struct ServerContext {
    pub queue: CommandQueue,
    pub registry: SessionRegistry,
    /// QR payload for the app, once the device listener is up
    pub pairing_url: Option<String>,
}

/// Unix socket server for the Coyote daemon.
pub struct DaemonServer {
    /// Path to the Unix socket
    socket_path: PathBuf,

    /// Queue, registry and pairing info shared with handlers
    context: ServerContext,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating client IDs
    connection_counter: AtomicU64,

    /// Active event subscribers (keyed by client_id)
    subscribers: SubscribersMap,
}

impl DaemonServer {
    /// Creates a new daemon server.
    ///
    /// # Arguments
    ///
    /// * `socket_path` - Path where the Unix socket will be created
    /// * `queue` - Handle to the command queue
    /// * `registry` - The device session registry
    /// * `cancel_token` - Token for graceful shutdown
    pub fn new(
        socket_path: impl Into<PathBuf>,
        queue: CommandQueue,
        registry: SessionRegistry,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            context: ServerContext {
                queue,
                registry,
                pairing_url: None,
            },
            cancel_token,
            connection_counter: AtomicU64::new(0),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Sets the pairing payload returned by `status` and `pairing`.
    #[must_use]
    pub fn with_pairing_url(mut self, url: impl Into<String>) -> Self {
        self.context.pairing_url = Some(url.into());
        self
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Runs the server.
    ///
    /// Listens for connections until the cancellation token is triggered.
    /// This method does not return until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        // Remove a stale socket file from an earlier run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ServerError::SocketSetup {
                    path: self.socket_path.clone(),
                    error: e.to_string(),
                })?;
            }
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;

        info!(
            socket = %self.socket_path.display(),
            "Control server listening"
        );

        self.spawn_event_broadcaster();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.cleanup().await;
        Ok(())
    }

    /// Handles a new client connection by spawning a handler task.
    fn handle_connection(&self, stream: tokio::net::UnixStream, connection_number: u64) {
        let (reader, writer) = stream.into_split();
        let context = self.context.clone();
        let subscribers = Arc::clone(&self.subscribers);
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            let handler = ConnectionHandler::new(
                reader,
                writer,
                context,
                Arc::clone(&subscribers),
                connection_number,
            );

            let client_id = tokio::select! {
                id = handler.run() => id,
                _ = cancel_token.cancelled() => None,
            };

            if let Some(id) = client_id {
                let mut subs = subscribers.write().await;
                if subs.remove(&id).is_some() {
                    debug!(client_id = %id, "Removed disconnected subscriber");
                }
            }
        });
    }

    /// Spawns the task that forwards registry events to subscribers.
    fn spawn_event_broadcaster(&self) {
        let mut event_rx = self.context.registry.subscribe();
        let subscribers = Arc::clone(&self.subscribers);
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Event broadcaster shutting down");
                        break;
                    }

                    result = event_rx.recv() => {
                        match result {
                            Ok(event) => {
                                broadcast_event(&subscribers, &event).await;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Event broadcaster lagged, skipped events");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Returns the number of active subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Performs cleanup on shutdown.
    async fn cleanup(&self) {
        self.subscribers.write().await.clear();

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }

        info!("Server cleanup complete");
    }
}

/// Wire form of a registry event.
pub fn device_event(event: &SessionEvent) -> DeviceEvent {
    match event {
        SessionEvent::Bound {
            session_id,
            bound_at,
        } => DeviceEvent::Bound {
            session_id: session_id.clone(),
            bound_at: *bound_at,
        },
        SessionEvent::Closed { session_id, reason } => DeviceEvent::Closed {
            session_id: session_id.clone(),
            reason: reason.to_string(),
        },
        SessionEvent::Strength { session_id, report } => DeviceEvent::Strength {
            session_id: session_id.clone(),
            report: *report,
        },
        SessionEvent::Feedback { session_id, button } => DeviceEvent::Feedback {
            session_id: session_id.clone(),
            button: *button,
        },
        SessionEvent::Pulse {
            caller, outcome, ..
        } => DeviceEvent::pulse(caller.clone(), outcome.clone()),
    }
}

/// Sends an event to every subscriber, dropping the ones that fail.
async fn broadcast_event(subscribers: &SubscribersMap, event: &SessionEvent) {
    let msg = DaemonMessage::device_event(device_event(event));

    let json = match serde_json::to_string(&msg) {
        Ok(j) => j,
        Err(e) => {
            error!(error = %e, "Failed to serialize event");
            return;
        }
    };

    let subs = subscribers.read().await;
    let mut failed_clients = Vec::new();

    for (client_id, sub) in subs.iter() {
        let mut writer = sub.writer.lock().await;
        let send_result = async {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = send_result {
            debug!(
                client_id = %client_id,
                error = %e,
                "Failed to send event to subscriber"
            );
            failed_clients.push(client_id.clone());
        }
    }

    drop(subs);

    if !failed_clients.is_empty() {
        let mut subs = subscribers.write().await;
        for client_id in failed_clients {
            subs.remove(&client_id);
            debug!(client_id = %client_id, "Removed failed subscriber");
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CloseReason;
    use coyote_core::SessionId;

    #[test]
    fn test_default_socket_path() {
        assert_eq!(DEFAULT_SOCKET_PATH, "/tmp/coyote.sock");
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::SocketSetup {
            path: PathBuf::from("/tmp/test.sock"),
            error: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/tmp/test.sock"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_closed_event_carries_reason_text() {
        let event = SessionEvent::Closed {
            session_id: SessionId::new("app"),
            reason: CloseReason::IdleTimeout,
        };
        assert_eq!(
            device_event(&event),
            DeviceEvent::Closed {
                session_id: SessionId::new("app"),
                reason: "idle timeout".to_string(),
            }
        );
    }
}
