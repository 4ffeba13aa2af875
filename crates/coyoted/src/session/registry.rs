//! Single-slot session registry.
//!
//! Holds at most one non-`Closed` [`DeviceSession`]. The transport reserves
//! the slot when an app connects, marks it bound after the handshake and
//! releases it on disconnect. The execution worker reads the slot before
//! each pulse. Lifecycle and telemetry changes are published as
//! [`SessionEvent`]s for subscribers.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Event publishing ignores the "no subscribers" case

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use coyote_core::{PulseErrorCode, PulseReceipt, SessionId, SessionInfo, StrengthReport};

use super::device::DeviceSession;

/// Event channel capacity.
const EVENT_BUFFER: usize = 100;

// ============================================================================
// Events and Errors
// ============================================================================

/// Why a session left the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The app closed the socket or sent `break`.
    PeerClosed,
    /// Pairing did not complete.
    HandshakeFailed(String),
    /// A read or write on the socket failed.
    TransportError(String),
    /// Nothing was heard from the app for too long.
    IdleTimeout,
    /// The daemon is shutting down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => f.write_str("peer closed"),
            Self::HandshakeFailed(why) => write!(f, "handshake failed: {why}"),
            Self::TransportError(why) => write!(f, "transport error: {why}"),
            Self::IdleTimeout => f.write_str("idle timeout"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Published on every session lifecycle or telemetry change.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Bound {
        session_id: SessionId,
        bound_at: DateTime<Utc>,
    },
    Closed {
        session_id: SessionId,
        reason: CloseReason,
    },
    Strength {
        session_id: SessionId,
        report: StrengthReport,
    },
    Feedback {
        session_id: SessionId,
        button: u8,
    },
    /// A queued pulse finished executing, successfully or not.
    Pulse {
        seq: u64,
        caller: Option<String>,
        outcome: Result<PulseReceipt, PulseErrorCode>,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a device session is already active: {current}")]
    AlreadyOccupied { current: SessionId },
}

// ============================================================================
// Registry
// ============================================================================

/// Cheap-to-clone handle to the one device slot.
#[derive(Clone)]
pub struct SessionRegistry {
    slot: Arc<RwLock<Option<Arc<DeviceSession>>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            slot: Arc::new(RwLock::new(None)),
            events,
        }
    }

    /// Claims the slot for a new connection.
    ///
    /// A `Closed` session still in the slot is replaced.
    ///
    /// # Errors
    ///
    /// `RegistryError::AlreadyOccupied` if a `Binding` or `Bound` session
    /// holds the slot.
    pub async fn reserve(&self, session: Arc<DeviceSession>) -> Result<(), RegistryError> {
        let mut slot = self.slot.write().await;
        if let Some(current) = slot.as_ref() {
            if !current.state().is_closed() {
                return Err(RegistryError::AlreadyOccupied {
                    current: current.id().clone(),
                });
            }
        }

        debug!(session_id = %session.id(), "Device slot reserved");
        *slot = Some(session);
        Ok(())
    }

    /// Completes pairing for the session in the slot.
    ///
    /// Returns false if `session_id` no longer holds the slot or was not
    /// in `Binding` state.
    pub async fn mark_bound(&self, session_id: &SessionId) -> bool {
        let slot = self.slot.read().await;
        let Some(session) = slot.as_ref().filter(|s| s.id() == session_id) else {
            return false;
        };

        if !session.mark_bound() {
            return false;
        }

        let bound_at = session.bound_at().unwrap_or_else(Utc::now);
        info!(session_id = %session_id, "Device bound");
        self.publish(SessionEvent::Bound {
            session_id: session_id.clone(),
            bound_at,
        });
        true
    }

    /// Frees the slot if `session_id` still holds it.
    ///
    /// The session is marked `Closed` and a `Closed` event is published.
    /// Returns false when the slot belongs to someone else, so stale
    /// releases cannot evict a newer session.
    pub async fn release(&self, session_id: &SessionId, reason: CloseReason) -> bool {
        let removed = {
            let mut slot = self.slot.write().await;
            match slot.as_ref() {
                Some(current) if current.id() == session_id => slot.take(),
                _ => None,
            }
        };

        let Some(session) = removed else {
            return false;
        };

        session.mark_closed();
        info!(session_id = %session_id, reason = %reason, "Device session released");
        self.publish(SessionEvent::Closed {
            session_id: session_id.clone(),
            reason,
        });
        true
    }

    /// The session holding the slot, unless it is `Closed`.
    pub async fn current(&self) -> Option<Arc<DeviceSession>> {
        self.slot
            .read()
            .await
            .as_ref()
            .filter(|s| !s.state().is_closed())
            .cloned()
    }

    /// The session holding the slot, only if it is `Bound`.
    pub async fn bound(&self) -> Option<Arc<DeviceSession>> {
        self.slot
            .read()
            .await
            .as_ref()
            .filter(|s| s.is_bound())
            .cloned()
    }

    pub async fn is_bound(&self) -> bool {
        self.bound().await.is_some()
    }

    /// Snapshot of the current session.
    pub async fn info(&self) -> Option<SessionInfo> {
        self.current().await.map(|s| s.info())
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
