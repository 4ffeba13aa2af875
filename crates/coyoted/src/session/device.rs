//! The device session - one paired app connection.
//!
//! A `DeviceSession` owns the write side of the transport (behind the
//! [`DeviceLink`] seam) and tracks the `Binding → Bound → Closed`
//! lifecycle. The execution worker is the only caller of
//! [`DeviceSession::send_pulse`]; the transport task sends heartbeats and
//! closes the session. Both go through the same link lock, so frames from
//! one pulse are never interleaved with a heartbeat.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - State changes go through `watch::Sender` and never block

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use coyote_core::waveform;
use coyote_core::{EffectivePulse, PulseError, SessionId, SessionInfo, SessionState, StrengthReport};
use coyote_protocol::dglab::DglabFrame;

// ============================================================================
// Transport Seam
// ============================================================================

/// Write half of a device connection.
#[async_trait]
pub trait DeviceLink: Send {
    /// Sends one text frame and waits for the write to complete.
    async fn send_text(&mut self, text: String) -> Result<(), LinkError>;

    /// Sends a transport-level keepalive, if the transport has one.
    async fn ping(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    /// Closes the connection. Errors are ignored; the peer may be gone.
    async fn close(&mut self);
}

/// Errors raised by a [`DeviceLink`].
#[derive(Debug, Clone, Error)]
pub enum LinkError {
    #[error("link closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("failed to encode frame: {0}")]
    Encode(String),
}

// ============================================================================
// Device Session
// ============================================================================

/// The one allowed device binding.
pub struct DeviceSession {
    /// Id assigned to the app during pairing
    id: SessionId,

    /// Our own client id (the path in the pairing URL)
    local_id: SessionId,

    /// Lifecycle state; receivers observe closure
    state: watch::Sender<SessionState>,

    /// Set once when the handshake completes
    bound_at: OnceLock<DateTime<Utc>>,

    /// Last strength report from the app
    strength: watch::Sender<Option<StrengthReport>>,

    /// Write half of the transport
    link: Mutex<Box<dyn DeviceLink>>,
}

impl DeviceSession {
    /// Creates a session in `Binding` state.
    pub fn new(id: SessionId, local_id: SessionId, link: Box<dyn DeviceLink>) -> Self {
        let (state, _) = watch::channel(SessionState::Binding);
        let (strength, _) = watch::channel(None);
        Self {
            id,
            local_id,
            state,
            bound_at: OnceLock::new(),
            strength,
            link: Mutex::new(link),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn local_id(&self) -> &SessionId {
        &self.local_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_bound(&self) -> bool {
        self.state().is_bound()
    }

    pub fn bound_at(&self) -> Option<DateTime<Utc>> {
        self.bound_at.get().copied()
    }

    pub fn strength(&self) -> Option<StrengthReport> {
        *self.strength.borrow()
    }

    /// Watches lifecycle changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            state: self.state(),
            bound_at: self.bound_at(),
            strength: self.strength(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// `Binding → Bound`. Returns false from any other state.
    pub fn mark_bound(&self) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == SessionState::Binding {
                *state = SessionState::Bound;
                true
            } else {
                false
            }
        });
        if changed {
            let _ = self.bound_at.set(Utc::now());
        }
        changed
    }

    /// Moves to `Closed`. Returns false if already closed.
    pub fn mark_closed(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_closed() {
                false
            } else {
                *state = SessionState::Closed;
                true
            }
        })
    }

    /// Closes the session, telling the app why when `code` is given.
    ///
    /// Idempotent: only the first call touches the link.
    pub async fn close(&self, code: Option<&str>) {
        if !self.mark_closed() {
            return;
        }

        let mut link = self.link.lock().await;
        if let Some(code) = code {
            let frame = DglabFrame::break_link(self.local_id.as_str(), self.id.as_str(), code);
            if let Ok(text) = frame.to_json() {
                if let Err(e) = link.send_text(text).await {
                    debug!(session_id = %self.id, error = %e, "Could not send break frame");
                }
            }
        }
        link.close().await;
        debug!(session_id = %self.id, "Device session closed");
    }

    /// Records a strength report from the app.
    pub fn record_strength(&self, report: StrengthReport) {
        self.strength.send_replace(Some(report));
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Sends a raw frame regardless of lifecycle state (handshake use).
    pub async fn send_frame(&self, frame: &DglabFrame) -> Result<(), LinkError> {
        let text = frame.to_json().map_err(|e| LinkError::Encode(e.to_string()))?;
        self.link.lock().await.send_text(text).await
    }

    /// Sends the protocol heartbeat plus a transport keepalive.
    pub async fn send_heartbeat(&self) -> Result<(), LinkError> {
        let frame = DglabFrame::heartbeat(self.local_id.as_str(), self.id.as_str());
        let text = frame.to_json().map_err(|e| LinkError::Encode(e.to_string()))?;

        let mut link = self.link.lock().await;
        link.send_text(text).await?;
        link.ping().await
    }

    /// Sends one pulse to the device.
    ///
    /// Encodes the pulse into a `clear` message plus waveform frames and
    /// writes them in order. Returns once the writes complete; it does not
    /// wait for the device to finish playing.
    ///
    /// # Errors
    ///
    /// - `PulseError::DeviceNotBound` if the session is not `Bound`
    /// - `PulseError::InvalidParameters` if the pulse cannot be encoded
    /// - `PulseError::TransportError` if a write fails; the session is
    ///   closed before returning
    pub async fn send_pulse(&self, pulse: &EffectivePulse) -> Result<(), PulseError> {
        if !self.is_bound() {
            return Err(PulseError::DeviceNotBound);
        }

        let messages = waveform::encode(pulse)?;

        let mut link = self.link.lock().await;

        // The session may have closed while we waited for the lock.
        if !self.is_bound() {
            return Err(PulseError::DeviceNotBound);
        }

        for body in messages {
            let frame = DglabFrame::command(self.local_id.as_str(), self.id.as_str(), &body);
            let result = match frame.to_json() {
                Ok(text) => link.send_text(text).await,
                Err(e) => Err(LinkError::Encode(e.to_string())),
            };

            if let Err(e) = result {
                warn!(session_id = %self.id, error = %e, "Device write failed, closing session");
                self.mark_closed();
                link.close().await;
                return Err(PulseError::transport(e));
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("bound_at", &self.bound_at())
            .finish()
    }
}
