//! One app connection: upgrade, pairing handshake and the bound loop.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Failed replies to the app are logged and otherwise ignored

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use coyote_core::waveform::MAX_MESSAGE_LEN;
use coyote_core::{SessionId, SessionState};
use coyote_protocol::dglab::{code, AppReport, DglabFrame, FrameType};

use super::link::WsLink;
use super::TransportConfig;
use crate::session::{CloseReason, DeviceSession, SessionEvent, SessionRegistry};

type WsReader = SplitStream<WebSocketStream<TcpStream>>;

/// Handles a single device socket from accept to close.
pub(super) struct DeviceConnection {
    registry: SessionRegistry,
    local_id: SessionId,
    config: TransportConfig,
    cancel_token: CancellationToken,
    peer: SocketAddr,
}

impl DeviceConnection {
    pub(super) fn new(
        registry: SessionRegistry,
        local_id: SessionId,
        config: TransportConfig,
        cancel_token: CancellationToken,
        peer: SocketAddr,
    ) -> Self {
        Self {
            registry,
            local_id,
            config,
            cancel_token,
            peer,
        }
    }

    /// Runs the connection to completion.
    pub(super) async fn run(self, stream: TcpStream) {
        let mut path = String::new();
        let record_path = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            path = req.uri().path().to_string();
            Ok(resp)
        };

        let ws = match accept_hdr_async(stream, record_path).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "WebSocket upgrade failed");
                return;
            }
        };

        let (sink, mut reader) = ws.split();
        let app_id = SessionId::generate();
        let session = Arc::new(DeviceSession::new(
            app_id.clone(),
            self.local_id.clone(),
            Box::new(WsLink::new(sink)),
        ));

        if path.trim_matches('/') != self.local_id.as_str() {
            warn!(peer = %self.peer, path = %path, "Device connected with unknown client id");
            self.reply(&session, DglabFrame::bind_result("", app_id.as_str(), code::QR_CLIENT_MISSING))
                .await;
            session.close(None).await;
            return;
        }

        if let Err(e) = self.registry.reserve(Arc::clone(&session)).await {
            info!(peer = %self.peer, error = %e, "Rejecting second device connection");
            self.reply(
                &session,
                DglabFrame::bind_result(self.local_id.as_str(), app_id.as_str(), code::ALREADY_BOUND),
            )
            .await;
            session.close(None).await;
            return;
        }

        info!(peer = %self.peer, session_id = %app_id, "Device connected, waiting for bind");

        // Subscribed while still Binding, so a close at any later point is seen.
        let state_rx = session.subscribe_state();

        let reason = match self.handshake(&session, &mut reader).await {
            Ok(()) => self.serve(&session, &mut reader, state_rx).await,
            Err(reason) => reason,
        };

        session.close(Some(code::PEER_DISCONNECTED)).await;
        self.registry.release(&app_id, reason).await;
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    /// Assigns the app its id and waits for a matching bind request.
    async fn handshake(
        &self,
        session: &DeviceSession,
        reader: &mut WsReader,
    ) -> Result<(), CloseReason> {
        let local = self.local_id.as_str();
        let app = session.id().as_str();

        session
            .send_frame(&DglabFrame::assign_id(app))
            .await
            .map_err(|e| CloseReason::TransportError(e.to_string()))?;

        let deadline = sleep(self.config.handshake_timeout);
        tokio::pin!(deadline);

        loop {
            let msg = tokio::select! {
                _ = self.cancel_token.cancelled() => return Err(CloseReason::Shutdown),
                _ = &mut deadline => {
                    warn!(session_id = %app, "Pairing handshake timed out");
                    return Err(CloseReason::HandshakeFailed("timed out".to_string()));
                }
                msg = reader.next() => msg,
            };

            let text = match msg {
                None | Some(Ok(Message::Close(_))) => return Err(CloseReason::PeerClosed),
                Some(Err(e)) => return Err(CloseReason::TransportError(e.to_string())),
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(_)) => continue,
            };

            if text.len() > MAX_MESSAGE_LEN {
                self.reply(session, DglabFrame::error(local, app, code::MESSAGE_TOO_LONG))
                    .await;
                continue;
            }

            let frame = match DglabFrame::parse(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(session_id = %app, error = %e, "Ignoring malformed frame");
                    self.reply(session, DglabFrame::error(local, app, code::NOT_JSON))
                        .await;
                    continue;
                }
            };

            if !frame.is_bind_request() {
                self.reply(session, DglabFrame::error(local, app, code::NOT_PAIRED))
                    .await;
                continue;
            }

            if frame.client_id != local || frame.target_id != app {
                warn!(
                    session_id = %app,
                    client_id = %frame.client_id,
                    target_id = %frame.target_id,
                    "Bind request with unknown ids"
                );
                self.reply(session, DglabFrame::bind_result(local, app, code::TARGET_NOT_FOUND))
                    .await;
                return Err(CloseReason::HandshakeFailed("unknown ids".to_string()));
            }

            session
                .send_frame(&DglabFrame::bind_result(local, app, code::OK))
                .await
                .map_err(|e| CloseReason::TransportError(e.to_string()))?;

            if !self.registry.mark_bound(session.id()).await {
                return Err(CloseReason::HandshakeFailed(
                    "session left the registry".to_string(),
                ));
            }
            return Ok(());
        }
    }

    // ========================================================================
    // Bound Loop
    // ========================================================================

    /// Heartbeats, telemetry and disconnect detection while bound.
    ///
    /// The idle timeout is never shorter than two heartbeat periods, so a
    /// pong to the previous heartbeat always has time to arrive.
    async fn serve(
        &self,
        session: &DeviceSession,
        reader: &mut WsReader,
        mut state_rx: watch::Receiver<SessionState>,
    ) -> CloseReason {
        if state_rx.borrow_and_update().is_closed() {
            return CloseReason::TransportError("device write failed".to_string());
        }

        let period = self.config.heartbeat;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let idle_timeout = self.config.idle_timeout.max(period.saturating_mul(2));
        let idle = sleep(idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => return CloseReason::Shutdown,

                _ = &mut idle => {
                    warn!(session_id = %session.id(), "Nothing heard from the app, closing");
                    return CloseReason::IdleTimeout;
                }

                _ = heartbeat.tick() => {
                    if let Err(e) = session.send_heartbeat().await {
                        return CloseReason::TransportError(e.to_string());
                    }
                    debug!(session_id = %session.id().short(), "Heartbeat sent");
                }

                changed = state_rx.changed() => {
                    if changed.is_err() || state_rx.borrow().is_closed() {
                        return CloseReason::TransportError("device write failed".to_string());
                    }
                }

                msg = reader.next() => {
                    idle.as_mut().reset(Instant::now() + idle_timeout);
                    match msg {
                        None | Some(Ok(Message::Close(_))) => return CloseReason::PeerClosed,
                        Some(Err(e)) => return CloseReason::TransportError(e.to_string()),
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reason) = self.handle_text(session, &text).await {
                                return reason;
                            }
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    /// Handles one text frame from a bound app. Returns a reason to close.
    async fn handle_text(&self, session: &DeviceSession, text: &str) -> Option<CloseReason> {
        let local = self.local_id.as_str();
        let app = session.id().as_str();

        if text.len() > MAX_MESSAGE_LEN {
            self.reply(session, DglabFrame::error(local, app, code::MESSAGE_TOO_LONG))
                .await;
            return None;
        }

        let frame = match DglabFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(session_id = %app, error = %e, "Ignoring malformed frame");
                self.reply(session, DglabFrame::error(local, app, code::NOT_JSON))
                    .await;
                return None;
            }
        };

        match frame.kind {
            FrameType::Msg => {
                self.handle_report(session, &frame.message);
                None
            }
            FrameType::Break => {
                info!(session_id = %app, code = %frame.message, "App ended the session");
                Some(CloseReason::PeerClosed)
            }
            FrameType::Heartbeat => None,
            FrameType::Bind | FrameType::Error => {
                debug!(session_id = %app, kind = ?frame.kind, message = %frame.message, "Ignoring frame");
                None
            }
        }
    }

    fn handle_report(&self, session: &DeviceSession, message: &str) {
        let session_id = session.id().clone();
        match AppReport::parse(message) {
            AppReport::Strength(report) => {
                debug!(session_id = %session_id.short(), strength = %report, "Strength report");
                session.record_strength(report);
                self.registry
                    .publish(SessionEvent::Strength { session_id, report });
            }
            AppReport::Feedback(button) => {
                debug!(session_id = %session_id.short(), button, "Feedback button");
                self.registry
                    .publish(SessionEvent::Feedback { session_id, button });
            }
            AppReport::Other(other) => {
                debug!(session_id = %session_id.short(), message = %other, "Unrecognised app message");
            }
        }
    }

    async fn reply(&self, session: &DeviceSession, frame: DglabFrame) {
        if let Err(e) = session.send_frame(&frame).await {
            debug!(peer = %self.peer, error = %e, "Failed to reply to device");
        }
    }
}
