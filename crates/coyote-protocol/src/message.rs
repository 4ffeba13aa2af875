//! Control protocol message types for daemon communication.

use crate::version::ProtocolVersion;
use chrono::{DateTime, Utc};
use coyote_core::limits::{DEFAULT_AMPLITUDE, DEFAULT_COPIES, DEFAULT_FREQUENCY};
use coyote_core::{
    PulseError, PulseErrorCode, PulseReceipt, PulseRequest, SessionId, SessionInfo,
    StrengthReport,
};
use serde::{Deserialize, Serialize};

fn default_amp() -> i64 {
    DEFAULT_AMPLITUDE
}

fn default_freq() -> i64 {
    DEFAULT_FREQUENCY
}

fn default_copies() -> i64 {
    DEFAULT_COPIES
}

/// Message types that can be sent by clients to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Client handshake/connection request
    Connect {
        /// Client identifier (optional)
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// Queue a pulse and wait for it to execute
    Shock {
        channel: String,
        #[serde(default = "default_amp")]
        amp: i64,
        #[serde(default = "default_freq")]
        freq: i64,
        #[serde(default = "default_copies")]
        copies: i64,
    },

    /// Request device and queue status
    Status,

    /// Request the pairing payload for the app
    Pairing,

    /// Change the owner amplitude cap
    SetOwnerMax { value: i64 },

    /// Subscribe to device events
    Subscribe,

    /// Unsubscribe from device events
    Unsubscribe,

    /// Ping to check connection
    Ping {
        /// Sequence number for matching pong response
        seq: u64,
    },

    /// Client disconnecting gracefully
    Disconnect,
}

/// Messages sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Protocol version
    pub protocol_version: ProtocolVersion,

    /// Message payload
    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect { client_id })
    }

    pub fn shock(request: &PulseRequest) -> Self {
        Self::new(MessageType::Shock {
            channel: request.channel.clone(),
            amp: request.amplitude,
            freq: request.frequency,
            copies: request.repeat_count,
        })
    }

    pub fn status() -> Self {
        Self::new(MessageType::Status)
    }

    pub fn pairing() -> Self {
        Self::new(MessageType::Pairing)
    }

    pub fn set_owner_max(value: i64) -> Self {
        Self::new(MessageType::SetOwnerMax { value })
    }

    pub fn subscribe() -> Self {
        Self::new(MessageType::Subscribe)
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

/// Device lifecycle and telemetry events pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// The app completed pairing.
    Bound {
        session_id: SessionId,
        bound_at: DateTime<Utc>,
    },
    /// The session ended (disconnect, transport error, shutdown).
    Closed { session_id: SessionId, reason: String },
    /// The app reported new channel strengths.
    Strength {
        session_id: SessionId,
        report: StrengthReport,
    },
    /// A feedback button was pressed in the app.
    Feedback { session_id: SessionId, button: u8 },
    /// A queued pulse was executed. Exactly one of `receipt` and `error`
    /// is set.
    Pulse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        receipt: Option<PulseReceipt>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<PulseErrorCode>,
    },
}

impl DeviceEvent {
    /// Pulse event for an executed queue entry.
    pub fn pulse(client_id: Option<String>, outcome: Result<PulseReceipt, PulseErrorCode>) -> Self {
        let (receipt, error) = match outcome {
            Ok(receipt) => (Some(receipt), None),
            Err(code) => (None, Some(code)),
        };
        Self::Pulse {
            client_id,
            receipt,
            error,
        }
    }
}

/// Messages sent from daemon to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Connection accepted
    Connected {
        protocol_version: ProtocolVersion,
        client_id: String,
    },

    /// Connection rejected (version mismatch, etc.)
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    /// Pulse executed
    ShockResult { receipt: PulseReceipt },

    /// Pulse rejected or failed
    ShockFailed {
        code: PulseErrorCode,
        message: String,
    },

    /// Device and queue status
    Status {
        /// Current session, if any (binding or bound)
        #[serde(skip_serializing_if = "Option::is_none")]
        device: Option<SessionInfo>,
        owner_max: u8,
        /// Admitted pulses not yet executed
        pending: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        pairing_url: Option<String>,
    },

    /// Pairing payload (None until the device listener is up)
    Pairing {
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },

    /// Owner cap changed
    OwnerMaxUpdated { value: u8 },

    /// Pushed to subscribers
    DeviceEvent { event: DeviceEvent },

    /// Pong response to ping
    Pong { seq: u64 },

    /// Error response
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl DaemonMessage {
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    /// Maps a queue outcome to the matching reply.
    pub fn shock_outcome(outcome: Result<PulseReceipt, PulseError>) -> Self {
        match outcome {
            Ok(receipt) => Self::ShockResult { receipt },
            Err(e) => Self::ShockFailed {
                code: e.code(),
                message: e.to_string(),
            },
        }
    }

    pub fn device_event(event: DeviceEvent) -> Self {
        Self::DeviceEvent { event }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }
}
