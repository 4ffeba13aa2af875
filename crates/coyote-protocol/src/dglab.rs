//! DG-Lab app socket protocol (v2).
//!
//! Every frame is a JSON object `{type, clientId, targetId, message}`.
//! The daemon plays both the relay server and the controlling client, so
//! it only ever talks to one app:
//!
//! ```text
//!  app ──connect ws://host:port/<local id>──▶ daemon
//!  app ◀── bind {clientId: <app id>, message: "targetId"}
//!  app ──▶ bind {clientId: <local id>, targetId: <app id>, message: "DGLAB"}
//!  app ◀── bind {..., message: "200"}
//!  app ◀── msg "clear-1" / "pulse-A:[...]"      heartbeat "200"
//!  app ──▶ msg "strength-a+b+maxa+maxb" / "feedback-n"
//! ```

use coyote_core::StrengthReport;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message the server sends with the id it assigns to a new connection.
pub const ASSIGN_ID_MESSAGE: &str = "targetId";

/// Message the app sends to request binding.
pub const BIND_REQUEST_MESSAGE: &str = "DGLAB";

/// Prefix the app expects in its pairing QR code.
pub const QR_PREFIX: &str = "https://www.dungeon-lab.com/app-download.php#DGLAB-SOCKET#";

/// Result codes carried in `message` of bind/break/error frames.
pub mod code {
    pub const OK: &str = "200";
    pub const PEER_DISCONNECTED: &str = "209";
    pub const QR_CLIENT_MISSING: &str = "210";
    pub const NO_TARGET_ID: &str = "211";
    pub const ALREADY_BOUND: &str = "400";
    pub const TARGET_NOT_FOUND: &str = "401";
    pub const NOT_PAIRED: &str = "402";
    pub const NOT_JSON: &str = "403";
    pub const RECEIVER_OFFLINE: &str = "404";
    pub const MESSAGE_TOO_LONG: &str = "405";
    pub const SERVER_ERROR: &str = "500";
}

/// Pairing payload for a daemon reachable at `ws_url`.
///
/// `ws_url` must already contain the local client id as its path.
pub fn pairing_url(ws_url: &str) -> String {
    format!("{QR_PREFIX}{ws_url}")
}

// ============================================================================
// Frames
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Bind,
    Msg,
    Heartbeat,
    Break,
    Error,
}

/// One DG-Lab socket frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DglabFrame {
    #[serde(rename = "type")]
    pub kind: FrameType,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub target_id: String,
    #[serde(default)]
    pub message: String,
}

impl DglabFrame {
    fn new(kind: FrameType, client_id: &str, target_id: &str, message: &str) -> Self {
        Self {
            kind,
            client_id: client_id.to_string(),
            target_id: target_id.to_string(),
            message: message.to_string(),
        }
    }

    /// First frame on a new connection: tells the app its id.
    pub fn assign_id(app_id: &str) -> Self {
        Self::new(FrameType::Bind, app_id, "", ASSIGN_ID_MESSAGE)
    }

    /// Bind request as sent by the app (used by tests and simulators).
    pub fn bind_request(local_id: &str, app_id: &str) -> Self {
        Self::new(FrameType::Bind, local_id, app_id, BIND_REQUEST_MESSAGE)
    }

    /// Bind outcome with one of the [`code`] values.
    pub fn bind_result(local_id: &str, app_id: &str, code: &str) -> Self {
        Self::new(FrameType::Bind, local_id, app_id, code)
    }

    pub fn heartbeat(local_id: &str, app_id: &str) -> Self {
        Self::new(FrameType::Heartbeat, local_id, app_id, code::OK)
    }

    /// Command frame, e.g. `clear-1` or `pulse-A:[...]`.
    pub fn command(local_id: &str, app_id: &str, body: &str) -> Self {
        Self::new(FrameType::Msg, local_id, app_id, body)
    }

    /// Tells the app the link is going away.
    pub fn break_link(local_id: &str, app_id: &str, code: &str) -> Self {
        Self::new(FrameType::Break, local_id, app_id, code)
    }

    pub fn error(local_id: &str, app_id: &str, code: &str) -> Self {
        Self::new(FrameType::Error, local_id, app_id, code)
    }

    /// Parses a text frame.
    pub fn parse(text: &str) -> Result<Self, DglabError> {
        serde_json::from_str(text).map_err(|e| DglabError::NotJson(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, DglabError> {
        serde_json::to_string(self).map_err(|e| DglabError::NotJson(e.to_string()))
    }

    /// True for the app's bind request.
    pub fn is_bind_request(&self) -> bool {
        self.kind == FrameType::Bind && self.message == BIND_REQUEST_MESSAGE
    }
}

// ============================================================================
// App Reports
// ============================================================================

/// Telemetry the app sends inside `msg` frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppReport {
    /// `strength-a+b+maxa+maxb`
    Strength(StrengthReport),
    /// `feedback-n`: one of the app's feedback buttons (0..=9)
    Feedback(u8),
    /// Anything else, kept verbatim.
    Other(String),
}

impl AppReport {
    pub fn parse(message: &str) -> Self {
        if let Some(rest) = message.strip_prefix("strength-") {
            if let Some(report) = parse_strength(rest) {
                return Self::Strength(report);
            }
        } else if let Some(rest) = message.strip_prefix("feedback-") {
            if let Ok(button) = rest.trim().parse::<u8>() {
                return Self::Feedback(button);
            }
        }
        Self::Other(message.to_string())
    }
}

fn parse_strength(s: &str) -> Option<StrengthReport> {
    let mut parts = s.split('+').map(|p| p.trim().parse::<u8>());
    let report = StrengthReport {
        a: parts.next()?.ok()?,
        b: parts.next()?.ok()?,
        max_a: parts.next()?.ok()?,
        max_b: parts.next()?.ok()?,
    };
    match parts.next() {
        None => Some(report),
        Some(_) => None,
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DglabError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_wire_format() {
        let frame = DglabFrame::command("local", "app", "clear-1");
        let json: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "msg");
        assert_eq!(json["clientId"], "local");
        assert_eq!(json["targetId"], "app");
        assert_eq!(json["message"], "clear-1");
    }

    #[test]
    fn test_parse_bind_request() {
        let text = r#"{"type":"bind","clientId":"local","targetId":"app","message":"DGLAB"}"#;
        let frame = DglabFrame::parse(text).unwrap();
        assert!(frame.is_bind_request());
        assert_eq!(frame.client_id, "local");
        assert_eq!(frame.target_id, "app");
    }

    #[test]
    fn test_parse_tolerates_missing_fields() {
        let frame = DglabFrame::parse(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(frame.kind, FrameType::Heartbeat);
        assert!(frame.message.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(DglabFrame::parse("hello"), Err(DglabError::NotJson(_))));
        assert!(DglabFrame::parse(r#"{"type":"nope"}"#).is_err());
    }

    #[test]
    fn test_assign_id_frame() {
        let frame = DglabFrame::assign_id("app-1");
        assert_eq!(frame.kind, FrameType::Bind);
        assert_eq!(frame.client_id, "app-1");
        assert_eq!(frame.target_id, "");
        assert_eq!(frame.message, "targetId");
    }

    #[test]
    fn test_app_reports() {
        assert_eq!(
            AppReport::parse("strength-10+0+100+35"),
            AppReport::Strength(StrengthReport {
                a: 10,
                b: 0,
                max_a: 100,
                max_b: 35
            })
        );
        assert_eq!(AppReport::parse("feedback-3"), AppReport::Feedback(3));
        assert_eq!(
            AppReport::parse("strength-1+2+3"),
            AppReport::Other("strength-1+2+3".to_string())
        );
        assert_eq!(
            AppReport::parse("strength-1+2+3+4+5"),
            AppReport::Other("strength-1+2+3+4+5".to_string())
        );
    }

    #[test]
    fn test_pairing_url() {
        assert_eq!(
            pairing_url("ws://192.168.1.5:4567/abc"),
            "https://www.dungeon-lab.com/app-download.php#DGLAB-SOCKET#ws://192.168.1.5:4567/abc"
        );
    }
}
