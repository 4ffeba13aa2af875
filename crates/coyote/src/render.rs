//! Plain-text rendering of daemon replies for the terminal.

use chrono::{DateTime, Local, Utc};

use coyote_core::SessionState;
use coyote_protocol::DeviceEvent;

use crate::client::{DaemonStatus, ShockOutcome};

fn local_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// Multi-line status block for `coyote status` and `coyote watch`.
pub fn status(status: &DaemonStatus) -> String {
    let mut lines = Vec::new();

    match &status.device {
        Some(device) => {
            let mut line = format!("Device: {} ({})", device.state, device.id.short());
            if let (SessionState::Bound, Some(at)) = (device.state, &device.bound_at) {
                line.push_str(&format!(", bound since {}", local_time(at)));
            }
            lines.push(line);
            if let Some(strength) = &device.strength {
                lines.push(format!("Strength: {strength}"));
            }
        }
        None => lines.push("Device: not bound".to_string()),
    }

    lines.push(format!("Owner max: {}", status.owner_max));
    lines.push(format!("Pending pulses: {}", status.pending));

    if status.device.is_none() {
        if let Some(url) = &status.pairing_url {
            lines.push(format!("Pair with: {url}"));
        }
    }

    lines.join("\n")
}

/// One line per shock outcome.
pub fn shock(outcome: &ShockOutcome) -> String {
    match outcome {
        ShockOutcome::Sent(receipt) => receipt.to_string(),
        ShockOutcome::Failed { code, message } => format!("Failed ({code}): {message}"),
    }
}

/// One line per device event.
pub fn event(event: &DeviceEvent) -> String {
    match event {
        DeviceEvent::Bound {
            session_id,
            bound_at,
        } => format!("[{}] bound {}", local_time(bound_at), session_id.short()),
        DeviceEvent::Closed { session_id, reason } => {
            format!("[{}] closed {}: {reason}", local_time(&Utc::now()), session_id.short())
        }
        DeviceEvent::Strength { report, .. } => {
            format!("[{}] strength {report}", local_time(&Utc::now()))
        }
        DeviceEvent::Feedback { button, .. } => {
            format!("[{}] feedback button {button}", local_time(&Utc::now()))
        }
        DeviceEvent::Pulse {
            client_id,
            receipt,
            error,
        } => {
            let from = client_id.as_deref().unwrap_or("anonymous");
            let what = match (receipt, error) {
                (Some(receipt), _) => receipt.to_string(),
                (None, Some(code)) => format!("failed ({code})"),
                (None, None) => "no outcome".to_string(),
            };
            format!("[{}] {from}: {what}", local_time(&Utc::now()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coyote_core::{Channel, PulseErrorCode, PulseReceipt, SessionId, SessionInfo, StrengthReport};

    fn unbound() -> DaemonStatus {
        DaemonStatus {
            device: None,
            owner_max: 50,
            pending: 0,
            pairing_url: Some("https://example/qr".to_string()),
        }
    }

    #[test]
    fn test_unbound_status_shows_pairing_url() {
        let text = status(&unbound());
        assert!(text.contains("Device: not bound"));
        assert!(text.contains("Owner max: 50"));
        assert!(text.contains("Pair with: https://example/qr"));
    }

    #[test]
    fn test_bound_status_shows_strength() {
        let mut s = unbound();
        s.device = Some(SessionInfo {
            id: SessionId::new("0123456789abcdef"),
            state: SessionState::Bound,
            bound_at: Some(Utc::now()),
            strength: Some(StrengthReport {
                a: 10,
                b: 0,
                max_a: 100,
                max_b: 100,
            }),
        });

        let text = status(&s);
        assert!(text.contains("Device: bound"));
        assert!(text.contains("bound since"));
        assert!(text.contains("Strength: A 10/100 B 0/100"));
        assert!(!text.contains("Pair with"));
    }

    #[test]
    fn test_shock_lines() {
        let sent = ShockOutcome::Sent(PulseReceipt {
            channel: Channel::A,
            amp_requested: 80,
            amp_effective: 50,
            owner_max: 50,
            freq: 20,
            copies: 5,
            approx_duration_ms: 500,
        });
        assert!(shock(&sent).starts_with("Pulse A: amp=50"));

        let failed = ShockOutcome::Failed {
            code: PulseErrorCode::DeviceNotBound,
            message: "device/app not bound yet".to_string(),
        };
        assert_eq!(
            shock(&failed),
            "Failed (device_not_bound): device/app not bound yet"
        );
    }

    #[test]
    fn test_event_lines() {
        let closed = DeviceEvent::Closed {
            session_id: SessionId::new("abcdef0123456789"),
            reason: "peer closed".to_string(),
        };
        assert!(event(&closed).ends_with(": peer closed"));

        let feedback = DeviceEvent::Feedback {
            session_id: SessionId::new("x"),
            button: 4,
        };
        assert!(event(&feedback).ends_with("feedback button 4"));
    }

    #[test]
    fn test_pulse_event_lines() {
        let sent = DeviceEvent::Pulse {
            client_id: Some("alice".to_string()),
            receipt: Some(PulseReceipt {
                channel: Channel::B,
                amp_requested: 70,
                amp_effective: 30,
                owner_max: 30,
                freq: 20,
                copies: 2,
                approx_duration_ms: 200,
            }),
            error: None,
        };
        let line = event(&sent);
        assert!(line.contains("alice: Pulse B: amp=30"));
        assert!(line.contains("owner max 30"));

        let failed = DeviceEvent::Pulse {
            client_id: None,
            receipt: None,
            error: Some(PulseErrorCode::TransportError),
        };
        assert!(event(&failed).ends_with("anonymous: failed (transport_error)"));
    }
}
