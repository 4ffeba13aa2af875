//! Integration tests for the Unix socket control server.
//!
//! These run a `DaemonServer` on a socket inside a temp dir and speak the
//! JSON-lines protocol to it: handshake, shock requests, status, the owner
//! cap, pairing and device event subscriptions.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use coyote_core::{OwnerCap, PulseErrorCode, PulseRequest, SessionId, SessionState, StrengthReport};
use coyote_protocol::{ClientMessage, DaemonMessage, DeviceEvent, ProtocolVersion};
use coyoted::queue::spawn_queue;
use coyoted::server::DaemonServer;
use coyoted::session::testing::RecordingLink;
use coyoted::session::{DeviceSession, SessionEvent, SessionRegistry};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for server socket to appear
const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval between socket existence checks
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on any single reply
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

const PAIRING_URL: &str =
    "https://www.dungeon-lab.com/app-download.php#DGLAB-SOCKET#ws://127.0.0.1:4567/local";

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle and cleanup.
struct TestServer {
    socket_path: PathBuf,
    registry: SessionRegistry,
    cancel_token: CancellationToken,
    _temp_dir: TempDir, // Keep alive for RAII cleanup
}

impl TestServer {
    async fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let socket_path = temp_dir.path().join("coyote.sock");

        let registry = SessionRegistry::new();
        let queue = spawn_queue(registry.clone(), OwnerCap::new(50).unwrap());
        let cancel_token = CancellationToken::new();

        let server = DaemonServer::new(
            socket_path.clone(),
            queue,
            registry.clone(),
            cancel_token.clone(),
        )
        .with_pairing_url(PAIRING_URL);

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let start = tokio::time::Instant::now();
        while start.elapsed() < SOCKET_WAIT_TIMEOUT {
            if socket_path.exists() {
                break;
            }
            sleep(SOCKET_POLL_INTERVAL).await;
        }

        assert!(
            socket_path.exists(),
            "Server socket did not appear within {SOCKET_WAIT_TIMEOUT:?}"
        );

        Self {
            socket_path,
            registry,
            cancel_token,
            _temp_dir: temp_dir,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .expect("connect to server");
        TestClient::new(stream)
    }

    /// Connects and completes the handshake.
    async fn connect_ready(&self, name: &str) -> TestClient {
        let mut client = self.connect().await;
        client
            .send(ClientMessage::connect(Some(name.to_string())))
            .await;
        match client.recv().await {
            DaemonMessage::Connected { client_id, .. } => assert_eq!(client_id, name),
            other => panic!("expected Connected, got {other:?}"),
        }
        client
    }

    /// Puts a bound in-memory device into the registry.
    async fn bind_device(&self, link: RecordingLink) -> Arc<DeviceSession> {
        let session = Arc::new(DeviceSession::new(
            SessionId::new("app-1234"),
            SessionId::new("local"),
            Box::new(link),
        ));
        self.registry.reserve(Arc::clone(&session)).await.unwrap();
        assert!(self.registry.mark_bound(session.id()).await);
        session
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Test client connection with protocol helpers.
struct TestClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send(&mut self, msg: ClientMessage) {
        let json = serde_json::to_string(&msg).unwrap();
        self.send_raw(&json).await;
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> DaemonMessage {
        let mut line = String::new();
        timeout(REPLY_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        serde_json::from_str(&line).unwrap()
    }

    /// Returns true once the server has closed the connection.
    async fn is_closed(&mut self) -> bool {
        let mut line = String::new();
        matches!(
            timeout(REPLY_TIMEOUT, self.reader.read_line(&mut line)).await,
            Ok(Ok(0))
        )
    }
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_connect_handshake() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send(ClientMessage::connect(None)).await;

    match client.recv().await {
        DaemonMessage::Connected {
            protocol_version,
            client_id,
        } => {
            assert_eq!(protocol_version, ProtocolVersion::CURRENT);
            assert!(client_id.starts_with("client-"));
        }
        other => panic!("expected Connected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_message_must_be_connect() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send(ClientMessage::status()).await;

    assert!(matches!(client.recv().await, DaemonMessage::Error { .. }));
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_incompatible_version_rejected() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    let mut msg = ClientMessage::connect(None);
    msg.protocol_version = ProtocolVersion::new(99, 0);
    client.send(msg).await;

    assert!(matches!(client.recv().await, DaemonMessage::Rejected { .. }));
    assert!(client.is_closed().await);
}

// ============================================================================
// Command Tests
// ============================================================================

#[tokio::test]
async fn test_shock_without_device() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready("caller").await;

    client
        .send(ClientMessage::shock(&PulseRequest::new("A", 20, 20, 5)))
        .await;

    match client.recv().await {
        DaemonMessage::ShockFailed { code, message } => {
            assert_eq!(code, PulseErrorCode::DeviceNotBound);
            assert!(message.contains("not bound"));
        }
        other => panic!("expected ShockFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shock_invalid_channel() {
    let server = TestServer::spawn().await;
    server.bind_device(RecordingLink::new()).await;
    let mut client = server.connect_ready("caller").await;

    client
        .send(ClientMessage::shock(&PulseRequest::new("C", 20, 20, 5)))
        .await;

    match client.recv().await {
        DaemonMessage::ShockFailed { code, .. } => {
            assert_eq!(code, PulseErrorCode::InvalidParameters);
        }
        other => panic!("expected ShockFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shock_with_bound_device() {
    let server = TestServer::spawn().await;
    let link = RecordingLink::new();
    server.bind_device(link.clone()).await;
    let mut client = server.connect_ready("caller").await;

    // Omitted fields fall back to the defaults.
    client
        .send_raw(r#"{"protocol_version":{"major":1,"minor":0},"type":"shock","channel":"b","amp":90}"#)
        .await;

    match client.recv().await {
        DaemonMessage::ShockResult { receipt } => {
            assert_eq!(receipt.amp_requested, 90);
            assert_eq!(receipt.amp_effective, 50);
            assert_eq!(receipt.freq, 20);
            assert_eq!(receipt.copies, 5);
        }
        other => panic!("expected ShockResult, got {other:?}"),
    }

    assert_eq!(link.bodies()[0], "clear-2");
}

#[tokio::test]
async fn test_status_reports_device_and_cap() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready("status").await;

    client.send(ClientMessage::status()).await;
    match client.recv().await {
        DaemonMessage::Status {
            device,
            owner_max,
            pending,
            pairing_url,
        } => {
            assert!(device.is_none());
            assert_eq!(owner_max, 50);
            assert_eq!(pending, 0);
            assert_eq!(pairing_url.as_deref(), Some(PAIRING_URL));
        }
        other => panic!("expected Status, got {other:?}"),
    }

    server.bind_device(RecordingLink::new()).await;

    client.send(ClientMessage::status()).await;
    match client.recv().await {
        DaemonMessage::Status { device, .. } => {
            let device = device.expect("device should be reported");
            assert_eq!(device.id.as_str(), "app-1234");
            assert_eq!(device.state, SessionState::Bound);
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn test_set_owner_max() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready("owner").await;

    client.send(ClientMessage::set_owner_max(30)).await;
    assert!(matches!(
        client.recv().await,
        DaemonMessage::OwnerMaxUpdated { value: 30 }
    ));

    client.send(ClientMessage::set_owner_max(150)).await;
    match client.recv().await {
        DaemonMessage::Error { code, .. } => {
            assert_eq!(code.as_deref(), Some("invalid_owner_max"));
        }
        other => panic!("expected Error, got {other:?}"),
    }

    client.send(ClientMessage::status()).await;
    assert!(matches!(
        client.recv().await,
        DaemonMessage::Status { owner_max: 30, .. }
    ));
}

#[tokio::test]
async fn test_pairing_url() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready("pair").await;

    client.send(ClientMessage::pairing()).await;
    match client.recv().await {
        DaemonMessage::Pairing { url } => assert_eq!(url.as_deref(), Some(PAIRING_URL)),
        other => panic!("expected Pairing, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ping_pong() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready("pinger").await;

    client.send(ClientMessage::ping(42)).await;
    assert!(matches!(client.recv().await, DaemonMessage::Pong { seq: 42 }));
}

#[tokio::test]
async fn test_malformed_line_keeps_connection() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready("sloppy").await;

    client.send_raw("{not json").await;
    match client.recv().await {
        DaemonMessage::Error { code, .. } => assert_eq!(code.as_deref(), Some("parse_error")),
        other => panic!("expected Error, got {other:?}"),
    }

    client.send(ClientMessage::ping(7)).await;
    assert!(matches!(client.recv().await, DaemonMessage::Pong { seq: 7 }));
}

#[tokio::test]
async fn test_disconnect_closes_connection() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready("leaver").await;

    client.send(ClientMessage::disconnect()).await;
    assert!(client.is_closed().await);
}

// ============================================================================
// Subscription Tests
// ============================================================================

#[tokio::test]
async fn test_subscriber_receives_device_events() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready("watcher").await;

    client.send(ClientMessage::subscribe()).await;
    assert!(matches!(client.recv().await, DaemonMessage::Status { .. }));

    // Registration completes before the next request is read.
    client.send(ClientMessage::ping(1)).await;
    assert!(matches!(client.recv().await, DaemonMessage::Pong { seq: 1 }));

    let session = server.bind_device(RecordingLink::new()).await;
    match client.recv().await {
        DaemonMessage::DeviceEvent {
            event: DeviceEvent::Bound { session_id, .. },
        } => assert_eq!(&session_id, session.id()),
        other => panic!("expected Bound event, got {other:?}"),
    }

    let report = StrengthReport {
        a: 5,
        b: 0,
        max_a: 100,
        max_b: 100,
    };
    server.registry.publish(SessionEvent::Strength {
        session_id: session.id().clone(),
        report,
    });
    match client.recv().await {
        DaemonMessage::DeviceEvent {
            event: DeviceEvent::Strength { report: got, .. },
        } => assert_eq!(got, report),
        other => panic!("expected Strength event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_subscriber_sees_who_sent_each_pulse() {
    let server = TestServer::spawn().await;
    let link = RecordingLink::new();
    server.bind_device(link.clone()).await;

    let mut watcher = server.connect_ready("owner").await;
    watcher.send(ClientMessage::subscribe()).await;
    assert!(matches!(watcher.recv().await, DaemonMessage::Status { .. }));
    watcher.send(ClientMessage::ping(1)).await;
    assert!(matches!(watcher.recv().await, DaemonMessage::Pong { seq: 1 }));

    let mut shooter = server.connect_ready("shooter").await;
    shooter
        .send(ClientMessage::shock(&PulseRequest::new("A", 80, 20, 5)))
        .await;
    assert!(matches!(
        shooter.recv().await,
        DaemonMessage::ShockResult { .. }
    ));

    match watcher.recv().await {
        DaemonMessage::DeviceEvent {
            event:
                DeviceEvent::Pulse {
                    client_id,
                    receipt: Some(receipt),
                    error: None,
                },
        } => {
            assert_eq!(client_id.as_deref(), Some("shooter"));
            assert_eq!(receipt.amp_requested, 80);
            assert_eq!(receipt.amp_effective, 50);
            assert_eq!(receipt.owner_max, 50);
        }
        other => panic!("expected Pulse event, got {other:?}"),
    }
    assert_eq!(link.bodies().len(), 2);
}

#[tokio::test]
async fn test_non_subscriber_gets_no_events() {
    let server = TestServer::spawn().await;
    let mut client = server.connect_ready("quiet").await;

    server.bind_device(RecordingLink::new()).await;

    // The next line must be the pong, not a device event.
    client.send(ClientMessage::ping(1)).await;
    assert!(matches!(client.recv().await, DaemonMessage::Pong { seq: 1 }));
}
