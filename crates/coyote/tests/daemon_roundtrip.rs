//! End-to-end tests: the CLI client against an in-process daemon.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::time::Duration;

use coyote_cli::{CliError, ClientConfig, DaemonClient, ShockOutcome};
use coyote_core::{PulseErrorCode, PulseRequest};
use coyoted::config::DaemonConfig;
use coyoted::daemon::Daemon;
use tempfile::TempDir;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

struct RunningDaemon {
    config: ClientConfig,
    ws_url: String,
    cancel: CancellationToken,
    _dir: TempDir,
}

impl Drop for RunningDaemon {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn start_daemon() -> RunningDaemon {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DaemonConfig::default();
    config.socket_path = dir.path().join("coyote.sock");
    config.device.host = "127.0.0.1".to_string();
    config.device.port = 0;

    let cancel = CancellationToken::new();
    let daemon = Daemon::bind(&config, cancel.clone()).await.unwrap();
    let ws_url = daemon.pairing().ws_url.clone();
    tokio::spawn(daemon.run());

    let start = tokio::time::Instant::now();
    while !config.socket_path.exists() && start.elapsed() < SOCKET_WAIT_TIMEOUT {
        sleep(Duration::from_millis(10)).await;
    }
    assert!(config.socket_path.exists(), "daemon socket never appeared");

    RunningDaemon {
        config: ClientConfig {
            socket_path: config.socket_path.clone(),
            ..ClientConfig::default()
        },
        ws_url,
        cancel,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_status_before_pairing() {
    let daemon = start_daemon().await;
    let mut client = DaemonClient::connect(&daemon.config).await.unwrap();

    let status = client.status().await.unwrap();
    assert!(status.device.is_none());
    assert_eq!(status.owner_max, 50);
    assert_eq!(status.pending, 0);

    let url = status.pairing_url.expect("pairing url advertised");
    assert!(url.ends_with(&daemon.ws_url));
    assert_eq!(client.pairing().await.unwrap(), Some(url));
}

#[tokio::test]
async fn test_shock_without_device_fails_cleanly() {
    let daemon = start_daemon().await;
    let mut client = DaemonClient::connect(&daemon.config).await.unwrap();

    let outcome = client
        .shock(&PulseRequest::new("A", 20, 20, 5))
        .await
        .unwrap();

    match outcome {
        ShockOutcome::Failed { code, .. } => assert_eq!(code, PulseErrorCode::DeviceNotBound),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_owner_max_persists_across_connections() {
    let daemon = start_daemon().await;

    let mut first = DaemonClient::connect(&daemon.config).await.unwrap();
    assert_eq!(first.set_owner_max(30).await.unwrap(), 30);
    first.disconnect().await.unwrap();

    let mut second = DaemonClient::connect(&daemon.config).await.unwrap();
    assert_eq!(second.status().await.unwrap().owner_max, 30);

    let err = second.set_owner_max(101).await.unwrap_err();
    assert!(matches!(err, CliError::Daemon { .. }));
    assert_eq!(second.status().await.unwrap().owner_max, 30);
}

#[tokio::test]
async fn test_shutdown_closes_client_connections() {
    let daemon = start_daemon().await;
    let mut client = DaemonClient::connect(&daemon.config).await.unwrap();
    client.subscribe().await.unwrap();

    daemon.cancel.cancel();

    let next = tokio::time::timeout(Duration::from_secs(5), client.next_event())
        .await
        .expect("client should notice shutdown");
    assert!(matches!(next, Ok(None) | Err(_)));
}
