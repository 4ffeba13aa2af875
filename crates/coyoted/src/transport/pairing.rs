//! Pairing payload construction.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use coyote_core::SessionId;
use coyote_protocol::dglab;

/// Address used only to pick the outbound interface; nothing is sent.
const ROUTE_CHECK_ADDR: &str = "8.8.8.8:80";

/// What the app needs to find and bind to this daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingInfo {
    /// Our client id, the path of the socket URL
    pub local_id: SessionId,
    /// `ws://host:port/<local id>`
    pub ws_url: String,
    /// Full QR payload
    pub url: String,
}

impl PairingInfo {
    pub fn new(local_id: SessionId, host: &str, port: u16) -> Self {
        let ws_url = format!("ws://{host}:{port}/{local_id}");
        let url = dglab::pairing_url(&ws_url);
        Self {
            local_id,
            ws_url,
            url,
        }
    }
}

/// Host name to advertise for a listener bound to `bound`.
///
/// A configured public host always wins. Otherwise a wildcard bind
/// advertises the guessed LAN address and a specific bind advertises
/// itself.
pub fn advertised_host(public_host: Option<&str>, bound: SocketAddr) -> String {
    if let Some(host) = public_host.filter(|h| !h.trim().is_empty()) {
        return host.trim().to_string();
    }
    if bound.ip().is_unspecified() {
        guess_lan_ip().to_string()
    } else {
        bound.ip().to_string()
    }
}

/// Best guess at this machine's LAN address, falling back to loopback.
///
/// Connecting a UDP socket only selects a route; no packet leaves.
pub fn guess_lan_ip() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect(ROUTE_CHECK_ADDR)?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
