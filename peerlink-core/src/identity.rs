//! Node identity: peer ID generation, advertised identity, local address resolution.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identity a node advertises in its handshake and discovery broadcasts.
/// Generated once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub peer_id: String,
    pub nickname: String,
    pub ip: String,
    pub port: u16,
}

impl PeerIdentity {
    /// New identity with a freshly generated peer ID.
    pub fn generate(nickname: impl Into<String>, ip: IpAddr, port: u16) -> Self {
        Self {
            peer_id: generate_peer_id(),
            nickname: nickname.into(),
            ip: ip.to_string(),
            port,
        }
    }

    /// Advertised listen address. `None` if the advertised IP does not parse.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }

    /// First eight characters of the peer ID, for display.
    pub fn short_id(&self) -> &str {
        short_id(&self.peer_id)
    }
}

/// Random peer ID: 8 hex chars of a v4 UUID plus a 4-digit random suffix, e.g. `3f2a9c1e-4821`.
pub fn generate_peer_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    let suffix: u16 = rand::thread_rng().gen_range(1000..10000);
    format!("{}-{}", &uuid[..8], suffix)
}

/// Truncate a peer ID for display without splitting a character.
pub fn short_id(peer_id: &str) -> &str {
    match peer_id.char_indices().nth(8) {
        Some((idx, _)) => &peer_id[..idx],
        None => peer_id,
    }
}

/// IP address of the interface used for outbound traffic.
///
/// Connecting a UDP socket sends no packets; it only asks the OS to pick a route.
/// Falls back to loopback when no route exists (offline host, sandbox).
pub fn local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    };
    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}
