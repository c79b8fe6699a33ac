//! Connected-peer registry and blocklist, guarded by a single lock.
//!
//! The lock is held only for map reads and mutations, never across network I/O:
//! callers take a [`ConnectedPeer`] clone out and send through its connection afterwards.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::transport::PeerConnection;

/// A peer with an established, handshaken connection.
#[derive(Debug, Clone)]
pub struct ConnectedPeer {
    pub peer_id: String,
    pub nickname: String,
    /// Address used for blocklisting: dialed address for outbound, advertised address for inbound.
    pub addr: SocketAddr,
    pub connection: Arc<PeerConnection>,
}

impl ConnectedPeer {
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            peer_id: self.peer_id.clone(),
            nickname: self.nickname.clone(),
            addr: self.addr,
        }
    }
}

/// Plain description of a peer, without the connection handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    pub peer_id: String,
    pub nickname: String,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => f.write_str("connected"),
            ConnectionStatus::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Row of `list_peers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatus {
    pub nickname: String,
    pub ip: String,
    pub port: u16,
    pub status: ConnectionStatus,
}

#[derive(Debug, Default)]
struct RegistryState {
    peers: BTreeMap<String, ConnectedPeer>,
    blocklist: HashSet<SocketAddr>,
}

/// Map from peer ID to connection state, plus the blocklist.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    state: Mutex<RegistryState>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the peer ID is already present. The existing connection wins.
    pub async fn insert(&self, peer: ConnectedPeer) -> bool {
        let mut state = self.state.lock().await;
        if state.peers.contains_key(&peer.peer_id) {
            return false;
        }
        state.peers.insert(peer.peer_id.clone(), peer);
        true
    }

    pub async fn contains(&self, peer_id: &str) -> bool {
        self.state.lock().await.peers.contains_key(peer_id)
    }

    pub async fn get(&self, peer_id: &str) -> Option<ConnectedPeer> {
        self.state.lock().await.peers.get(peer_id).cloned()
    }

    /// Resolve a user-supplied identifier: case-insensitive nickname match first,
    /// then peer ID prefix. Ties resolve to the smallest peer ID.
    pub async fn find(&self, identifier: &str) -> Option<ConnectedPeer> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }
        let state = self.state.lock().await;
        state
            .peers
            .values()
            .find(|p| p.nickname.eq_ignore_ascii_case(identifier))
            .or_else(|| {
                state
                    .peers
                    .values()
                    .find(|p| p.peer_id.starts_with(identifier))
            })
            .cloned()
    }

    /// Remove the entry only if it still refers to `connection`.
    pub async fn remove_connection(
        &self,
        peer_id: &str,
        connection: &Arc<PeerConnection>,
    ) -> Option<ConnectedPeer> {
        let mut state = self.state.lock().await;
        match state.peers.get(peer_id) {
            Some(p) if Arc::ptr_eq(&p.connection, connection) => state.peers.remove(peer_id),
            _ => None,
        }
    }

    pub async fn snapshot(&self) -> Vec<ConnectedPeer> {
        self.state.lock().await.peers.values().cloned().collect()
    }

    /// Remove and return every entry.
    pub async fn drain(&self) -> Vec<ConnectedPeer> {
        let mut state = self.state.lock().await;
        std::mem::take(&mut state.peers).into_values().collect()
    }

    pub async fn statuses(&self) -> BTreeMap<String, PeerStatus> {
        let state = self.state.lock().await;
        state
            .peers
            .iter()
            .map(|(id, p)| {
                let status = if p.connection.is_closed() {
                    ConnectionStatus::Disconnected
                } else {
                    ConnectionStatus::Connected
                };
                (
                    id.clone(),
                    PeerStatus {
                        nickname: p.nickname.clone(),
                        ip: p.addr.ip().to_string(),
                        port: p.addr.port(),
                        status,
                    },
                )
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.peers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn block(&self, addr: SocketAddr) {
        self.state.lock().await.blocklist.insert(addr);
    }

    pub async fn is_blocked(&self, addr: SocketAddr) -> bool {
        self.state.lock().await.blocklist.contains(&addr)
    }

    pub async fn blocklist(&self) -> HashSet<SocketAddr> {
        self.state.lock().await.blocklist.clone()
    }
}
