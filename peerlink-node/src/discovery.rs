//! LAN discovery: periodic UDP broadcast of our identity plus the peers we know,
//! and a listener that merges received announcements into the discovery table.
//!
//! Peers heard directly are dialed once; peers learned second-hand through
//! `known_peers` gossip are only recorded.

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use peerlink_core::{decode_datagram, encode_datagram, unix_now, Announcement, KnownPeer, PeerIdentity};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace, warn};

use crate::events::Event;
use crate::node::Shared;

/// Most known peers carried in one announcement, most recently seen first.
pub const MAX_GOSSIP_PEERS: usize = 64;
const RECV_BUF_SIZE: usize = 65536;
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// A peer recorded from discovery traffic.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPeer {
    pub peer_id: String,
    pub nickname: String,
    pub ip: String,
    pub port: u16,
    /// Unix seconds. Receive time for direct announcements, the gossiped value otherwise.
    pub last_seen: f64,
    /// Learned only through another peer's `known_peers`.
    pub relayed: bool,
}

impl DiscoveredPeer {
    pub fn addr(&self) -> Option<SocketAddr> {
        self.ip
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }

    fn to_known(&self) -> KnownPeer {
        KnownPeer {
            peer_id: self.peer_id.clone(),
            nickname: self.nickname.clone(),
            ip: self.ip.clone(),
            port: self.port,
            last_seen: self.last_seen,
        }
    }
}

/// Result of merging one announcement.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// Set when the announcing peer should be dialed, unless it is already connected.
    pub dial: Option<(String, SocketAddr)>,
    /// Entries that were not in the table before.
    pub new_peers: Vec<DiscoveredPeer>,
}

#[derive(Debug, Default)]
pub struct DiscoveryTable {
    peers: Mutex<HashMap<String, DiscoveredPeer>>,
}

impl DiscoveryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Our announcement, carrying up to [`MAX_GOSSIP_PEERS`] known peers.
    pub async fn announcement(&self, local: &PeerIdentity) -> Announcement {
        let mut known: Vec<KnownPeer> = self
            .peers
            .lock()
            .await
            .values()
            .map(DiscoveredPeer::to_known)
            .collect();
        known.sort_by(|a, b| b.last_seen.total_cmp(&a.last_seen));
        known.truncate(MAX_GOSSIP_PEERS);
        Announcement {
            peer_id: local.peer_id.clone(),
            nickname: local.nickname.clone(),
            ip: local.ip.clone(),
            port: local.port,
            known_peers: known,
        }
    }

    /// All recorded peers, sorted by nickname then ID.
    pub async fn snapshot(&self) -> Vec<DiscoveredPeer> {
        let mut out: Vec<DiscoveredPeer> = self.peers.lock().await.values().cloned().collect();
        out.sort_by(|a, b| {
            a.nickname
                .to_lowercase()
                .cmp(&b.nickname.to_lowercase())
                .then_with(|| a.peer_id.cmp(&b.peer_id))
        });
        out
    }

    /// Merge an announcement received from `from`.
    ///
    /// Announcements from ourselves or from blocklisted addresses are dropped whole;
    /// gossiped entries for ourselves or blocklisted addresses are skipped. A relayed
    /// entry never replaces a direct one.
    pub async fn ingest(
        &self,
        ann: &Announcement,
        from: SocketAddr,
        local_id: &str,
        blocked: &HashSet<SocketAddr>,
    ) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();
        if ann.peer_id.is_empty() || ann.peer_id == local_id {
            return outcome;
        }
        let ip = match ann.ip.parse::<IpAddr>() {
            Ok(ip) if !ip.is_unspecified() => ip,
            _ => from.ip(),
        };
        let sender_addr = SocketAddr::new(ip, ann.port);
        if blocked.contains(&sender_addr) {
            trace!(addr = %sender_addr, "Ignoring announcement from blocklisted address");
            return outcome;
        }

        let now = unix_now();
        let mut peers = self.peers.lock().await;
        let direct = DiscoveredPeer {
            peer_id: ann.peer_id.clone(),
            nickname: ann.nickname.clone(),
            ip: ip.to_string(),
            port: ann.port,
            last_seen: now,
            relayed: false,
        };
        let should_dial = match peers.insert(ann.peer_id.clone(), direct.clone()) {
            None => {
                outcome.new_peers.push(direct);
                true
            }
            Some(previous) => previous.relayed,
        };
        if should_dial {
            outcome.dial = Some((ann.peer_id.clone(), sender_addr));
        }

        for known in &ann.known_peers {
            if known.peer_id.is_empty()
                || known.peer_id == local_id
                || known.peer_id == ann.peer_id
            {
                continue;
            }
            let Ok(known_ip) = known.ip.parse::<IpAddr>() else {
                continue;
            };
            if blocked.contains(&SocketAddr::new(known_ip, known.port)) {
                continue;
            }
            let relayed = DiscoveredPeer {
                peer_id: known.peer_id.clone(),
                nickname: known.nickname.clone(),
                ip: known.ip.clone(),
                port: known.port,
                last_seen: known.last_seen,
                relayed: true,
            };
            match peers.get_mut(&known.peer_id) {
                None => {
                    peers.insert(known.peer_id.clone(), relayed.clone());
                    outcome.new_peers.push(relayed);
                }
                Some(existing) if existing.relayed && known.last_seen > existing.last_seen => {
                    *existing = relayed;
                }
                Some(_) => {}
            }
        }
        outcome
    }
}

/// UDP socket for receiving announcements. Address and port reuse let several
/// nodes on one host share the discovery port.
pub(crate) fn bind_listener(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;
    UdpSocket::from_std(socket.into())
}

/// Ephemeral UDP socket with broadcast enabled.
pub(crate) fn bind_broadcaster() -> io::Result<UdpSocket> {
    let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket)
}

/// Announce immediately, then every `broadcast_interval` until shutdown.
pub(crate) async fn broadcast_loop(shared: Arc<Shared>, socket: UdpSocket) {
    let dest = SocketAddrV4::new(shared.config.broadcast_addr, shared.config.discovery_port);
    let interval = shared.config.broadcast_interval();
    let mut shutdown = shared.shutdown.subscribe();
    loop {
        if *shutdown.borrow() {
            break;
        }
        let ann = shared.discovery.announcement(&shared.identity).await;
        match encode_datagram(&ann) {
            Ok(bytes) => match socket.send_to(&bytes, dest).await {
                Ok(_) => trace!(%dest, known = ann.known_peers.len(), "Announcement sent"),
                Err(e) => warn!(%dest, error = %e, "Discovery broadcast failed"),
            },
            Err(e) => warn!(error = %e, "Cannot encode announcement"),
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }
    debug!("Discovery broadcaster stopped");
}

/// Receive announcements until shutdown. New direct peers are pushed to `dial_tx`.
pub(crate) async fn listen_loop(
    shared: Arc<Shared>,
    socket: UdpSocket,
    dial_tx: mpsc::UnboundedSender<SocketAddr>,
) {
    let mut shutdown = shared.shutdown.subscribe();
    let mut buf = vec![0u8; RECV_BUF_SIZE];
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            res = socket.recv_from(&mut buf) => match res {
                Ok((n, from)) => handle_datagram(&shared, &buf[..n], from, &dial_tx).await,
                Err(e) => {
                    warn!(error = %e, "Discovery receive failed");
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                }
            },
        }
    }
    debug!("Discovery listener stopped");
}

async fn handle_datagram(
    shared: &Shared,
    bytes: &[u8],
    from: SocketAddr,
    dial_tx: &mpsc::UnboundedSender<SocketAddr>,
) {
    let ann = match decode_datagram(bytes) {
        Ok(a) => a,
        Err(e) => {
            debug!(%from, error = %e, "Ignoring datagram");
            return;
        }
    };
    let blocked = shared.registry.blocklist().await;
    let outcome = shared
        .discovery
        .ingest(&ann, from, &shared.identity.peer_id, &blocked)
        .await;

    for peer in outcome.new_peers {
        let Some(addr) = peer.addr() else { continue };
        debug!(peer = %peer.peer_id, %addr, relayed = peer.relayed, "Discovered peer");
        shared.events.emit(Event::PeerDiscovered {
            peer_id: peer.peer_id,
            nickname: peer.nickname,
            addr,
            relayed: peer.relayed,
        });
    }
    if let Some((peer_id, addr)) = outcome.dial {
        if !shared.registry.contains(&peer_id).await {
            info!(peer = %peer_id, %addr, "Connecting to discovered peer");
            if dial_tx.send(addr).is_err() {
                debug!("Dialer stopped, discovery connect dropped");
            }
        }
    }
}
