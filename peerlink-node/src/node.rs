//! The node: listener, dialer, discovery and the public operations front ends call.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use peerlink_core::protocol::{REASON_SHUTDOWN, REASON_USER_REQUESTED};
use peerlink_core::wire::FrameDecoder;
use peerlink_core::{local_ip, Envelope, PeerIdentity};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::discovery::{self, DiscoveredPeer, DiscoveryTable};
use crate::error::NodeError;
use crate::events::{Direction, Event, EventSink};
use crate::messaging;
use crate::registry::{ConnectedPeer, PeerRegistry, PeerStatus, PeerSummary};
use crate::transfer::{SendReport, TransferEngine, TransferSummary};
use crate::transport::{self, read_handshake, write_handshake};

/// State shared by every task of one node.
pub(crate) struct Shared {
    pub(crate) identity: PeerIdentity,
    pub(crate) config: Config,
    pub(crate) registry: PeerRegistry,
    pub(crate) transfers: TransferEngine,
    pub(crate) discovery: DiscoveryTable,
    pub(crate) events: EventSink,
    /// `true` once shutdown has begun.
    pub(crate) shutdown: watch::Sender<bool>,
    tasks: Mutex<JoinSet<()>>,
}

impl Shared {
    fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
    }

    async fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(fut);
    }

    async fn connect(self: &Arc<Self>, addr: SocketAddr) -> Result<ConnectedPeer, NodeError> {
        if !self.is_running() {
            return Err(NodeError::ShuttingDown);
        }
        if self.registry.is_blocked(addr).await {
            info!(%addr, "Refusing to connect to blocklisted address");
            return Err(NodeError::Blocked(addr));
        }
        let limit = self.config.connect_timeout();
        let mut stream = tokio::time::timeout(limit, TcpStream::connect(addr))
            .await
            .map_err(|_| NodeError::Connect {
                addr,
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
            })?
            .map_err(|e| NodeError::Connect { addr, source: e })?;
        let _ = stream.set_nodelay(true);

        write_handshake(&mut stream, &self.identity)
            .await
            .map_err(|e| NodeError::Connect { addr, source: e })?;
        let mut decoder = FrameDecoder::new();
        let remote = read_handshake(&mut stream, &mut decoder, limit)
            .await
            .map_err(|e| NodeError::Handshake {
                addr,
                reason: e.to_string(),
            })?;
        if remote.peer_id == self.identity.peer_id {
            return Err(NodeError::SelfConnection);
        }

        let (peer, reader) = self
            .register(stream, remote, addr, Direction::Outbound)
            .await?;
        let worker = transport::run_connection(self.clone(), peer.clone(), reader, decoder);
        self.spawn(worker).await;
        Ok(peer)
    }

    async fn handle_inbound(self: Arc<Self>, mut stream: TcpStream, from: SocketAddr) {
        let mut decoder = FrameDecoder::new();
        let remote =
            match read_handshake(&mut stream, &mut decoder, self.config.connect_timeout()).await {
                Ok(r) => r,
                Err(e) => {
                    debug!(%from, error = %e, "Rejected inbound connection");
                    return;
                }
            };
        let addr = remote
            .socket_addr()
            .filter(|a| !a.ip().is_unspecified())
            .unwrap_or_else(|| SocketAddr::new(from.ip(), remote.port));

        if !self.is_running() || remote.peer_id == self.identity.peer_id {
            return;
        }
        if self.registry.contains(&remote.peer_id).await {
            debug!(peer = %remote.peer_id, %from, "Duplicate connection closed");
            return;
        }
        if self.registry.is_blocked(addr).await {
            info!(peer = %remote.peer_id, %addr, "Rejected inbound connection from blocklisted peer");
            return;
        }
        let _ = stream.set_nodelay(true);
        if let Err(e) = write_handshake(&mut stream, &self.identity).await {
            debug!(%from, error = %e, "Handshake reply failed");
            return;
        }

        let (peer, reader) = match self
            .register(stream, remote, addr, Direction::Inbound)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                debug!(%from, error = %e, "Inbound registration failed");
                return;
            }
        };
        transport::run_connection(self, peer, reader, decoder).await;
    }

    async fn register(
        &self,
        stream: TcpStream,
        remote: PeerIdentity,
        addr: SocketAddr,
        direction: Direction,
    ) -> Result<(ConnectedPeer, tokio::net::tcp::OwnedReadHalf), NodeError> {
        let (reader, writer) = stream.into_split();
        let peer = ConnectedPeer {
            peer_id: remote.peer_id,
            nickname: remote.nickname,
            addr,
            connection: transport::PeerConnection::new(writer, self.config.read_timeout()),
        };
        if !self.registry.insert(peer.clone()).await {
            peer.connection.close().await;
            return Err(NodeError::AlreadyConnected(peer.peer_id));
        }
        info!(peer = %peer.peer_id, nickname = %peer.nickname, %addr, ?direction, "Peer connected");
        self.events.emit(Event::PeerConnected {
            peer_id: peer.peer_id.clone(),
            nickname: peer.nickname.clone(),
            addr,
            direction,
        });
        Ok((peer, reader))
    }

    async fn resolve(&self, identifier: &str) -> Result<ConnectedPeer, NodeError> {
        self.registry
            .find(identifier)
            .await
            .ok_or_else(|| NodeError::UnknownPeer(identifier.to_string()))
    }
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    let mut shutdown = shared.shutdown.subscribe();
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            res = listener.accept() => match res {
                Ok((stream, from)) => {
                    debug!(%from, "Inbound connection");
                    let s = shared.clone();
                    shared.spawn(s.handle_inbound(stream, from)).await;
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            },
        }
    }
    debug!("Listener stopped");
}

async fn dial_loop(shared: Arc<Shared>, mut dial_rx: mpsc::UnboundedReceiver<SocketAddr>) {
    let mut shutdown = shared.shutdown.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = dial_rx.recv() => {
                let Some(addr) = next else { break };
                let s = shared.clone();
                shared
                    .spawn(async move {
                        if let Err(e) = s.connect(addr).await {
                            debug!(%addr, error = %e, "Discovery connect failed");
                        }
                    })
                    .await;
            }
        }
    }
}

/// Handle to a running node. Cheap to clone; all clones drive the same node.
#[derive(Clone)]
pub struct Node {
    shared: Arc<Shared>,
    local_port: u16,
}

impl Node {
    /// Bind the listener, start discovery and return the node with its event stream.
    /// Failing to bind the TCP listener is fatal; failing to bind discovery only disables it.
    pub async fn start(config: Config) -> Result<(Node, mpsc::UnboundedReceiver<Event>), NodeError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.listen_port))
            .await
            .map_err(|e| NodeError::Bind {
                port: config.listen_port,
                source: e,
            })?;
        let local_port = listener.local_addr()?.port();
        let ip = config.advertise_ip.unwrap_or_else(local_ip);
        let identity = PeerIdentity::generate(config.nickname.clone(), ip, local_port);

        let (events, events_rx) = EventSink::channel();
        let transfers = TransferEngine::new(
            identity.clone(),
            events.clone(),
            config.download_dir.clone(),
            config.chunk_size,
            config.ack_timeout(),
        );
        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            identity,
            config,
            registry: PeerRegistry::new(),
            transfers,
            discovery: DiscoveryTable::new(),
            events,
            shutdown,
            tasks: Mutex::new(JoinSet::new()),
        });

        let (dial_tx, dial_rx) = mpsc::unbounded_channel();
        shared.spawn(accept_loop(shared.clone(), listener)).await;
        shared.spawn(dial_loop(shared.clone(), dial_rx)).await;
        if shared.config.discovery_enabled {
            match (
                discovery::bind_listener(shared.config.discovery_port),
                discovery::bind_broadcaster(),
            ) {
                (Ok(rx_sock), Ok(tx_sock)) => {
                    shared
                        .spawn(discovery::listen_loop(shared.clone(), rx_sock, dial_tx))
                        .await;
                    shared
                        .spawn(discovery::broadcast_loop(shared.clone(), tx_sock))
                        .await;
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(port = shared.config.discovery_port, error = %e, "Discovery unavailable, continuing without it");
                }
            }
        }

        info!(
            peer_id = %shared.identity.peer_id,
            nickname = %shared.identity.nickname,
            ip = %shared.identity.ip,
            port = local_port,
            "Node started"
        );
        Ok((Node { shared, local_port }, events_rx))
    }

    pub fn identity(&self) -> &PeerIdentity {
        &self.shared.identity
    }

    /// Bound TCP listen port.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Connect to a peer by address and exchange handshakes.
    pub async fn connect(&self, ip: IpAddr, port: u16) -> Result<PeerSummary, NodeError> {
        let peer = self.shared.connect(SocketAddr::new(ip, port)).await?;
        Ok(peer.summary())
    }

    pub async fn list_peers(&self) -> BTreeMap<String, PeerStatus> {
        self.shared.registry.statuses().await
    }

    /// Send a text message to a peer named by nickname or peer ID prefix.
    pub async fn send_to(&self, identifier: &str, text: &str) -> Result<(), NodeError> {
        let peer = self.shared.resolve(identifier).await?;
        messaging::send_text(&self.shared.registry, &self.shared.identity, &peer, text).await
    }

    /// Send a text message to every connected peer. Maps peer ID to success.
    pub async fn broadcast(&self, text: &str) -> BTreeMap<String, bool> {
        messaging::broadcast(&self.shared.registry, &self.shared.identity, text).await
    }

    pub async fn send_file(&self, identifier: &str, path: &Path) -> Result<SendReport, NodeError> {
        if !self.is_running() {
            return Err(NodeError::ShuttingDown);
        }
        let peer = self.shared.resolve(identifier).await?;
        self.shared.transfers.send_file(&peer, path).await
    }

    /// Tear down a connection and blocklist the peer's address for the rest of the session.
    pub async fn disconnect(&self, identifier: &str) -> Result<PeerSummary, NodeError> {
        let peer = self.shared.resolve(identifier).await?;
        let goodbye = Envelope::Disconnect {
            peer_id: self.shared.identity.peer_id.clone(),
            reason: REASON_USER_REQUESTED.to_string(),
        };
        let limit = self.shared.config.shutdown_grace();
        if let Err(e) = peer.connection.send_and_close(&goodbye, limit).await {
            debug!(peer = %peer.peer_id, error = %e, "Disconnect notice not delivered");
        }
        self.shared.registry.block(peer.addr).await;
        self.shared
            .registry
            .remove_connection(&peer.peer_id, &peer.connection)
            .await;
        info!(peer = %peer.peer_id, addr = %peer.addr, "Disconnected and blocklisted peer");
        Ok(peer.summary())
    }

    pub async fn list_discovered(&self) -> Vec<DiscoveredPeer> {
        self.shared.discovery.snapshot().await
    }

    pub async fn transfers(&self) -> Vec<TransferSummary> {
        self.shared.transfers.transfers().await
    }

    /// Stop every task and close every connection. Idempotent.
    pub async fn shutdown(&self) {
        if self.shared.shutdown.send_replace(true) {
            return;
        }
        info!("Shutting down");
        let grace = self.shared.config.shutdown_grace();
        let deadline = tokio::time::Instant::now() + grace;
        let goodbye = Envelope::Disconnect {
            peer_id: self.shared.identity.peer_id.clone(),
            reason: REASON_SHUTDOWN.to_string(),
        };
        // Peers are notified concurrently so one stalled socket cannot hold up the rest.
        let mut notices = JoinSet::new();
        for peer in self.shared.registry.drain().await {
            let goodbye = goodbye.clone();
            notices.spawn(async move {
                if let Err(e) = peer.connection.send_and_close(&goodbye, grace).await {
                    debug!(peer = %peer.peer_id, error = %e, "Shutdown notice not delivered");
                }
            });
        }
        while notices.join_next().await.is_some() {}
        self.shared.transfers.abort_all().await;

        let mut tasks = std::mem::take(&mut *self.shared.tasks.lock().await);
        let drained = tokio::time::timeout_at(deadline, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(remaining = tasks.len(), "Tasks still running after grace period, aborting");
            tasks.abort_all();
        }
        info!("Shutdown complete");
    }
}

#[cfg(test)]
impl Node {
    pub(crate) fn shared(&self) -> Arc<Shared> {
        self.shared.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::ConnectionStatus;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct TestNode {
        node: Node,
        events: UnboundedReceiver<Event>,
        _dir: tempfile::TempDir,
    }

    impl TestNode {
        fn downloads(&self) -> PathBuf {
            self.node.config().download_dir.clone()
        }
    }

    async fn start(nickname: &str) -> TestNode {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            nickname: nickname.to_string(),
            advertise_ip: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            discovery_enabled: false,
            download_dir: dir.path().join("downloads"),
            ack_timeout_secs: 5,
            shutdown_grace_secs: 1,
            ..Config::default()
        };
        let (node, events) = Node::start(config).await.unwrap();
        TestNode {
            node,
            events,
            _dir: dir,
        }
    }

    async fn wait_for(rx: &mut UnboundedReceiver<Event>, pred: impl Fn(&Event) -> bool) -> Event {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let e = rx.recv().await.expect("event channel open");
                if pred(&e) {
                    return e;
                }
            }
        })
        .await
        .expect("expected event not received")
    }

    async fn link(a: &mut TestNode, b: &mut TestNode) {
        a.node
            .connect(IpAddr::V4(Ipv4Addr::LOCALHOST), b.node.local_port())
            .await
            .unwrap();
        wait_for(&mut b.events, |e| matches!(e, Event::PeerConnected { .. })).await;
    }

    #[tokio::test]
    async fn connect_and_exchange_text() {
        let mut a = start("alice").await;
        let mut b = start("bob").await;
        link(&mut a, &mut b).await;

        let peers = a.node.list_peers().await;
        let row = &peers[&b.node.identity().peer_id];
        assert_eq!(row.nickname, "bob");
        assert_eq!(row.status, ConnectionStatus::Connected);
        assert!(b.node.list_peers().await.contains_key(&a.node.identity().peer_id));

        a.node.send_to("bob", "hello").await.unwrap();
        match wait_for(&mut b.events, |e| matches!(e, Event::TextReceived { .. })).await {
            Event::TextReceived {
                sender_id,
                sender_nickname,
                content,
                ..
            } => {
                assert_eq!(sender_id, a.node.identity().peer_id);
                assert_eq!(sender_nickname, "alice");
                assert_eq!(content, "hello");
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn second_connect_does_not_duplicate() {
        let mut a = start("alice").await;
        let mut b = start("bob").await;
        link(&mut a, &mut b).await;

        let again = a
            .node
            .connect(IpAddr::V4(Ipv4Addr::LOCALHOST), b.node.local_port())
            .await;
        assert!(again.is_err());
        assert_eq!(a.node.list_peers().await.len(), 1);
        assert_eq!(b.node.list_peers().await.len(), 1);
    }

    #[tokio::test]
    async fn connect_to_self_is_refused() {
        let a = start("alice").await;
        let err = a
            .node
            .connect(IpAddr::V4(Ipv4Addr::LOCALHOST), a.node.local_port())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::SelfConnection | NodeError::Handshake { .. }));
        assert!(a.node.list_peers().await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_blocklists_both_directions() {
        let mut a = start("alice").await;
        let mut b = start("bob").await;
        link(&mut a, &mut b).await;

        a.node.disconnect("bob").await.unwrap();
        assert!(a.node.list_peers().await.is_empty());
        wait_for(&mut b.events, |e| matches!(e, Event::PeerDisconnected { .. })).await;
        assert!(b.node.list_peers().await.is_empty());

        let err = a
            .node
            .connect(IpAddr::V4(Ipv4Addr::LOCALHOST), b.node.local_port())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Blocked(_)));

        // Bob dialing back is refused on Alice's side.
        assert!(b
            .node
            .connect(IpAddr::V4(Ipv4Addr::LOCALHOST), a.node.local_port())
            .await
            .is_err());
        assert!(a.node.list_peers().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_peer_is_reported() {
        let mut a = start("alice").await;
        let mut b = start("bob").await;
        link(&mut a, &mut b).await;

        let err = b.node.send_to("nobody", "hi").await.unwrap_err();
        assert!(matches!(err, NodeError::UnknownPeer(_)));
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(b.node.list_peers().await.len(), 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_peer() {
        let mut a = start("alice").await;
        let mut b = start("bob").await;
        let mut c = start("carol").await;
        link(&mut a, &mut b).await;
        link(&mut a, &mut c).await;

        let results = a.node.broadcast("all hands").await;
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|ok| *ok));
        for rx in [&mut b.events, &mut c.events] {
            wait_for(rx, |e| {
                matches!(e, Event::TextReceived { content, .. } if content == "all hands")
            })
            .await;
        }
    }

    #[tokio::test]
    async fn file_transfer_end_to_end() {
        let mut a = start("alice").await;
        let mut b = start("bob").await;
        link(&mut a, &mut b).await;

        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("payload.bin");
        let content: Vec<u8> = (0..100_000u32).map(|i| (i * 31 % 251) as u8).collect();
        std::fs::write(&src, &content).unwrap();

        let report = a.node.send_file("bob", &src).await.unwrap();
        assert_eq!(report.file_size, content.len() as u64);
        assert_eq!(report.chunks, 13);

        let path = match wait_for(&mut b.events, |e| matches!(e, Event::FileReceived { .. })).await
        {
            Event::FileReceived { path, .. } => path,
            _ => unreachable!(),
        };
        assert_eq!(path, b.downloads().join("payload.bin"));
        assert_eq!(std::fs::read(&path).unwrap(), content);
        wait_for(&mut a.events, |e| {
            matches!(e, Event::FileDelivered { transfer_id } if *transfer_id == report.transfer_id)
        })
        .await;
        assert!(a.node.transfers().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_transfers_stay_isolated() {
        let mut a = start("alice").await;
        let mut b = start("bob").await;
        let mut c = start("carol").await;
        link(&mut a, &mut b).await;
        link(&mut a, &mut c).await;

        let src_dir = tempfile::tempdir().unwrap();
        let for_b = src_dir.path().join("b.txt");
        let for_c = src_dir.path().join("c.txt");
        std::fs::write(&for_b, vec![b'b'; 50_000]).unwrap();
        std::fs::write(&for_c, vec![b'c'; 70_000]).unwrap();

        let (rb, rc) = tokio::join!(
            a.node.send_file("bob", &for_b),
            a.node.send_file("carol", &for_c)
        );
        rb.unwrap();
        rc.unwrap();

        wait_for(&mut b.events, |e| matches!(e, Event::FileReceived { .. })).await;
        wait_for(&mut c.events, |e| matches!(e, Event::FileReceived { .. })).await;
        assert_eq!(
            std::fs::read(b.downloads().join("b.txt")).unwrap(),
            vec![b'b'; 50_000]
        );
        assert_eq!(
            std::fs::read(c.downloads().join("c.txt")).unwrap(),
            vec![b'c'; 70_000]
        );
    }

    #[tokio::test]
    async fn missing_file_fails_before_network() {
        let mut a = start("alice").await;
        let mut b = start("bob").await;
        link(&mut a, &mut b).await;

        let err = a
            .node
            .send_file("bob", Path::new("/definitely/not/here.txt"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(a.node.transfers().await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_notifies_peers() {
        let mut a = start("alice").await;
        let mut b = start("bob").await;
        link(&mut a, &mut b).await;

        b.node.shutdown().await;
        assert!(!b.node.is_running());
        wait_for(&mut a.events, |e| matches!(e, Event::PeerDisconnected { .. })).await;
        assert!(a.node.list_peers().await.is_empty());

        let err = b
            .node
            .connect(IpAddr::V4(Ipv4Addr::LOCALHOST), a.node.local_port())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::ShuttingDown));
        // Second call is a no-op.
        b.node.shutdown().await;
    }

    /// Connect a raw peer that completes the handshake and then never reads, and keep
    /// the node's writer to it busy until the socket buffers are full.
    async fn stalled_peer(a: &mut TestNode) -> TcpStream {
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, a.node.local_port()))
            .await
            .unwrap();
        let mallory = PeerIdentity::generate("mallory", IpAddr::V4(Ipv4Addr::LOCALHOST), 1);
        write_handshake(&mut stream, &mallory).await.unwrap();
        read_handshake(&mut stream, &mut FrameDecoder::new(), Duration::from_secs(5))
            .await
            .unwrap();
        wait_for(&mut a.events, |e| {
            matches!(e, Event::PeerConnected { nickname, .. } if nickname == "mallory")
        })
        .await;

        let node = a.node.clone();
        tokio::spawn(async move {
            let big = "x".repeat(4 * 1024 * 1024);
            while node.send_to("mallory", &big).await.is_ok() {}
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        stream
    }

    #[tokio::test]
    async fn shutdown_bounded_by_grace_with_stalled_peer() {
        let mut a = start("alice").await;
        let mut b = start("bob").await;
        link(&mut a, &mut b).await;
        let _stalled = stalled_peer(&mut a).await;

        let started = tokio::time::Instant::now();
        a.node.shutdown().await;
        let took = started.elapsed();
        assert!(took < Duration::from_secs(3), "shutdown took {:?}", took);
        // The healthy peer still got its notice.
        wait_for(&mut b.events, |e| matches!(e, Event::PeerDisconnected { .. })).await;
    }

    #[tokio::test]
    async fn disconnect_stalled_peer_returns_promptly() {
        let mut a = start("alice").await;
        let _stalled = stalled_peer(&mut a).await;

        let started = tokio::time::Instant::now();
        a.node.disconnect("mallory").await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(a.node.list_peers().await.is_empty());
    }
}
