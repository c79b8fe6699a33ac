//! Test helpers: a real loopback TCP connection wrapped as a [`ConnectedPeer`],
//! with the far end exposed for reading and writing raw frames.

use std::time::Duration;

use peerlink_core::wire::{encode_frame, FrameDecoder};
use peerlink_core::Envelope;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

use crate::registry::ConnectedPeer;
use crate::transport::PeerConnection;

pub(crate) struct RemoteEnd {
    stream: TcpStream,
    decoder: FrameDecoder,
    // Keeps the local read half open so writes to it do not reset.
    _local_reader: Option<OwnedReadHalf>,
}

impl RemoteEnd {
    pub(crate) async fn recv(&mut self) -> Envelope {
        let mut buf = [0u8; 8192];
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(frame) = self.decoder.next_frame() {
                    return frame.expect("well-formed frame");
                }
                let n = self.stream.read(&mut buf).await.expect("read");
                assert!(n > 0, "connection closed while waiting for a frame");
                self.decoder.extend(&buf[..n]);
            }
        })
        .await
        .expect("frame within timeout")
    }

    pub(crate) async fn send(&mut self, msg: &Envelope) {
        let frame = encode_frame(msg).expect("encode");
        self.send_raw(&frame).await;
    }

    pub(crate) async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write");
    }
}

pub(crate) async fn connected_pair(peer_id: &str, nickname: &str) -> (ConnectedPeer, RemoteEnd) {
    let (peer, reader, mut remote) = worker_pair(peer_id, nickname).await;
    remote._local_reader = Some(reader);
    (peer, remote)
}

/// Like [`connected_pair`], but hands back the local read half for a connection worker.
pub(crate) async fn worker_pair(
    peer_id: &str,
    nickname: &str,
) -> (ConnectedPeer, OwnedReadHalf, RemoteEnd) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (local, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let local = local.expect("connect");
    let (remote, _) = accepted.expect("accept");
    let (reader, writer) = local.into_split();
    let peer = ConnectedPeer {
        peer_id: peer_id.to_string(),
        nickname: nickname.to_string(),
        addr,
        connection: PeerConnection::new(writer, Duration::from_secs(5)),
    };
    (
        peer,
        reader,
        RemoteEnd {
            stream: remote,
            decoder: FrameDecoder::new(),
            _local_reader: None,
        },
    )
}
