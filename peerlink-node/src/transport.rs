//! Peer connections: handshake exchange, the per-connection worker loop, and the
//! write handle other tasks use to send frames.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use peerlink_core::wire::{encode_frame, FrameDecodeError, FrameDecoder};
use peerlink_core::{Envelope, PeerIdentity};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, trace, warn};

use crate::dispatch::{self, Flow};
use crate::events::Event;
use crate::node::Shared;
use crate::registry::ConnectedPeer;

const READ_BUF_SIZE: usize = 64 * 1024;
/// Bytes buffered without a complete handshake frame before the connection is dropped.
const MAX_HANDSHAKE_LEN: usize = 64 * 1024;

/// Write side of an established connection. Frames are written whole under the lock,
/// so concurrent senders never interleave.
#[derive(Debug)]
pub struct PeerConnection {
    writer: Mutex<OwnedWriteHalf>,
    write_timeout: Duration,
    closed: AtomicBool,
    close_signal: Notify,
}

impl PeerConnection {
    pub fn new(writer: OwnedWriteHalf, write_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            writer: Mutex::new(writer),
            write_timeout,
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        })
    }

    /// Encode and write one frame. A failed write marks the connection closed and
    /// wakes its worker.
    pub async fn send(&self, msg: &Envelope) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        let frame =
            encode_frame(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut writer = self.writer.lock().await;
        let res = tokio::time::timeout(self.write_timeout, async {
            writer.write_all(&frame).await?;
            writer.flush().await
        })
        .await
        .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")));
        if res.is_err() {
            self.mark_closed();
        }
        // A close() that found the writer busy leaves the shutdown to us.
        if self.is_closed() {
            let _ = writer.shutdown().await;
        }
        res
    }

    /// Best-effort final frame, given at most `limit`, then close.
    pub async fn send_and_close(&self, msg: &Envelope, limit: Duration) -> io::Result<()> {
        let res = tokio::time::timeout(limit, self.send(msg))
            .await
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")));
        self.close().await;
        res
    }

    /// Stop the worker and shut down the write side. Idempotent and never waits on a
    /// stalled writer: if a send holds the writer, that send shuts it down when it ends.
    pub async fn close(&self) {
        self.mark_closed();
        if let Ok(mut writer) = self.writer.try_lock() {
            let _ = writer.shutdown().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_signal.notify_one();
        }
    }

    async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.close_signal.notified().await;
    }
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("timed out waiting for handshake")]
    Timeout,
    #[error("connection closed before handshake")]
    Closed,
    #[error("expected handshake, got {0}")]
    Unexpected(&'static str),
    #[error("malformed handshake: {0}")]
    Malformed(#[from] FrameDecodeError),
    #[error("handshake exceeds {MAX_HANDSHAKE_LEN} bytes")]
    TooLarge,
    #[error("handshake carries an empty peer id")]
    EmptyPeerId,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Write the local identity as the first frame.
pub async fn write_handshake<W>(stream: &mut W, identity: &PeerIdentity) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(&Envelope::Handshake(identity.clone()))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    stream.write_all(&frame).await?;
    stream.flush().await
}

/// Read exactly one handshake frame. Bytes that arrive behind it stay in `decoder`
/// for the worker.
pub async fn read_handshake<R>(
    stream: &mut R,
    decoder: &mut FrameDecoder,
    limit: Duration,
) -> Result<PeerIdentity, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let read = async {
        let mut buf = [0u8; 4096];
        loop {
            match decoder.next_frame() {
                Some(Ok(Envelope::Handshake(identity))) => {
                    if identity.peer_id.trim().is_empty() {
                        return Err(HandshakeError::EmptyPeerId);
                    }
                    return Ok(identity);
                }
                Some(Ok(other)) => return Err(HandshakeError::Unexpected(other.kind())),
                Some(Err(e)) => return Err(e.into()),
                None if decoder.buffered() > MAX_HANDSHAKE_LEN => {
                    return Err(HandshakeError::TooLarge)
                }
                None => {}
            }
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Err(HandshakeError::Closed);
            }
            decoder.extend(&buf[..n]);
        }
    };
    tokio::time::timeout(limit, read)
        .await
        .unwrap_or(Err(HandshakeError::Timeout))
}

/// Worker for one registered connection: reads frames, dispatches them, sends a
/// heartbeat after each idle `read_timeout`, and cleans up when the loop ends.
pub(crate) async fn run_connection(
    shared: Arc<Shared>,
    peer: ConnectedPeer,
    mut reader: OwnedReadHalf,
    mut decoder: FrameDecoder,
) {
    let conn = peer.connection.clone();
    let mut shutdown = shared.shutdown.subscribe();
    let read_timeout = shared.config.read_timeout();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    let reason = 'conn: loop {
        while let Some(frame) = decoder.next_frame() {
            match frame {
                Ok(msg) => {
                    trace!(peer = %peer.peer_id, kind = msg.kind(), "Frame received");
                    if let Flow::Close(reason) = dispatch::dispatch(&shared, &peer, msg).await {
                        break 'conn reason;
                    }
                }
                Err(e) => warn!(peer = %peer.peer_id, error = %e, "Dropping malformed frame"),
            }
        }
        if *shutdown.borrow() {
            break 'conn "node shutting down".to_string();
        }
        tokio::select! {
            _ = conn.closed() => break 'conn "connection closed locally".to_string(),
            _ = shutdown.changed() => break 'conn "node shutting down".to_string(),
            read = tokio::time::timeout(read_timeout, reader.read(&mut buf)) => match read {
                Err(_) => {
                    if let Err(e) = conn.send(&Envelope::Heartbeat).await {
                        break 'conn format!("heartbeat failed: {}", e);
                    }
                }
                Ok(Ok(0)) => break 'conn "connection closed by peer".to_string(),
                Ok(Ok(n)) => decoder.extend(&buf[..n]),
                Ok(Err(e)) => break 'conn format!("read error: {}", e),
            },
        }
    };

    let removed = shared
        .registry
        .remove_connection(&peer.peer_id, &conn)
        .await
        .is_some();
    conn.close().await;
    if !shared.registry.contains(&peer.peer_id).await {
        shared.transfers.peer_lost(&peer.peer_id).await;
    }
    if removed {
        info!(peer = %peer.peer_id, nickname = %peer.nickname, %reason, "Peer disconnected");
    } else {
        debug!(peer = %peer.peer_id, %reason, "Connection worker finished");
    }
    shared.events.emit(Event::PeerDisconnected {
        peer_id: peer.peer_id,
        nickname: peer.nickname,
        reason,
    });
}
