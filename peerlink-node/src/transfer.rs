//! File transfer engine.
//!
//! Sender: validate, hash, `file-metadata`, wait for `file-ack`, stream `file-chunk`s.
//! Receiver: reserve a destination, ack, persist chunks to a temporary file in the
//! download directory, verify the checksum, rename into place, reply `file-complete`
//! or `file-error`. Every transfer is keyed by its ID; failures never touch other transfers.

use std::collections::{HashMap, HashSet};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use peerlink_core::chunk::{chunk_count, decode_payload, encode_payload, new_transfer_id};
use peerlink_core::integrity::{checksums_match, ContentHasher};
use peerlink_core::{ChunkError, Envelope, PeerIdentity, ReceiveProgress, DEFAULT_CHUNK_SIZE};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, NodeError};
use crate::events::{Event, EventSink};
use crate::registry::ConnectedPeer;

const UNNAMED_FILE: &str = "unnamed_file";
const HASH_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Send,
    Receive,
}

/// Point-in-time view of an active transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub transfer_id: String,
    pub direction: TransferDirection,
    pub peer_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub bytes_transferred: u64,
}

/// Result of a successful `send_file`: every chunk was written to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub transfer_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub chunks: u64,
    pub checksum: String,
}

#[derive(Debug)]
enum AckOutcome {
    Approved,
    Declined(String),
    PeerLost,
}

#[derive(Debug)]
struct AckWaiter {
    peer_id: String,
    tx: oneshot::Sender<AckOutcome>,
}

#[derive(Debug)]
struct OutgoingTransfer {
    peer_id: String,
    file_name: String,
    file_size: u64,
    bytes_sent: u64,
}

#[derive(Debug)]
struct IncomingTransfer {
    peer_id: String,
    file_name: String,
    expected_checksum: String,
    temp_path: PathBuf,
    final_path: PathBuf,
    file: Option<File>,
    progress: ReceiveProgress,
}

pub struct TransferEngine {
    local: PeerIdentity,
    events: EventSink,
    download_dir: PathBuf,
    chunk_size: usize,
    ack_timeout: Duration,
    incoming: Mutex<HashMap<String, IncomingTransfer>>,
    outgoing: Mutex<HashMap<String, OutgoingTransfer>>,
    ack_waiters: Mutex<HashMap<String, AckWaiter>>,
}

impl TransferEngine {
    pub fn new(
        local: PeerIdentity,
        events: EventSink,
        download_dir: PathBuf,
        chunk_size: usize,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            local,
            events,
            download_dir,
            chunk_size: if chunk_size == 0 {
                DEFAULT_CHUNK_SIZE
            } else {
                chunk_size
            },
            ack_timeout,
            incoming: Mutex::new(HashMap::new()),
            outgoing: Mutex::new(HashMap::new()),
            ack_waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Send a file to `peer`. Returns once the last chunk has been written; the
    /// receiver's verdict arrives later as [`Event::FileDelivered`] or
    /// [`Event::FileFailedRemotely`].
    pub async fn send_file(&self, peer: &ConnectedPeer, path: &Path) -> Result<SendReport, NodeError> {
        let path = expand_home(path);
        let meta = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(NodeError::FileNotFound(path))
            }
            Err(e) => return Err(NodeError::Unreadable { path, source: e }),
        };
        if !meta.is_file() {
            return Err(NodeError::NotAFile(path));
        }
        let unreadable = |source| NodeError::Unreadable {
            path: path.clone(),
            source,
        };
        let mut file = File::open(&path).await.map_err(unreadable)?;
        let (checksum, file_size) = hash_reader(&mut file).await.map_err(unreadable)?;
        file.seek(SeekFrom::Start(0)).await.map_err(unreadable)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNNAMED_FILE.to_string());
        let chunks = chunk_count(file_size, self.chunk_size);
        let transfer_id = new_transfer_id(&self.local.peer_id);

        let (tx, rx) = oneshot::channel();
        self.ack_waiters.lock().await.insert(
            transfer_id.clone(),
            AckWaiter {
                peer_id: peer.peer_id.clone(),
                tx,
            },
        );
        self.outgoing.lock().await.insert(
            transfer_id.clone(),
            OutgoingTransfer {
                peer_id: peer.peer_id.clone(),
                file_name: file_name.clone(),
                file_size,
                bytes_sent: 0,
            },
        );

        let metadata = Envelope::FileMetadata {
            transfer_id: transfer_id.clone(),
            file_name: file_name.clone(),
            file_size,
            checksum: checksum.clone(),
            chunks,
            sender_nickname: self.local.nickname.clone(),
        };
        if let Err(e) = peer.connection.send(&metadata).await {
            self.forget_outgoing(&transfer_id).await;
            return Err(NodeError::Send {
                peer: peer.nickname.clone(),
                source: e,
            });
        }
        info!(transfer = %transfer_id, peer = %peer.peer_id, file = %file_name, size = file_size, "Offered file");

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(AckOutcome::Approved)) => {}
            Ok(Ok(AckOutcome::Declined(reason))) => {
                self.forget_outgoing(&transfer_id).await;
                return Err(NodeError::Rejected {
                    transfer_id,
                    reason,
                });
            }
            Ok(Ok(AckOutcome::PeerLost)) | Ok(Err(_)) => {
                self.forget_outgoing(&transfer_id).await;
                return Err(NodeError::Transfer {
                    transfer_id,
                    reason: "peer disconnected before acknowledging".to_string(),
                    kind: ErrorKind::Connectivity,
                });
            }
            Err(_) => {
                self.forget_outgoing(&transfer_id).await;
                return Err(NodeError::AckTimeout {
                    transfer_id,
                    timeout: self.ack_timeout,
                });
            }
        }

        let mut buf = vec![0u8; self.chunk_size];
        for sequence in 0..chunks {
            let n = match read_full(&mut file, &mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    self.forget_outgoing(&transfer_id).await;
                    return Err(unreadable(e));
                }
            };
            let is_final = sequence + 1 == chunks;
            let chunk = Envelope::FileChunk {
                transfer_id: transfer_id.clone(),
                sequence,
                data: encode_payload(&buf[..n]),
                is_final,
                file_checksum: is_final.then(|| checksum.clone()),
            };
            if let Err(e) = peer.connection.send(&chunk).await {
                self.forget_outgoing(&transfer_id).await;
                return Err(NodeError::Send {
                    peer: peer.nickname.clone(),
                    source: e,
                });
            }
            if let Some(t) = self.outgoing.lock().await.get_mut(&transfer_id) {
                t.bytes_sent += n as u64;
            }
        }
        info!(transfer = %transfer_id, chunks, "All chunks sent");

        Ok(SendReport {
            transfer_id,
            file_name,
            file_size,
            chunks,
            checksum,
        })
    }

    /// Handle `file-metadata`: reserve a destination and reply with `file-ack`.
    /// The destination name is chosen under the transfer lock so concurrent
    /// offers never pick the same path.
    pub async fn receive_request(
        &self,
        peer: &ConnectedPeer,
        transfer_id: String,
        file_name: String,
        file_size: u64,
        checksum: String,
        sender_nickname: String,
    ) {
        let prepared = self
            .prepare_incoming(peer, &transfer_id, &file_name, file_size, checksum)
            .await;
        match prepared {
            Ok(stored_name) => {
                self.reply(
                    peer,
                    Envelope::FileAck {
                        transfer_id: transfer_id.clone(),
                        approved: true,
                        reason: None,
                    },
                )
                .await;
                info!(transfer = %transfer_id, peer = %peer.peer_id, file = %stored_name, size = file_size, "Accepted incoming file");
                self.events.emit(Event::FileIncoming {
                    transfer_id,
                    sender_nickname: if sender_nickname.is_empty() {
                        peer.nickname.clone()
                    } else {
                        sender_nickname
                    },
                    file_name: stored_name,
                    file_size,
                });
            }
            Err(e) => {
                warn!(transfer = %transfer_id, error = %e, "Declining incoming file");
                self.reply(
                    peer,
                    Envelope::FileAck {
                        transfer_id: transfer_id.clone(),
                        approved: false,
                        reason: Some(e.to_string()),
                    },
                )
                .await;
                self.events.emit(Event::FileReceiveFailed {
                    transfer_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn prepare_incoming(
        &self,
        peer: &ConnectedPeer,
        transfer_id: &str,
        file_name: &str,
        file_size: u64,
        checksum: String,
    ) -> Result<String, NodeError> {
        let fail = |reason: String, kind| NodeError::Transfer {
            transfer_id: transfer_id.to_string(),
            reason,
            kind,
        };
        if transfer_id.is_empty() {
            return Err(fail("empty transfer id".into(), ErrorKind::Protocol));
        }
        fs::create_dir_all(&self.download_dir).await.map_err(|e| {
            fail(
                format!("cannot create {}: {}", self.download_dir.display(), e),
                ErrorKind::Resource,
            )
        })?;

        let name = sanitize_file_name(file_name);
        let temp_path = self
            .download_dir
            .join(format!(".{}.{}.part", sanitize_component(transfer_id), name));

        // Reserve the id and destination first; the file is opened outside the lock.
        {
            let mut incoming = self.incoming.lock().await;
            if incoming.contains_key(transfer_id) {
                return Err(fail("duplicate transfer id".into(), ErrorKind::State));
            }
            let reserved: HashSet<PathBuf> =
                incoming.values().map(|t| t.final_path.clone()).collect();
            let final_path = unique_destination(&self.download_dir, &name, |p| {
                reserved.contains(p) || p.exists()
            });
            incoming.insert(
                transfer_id.to_string(),
                IncomingTransfer {
                    peer_id: peer.peer_id.clone(),
                    file_name: name.clone(),
                    expected_checksum: checksum,
                    temp_path: temp_path.clone(),
                    final_path,
                    file: None,
                    progress: ReceiveProgress::new(file_size),
                },
            );
        }

        let file = match File::create(&temp_path).await {
            Ok(f) => f,
            Err(e) => {
                self.incoming.lock().await.remove(transfer_id);
                return Err(fail(
                    format!("cannot create {}: {}", temp_path.display(), e),
                    ErrorKind::Resource,
                ));
            }
        };
        let orphan = {
            let mut incoming = self.incoming.lock().await;
            match incoming.get_mut(transfer_id) {
                Some(t) if t.peer_id == peer.peer_id && t.file.is_none() => {
                    t.file = Some(file);
                    None
                }
                _ => Some(file),
            }
        };
        if let Some(file) = orphan {
            // Aborted while the file was being opened.
            drop(file);
            let _ = fs::remove_file(&temp_path).await;
            return Err(fail("transfer aborted".into(), ErrorKind::State));
        }
        Ok(name)
    }

    /// Handle `file-chunk`.
    pub async fn receive_chunk(
        &self,
        peer: &ConnectedPeer,
        transfer_id: &str,
        sequence: u64,
        data: &str,
        is_final: bool,
        file_checksum: Option<String>,
    ) {
        let mut transfer = {
            let mut incoming = self.incoming.lock().await;
            match incoming.remove(transfer_id) {
                Some(t) if t.peer_id == peer.peer_id => t,
                Some(t) => {
                    warn!(transfer = %transfer_id, peer = %peer.peer_id, "Chunk from a peer that does not own the transfer");
                    incoming.insert(transfer_id.to_string(), t);
                    return;
                }
                None => {
                    debug!(transfer = %transfer_id, sequence, "Chunk for unknown transfer ignored");
                    return;
                }
            }
        };

        match self
            .apply_chunk(&mut transfer, transfer_id, sequence, data, is_final, file_checksum)
            .await
        {
            Ok(false) => {
                self.incoming
                    .lock()
                    .await
                    .insert(transfer_id.to_string(), transfer);
            }
            Ok(true) => {
                info!(transfer = %transfer_id, path = %transfer.final_path.display(), "File received and verified");
                self.reply(
                    peer,
                    Envelope::FileComplete {
                        transfer_id: transfer_id.to_string(),
                        success: true,
                    },
                )
                .await;
                self.events.emit(Event::FileReceived {
                    transfer_id: transfer_id.to_string(),
                    path: transfer.final_path,
                });
            }
            Err(e) => {
                warn!(transfer = %transfer_id, error = %e, "Incoming transfer failed");
                discard(transfer).await;
                let reason = match &e {
                    NodeError::Transfer { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                self.reply(
                    peer,
                    Envelope::FileError {
                        transfer_id: transfer_id.to_string(),
                        error: reason.clone(),
                    },
                )
                .await;
                self.events.emit(Event::FileReceiveFailed {
                    transfer_id: transfer_id.to_string(),
                    reason,
                });
            }
        }
    }

    /// Persist one chunk. `Ok(true)` once the file is verified and renamed into place.
    async fn apply_chunk(
        &self,
        t: &mut IncomingTransfer,
        transfer_id: &str,
        sequence: u64,
        data: &str,
        is_final: bool,
        file_checksum: Option<String>,
    ) -> Result<bool, NodeError> {
        let fail = |reason: String, kind| NodeError::Transfer {
            transfer_id: transfer_id.to_string(),
            reason,
            kind,
        };
        let bytes = decode_payload(data).map_err(|e| fail(e.to_string(), chunk_error_kind(&e)))?;
        let complete = t
            .progress
            .accept(sequence, &bytes)
            .map_err(|e| fail(e.to_string(), chunk_error_kind(&e)))?;
        let file = t
            .file
            .as_mut()
            .ok_or_else(|| fail("temporary file already closed".into(), ErrorKind::State))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| fail(format!("write failed: {}", e), ErrorKind::Resource))?;
        if !complete && !is_final {
            return Ok(false);
        }

        if let Some(announced) = file_checksum.as_deref() {
            if !checksums_match(announced, &t.expected_checksum) {
                return Err(fail(
                    "final chunk checksum differs from metadata".into(),
                    ErrorKind::Integrity,
                ));
            }
        }
        if let Some(mut file) = t.file.take() {
            let synced = async {
                file.flush().await?;
                file.sync_all().await
            }
            .await;
            synced.map_err(|e| fail(format!("write failed: {}", e), ErrorKind::Resource))?;
        }
        t.progress
            .clone()
            .finish(&t.expected_checksum)
            .map_err(|e| fail(e.to_string(), chunk_error_kind(&e)))?;

        // A file may have appeared at the destination since it was reserved.
        if t.final_path.exists() {
            let reserved: HashSet<PathBuf> = self
                .incoming
                .lock()
                .await
                .values()
                .map(|o| o.final_path.clone())
                .collect();
            t.final_path = unique_destination(&self.download_dir, &t.file_name, |p| {
                reserved.contains(p) || p.exists()
            });
        }
        fs::rename(&t.temp_path, &t.final_path).await.map_err(|e| {
            fail(
                format!("cannot move file into place: {}", e),
                ErrorKind::Resource,
            )
        })?;
        Ok(true)
    }

    /// Handle `file-ack` for one of our offers.
    pub async fn handle_ack(
        &self,
        peer: &ConnectedPeer,
        transfer_id: &str,
        approved: bool,
        reason: Option<String>,
    ) {
        let mut waiters = self.ack_waiters.lock().await;
        match waiters.remove(transfer_id) {
            Some(w) if w.peer_id == peer.peer_id => {
                let outcome = if approved {
                    AckOutcome::Approved
                } else {
                    AckOutcome::Declined(reason.unwrap_or_else(|| "no reason given".to_string()))
                };
                let _ = w.tx.send(outcome);
            }
            Some(w) => {
                warn!(transfer = %transfer_id, peer = %peer.peer_id, "Ack from a peer that was not offered the transfer");
                waiters.insert(transfer_id.to_string(), w);
            }
            None => debug!(transfer = %transfer_id, "Ack for unknown or expired transfer"),
        }
    }

    /// Handle `file-complete` from the receiver.
    pub async fn handle_complete(&self, peer: &ConnectedPeer, transfer_id: &str, success: bool) {
        if !self.retire_outgoing(peer, transfer_id).await {
            return;
        }
        if success {
            info!(transfer = %transfer_id, "Receiver verified file");
            self.events.emit(Event::FileDelivered {
                transfer_id: transfer_id.to_string(),
            });
        } else {
            warn!(transfer = %transfer_id, "Receiver reported unsuccessful completion");
            self.events.emit(Event::FileFailedRemotely {
                transfer_id: transfer_id.to_string(),
                reason: "receiver reported failure".to_string(),
            });
        }
    }

    /// Handle `file-error` from the receiver.
    pub async fn handle_remote_error(&self, peer: &ConnectedPeer, transfer_id: &str, error: String) {
        if !self.retire_outgoing(peer, transfer_id).await {
            return;
        }
        warn!(transfer = %transfer_id, %error, "Receiver reported transfer error");
        self.events.emit(Event::FileFailedRemotely {
            transfer_id: transfer_id.to_string(),
            reason: error,
        });
    }

    /// Drop every transfer bound to `peer_id`. Partial files are deleted.
    pub async fn peer_lost(&self, peer_id: &str) {
        self.abort_where(|owner| owner == peer_id, "connection lost").await;
    }

    /// Drop every transfer, for shutdown.
    pub async fn abort_all(&self) {
        self.abort_where(|_| true, "node shutting down").await;
    }

    pub async fn transfers(&self) -> Vec<TransferSummary> {
        let mut out: Vec<TransferSummary> = self
            .outgoing
            .lock()
            .await
            .iter()
            .map(|(id, t)| TransferSummary {
                transfer_id: id.clone(),
                direction: TransferDirection::Send,
                peer_id: t.peer_id.clone(),
                file_name: t.file_name.clone(),
                file_size: t.file_size,
                bytes_transferred: t.bytes_sent,
            })
            .collect();
        out.extend(self.incoming.lock().await.iter().map(|(id, t)| TransferSummary {
            transfer_id: id.clone(),
            direction: TransferDirection::Receive,
            peer_id: t.peer_id.clone(),
            file_name: t.file_name.clone(),
            file_size: t.progress.file_size(),
            bytes_transferred: t.progress.received(),
        }));
        out.sort_by(|a, b| a.transfer_id.cmp(&b.transfer_id));
        out
    }

    async fn abort_where(&self, owned_by: impl Fn(&str) -> bool, reason: &str) {
        let lost: Vec<(String, IncomingTransfer)> = {
            let mut incoming = self.incoming.lock().await;
            let ids: Vec<String> = incoming
                .iter()
                .filter(|(_, t)| owned_by(t.peer_id.as_str()))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| incoming.remove(&id).map(|t| (id, t)))
                .collect()
        };
        for (transfer_id, transfer) in lost {
            debug!(transfer = %transfer_id, reason, "Aborting incoming transfer");
            discard(transfer).await;
            self.events.emit(Event::FileReceiveFailed {
                transfer_id,
                reason: reason.to_string(),
            });
        }

        let waiters: Vec<AckWaiter> = {
            let mut map = self.ack_waiters.lock().await;
            let ids: Vec<String> = map
                .iter()
                .filter(|(_, w)| owned_by(w.peer_id.as_str()))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| map.remove(id)).collect()
        };
        for w in waiters {
            let _ = w.tx.send(AckOutcome::PeerLost);
        }

        self.outgoing
            .lock()
            .await
            .retain(|_, t| !owned_by(t.peer_id.as_str()));
    }

    async fn forget_outgoing(&self, transfer_id: &str) {
        self.ack_waiters.lock().await.remove(transfer_id);
        self.outgoing.lock().await.remove(transfer_id);
    }

    /// Remove an outgoing entry owned by `peer`. False if there was none.
    async fn retire_outgoing(&self, peer: &ConnectedPeer, transfer_id: &str) -> bool {
        let mut outgoing = self.outgoing.lock().await;
        match outgoing.get(transfer_id) {
            Some(t) if t.peer_id == peer.peer_id => {
                outgoing.remove(transfer_id);
                true
            }
            _ => {
                debug!(transfer = %transfer_id, "Result for unknown transfer ignored");
                false
            }
        }
    }

    /// Replies are best effort: a broken connection is reported by its worker.
    async fn reply(&self, peer: &ConnectedPeer, msg: Envelope) {
        if let Err(e) = peer.connection.send(&msg).await {
            warn!(peer = %peer.peer_id, kind = msg.kind(), error = %e, "Reply not delivered");
        }
    }
}

fn chunk_error_kind(e: &ChunkError) -> ErrorKind {
    match e {
        ChunkError::Decode(_) | ChunkError::OutOfOrder { .. } => ErrorKind::Protocol,
        ChunkError::Overflow { .. }
        | ChunkError::Incomplete { .. }
        | ChunkError::ChecksumMismatch { .. } => ErrorKind::Integrity,
    }
}

async fn discard(mut transfer: IncomingTransfer) {
    drop(transfer.file.take());
    match fs::remove_file(&transfer.temp_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %transfer.temp_path.display(), error = %e, "Failed to remove partial file")
        }
    }
}

async fn hash_reader<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<(String, u64)> {
    let mut hasher = ContentHasher::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hasher.finalize_hex(), total))
}

/// Fill `buf` unless EOF comes first. Returns the byte count.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Reduce a sender-supplied name to a bare file name.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or("").trim();
    if last.is_empty() || last == "." || last == ".." {
        UNNAMED_FILE.to_string()
    } else {
        last.to_string()
    }
}

fn sanitize_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `dir/name`, or `dir/stem_N.ext` with the smallest N for which `taken` is false.
pub fn unique_destination(dir: &Path, name: &str, taken: impl Fn(&Path) -> bool) -> PathBuf {
    let candidate = dir.join(name);
    if !taken(&candidate) {
        return candidate;
    }
    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let ext = as_path.extension().map(|e| e.to_string_lossy().into_owned());
    let mut n = 1u64;
    loop {
        let file = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        };
        let candidate = dir.join(file);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
