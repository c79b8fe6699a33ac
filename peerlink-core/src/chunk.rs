//! Chunk manager: plan chunk counts, generate transfer IDs, encode payloads,
//! and track receive-side progress for one transfer.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::Rng;

use crate::integrity::{self, ContentHasher};

/// Default chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Number of `file-chunk` frames needed for `file_size` bytes.
/// An empty file still takes one (empty, final) chunk so the receiver reaches completion.
pub fn chunk_count(file_size: u64, chunk_size: usize) -> u64 {
    let size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    } as u64;
    if file_size == 0 {
        return 1;
    }
    file_size.div_ceil(size)
}

/// Fresh transfer ID: sender peer ID, nanosecond timestamp and a random per-file salt.
pub fn new_transfer_id(sender_peer_id: &str) -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    let salt: u32 = rand::thread_rng().gen();
    format!("{}-{}-{:08x}", sender_peer_id, nanos, salt)
}

/// Encode chunk bytes for the `data` field.
pub fn encode_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode the `data` field of a `file-chunk`.
pub fn decode_payload(data: &str) -> Result<Vec<u8>, ChunkError> {
    Ok(STANDARD.decode(data)?)
}

/// Receive-side state of one transfer: byte counter, running digest, expected sequence.
///
/// Enforces that chunks arrive in order with no gaps and that the byte count never
/// exceeds the announced file size. Does no I/O; the caller persists accepted bytes.
#[derive(Debug, Clone)]
pub struct ReceiveProgress {
    file_size: u64,
    received: u64,
    next_sequence: u64,
    hasher: ContentHasher,
}

impl ReceiveProgress {
    pub fn new(file_size: u64) -> Self {
        Self {
            file_size,
            received: 0,
            next_sequence: 0,
            hasher: ContentHasher::new(),
        }
    }

    /// Account for one chunk. Returns `true` once every announced byte has arrived.
    pub fn accept(&mut self, sequence: u64, payload: &[u8]) -> Result<bool, ChunkError> {
        if sequence != self.next_sequence {
            return Err(ChunkError::OutOfOrder {
                expected: self.next_sequence,
                got: sequence,
            });
        }
        let received = self.received + payload.len() as u64;
        if received > self.file_size {
            return Err(ChunkError::Overflow {
                file_size: self.file_size,
                received,
            });
        }
        self.hasher.update(payload);
        self.received = received;
        self.next_sequence += 1;
        Ok(self.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        self.received >= self.file_size
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Verify the completed content against the expected digest.
    pub fn finish(self, expected_checksum: &str) -> Result<String, ChunkError> {
        if !self.is_complete() {
            return Err(ChunkError::Incomplete {
                expected: self.file_size,
                received: self.received,
            });
        }
        let actual = self.hasher.finalize_hex();
        if !integrity::checksums_match(expected_checksum, &actual) {
            return Err(ChunkError::ChecksumMismatch {
                expected: expected_checksum.to_string(),
                actual,
            });
        }
        Ok(actual)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("invalid chunk payload: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("chunk out of order: expected sequence {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },
    #[error("received {received} bytes, more than the announced {file_size}")]
    Overflow { file_size: u64, received: u64 },
    #[error("transfer ended after {received} of {expected} bytes")]
    Incomplete { expected: u64, received: u64 },
    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}
