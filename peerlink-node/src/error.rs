use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure category, independent of the concrete cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Refused, reset or timed out. Non-fatal.
    Connectivity,
    /// Malformed frame or handshake.
    Protocol,
    /// Checksum or size mismatch on a transfer.
    Integrity,
    /// Local file or directory problem.
    Resource,
    /// Duplicate peer, unknown peer or transfer, node shutting down.
    State,
}

/// Error returned by node operations. `Display` is a single human-readable line.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("failed to bind listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is blocklisted")]
    Blocked(SocketAddr),

    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake with {addr} failed: {reason}")]
    Handshake { addr: SocketAddr, reason: String },

    #[error("peer {0} is already connected")]
    AlreadyConnected(String),

    #[error("refusing to connect to self")]
    SelfConnection,

    #[error("no connected peer matches '{0}'")]
    UnknownPeer(String),

    #[error("sending to {peer} failed: {source}")]
    Send {
        peer: String,
        #[source]
        source: std::io::Error,
    },

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no acknowledgment for transfer {transfer_id} within {timeout:?}")]
    AckTimeout {
        transfer_id: String,
        timeout: Duration,
    },

    #[error("transfer {transfer_id} rejected: {reason}")]
    Rejected { transfer_id: String, reason: String },

    #[error("transfer {transfer_id} failed: {reason}")]
    Transfer {
        transfer_id: String,
        reason: String,
        kind: ErrorKind,
    },

    #[error("node is shutting down")]
    ShuttingDown,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::Connect { .. } | NodeError::Send { .. } | NodeError::AckTimeout { .. } => {
                ErrorKind::Connectivity
            }
            NodeError::Handshake { .. } => ErrorKind::Protocol,
            NodeError::Bind { .. }
            | NodeError::FileNotFound(_)
            | NodeError::NotAFile(_)
            | NodeError::Unreadable { .. }
            | NodeError::Io(_) => ErrorKind::Resource,
            NodeError::Transfer { kind, .. } => *kind,
            NodeError::Blocked(_)
            | NodeError::AlreadyConnected(_)
            | NodeError::SelfConnection
            | NodeError::UnknownPeer(_)
            | NodeError::Rejected { .. }
            | NodeError::ShuttingDown => ErrorKind::State,
        }
    }
}
