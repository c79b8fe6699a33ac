//! Route decoded envelopes to the component that owns them.

use peerlink_core::Envelope;
use tracing::{trace, warn};

use crate::messaging;
use crate::node::Shared;
use crate::registry::ConnectedPeer;

/// What the connection worker does after a message.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    /// Tear the connection down with this reason.
    Close(String),
}

pub(crate) async fn dispatch(shared: &Shared, peer: &ConnectedPeer, msg: Envelope) -> Flow {
    match msg {
        Envelope::Text {
            sender_nickname,
            content,
            timestamp,
            ..
        } => messaging::handle_text(&shared.events, peer, sender_nickname, content, timestamp),
        Envelope::FileMetadata {
            transfer_id,
            file_name,
            file_size,
            checksum,
            sender_nickname,
            ..
        } => {
            shared
                .transfers
                .receive_request(peer, transfer_id, file_name, file_size, checksum, sender_nickname)
                .await
        }
        Envelope::FileChunk {
            transfer_id,
            sequence,
            data,
            is_final,
            file_checksum,
        } => {
            shared
                .transfers
                .receive_chunk(peer, &transfer_id, sequence, &data, is_final, file_checksum)
                .await
        }
        Envelope::FileAck {
            transfer_id,
            approved,
            reason,
        } => shared.transfers.handle_ack(peer, &transfer_id, approved, reason).await,
        Envelope::FileComplete {
            transfer_id,
            success,
        } => shared.transfers.handle_complete(peer, &transfer_id, success).await,
        Envelope::FileError { transfer_id, error } => {
            shared.transfers.handle_remote_error(peer, &transfer_id, error).await
        }
        Envelope::Heartbeat => trace!(peer = %peer.peer_id, "Heartbeat"),
        Envelope::Disconnect { reason, .. } => {
            return Flow::Close(format!("peer disconnected ({})", reason));
        }
        Envelope::Handshake(_) => {
            warn!(peer = %peer.peer_id, "Unexpected handshake on established connection")
        }
        Envelope::Discovery(_) => warn!(peer = %peer.peer_id, "Ignoring discovery over TCP"),
        Envelope::Unknown => warn!(peer = %peer.peer_id, "Ignoring message of unknown type"),
    }
    Flow::Continue
}
