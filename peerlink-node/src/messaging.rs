//! Text messages: unicast, broadcast, and inbound delivery.

use std::collections::BTreeMap;

use peerlink_core::{unix_now, Envelope, PeerIdentity};
use tracing::{debug, warn};

use crate::error::NodeError;
use crate::events::{Event, EventSink};
use crate::registry::{ConnectedPeer, PeerRegistry};

/// Send one text message. A failed write drops the peer from the registry.
pub(crate) async fn send_text(
    registry: &PeerRegistry,
    local: &PeerIdentity,
    peer: &ConnectedPeer,
    content: &str,
) -> Result<(), NodeError> {
    let msg = Envelope::Text {
        sender_id: local.peer_id.clone(),
        sender_nickname: local.nickname.clone(),
        content: content.to_string(),
        timestamp: unix_now(),
    };
    if let Err(e) = peer.connection.send(&msg).await {
        warn!(peer = %peer.peer_id, error = %e, "Text send failed, dropping peer");
        registry.remove_connection(&peer.peer_id, &peer.connection).await;
        peer.connection.close().await;
        return Err(NodeError::Send {
            peer: peer.nickname.clone(),
            source: e,
        });
    }
    debug!(peer = %peer.peer_id, bytes = content.len(), "Text sent");
    Ok(())
}

/// Send to every connected peer. Result maps peer ID to delivery success.
pub(crate) async fn broadcast(
    registry: &PeerRegistry,
    local: &PeerIdentity,
    content: &str,
) -> BTreeMap<String, bool> {
    let mut results = BTreeMap::new();
    for peer in registry.snapshot().await {
        let ok = send_text(registry, local, &peer, content).await.is_ok();
        results.insert(peer.peer_id, ok);
    }
    results
}

pub(crate) fn handle_text(
    events: &EventSink,
    peer: &ConnectedPeer,
    sender_nickname: String,
    content: String,
    timestamp: f64,
) {
    let sender_nickname = if sender_nickname.trim().is_empty() {
        peer.nickname.clone()
    } else {
        sender_nickname
    };
    events.emit(Event::TextReceived {
        sender_id: peer.peer_id.clone(),
        sender_nickname,
        content,
        timestamp,
    });
}
