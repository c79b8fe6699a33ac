//! PeerLink wire protocol: the closed set of envelope types.

use serde::{Deserialize, Serialize};

use crate::identity::PeerIdentity;

/// Default UDP port for discovery broadcasts.
pub const DEFAULT_DISCOVERY_PORT: u16 = 35000;

/// Reason sent in a `disconnect` envelope when the local user tears a connection down.
pub const REASON_USER_REQUESTED: &str = "user-requested";
/// Reason sent in a `disconnect` envelope on node shutdown.
pub const REASON_SHUTDOWN: &str = "shutdown";

/// Every message exchanged between peers. Serialized as a JSON object tagged by `type`.
///
/// `Discovery` only ever travels in UDP datagrams; the rest travel over TCP, one per frame.
/// Tags this build does not know decode to [`Envelope::Unknown`] instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    /// Identity exchange, exactly one frame in each direction right after connect/accept.
    Handshake(PeerIdentity),
    Text {
        sender_id: String,
        sender_nickname: String,
        content: String,
        /// Unix seconds.
        timestamp: f64,
    },
    Discovery(Announcement),
    /// Keepalive, no payload.
    Heartbeat,
    /// Graceful teardown.
    Disconnect { peer_id: String, reason: String },
    /// Sender asks to transfer a file.
    FileMetadata {
        transfer_id: String,
        file_name: String,
        file_size: u64,
        checksum: String,
        chunks: u64,
        sender_nickname: String,
    },
    /// One slice of file content, base64 in `data`.
    FileChunk {
        transfer_id: String,
        sequence: u64,
        data: String,
        #[serde(
            rename = "final",
            default,
            skip_serializing_if = "std::ops::Not::not"
        )]
        is_final: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_checksum: Option<String>,
    },
    /// Receiver accepts or declines a `file-metadata` request.
    FileAck {
        transfer_id: String,
        approved: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    FileComplete { transfer_id: String, success: bool },
    FileError { transfer_id: String, error: String },
    #[serde(other)]
    Unknown,
}

impl Envelope {
    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Handshake(_) => "handshake",
            Envelope::Text { .. } => "text",
            Envelope::Discovery(_) => "discovery",
            Envelope::Heartbeat => "heartbeat",
            Envelope::Disconnect { .. } => "disconnect",
            Envelope::FileMetadata { .. } => "file-metadata",
            Envelope::FileChunk { .. } => "file-chunk",
            Envelope::FileAck { .. } => "file-ack",
            Envelope::FileComplete { .. } => "file-complete",
            Envelope::FileError { .. } => "file-error",
            Envelope::Unknown => "unknown",
        }
    }
}

/// Discovery broadcast payload: the sender's identity plus its discovered-peer table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub peer_id: String,
    pub nickname: String,
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub known_peers: Vec<KnownPeer>,
}

/// Gossip entry: a third-party peer the sender has discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownPeer {
    pub peer_id: String,
    pub nickname: String,
    pub ip: String,
    pub port: u16,
    /// Unix seconds.
    pub last_seen: f64,
}

/// Current time as Unix seconds with sub-second precision.
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn handshake_is_flat_object() {
        let env = Envelope::Handshake(PeerIdentity {
            peer_id: "a1".into(),
            nickname: "alice".into(),
            ip: "10.0.0.1".into(),
            port: 5000,
        });
        let v: Value = serde_json::to_value(&env).unwrap();
        assert_eq!(
            v,
            json!({"type": "handshake", "peer_id": "a1", "nickname": "alice", "ip": "10.0.0.1", "port": 5000})
        );
    }

    #[test]
    fn heartbeat_has_only_type() {
        let v: Value = serde_json::to_value(Envelope::Heartbeat).unwrap();
        assert_eq!(v, json!({"type": "heartbeat"}));
    }

    #[test]
    fn file_chunk_final_flag_on_wire() {
        let last = Envelope::FileChunk {
            transfer_id: "t".into(),
            sequence: 3,
            data: "AAEC".into(),
            is_final: true,
            file_checksum: Some("abc".into()),
        };
        let v: Value = serde_json::to_value(&last).unwrap();
        assert_eq!(v["type"], "file-chunk");
        assert_eq!(v["final"], true);
        assert_eq!(v["file_checksum"], "abc");

        let middle = Envelope::FileChunk {
            transfer_id: "t".into(),
            sequence: 0,
            data: String::new(),
            is_final: false,
            file_checksum: None,
        };
        let v: Value = serde_json::to_value(&middle).unwrap();
        assert!(v.get("final").is_none());
        assert!(v.get("file_checksum").is_none());
    }

    #[test]
    fn unknown_type_decodes_to_unknown() {
        let env: Envelope =
            serde_json::from_value(json!({"type": "typing-indicator", "peer_id": "x"})).unwrap();
        assert_eq!(env, Envelope::Unknown);
    }

    #[test]
    fn discovery_without_known_peers_still_parses() {
        let env: Envelope = serde_json::from_value(json!({
            "type": "discovery", "peer_id": "b2", "nickname": "bob", "ip": "10.0.0.2", "port": 6000
        }))
        .unwrap();
        match env {
            Envelope::Discovery(ann) => {
                assert_eq!(ann.peer_id, "b2");
                assert!(ann.known_peers.is_empty());
            }
            other => panic!("expected discovery, got {:?}", other),
        }
    }

    #[test]
    fn file_ack_reason_optional() {
        let env: Envelope =
            serde_json::from_value(json!({"type": "file-ack", "transfer_id": "t", "approved": true}))
                .unwrap();
        assert_eq!(
            env,
            Envelope::FileAck {
                transfer_id: "t".into(),
                approved: true,
                reason: None
            }
        );
    }
}
