//! Notifications pushed from the node to its front end.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use peerlink_core::identity::short_id;
use tokio::sync::mpsc;
use tracing::trace;

/// Which side opened a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Asynchronous event for the user. Each renders as one printable line.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PeerConnected {
        peer_id: String,
        nickname: String,
        addr: SocketAddr,
        direction: Direction,
    },
    PeerDisconnected {
        peer_id: String,
        nickname: String,
        reason: String,
    },
    PeerDiscovered {
        peer_id: String,
        nickname: String,
        addr: SocketAddr,
        relayed: bool,
    },
    TextReceived {
        sender_id: String,
        sender_nickname: String,
        content: String,
        /// Unix seconds.
        timestamp: f64,
    },
    FileIncoming {
        transfer_id: String,
        sender_nickname: String,
        file_name: String,
        file_size: u64,
    },
    FileReceived {
        transfer_id: String,
        path: PathBuf,
    },
    FileReceiveFailed {
        transfer_id: String,
        reason: String,
    },
    /// Receiver confirmed the file arrived intact.
    FileDelivered { transfer_id: String },
    /// Receiver reported the transfer failed on its side.
    FileFailedRemotely {
        transfer_id: String,
        reason: String,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::PeerConnected {
                peer_id,
                nickname,
                addr,
                direction,
            } => {
                let verb = match direction {
                    Direction::Inbound => "accepted connection from",
                    Direction::Outbound => "connected to",
                };
                write!(f, "{} {} ({}) at {}", verb, nickname, short_id(peer_id), addr)
            }
            Event::PeerDisconnected {
                peer_id,
                nickname,
                reason,
            } => write!(f, "disconnected from {} ({}): {}", nickname, short_id(peer_id), reason),
            Event::PeerDiscovered {
                peer_id,
                nickname,
                addr,
                relayed,
            } => write!(
                f,
                "discovered {} ({}) at {}{}",
                nickname,
                short_id(peer_id),
                addr,
                if *relayed { " via gossip" } else { "" }
            ),
            Event::TextReceived {
                sender_nickname,
                content,
                timestamp,
                ..
            } => write!(f, "[{}] {}: {}", clock(*timestamp), sender_nickname, content),
            Event::FileIncoming {
                sender_nickname,
                file_name,
                file_size,
                ..
            } => write!(
                f,
                "{} is sending '{}' ({})",
                sender_nickname,
                file_name,
                format_size(*file_size)
            ),
            Event::FileReceived { path, .. } => {
                write!(f, "file received: {}", path.display())
            }
            Event::FileReceiveFailed {
                transfer_id,
                reason,
            } => write!(f, "incoming transfer {} failed: {}", transfer_id, reason),
            Event::FileDelivered { transfer_id } => {
                write!(f, "transfer {} delivered and verified", transfer_id)
            }
            Event::FileFailedRemotely {
                transfer_id,
                reason,
            } => write!(f, "transfer {} failed on receiver: {}", transfer_id, reason),
        }
    }
}

fn clock(timestamp: f64) -> String {
    let millis = (timestamp * 1000.0) as i64;
    match chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis) {
        Some(t) => t
            .with_timezone(&chrono::Local)
            .format("%H:%M:%S")
            .to_string(),
        None => "--:--:--".to_string(),
    }
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else if b < KB * KB * KB {
        format!("{:.1} MB", b / (KB * KB))
    } else {
        format!("{:.1} GB", b / (KB * KB * KB))
    }
}

/// Sending half of the event channel. Emitting never fails; a dropped receiver discards events.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: Event) {
        if self.tx.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn text_event_names_sender() {
        let e = Event::TextReceived {
            sender_id: "a1".into(),
            sender_nickname: "alice".into(),
            content: "hello".into(),
            timestamp: 0.0,
        };
        let line = e.to_string();
        assert!(line.ends_with("alice: hello"), "{}", line);
    }

    #[test]
    fn emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(Event::FileDelivered {
            transfer_id: "t".into(),
        });
    }
}
