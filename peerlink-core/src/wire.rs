//! Framing: JSON envelope followed by a single 0x00 sentinel byte.
//!
//! serde_json escapes every control character inside strings, so a serialized
//! envelope never contains a raw 0x00 and the sentinel is unambiguous.

use crate::protocol::{Announcement, Envelope};

/// Byte separating consecutive frames on a stream.
pub const SENTINEL: u8 = 0x00;
/// Longest payload accepted before a sentinel must appear.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024; // 16 MiB

/// Encode an envelope into a single frame: JSON bytes + sentinel.
pub fn encode_frame(msg: &Envelope) -> Result<Vec<u8>, FrameEncodeError> {
    let mut out = serde_json::to_vec(msg)?;
    if out.len() > MAX_FRAME_LEN {
        return Err(FrameEncodeError::TooLarge);
    }
    out.push(SENTINEL);
    Ok(out)
}

/// Error encoding an envelope (serialization or size limit).
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("frame too large")]
    TooLarge,
}

/// Decode one sentinel-free segment into an envelope.
pub fn decode_frame(segment: &[u8]) -> Result<Envelope, FrameDecodeError> {
    Ok(serde_json::from_slice(segment)?)
}

/// Error decoding a frame. Neither variant is fatal to the connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("frame too large, discarded up to the next delimiter")]
    TooLarge,
    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Incremental frame extractor for a byte stream.
///
/// Feed raw reads with [`FrameDecoder::extend`], then drain with
/// [`FrameDecoder::next_frame`] until it returns `None`. Partial frames stay buffered.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Set after an oversized segment; bytes are dropped until the next sentinel.
    discarding: bool,
    /// Prefix of `buf` already known to hold no sentinel.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes held that do not yet form a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete frame, in stream order. Empty segments are skipped.
    pub fn next_frame(&mut self) -> Option<Result<Envelope, FrameDecodeError>> {
        loop {
            match self.buf[self.scanned..].iter().position(|&b| b == SENTINEL) {
                Some(offset) => {
                    let pos = self.scanned + offset;
                    self.scanned = 0;
                    let segment: Vec<u8> = self.buf.drain(..=pos).collect();
                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    if pos == 0 {
                        continue;
                    }
                    return Some(decode_frame(&segment[..pos]));
                }
                None => {
                    self.scanned = self.buf.len();
                    if self.buf.len() > MAX_FRAME_LEN {
                        self.buf.clear();
                        self.scanned = 0;
                        if !self.discarding {
                            self.discarding = true;
                            return Some(Err(FrameDecodeError::TooLarge));
                        }
                    }
                    return None;
                }
            }
        }
    }
}

/// Encode a discovery announcement as one UDP datagram (no sentinel).
pub fn encode_datagram(announcement: &Announcement) -> Result<Vec<u8>, FrameEncodeError> {
    Ok(serde_json::to_vec(&Envelope::Discovery(announcement.clone()))?)
}

/// Decode a discovery datagram. A trailing sentinel is tolerated.
pub fn decode_datagram(bytes: &[u8]) -> Result<Announcement, DatagramError> {
    let bytes = bytes.strip_suffix(&[SENTINEL]).unwrap_or(bytes);
    match serde_json::from_slice::<Envelope>(bytes)? {
        Envelope::Discovery(announcement) => Ok(announcement),
        other => Err(DatagramError::UnexpectedType(other.kind())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatagramError {
    #[error("malformed datagram: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected {0} message on discovery port")]
    UnexpectedType(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::KnownPeer;

    fn sample_envelopes() -> Vec<Envelope> {
        vec![
            Envelope::Text {
                sender_id: "a1".into(),
                sender_nickname: "alice".into(),
                content: "hello\u{0000}with nul and ünïcode".into(),
                timestamp: 1_700_000_000.25,
            },
            Envelope::Heartbeat,
            Envelope::FileChunk {
                transfer_id: "a1-1-ff".into(),
                sequence: 0,
                data: "aGVsbG8=".into(),
                is_final: true,
                file_checksum: Some("deadbeef".into()),
            },
            Envelope::Disconnect {
                peer_id: "a1".into(),
                reason: "user-requested".into(),
            },
        ]
    }

    #[test]
    fn encoded_frame_has_single_sentinel_at_end() {
        for env in sample_envelopes() {
            let frame = encode_frame(&env).unwrap();
            assert_eq!(frame.last(), Some(&SENTINEL));
            assert_eq!(frame.iter().filter(|&&b| b == SENTINEL).count(), 1);
        }
    }

    #[test]
    fn any_split_preserves_sequence() {
        let envs = sample_envelopes();
        let stream: Vec<u8> = envs
            .iter()
            .flat_map(|e| encode_frame(e).unwrap())
            .collect();
        for piece in 1..=stream.len() {
            let mut decoder = FrameDecoder::new();
            let mut out = Vec::new();
            for chunk in stream.chunks(piece) {
                decoder.extend(chunk);
                while let Some(frame) = decoder.next_frame() {
                    out.push(frame.unwrap());
                }
            }
            assert_eq!(out, envs, "split size {}", piece);
            assert_eq!(decoder.buffered(), 0);
        }
    }

    #[test]
    fn partial_frame_stays_buffered() {
        let frame = encode_frame(&Envelope::Heartbeat).unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame[..frame.len() - 1]);
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.buffered(), frame.len() - 1);
        decoder.extend(&frame[frame.len() - 1..]);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), Envelope::Heartbeat);
    }

    #[test]
    fn malformed_segment_does_not_poison_stream() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"{not json");
        decoder.extend(&[SENTINEL]);
        decoder.extend(&encode_frame(&Envelope::Heartbeat).unwrap());
        assert!(matches!(
            decoder.next_frame(),
            Some(Err(FrameDecodeError::Decode(_)))
        ));
        assert_eq!(decoder.next_frame().unwrap().unwrap(), Envelope::Heartbeat);
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn large_frame_across_many_reads() {
        let env = Envelope::Text {
            sender_id: "a1".into(),
            sender_nickname: "alice".into(),
            content: "x".repeat(1024 * 1024),
            timestamp: 1.0,
        };
        let frame = encode_frame(&env).unwrap();
        let mut decoder = FrameDecoder::new();
        let (body, last) = frame.split_at(frame.len() - 1);
        for chunk in body.chunks(64 * 1024) {
            decoder.extend(chunk);
            assert!(decoder.next_frame().is_none());
            // Bytes already searched are not searched again.
            assert_eq!(decoder.scanned, decoder.buffered());
        }
        decoder.extend(last);
        decoder.extend(&encode_frame(&Envelope::Heartbeat).unwrap());
        assert_eq!(decoder.next_frame().unwrap().unwrap(), env);
        assert_eq!(decoder.scanned, 0);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), Envelope::Heartbeat);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn empty_segments_skipped() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[SENTINEL, SENTINEL]);
        decoder.extend(&encode_frame(&Envelope::Heartbeat).unwrap());
        assert_eq!(decoder.next_frame().unwrap().unwrap(), Envelope::Heartbeat);
    }

    #[test]
    fn oversized_segment_discarded_until_sentinel() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&vec![b'x'; MAX_FRAME_LEN + 1]);
        assert!(matches!(
            decoder.next_frame(),
            Some(Err(FrameDecodeError::TooLarge))
        ));
        assert_eq!(decoder.buffered(), 0);
        // Tail of the oversized segment, then a good frame.
        decoder.extend(b"tail");
        decoder.extend(&[SENTINEL]);
        decoder.extend(&encode_frame(&Envelope::Heartbeat).unwrap());
        assert_eq!(decoder.next_frame().unwrap().unwrap(), Envelope::Heartbeat);
    }

    #[test]
    fn datagram_roundtrip_with_gossip() {
        let ann = Announcement {
            peer_id: "b2".into(),
            nickname: "bob".into(),
            ip: "10.0.0.2".into(),
            port: 6000,
            known_peers: vec![KnownPeer {
                peer_id: "a1".into(),
                nickname: "alice".into(),
                ip: "10.0.0.1".into(),
                port: 5000,
                last_seen: 12.5,
            }],
        };
        let bytes = encode_datagram(&ann).unwrap();
        assert_eq!(decode_datagram(&bytes).unwrap(), ann);
    }

    #[test]
    fn datagram_rejects_other_types() {
        let bytes = serde_json::to_vec(&Envelope::Heartbeat).unwrap();
        assert!(matches!(
            decode_datagram(&bytes),
            Err(DatagramError::UnexpectedType("heartbeat"))
        ));
        assert!(matches!(
            decode_datagram(b"garbage"),
            Err(DatagramError::Decode(_))
        ));
    }
}
