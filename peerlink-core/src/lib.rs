//! PeerLink protocol core.
//! No sockets and no runtime: identity, envelopes, sentinel framing, chunking and integrity.
//! The node crate drives these from its connection and discovery tasks.

pub mod chunk;
pub mod identity;
pub mod integrity;
pub mod protocol;
pub mod wire;

pub use chunk::{ChunkError, ReceiveProgress, DEFAULT_CHUNK_SIZE};
pub use identity::{generate_peer_id, local_ip, PeerIdentity};
pub use protocol::{unix_now, Announcement, Envelope, KnownPeer, DEFAULT_DISCOVERY_PORT};
pub use wire::{
    decode_datagram, decode_frame, encode_datagram, encode_frame, DatagramError,
    FrameDecodeError, FrameDecoder, FrameEncodeError,
};
