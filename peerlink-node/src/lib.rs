//! PeerLink node: serverless LAN peer-to-peer messaging and file transfer.
//!
//! [`Node::start`] binds the TCP listener, starts UDP discovery and returns the node
//! handle together with its [`Event`] stream.

pub mod config;
pub mod discovery;
mod dispatch;
pub mod error;
pub mod events;
mod messaging;
pub mod node;
pub mod registry;
pub mod transfer;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use discovery::DiscoveredPeer;
pub use error::{ErrorKind, NodeError};
pub use events::{Direction, Event};
pub use node::Node;
pub use registry::{ConnectionStatus, PeerStatus, PeerSummary};
pub use transfer::{SendReport, TransferDirection, TransferSummary};
