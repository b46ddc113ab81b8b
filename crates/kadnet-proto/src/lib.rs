//! Kademlia identifiers, routing table, content store, and RPC wire
//! protocol for kadnet.
//!
//! This crate is pure data and codecs: it has no I/O of its own. The
//! reactor in `kadnet-node` owns the sockets and drives the state these
//! types describe.
//!
//! # Example
//!
//! ```
//! use kadnet_proto::nodeid::NodeId;
//! use kadnet_proto::peer::Peer;
//! use kadnet_proto::routing::RoutingTable;
//!
//! let local = NodeId::random();
//! let mut table = RoutingTable::new(local, 4);
//! let peer = Peer::new(NodeId::random(), "127.0.0.1:8182".parse().unwrap());
//! table.observe(peer);
//! assert_eq!(table.peer_count(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod nodeid;
pub mod peer;
pub mod routing;
pub mod store;
pub mod wire;

pub use error::{ProtoError, Result};
pub use nodeid::NodeId;
pub use peer::Peer;
pub use routing::RoutingTable;
pub use store::{ContentStore, ProviderSet};
