//! Node lifecycle, iterative lookup, publish/fetch flows, and the
//! single-reactor I/O loop for kadnet.
//!
//! This crate owns everything that turns the wire protocol in
//! [`kadnet_proto`] and the bulk-transfer sub-protocol in
//! [`kadnet_transfer`] into a running node: a [`config::NodeConfig`], a
//! bounded [`command`] intake queue, the [`lookup`] and [`flows`] that
//! answer publish/fetch, and the [`reactor`] that drives the sockets.
//!
//! # Example
//!
//! ```no_run
//! use kadnet_node::{Node, NodeConfig};
//!
//! # async fn example() -> kadnet_node::Result<()> {
//! let config = NodeConfig::new("0.0.0.0:8182".parse().unwrap());
//! let mut node = Node::new(config);
//! node.start().await?;
//! let status = node.commands().submit_status().unwrap().wait().await;
//! println!("peers known: {}", status.status.unwrap().peer_count);
//! node.stop().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod config;
pub mod error;
pub mod flows;
pub mod lookup;
mod node;
mod reactor;
pub mod rpc;

pub use command::{CommandHandle, CommandOutcome, CommandSender, FileDescriptor, NodeStatus, ParseDescriptorError, ResultCode};
pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use node::Node;
