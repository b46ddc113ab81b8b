//! Error types for the node lifecycle, lookup, and publish/fetch flows.

use thiserror::Error;

/// Errors surfaced by `kadnet-node`.
///
/// Wire-format and timeout errors are isolated to the peer or connection
/// that produced them and never unwind past a single RPC or transfer
/// attempt; only [`NodeError::AlreadyRunning`] and [`NodeError::Io`] at
/// startup (a bind failure) are meant to reach the front-end as something
/// other than a command result code.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A wire-format problem while encoding or decoding an RPC message.
    #[error("wire protocol error: {0}")]
    Proto(#[from] kadnet_proto::ProtoError),

    /// The bulk-transfer sub-protocol reported a failure.
    #[error("bulk transfer error: {0}")]
    Transfer(#[from] kadnet_transfer::TransferError),

    /// An underlying socket or filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A peer did not respond before the configured RPC deadline elapsed.
    #[error("peer did not respond in time")]
    Timeout,

    /// An iterative lookup terminated, or a fetch exhausted every known
    /// provider, without finding the requested content.
    #[error("{0} not found")]
    NotFound(String),

    /// `Node::start` was called on a node that is already running.
    #[error("node is already running")]
    AlreadyRunning,

    /// `Node::stop` was called on a node that was never started.
    #[error("node is not running")]
    NotRunning,
}

/// Result type for `kadnet-node` operations.
pub type Result<T> = std::result::Result<T, NodeError>;
