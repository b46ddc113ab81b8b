//! Error types shared by the identifier, routing, store, and wire modules.

use thiserror::Error;

/// Errors surfaced by `kadnet-proto`.
///
/// Matches the error taxonomy used throughout kadnet: wire-format problems
/// are isolated to the connection that produced them and never propagate as
/// panics.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Magic mismatch, size mismatch, or truncated read while decoding an
    /// RPC envelope or body.
    #[error("wire format error: {0}")]
    WireFormat(String),

    /// The routing table's bucket for this distance is already full.
    #[error("bucket is full")]
    BucketFull,

    /// Attempted to insert or look up the local node's own id.
    #[error("refusing to operate on the local node id")]
    SelfReference,
}

/// Result type for `kadnet-proto` operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
