//! Errors for the bulk transfer sub-protocol.

use thiserror::Error;

/// Errors surfaced by `kadnet-transfer`.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The peer's response did not parse as a valid bulk-transfer
    /// request/response line.
    #[error("malformed bulk-transfer message: {0}")]
    Protocol(String),

    /// The provider responded with an HTTP 404-equivalent: a permanent
    /// per-provider failure for this fetch.
    #[error("not found")]
    NotFound,

    /// Any I/O error aborts the transfer; the caller may retry against a
    /// different provider.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for `kadnet-transfer` operations.
pub type Result<T> = std::result::Result<T, TransferError>;
