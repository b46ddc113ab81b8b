//! Bulk file transfer sub-protocol for kadnet.
//!
//! Once the overlay has located a provider (or a set of replication
//! targets), file bytes move directly between the two nodes over a plain
//! TCP connection using an HTTP/1.1-compatible GET/PUT exchange: one
//! request, one response, connection closed. This crate owns that
//! exchange and the upload/download directories it reads from and writes
//! into; it has no knowledge of the routing table, the content store, or
//! the RPC wire protocol in [`kadnet_proto`].
//!
//! # Example
//!
//! ```no_run
//! use kadnet_transfer::fs::FileStore;
//!
//! # async fn example() -> std::io::Result<()> {
//! let store = FileStore::open("./upload", "./download").await?;
//! store.write_upload("hello.txt", b"hello world\n").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bulk;
pub mod error;
pub mod fs;

pub use bulk::{fetch, handle_connection, push};
pub use error::{Result, TransferError};
pub use fs::FileStore;
