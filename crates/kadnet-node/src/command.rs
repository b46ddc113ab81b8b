//! The front-end-facing Command API: a bounded FIFO intake queue, each
//! entry carrying its own completion signal.

use kadnet_proto::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// A magnet-style reference to a file: its content hash, display name, and
/// byte length. This crate only needs the minimal `hash:name:size` form to
/// build one, not a full magnet-URI codec.
///
/// `Serialize`/`Deserialize` are derived so a descriptor can be handed to
/// `bincode` at a process boundary (e.g. a future out-of-process front-end);
/// nothing in this crate puts it on the wire today.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// SHA-256 of the file's bytes, also its content-store key.
    pub hash: NodeId,
    /// Display name; also the name used in the bulk-transfer GET/PUT path
    /// and the file's name within the upload/download directories.
    pub name: String,
    /// Length of the file in bytes.
    pub size: u64,
}

/// Error returned by [`FileDescriptor::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDescriptorError(String);

impl fmt::Display for ParseDescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed file descriptor: {}", self.0)
    }
}

impl std::error::Error for ParseDescriptorError {}

impl FileDescriptor {
    /// Build a descriptor directly.
    #[must_use]
    pub fn new(hash: NodeId, name: impl Into<String>, size: u64) -> Self {
        Self {
            hash,
            name: name.into(),
            size,
        }
    }

    /// Parse the minimal `<hex-sha256>:<name>:<size>` magnet form.
    ///
    /// # Errors
    ///
    /// Returns [`ParseDescriptorError`] if the string does not have exactly
    /// three colon-separated fields, the hash is not 64 hex characters, or
    /// the size does not parse as a `u64`.
    pub fn parse(s: &str) -> Result<Self, ParseDescriptorError> {
        let mut parts = s.splitn(3, ':');
        let (Some(hash_hex), Some(name), Some(size)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseDescriptorError(
                "expected hash:name:size".to_string(),
            ));
        };
        if hash_hex.len() != 64 {
            return Err(ParseDescriptorError(format!(
                "hash must be 64 hex characters, got {}",
                hash_hex.len()
            )));
        }
        let decoded =
            hex::decode(hash_hex).map_err(|_| ParseDescriptorError("hash is not valid hex".to_string()))?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        let size: u64 = size
            .parse()
            .map_err(|_| ParseDescriptorError("size is not a valid integer".to_string()))?;
        if name.is_empty() {
            return Err(ParseDescriptorError("name must not be empty".to_string()));
        }
        Ok(Self {
            hash: NodeId::from_bytes(bytes),
            name: name.to_string(),
            size,
        })
    }

    /// Render the `hash:name:size` magnet form.
    #[must_use]
    pub fn to_magnet(&self) -> String {
        format!("{}:{}:{}", self.hash, self.name, self.size)
    }
}

/// Integer result code surfaced to the front-end on a completed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// The command completed as requested.
    Success = 0,
    /// A fetch exhausted every known provider, or a lookup found nothing.
    NotFound = 1,
    /// The reactor shut down before the command could run.
    Cancelled = 2,
    /// The command queue was full; the command was never enqueued.
    QueueFull = 3,
    /// An I/O error (socket or filesystem) aborted the command.
    Io = 4,
}

/// A snapshot of node state, returned by a `Status` command.
#[derive(Debug, Clone, Copy)]
pub struct NodeStatus {
    /// This node's own identifier.
    pub local_id: NodeId,
    /// Number of peers currently held across all k-buckets.
    pub peer_count: usize,
    /// Number of distinct content hashes in the local content store.
    pub stored_keys: usize,
}

/// The outcome delivered through a command's completion signal: always a
/// [`ResultCode`], plus a [`NodeStatus`] snapshot for `Status` commands.
#[derive(Debug, Clone, Copy)]
pub struct CommandOutcome {
    /// The result code for this command.
    pub code: ResultCode,
    /// Present only for a completed `Status` command.
    pub status: Option<NodeStatus>,
}

impl CommandOutcome {
    pub(crate) fn done(code: ResultCode) -> Self {
        Self { code, status: None }
    }

    pub(crate) fn status(code: ResultCode, status: NodeStatus) -> Self {
        Self {
            code,
            status: Some(status),
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self::done(ResultCode::Cancelled)
    }
}

/// The kind of work a [`QueuedCommand`] asks the reactor to perform.
pub(crate) enum CommandKind {
    Status,
    Publish(FileDescriptor),
    Fetch(FileDescriptor),
}

/// A command sitting in the intake queue: its kind, plus the completion
/// channel the reactor signals when it finishes. Ownership is inverted
/// from a shared-queue design: the producer (front-end) holds the
/// receiving half of `completion` until the consumer (reactor) signals
/// it, rather than both sides touching a shared, separately-allocated
/// `Command`.
pub(crate) struct QueuedCommand {
    pub kind: CommandKind,
    pub completion: oneshot::Sender<CommandOutcome>,
}

/// A handle to a command already accepted onto the intake queue. Await
/// [`CommandHandle::wait`] to block until the reactor signals completion.
pub struct CommandHandle {
    completion: oneshot::Receiver<CommandOutcome>,
}

impl CommandHandle {
    /// Wait for the reactor to finish this command and return its outcome.
    ///
    /// If the reactor drops the completion sender without signalling (it
    /// never does, but a panicking task could), this resolves as
    /// [`ResultCode::Cancelled`] rather than hanging forever.
    pub async fn wait(self) -> CommandOutcome {
        self.completion
            .await
            .unwrap_or_else(|_| CommandOutcome::cancelled())
    }
}

/// Front-end handle for submitting commands to a running [`crate::Node`].
///
/// Cloning is cheap (it clones the underlying channel sender); every clone
/// feeds the same bounded FIFO queue, so commands submitted by different
/// front-end threads still execute in the order the reactor drains them.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<QueuedCommand>,
}

impl CommandSender {
    fn submit(&self, kind: CommandKind) -> Result<CommandHandle, ResultCode> {
        let (completion_tx, completion_rx) = oneshot::channel();
        let command = QueuedCommand {
            kind,
            completion: completion_tx,
        };
        self.tx
            .try_send(command)
            .map(|()| CommandHandle {
                completion: completion_rx,
            })
            .map_err(|_| ResultCode::QueueFull)
    }

    /// Submit a publish request. Returns immediately with a handle to await,
    /// or [`ResultCode::QueueFull`] without waiting if the queue is full.
    pub fn submit_publish(&self, descriptor: FileDescriptor) -> Result<CommandHandle, ResultCode> {
        self.submit(CommandKind::Publish(descriptor))
    }

    /// Submit a fetch request. Returns immediately with a handle to await,
    /// or [`ResultCode::QueueFull`] without waiting if the queue is full.
    pub fn submit_fetch(&self, descriptor: FileDescriptor) -> Result<CommandHandle, ResultCode> {
        self.submit(CommandKind::Fetch(descriptor))
    }

    /// Submit a status request. Returns immediately with a handle to await,
    /// or [`ResultCode::QueueFull`] without waiting if the queue is full.
    pub fn submit_status(&self) -> Result<CommandHandle, ResultCode> {
        self.submit(CommandKind::Status)
    }
}

/// Create a bounded command channel: the front-end-facing sender half and
/// the reactor-facing receiver half.
pub(crate) fn channel(capacity: usize) -> (CommandSender, mpsc::Receiver<QueuedCommand>) {
    let (tx, rx) = mpsc::channel(capacity);
    (CommandSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_round_trips_through_magnet_form() {
        let original = FileDescriptor::new(NodeId::hash_content(b"hello world\n"), "hello.txt", 12);
        let magnet = original.to_magnet();
        let parsed = FileDescriptor::parse(&magnet).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn parse_rejects_short_hash() {
        assert!(FileDescriptor::parse("abcd:name:10").is_err());
    }

    #[test]
    fn parse_rejects_non_numeric_size() {
        let hash = "a".repeat(64);
        assert!(FileDescriptor::parse(&format!("{hash}:name:notanumber")).is_err());
    }

    #[test]
    fn descriptor_round_trips_through_bincode() {
        let original = FileDescriptor::new(NodeId::hash_content(b"hello world\n"), "hello.txt", 12);
        let bytes = bincode::serde::encode_to_vec(&original, bincode::config::standard()).unwrap();
        let (decoded, _): (FileDescriptor, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(decoded, original);
    }

    #[tokio::test]
    async fn queue_full_returns_immediately() {
        let (sender, mut rx) = channel(1);
        let first = sender.submit_status();
        assert!(first.is_ok());
        let second = sender.submit_status();
        assert_eq!(second.err(), Some(ResultCode::QueueFull));
        // Draining frees capacity for the next submission.
        let queued = rx.try_recv().unwrap();
        let _ = queued.completion.send(CommandOutcome::done(ResultCode::Success));
        assert!(sender.submit_status().is_ok());
    }

    #[tokio::test]
    async fn handle_resolves_to_cancelled_if_completion_is_dropped() {
        let (sender, mut rx) = channel(4);
        let handle = sender.submit_status().unwrap();
        let queued = rx.try_recv().unwrap();
        drop(queued.completion);
        let outcome = handle.wait().await;
        assert_eq!(outcome.code, ResultCode::Cancelled);
    }

    proptest::proptest! {
        #[test]
        fn magnet_form_round_trips_for_any_hash_and_size(bytes: [u8; 32], size: u64, name in "[a-zA-Z0-9._-]{1,32}") {
            let original = FileDescriptor::new(NodeId::from_bytes(bytes), &name, size);
            let parsed = FileDescriptor::parse(&original.to_magnet()).unwrap();
            prop_assert_eq!(parsed, original);
        }
    }
}
