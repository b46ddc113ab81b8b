//! Node configuration: bind addresses, bucket capacity, storage
//! directories, and the tunables of the concurrency model.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

/// Default TCP port for the combined RPC / bulk-transfer listener.
pub const DEFAULT_PORT: u16 = 8182;

/// Default UDP port for `BROADCAST` discovery, one above [`DEFAULT_PORT`].
pub const DEFAULT_DISCOVERY_PORT: u16 = 8183;

/// Recommended bucket capacity / replication factor.
pub const DEFAULT_K: usize = 4;

/// Suggested command-queue capacity.
pub const DEFAULT_MAX_PENDING: usize = 10;

/// Suggested open-socket ceiling.
pub const DEFAULT_MAX_SOCK: usize = 128;

/// Configuration for a single node instance.
///
/// Built with `with_*` methods rather than a file-based format: the only
/// external configuration surface is environment variables and
/// constructor parameters.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Address the combined RPC / bulk-transfer TCP listener binds to.
    pub bind_addr: SocketAddrV4,
    /// UDP port used for `BROADCAST` discovery (always `bind_addr`'s IP).
    pub discovery_port: u16,
    /// Bucket capacity and STORE replication factor. Valid range `[2, 20]`;
    /// the recommended default is 4.
    pub k: usize,
    /// Directory of files this node makes available to FETCH.
    pub upload_dir: PathBuf,
    /// Directory fetched files are written into.
    pub download_dir: PathBuf,
    /// Interval between discovery `BROADCAST` datagrams.
    pub broadcast_interval: Duration,
    /// Bootstrap peer addresses pinged once at startup so their responses
    /// seed the routing table before the first lookup runs.
    pub bootstrap_peers: Vec<SocketAddrV4>,
    /// Capacity of the command-intake queue.
    pub max_pending: usize,
    /// Ceiling on concurrently open accepted connections, not counting the
    /// listener and broadcast sockets.
    pub max_sock: usize,
    /// Per-connection send/receive deadline (suggested 3s).
    pub rpc_timeout: Duration,
    /// Readiness-wait timeout the reactor's loops re-check the shutdown
    /// flag against (suggested 50ms).
    pub poll_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT),
            discovery_port: DEFAULT_DISCOVERY_PORT,
            k: DEFAULT_K,
            upload_dir: PathBuf::from("./upload"),
            download_dir: PathBuf::from("./download"),
            broadcast_interval: Duration::from_secs(30),
            bootstrap_peers: Vec::new(),
            max_pending: DEFAULT_MAX_PENDING,
            max_sock: DEFAULT_MAX_SOCK,
            rpc_timeout: Duration::from_secs(3),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl NodeConfig {
    /// Start from the defaults, bound to `bind_addr`.
    #[must_use]
    pub fn new(bind_addr: SocketAddrV4) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Override the discovery (broadcast) port.
    #[must_use]
    pub fn with_discovery_port(mut self, port: u16) -> Self {
        self.discovery_port = port;
        self
    }

    /// Override the bucket capacity / replication factor.
    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Override the upload directory.
    #[must_use]
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    /// Override the download directory.
    #[must_use]
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Override the discovery broadcast interval.
    #[must_use]
    pub fn with_broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval;
        self
    }

    /// Add a bootstrap peer address pinged once at startup.
    #[must_use]
    pub fn with_bootstrap_peer(mut self, addr: SocketAddrV4) -> Self {
        self.bootstrap_peers.push(addr);
        self
    }

    /// Override the command-queue capacity.
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Override the open-socket ceiling.
    #[must_use]
    pub fn with_max_sock(mut self, max_sock: usize) -> Self {
        self.max_sock = max_sock;
        self
    }

    /// Override the per-connection RPC/transfer deadline.
    #[must_use]
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// The UDP address this node listens for and sends `BROADCAST`
    /// datagrams on: `bind_addr`'s IP at `discovery_port`.
    #[must_use]
    pub fn discovery_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(*self.bind_addr.ip(), self.discovery_port)
    }
}
