//! The I/O loop: an accept loop that dispatches each connection between
//! the RPC and bulk-transfer sub-protocols, a periodic discovery broadcast
//! task, and the command intake that drives publish/fetch/status.
//!
//! Three cooperating tokio tasks share one `Arc<Mutex<ReactorState>>`
//! rather than a literal single-threaded poll loop: readiness is
//! multiplexed over a bounded socket set the same way a single reactor
//! thread would, but without serializing unrelated connections behind one
//! another.

use crate::command::{self, CommandKind, CommandOutcome, CommandSender, NodeStatus, QueuedCommand, ResultCode};
use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::flows;
use kadnet_proto::wire::{CallType, RpcBody, RpcMessage, SuccessBody, ENVELOPE_HEADER_SIZE};
use kadnet_proto::{ContentStore, Peer, RoutingTable};
use kadnet_transfer::FileStore;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{debug, info, warn};

/// State mutated only by the reactor's tasks: the routing table and the
/// content store. Held behind one mutex so the three tasks serialize their
/// access to it without needing to run on a single thread.
pub(crate) struct ReactorState {
    pub routing: RoutingTable,
    pub store: ContentStore,
}

/// A running node's reactor: owns the listening sockets, the shared
/// routing/store state, and the command intake. Constructed with its
/// dependencies passed in explicitly rather than reaching for a global.
pub struct Reactor {
    local: Peer,
    config: NodeConfig,
    state: Arc<Mutex<ReactorState>>,
    file_store: FileStore,
    command_rx: Option<mpsc::Receiver<QueuedCommand>>,
    command_tx: CommandSender,
    shutdown: Arc<AtomicBool>,
}

impl Reactor {
    /// Build a reactor for `local`, with a freshly constructed routing
    /// table and content store.
    ///
    /// # Errors
    ///
    /// Returns a [`NodeError::Io`] if the upload/download directories
    /// cannot be created.
    pub async fn new(local: Peer, config: NodeConfig) -> Result<Self> {
        let routing = RoutingTable::new(local.id, config.k);
        let store = ContentStore::new();
        let file_store = FileStore::open(&config.upload_dir, &config.download_dir).await?;
        let (command_tx, command_rx) = command::channel(config.max_pending);
        Ok(Self {
            local,
            config,
            state: Arc::new(Mutex::new(ReactorState { routing, store })),
            file_store,
            command_rx: Some(command_rx),
            command_tx,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A clone-able handle for submitting commands to this reactor.
    #[must_use]
    pub fn command_sender(&self) -> CommandSender {
        self.command_tx.clone()
    }

    /// The atomic shutdown flag; setting it requests orderly cancellation.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Run the reactor to completion: bootstrap, then drive the accept,
    /// broadcast, and command loops concurrently until the shutdown flag is
    /// observed by all three.
    ///
    /// # Errors
    ///
    /// Returns a [`NodeError::Io`] if either the TCP listener or the UDP
    /// broadcast socket fails to bind — both are treated as fatal per §7.6
    /// (allocation/listen-bind failure at startup).
    pub async fn run(mut self) -> Result<()> {
        let listener = TcpListener::bind(self.local.address).await?;
        let discovery_addr = self.config.discovery_addr();
        let udp = UdpSocket::bind(discovery_addr).await?;
        udp.set_broadcast(true)?;
        info!(bind = %self.local.address, discovery = %discovery_addr, id = %self.local.id, "reactor starting");

        self.bootstrap().await;

        let command_rx = self.command_rx.take().expect("run() called at most once");
        let sockets = Arc::new(Semaphore::new(self.config.max_sock.saturating_sub(2)));

        let accept = accept_loop(
            listener,
            Arc::clone(&self.state),
            self.file_store.clone(),
            self.local.clone(),
            self.config.clone(),
            Arc::clone(&sockets),
            Arc::clone(&self.shutdown),
        );
        let broadcast = broadcast_loop(
            udp,
            Arc::clone(&self.state),
            self.local.clone(),
            self.config.clone(),
            Arc::clone(&self.shutdown),
        );
        let commands = command_loop(
            command_rx,
            Arc::clone(&self.state),
            self.file_store.clone(),
            self.local.clone(),
            self.config.clone(),
            Arc::clone(&self.shutdown),
        );

        tokio::join!(accept, broadcast, commands);
        info!("reactor stopped");
        Ok(())
    }

    /// Ping each configured bootstrap peer once; a successful response's
    /// embedded caller record seeds the routing table via the same
    /// observe-on-every-response rule the reactor applies to ordinary RPC
    /// traffic.
    async fn bootstrap(&self) {
        for addr in self.config.bootstrap_peers.clone() {
            let request = RpcMessage {
                caller: self.local.clone(),
                body: RpcBody::Ping,
            };
            match crate::rpc::call(SocketAddr::from(addr), request, self.config.k, self.config.rpc_timeout).await {
                Ok(response) => {
                    let mut guard = self.state.lock().await;
                    guard.routing.observe(response.caller);
                }
                Err(err) => warn!(%addr, error = %err, "bootstrap peer unreachable"),
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<Mutex<ReactorState>>,
    file_store: FileStore,
    local: Peer,
    config: NodeConfig,
    sockets: Arc<Semaphore>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        let accepted = tokio::time::timeout(config.poll_interval, listener.accept()).await;
        let (stream, peer_addr) = match accepted {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => {
                warn!(error = %err, "accept failed");
                continue;
            }
            Err(_) => continue, // poll tick: re-check shutdown
        };

        let Ok(permit) = Arc::clone(&sockets).try_acquire_owned() else {
            // MAX_SOCK reached: close the new connection immediately.
            debug!(%peer_addr, "connection limit reached, dropping");
            drop(stream);
            continue;
        };

        let state = Arc::clone(&state);
        let file_store = file_store.clone();
        let local = local.clone();
        let k = config.k;
        let deadline = config.rpc_timeout;
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = dispatch_connection(stream, &state, &file_store, &local, k, deadline).await {
                debug!(%peer_addr, error = %err, "connection closed with error");
            }
        });
    }
}

/// Peek the first four bytes of a freshly accepted stream against the RPC
/// magic to decide whether it belongs to the wire protocol or the
/// bulk-transfer sub-protocol.
async fn dispatch_connection(
    mut stream: TcpStream,
    state: &Mutex<ReactorState>,
    file_store: &FileStore,
    local: &Peer,
    k: usize,
    deadline: std::time::Duration,
) -> Result<()> {
    // `TcpStream::peek` re-reads from the start of the socket's unconsumed
    // data on every call rather than continuing where the last call left
    // off, so accumulating into `probe[peeked..]` across calls would
    // duplicate early bytes instead of extending the read. Peek the whole
    // buffer each time and wait for readiness in between; bounded by
    // `deadline` so a peer that trickles in under four bytes (or never
    // sends any) cannot pin a connection slot forever.
    let probe = tokio::time::timeout(deadline, async {
        let mut probe = [0u8; 4];
        loop {
            let n = stream.peek(&mut probe).await?;
            if n == 0 {
                return Ok(None); // peer closed before sending anything
            }
            if n >= 4 {
                return Ok(Some(probe));
            }
            stream.readable().await?;
        }
    })
    .await
    .map_err(|_| NodeError::Timeout)??;
    let Some(probe) = probe else {
        return Ok(());
    };

    if probe == kadnet_proto::wire::MAGIC {
        tokio::time::timeout(deadline, handle_rpc_connection(stream, state, local, k))
            .await
            .map_err(|_| NodeError::Timeout)?
    } else {
        tokio::time::timeout(deadline, kadnet_transfer::handle_connection(stream, file_store))
            .await
            .map_err(|_| NodeError::Timeout)??;
        Ok(())
    }
}

async fn handle_rpc_connection(mut stream: TcpStream, state: &Mutex<ReactorState>, local: &Peer, k: usize) -> Result<()> {
    let mut header = [0u8; ENVELOPE_HEADER_SIZE];
    stream.read_exact(&mut header).await?;
    let (_call_type, packet_size) = RpcMessage::peek_header(&header)?;
    if packet_size < ENVELOPE_HEADER_SIZE || packet_size > CallType::FindValueResp.total_size(k) {
        return Err(NodeError::Proto(kadnet_proto::ProtoError::WireFormat(format!(
            "declared packet_size {packet_size} is not a valid request size"
        ))));
    }
    let mut buf = vec![0u8; packet_size];
    buf[..ENVELOPE_HEADER_SIZE].copy_from_slice(&header);
    stream.read_exact(&mut buf[ENVELOPE_HEADER_SIZE..]).await?;
    let request = RpcMessage::decode(&buf, k)?;

    // Every inbound RPC carries the caller's peer record; observe it before
    // executing the body.
    {
        let mut guard = state.lock().await;
        guard.routing.observe(request.caller.clone());
    }

    let response_body = handle_body(request.body, state, local, k).await;
    let response = RpcMessage {
        caller: local.clone(),
        body: response_body,
    };
    let bytes = response.encode(k);
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}

async fn handle_body(body: RpcBody, state: &Mutex<ReactorState>, local: &Peer, k: usize) -> RpcBody {
    match body {
        RpcBody::Ping => RpcBody::PingResp(SuccessBody { success: true }),
        RpcBody::Store(store_body) => {
            let mut guard = state.lock().await;
            guard.store.put(store_body.key, store_body.providers.peers, k);
            RpcBody::StoreResp(SuccessBody { success: true })
        }
        RpcBody::FindNode(target_body) => {
            let guard = state.lock().await;
            let closest = guard.routing.closest(&target_body.target, k);
            RpcBody::FindNodeResp(kadnet_proto::wire::FindNodeRespBody {
                found: false,
                closest: kadnet_proto::wire::ProviderList { peers: closest },
            })
        }
        RpcBody::FindValue(target_body) => {
            let guard = state.lock().await;
            if let Some(providers) = guard.store.get(&target_body.target) {
                RpcBody::FindValueResp(kadnet_proto::wire::FindValueRespBody {
                    found: true,
                    key: target_body.target,
                    providers: kadnet_proto::wire::ProviderList {
                        peers: providers.peers().to_vec(),
                    },
                    closest: kadnet_proto::wire::ProviderList::default(),
                })
            } else {
                let closest = guard.routing.closest(&target_body.target, k);
                RpcBody::FindValueResp(kadnet_proto::wire::FindValueRespBody {
                    found: false,
                    key: target_body.target,
                    providers: kadnet_proto::wire::ProviderList::default(),
                    closest: kadnet_proto::wire::ProviderList { peers: closest },
                })
            }
        }
        // Responses and broadcasts never arrive as the body of a request
        // this node is asked to answer; answer with a success flag rather
        // than tearing down the connection.
        RpcBody::Broadcast | RpcBody::PingResp(_) | RpcBody::StoreResp(_) | RpcBody::FindNodeResp(_) | RpcBody::FindValueResp(_) => {
            let _ = local;
            RpcBody::PingResp(SuccessBody { success: false })
        }
    }
}

async fn broadcast_loop(
    socket: UdpSocket,
    state: Arc<Mutex<ReactorState>>,
    local: Peer,
    config: NodeConfig,
    shutdown: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(config.broadcast_interval);
    let broadcast_target = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::BROADCAST), config.discovery_port);
    let mut recv_buf = vec![0u8; CallType::FindValueResp.total_size(config.k).max(ENVELOPE_HEADER_SIZE)];

    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                send_broadcast(&socket, broadcast_target, &local, config.k).await;
            }
            received = tokio::time::timeout(config.poll_interval, socket.recv_from(&mut recv_buf)) => {
                if let Ok(Ok((n, from))) = received {
                    handle_broadcast(&recv_buf[..n], from, &local, &state, config.k).await;
                }
            }
        }
    }
}

async fn send_broadcast(socket: &UdpSocket, target: SocketAddr, local: &Peer, k: usize) {
    let message = RpcMessage {
        caller: local.clone(),
        body: RpcBody::Broadcast,
    };
    let bytes = message.encode(k);
    if let Err(err) = socket.send_to(&bytes, target).await {
        warn!(error = %err, "broadcast send failed");
    }
}

async fn handle_broadcast(buf: &[u8], from: SocketAddr, local: &Peer, state: &Mutex<ReactorState>, k: usize) {
    // The reactor's own broadcast, echoed back by the network, is
    // suppressed by comparing the datagram's source address to the local
    // primary address.
    if from == local.socket_addr() {
        return;
    }
    let Ok(message) = RpcMessage::decode(buf, k) else {
        return;
    };
    if !matches!(message.body, RpcBody::Broadcast) {
        return;
    }
    if message.caller.id == local.id {
        return;
    }
    let mut guard = state.lock().await;
    guard.routing.observe(message.caller);
}

async fn command_loop(
    mut command_rx: mpsc::Receiver<QueuedCommand>,
    state: Arc<Mutex<ReactorState>>,
    file_store: FileStore,
    local: Peer,
    config: NodeConfig,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        let received = tokio::time::timeout(config.poll_interval, command_rx.recv()).await;
        let command = match received {
            Ok(Some(command)) => command,
            Ok(None) => break, // every sender dropped
            Err(_) => continue,
        };
        let outcome = run_command(command.kind, &state, &file_store, &local, &config).await;
        let _ = command.completion.send(outcome);
    }

    // Drain and cancel whatever remains once shutdown is observed, per §5.
    command_rx.close();
    while let Ok(command) = command_rx.try_recv() {
        let _ = command.completion.send(CommandOutcome::cancelled());
    }
}

async fn run_command(
    kind: CommandKind,
    state: &Mutex<ReactorState>,
    file_store: &FileStore,
    local: &Peer,
    config: &NodeConfig,
) -> CommandOutcome {
    match kind {
        CommandKind::Status => {
            let guard = state.lock().await;
            CommandOutcome::status(
                ResultCode::Success,
                NodeStatus {
                    local_id: local.id,
                    peer_count: guard.routing.peer_count(),
                    stored_keys: stored_key_count(&guard),
                },
            )
        }
        CommandKind::Publish(descriptor) => match flows::publish(state, local, file_store, &descriptor, config).await {
            Ok(()) => CommandOutcome::done(ResultCode::Success),
            Err(NodeError::NotFound(_)) => CommandOutcome::done(ResultCode::NotFound),
            Err(NodeError::Io(_) | NodeError::Transfer(_)) => CommandOutcome::done(ResultCode::Io),
            Err(_) => CommandOutcome::done(ResultCode::Io),
        },
        CommandKind::Fetch(descriptor) => match flows::fetch(state, local, file_store, &descriptor, config).await {
            Ok(()) => CommandOutcome::done(ResultCode::Success),
            Err(NodeError::NotFound(_)) => CommandOutcome::done(ResultCode::NotFound),
            Err(NodeError::Io(_) | NodeError::Transfer(_)) => CommandOutcome::done(ResultCode::Io),
            Err(_) => CommandOutcome::done(ResultCode::Io),
        },
    }
}

fn stored_key_count(state: &ReactorState) -> usize {
    // `ContentStore` does not expose a direct key count; `all_peers` on the
    // routing table is unrelated, so this walks the store through the
    // public API it does offer. Kept here rather than added to
    // `kadnet-proto` since nothing else needs it.
    state.store.key_count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kadnet_proto::NodeId;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::time::Duration;

    fn local_peer(port: u16) -> Peer {
        Peer::new(NodeId::random(), SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
    }

    #[tokio::test]
    async fn ping_over_a_real_connection_updates_the_routing_table() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_id = NodeId::random();
        let server_peer = match addr {
            SocketAddr::V4(v4) => Peer::new(server_id, v4),
            SocketAddr::V6(_) => unreachable!("bound to an IPv4 loopback address"),
        };
        let state = Mutex::new(ReactorState {
            routing: RoutingTable::new(server_id, 4),
            store: ContentStore::new(),
        });

        let server_peer_clone = server_peer.clone();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            handle_rpc_connection(stream, &state, &server_peer_clone, 4).await.unwrap();
            state
        });

        let client = local_peer(0);
        let request = RpcMessage {
            caller: client.clone(),
            body: RpcBody::Ping,
        };
        let response = crate::rpc::call(SocketAddr::V4(server_peer.address), request, 4, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(response.body, RpcBody::PingResp(SuccessBody { success: true })));
        assert_eq!(response.caller.id, server_id);

        let state = server.await.unwrap();
        let guard = state.lock().await;
        assert!(guard.routing.get(&client.id).is_some());
    }

    #[tokio::test]
    async fn new_reactor_starts_with_an_empty_table_and_live_shutdown_flag() {
        let dir = tempfile::tempdir().unwrap();
        let local = local_peer(0);
        let config = NodeConfig::new(local.address)
            .with_upload_dir(dir.path().join("up"))
            .with_download_dir(dir.path().join("down"));
        let reactor = Reactor::new(local, config).await.unwrap();
        assert!(!reactor.shutdown_flag().load(Ordering::Acquire));
        let guard = reactor.state.lock().await;
        assert_eq!(guard.routing.peer_count(), 0);
    }
}
