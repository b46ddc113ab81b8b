//! Wire-level edge cases that must never panic the reactor and must never
//! pollute the routing table: a bulk-transfer/RPC dispatch mismatch, and an
//! RPC whose declared size disagrees with its actual shape.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use kadnet_node::{Node, NodeConfig};
use kadnet_proto::wire::{RpcBody, RpcMessage};
use kadnet_proto::{NodeId, Peer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn addr(port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
}

async fn start_node(port: u16, discovery_port: u16, tag: &str) -> (Node, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = NodeConfig::new(addr(port))
        .with_discovery_port(discovery_port)
        .with_upload_dir(dir.path().join(format!("{tag}-upload")))
        .with_download_dir(dir.path().join(format!("{tag}-download")))
        .with_rpc_timeout(Duration::from_millis(300))
        .with_broadcast_interval(Duration::from_secs(3600));
    let mut node = Node::new(config);
    node.start().await.unwrap();
    (node, dir)
}

/// A stream whose first four bytes are not the RPC magic is
/// routed to the bulk-transfer handler, which answers an unrecognised
/// request with a 404-equivalent rather than tearing anything down. The
/// routing table must stay empty — no RPC envelope means no caller to
/// observe.
#[tokio::test]
async fn protocol_magic_mismatch_routes_to_bulk_transfer() {
    let (node, _dir) = start_node(28782, 28783, "magic").await;

    let mut stream = TcpStream::connect(addr(28782)).await.unwrap();
    stream.write_all(b"GET /x HTTP/1.1\r\nConnection: close\r\n\r\n").await.unwrap();
    stream.flush().await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 404"), "got: {response}");

    let status = node.commands().submit_status().unwrap().wait().await.status.unwrap();
    assert_eq!(status.peer_count, 0);

    let mut node = node;
    node.stop().await.unwrap();
}

/// An otherwise well-formed envelope whose declared
/// `packet_size` is one byte larger than the true fixed size for its call
/// type. The reactor must wait for exactly that many bytes, hit EOF when
/// the sender only ever had the true (smaller) amount to give it, discard
/// the message, and close the connection without crashing or touching the
/// routing table.
#[tokio::test]
async fn size_mismatch_is_discarded_without_crashing() {
    let (node, _dir) = start_node(28882, 28883, "size").await;

    let caller = Peer::new(NodeId::random(), addr(19999));
    let mut bytes = RpcMessage {
        caller,
        body: RpcBody::Ping,
    }
    .encode(4);
    let bad_size = (bytes.len() as u32 + 1).to_le_bytes();
    bytes[4..8].copy_from_slice(&bad_size);

    let mut stream = TcpStream::connect(addr(28882)).await.unwrap();
    stream.write_all(&bytes).await.unwrap();
    stream.flush().await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert!(response.is_empty(), "a size-mismatched request must get no response");

    let status = node.commands().submit_status().unwrap().wait().await.status.unwrap();
    assert_eq!(status.peer_count, 0, "the bad caller record must never be observed");

    let mut node = node;
    node.stop().await.unwrap();
}

/// A declared `packet_size` smaller than the envelope header itself must be
/// rejected before any attempt to copy the header into a too-small buffer —
/// the inverse of the oversized case above, and just as reachable by a
/// malicious peer.
#[tokio::test]
async fn undersized_packet_size_is_rejected_without_panicking() {
    let (node, _dir) = start_node(29082, 29083, "undersized").await;

    let caller = Peer::new(NodeId::random(), addr(19998));
    let mut bytes = RpcMessage {
        caller,
        body: RpcBody::Ping,
    }
    .encode(4);
    let tiny_size = 1u32.to_le_bytes();
    bytes[4..8].copy_from_slice(&tiny_size);

    let mut stream = TcpStream::connect(addr(29082)).await.unwrap();
    stream.write_all(&bytes).await.unwrap();
    stream.flush().await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert!(response.is_empty(), "an undersized packet_size must get no response");

    let status = node.commands().submit_status().unwrap().wait().await.status.unwrap();
    assert_eq!(status.peer_count, 0, "the bad caller record must never be observed");

    let mut node = node;
    node.stop().await.unwrap();
}

/// A well-formed PING is still answered normally on the same port, proving
/// the size-mismatch and magic-mismatch handling above doesn't wedge the
/// listener for subsequent well-formed connections.
#[tokio::test]
async fn well_formed_ping_still_works_after_malformed_traffic() {
    let (node, _dir) = start_node(28982, 28983, "resilience").await;

    // First, send garbage that isn't RPC traffic at all.
    {
        let mut stream = TcpStream::connect(addr(28982)).await.unwrap();
        stream.write_all(b"\x00\x00\x00\x00").await.unwrap();
        stream.shutdown().await.unwrap();
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response).await;
    }

    let caller_id = NodeId::random();
    let caller = Peer::new(caller_id, addr(20000));
    let request = RpcMessage {
        caller,
        body: RpcBody::Ping,
    };
    let response = kadnet_node::rpc::call(addr(28982).into(), request, 4, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(matches!(response.body, RpcBody::PingResp(_)));

    let status = node.commands().submit_status().unwrap().wait().await.status.unwrap();
    assert_eq!(status.peer_count, 1, "only the well-formed ping's caller should be observed");

    let mut node = node;
    node.stop().await.unwrap();
}
