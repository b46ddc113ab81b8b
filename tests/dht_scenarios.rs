//! End-to-end scenarios spanning multiple live nodes: publish/fetch across
//! real loopback sockets, driven purely through the public `kadnet-node`
//! Command API.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use kadnet_node::{FileDescriptor, Node, NodeConfig, ResultCode};
use kadnet_proto::NodeId;

fn addr(port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
}

async fn start_node(port: u16, discovery_port: u16, bootstrap: &[SocketAddrV4], tag: &str) -> (Node, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = NodeConfig::new(addr(port))
        .with_discovery_port(discovery_port)
        .with_upload_dir(dir.path().join(format!("{tag}-upload")))
        .with_download_dir(dir.path().join(format!("{tag}-download")))
        .with_rpc_timeout(Duration::from_millis(500))
        .with_broadcast_interval(Duration::from_secs(3600)); // quiet during the test
    for peer in bootstrap {
        config = config.with_bootstrap_peer(*peer);
    }
    let mut node = Node::new(config);
    node.start().await.unwrap();
    (node, dir)
}

/// Two nodes that already know each other (here via a bootstrap ping
/// rather than waiting on the periodic BROADCAST) exchange a small file
/// end to end: publish on A, fetch on B, bytes land in B's download dir.
#[tokio::test]
async fn two_node_publish_then_fetch() {
    let (node_a, _dir_a) = start_node(28182, 28183, &[], "a").await;
    let (node_b, _dir_b) = start_node(28282, 28283, &[addr(28182)], "b").await;

    // B's bootstrap ping seeds both routing tables; give the async tasks a
    // beat to actually exchange it.
    tokio::time::sleep(Duration::from_millis(100)).await;

    tokio::fs::write(node_a.config().upload_dir.join("hello.txt"), b"hello world\n")
        .await
        .unwrap();
    let hash = NodeId::hash_content(b"hello world\n");
    let descriptor = FileDescriptor::new(hash, "hello.txt", 12);

    let publish_outcome = node_a
        .commands()
        .submit_publish(descriptor.clone())
        .unwrap()
        .wait()
        .await;
    assert_eq!(publish_outcome.code, ResultCode::Success);

    let fetch_outcome = node_b.commands().submit_fetch(descriptor).unwrap().wait().await;
    assert_eq!(fetch_outcome.code, ResultCode::Success);

    let fetched = tokio::fs::read(node_b.config().download_dir.join("hello.txt"))
        .await
        .unwrap();
    assert_eq!(fetched, b"hello world\n");

    let status_a = node_a.commands().submit_status().unwrap().wait().await.status.unwrap();
    let status_b = node_b.commands().submit_status().unwrap().wait().await.status.unwrap();
    assert!(status_a.peer_count >= 1, "A should know B from the bootstrap ping");
    assert!(status_b.peer_count >= 1, "B should know A from answering the ping");
    assert_eq!(status_b.stored_keys, 1);

    let mut node_a = node_a;
    let mut node_b = node_b;
    node_a.stop().await.unwrap();
    node_b.stop().await.unwrap();
}

/// A only knows B, B only knows C; C publishes, which STOREs its provider
/// set on the one closest node it knows (B). A's iterative lookup reaches
/// B, learns the providers (C, and B itself if replication succeeded), and
/// fetches the bytes directly from one of them.
#[tokio::test]
async fn three_node_indirect_fetch_via_store() {
    let (node_c, _dir_c) = start_node(28482, 28483, &[], "c").await;
    let (node_b, _dir_b) = start_node(28382, 28383, &[addr(28482)], "b").await;
    let (node_a, _dir_a) = start_node(28182 + 1000, 28183 + 1000, &[addr(28382)], "a").await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    tokio::fs::write(node_c.config().upload_dir.join("indirect.bin"), b"three node payload")
        .await
        .unwrap();
    let hash = NodeId::hash_content(b"three node payload");
    let descriptor = FileDescriptor::new(hash, "indirect.bin", 19);

    let publish_outcome = node_c
        .commands()
        .submit_publish(descriptor.clone())
        .unwrap()
        .wait()
        .await;
    assert_eq!(publish_outcome.code, ResultCode::Success);

    let fetch_outcome = node_a.commands().submit_fetch(descriptor).unwrap().wait().await;
    assert_eq!(fetch_outcome.code, ResultCode::Success);

    let fetched = tokio::fs::read(node_a.config().download_dir.join("indirect.bin"))
        .await
        .unwrap();
    assert_eq!(fetched, b"three node payload");

    let mut node_a = node_a;
    let mut node_b = node_b;
    let mut node_c = node_c;
    node_a.stop().await.unwrap();
    node_b.stop().await.unwrap();
    node_c.stop().await.unwrap();
}

/// Publish-then-fetch locality: once a node has published a hash it
/// already provides, a subsequent fetch on the same node resolves
/// immediately with no peers involved.
#[tokio::test]
async fn publish_then_fetch_is_local_with_no_peers() {
    let (node, _dir) = start_node(28582, 28583, &[], "solo").await;

    tokio::fs::write(node.config().upload_dir.join("solo.txt"), b"solo bytes")
        .await
        .unwrap();
    let hash = NodeId::hash_content(b"solo bytes");
    let descriptor = FileDescriptor::new(hash, "solo.txt", 10);

    node.commands().submit_publish(descriptor.clone()).unwrap().wait().await;
    let fetch_outcome = node.commands().submit_fetch(descriptor).unwrap().wait().await;
    assert_eq!(fetch_outcome.code, ResultCode::Success);

    let status = node.commands().submit_status().unwrap().wait().await.status.unwrap();
    assert_eq!(status.peer_count, 0);

    let mut node = node;
    node.stop().await.unwrap();
}

/// A fetch for a hash nobody has ever published and no peer knows about
/// fails cleanly with `NotFound`, never hangs, and never panics.
#[tokio::test]
async fn fetch_of_unknown_hash_reports_not_found() {
    let (node, _dir) = start_node(28682, 28683, &[], "lonely").await;
    let descriptor = FileDescriptor::new(NodeId::random(), "ghost.bin", 0);
    let outcome = node.commands().submit_fetch(descriptor).unwrap().wait().await;
    assert_eq!(outcome.code, ResultCode::NotFound);

    let mut node = node;
    node.stop().await.unwrap();
}
