//! Publish and fetch: the two flows the front-end drives through the
//! command queue, built on the iterative lookup and the bulk-transfer
//! sub-protocol.

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::lookup::{self, Mode};
use crate::reactor::ReactorState;
use kadnet_proto::wire::{ProviderList, RpcBody, RpcMessage, StoreBody};
use kadnet_proto::Peer;
use kadnet_transfer::FileStore;
use tokio::sync::Mutex;

use crate::command::FileDescriptor;

/// Publish `descriptor`'s file: record self as a provider, replicate it
/// onto the K closest nodes to its hash, then advertise the resulting
/// provider set to those same nodes via STORE.
pub async fn publish(
    state: &Mutex<ReactorState>,
    local: &Peer,
    file_store: &FileStore,
    descriptor: &FileDescriptor,
    config: &NodeConfig,
) -> Result<()> {
    let k = config.k;

    {
        let mut guard = state.lock().await;
        guard.store.put(descriptor.hash, [local.clone()], k);
    }

    let lookup_result = lookup::run(state, local, descriptor.hash, Mode::Node, k, config.rpc_timeout).await;

    let bytes = file_store.read_upload(&descriptor.name).await?;

    let mut providers = vec![local.clone()];
    for peer in lookup_result.closest.iter().filter(|p| p.id != local.id) {
        let replicated = kadnet_transfer::push(peer.socket_addr(), &descriptor.name, &bytes)
            .await
            .is_ok();
        if replicated && providers.len() < k && !providers.iter().any(|p| p.id == peer.id) {
            providers.push(peer.clone());
        }
    }

    {
        let mut guard = state.lock().await;
        guard.store.put(descriptor.hash, providers.clone(), k);
    }

    // Advertisement is best-effort on up to K replicas; no attempt is made
    // at global consistency. A STORE that fails or times out against one
    // of the closest nodes does not fail the publish as a whole.
    for peer in &lookup_result.closest {
        let request = RpcMessage {
            caller: local.clone(),
            body: RpcBody::Store(StoreBody {
                key: descriptor.hash,
                providers: ProviderList {
                    peers: providers.clone(),
                },
            }),
        };
        let _ = crate::rpc::call(peer.socket_addr(), request, k, config.rpc_timeout).await;
    }

    Ok(())
}

/// Fetch `descriptor`'s file: satisfy it from the local content store if
/// possible, otherwise run an iterative value lookup and try each returned
/// provider in turn.
pub async fn fetch(
    state: &Mutex<ReactorState>,
    local: &Peer,
    file_store: &FileStore,
    descriptor: &FileDescriptor,
    config: &NodeConfig,
) -> Result<()> {
    let k = config.k;

    let local_entry = {
        let guard = state.lock().await;
        guard.store.get(&descriptor.hash).cloned()
    };

    if let Some(providers) = local_entry {
        if providers.peers().iter().any(|p| p.id == local.id) {
            // Already a provider of our own: success with no network traffic.
            return Ok(());
        }
        for peer in providers.peers() {
            if let Ok(bytes) = kadnet_transfer::fetch(peer.socket_addr(), &descriptor.name).await {
                file_store.write_download(&descriptor.name, &bytes).await?;
                return Ok(());
            }
        }
        return Err(NodeError::NotFound(descriptor.name.clone()));
    }

    let lookup_result = lookup::run(state, local, descriptor.hash, Mode::Value, k, config.rpc_timeout).await;
    let Some(providers) = lookup_result.value else {
        return Err(NodeError::NotFound(descriptor.name.clone()));
    };

    for peer in &providers.peers {
        if peer.id == local.id {
            // A provider list naming ourselves means "you already have it";
            // nothing to fetch over the network for this entry.
            continue;
        }
        if let Ok(bytes) = kadnet_transfer::fetch(peer.socket_addr(), &descriptor.name).await {
            file_store.write_download(&descriptor.name, &bytes).await?;
            let mut guard = state.lock().await;
            guard.store.put(descriptor.hash, [peer.clone()], k);
            return Ok(());
        }
    }

    Err(NodeError::NotFound(descriptor.name.clone()))
}
