//! The iterative lookup algorithm: the FIND_NODE / FIND_VALUE traversal
//! used to locate a key's providers, or the K closest known peers to an
//! arbitrary target.

use crate::reactor::ReactorState;
use crate::rpc;
use kadnet_proto::wire::{RpcBody, RpcMessage, TargetBody};
use kadnet_proto::{NodeId, Peer};
use std::time::Duration;
use tokio::sync::Mutex;

/// Which RPC the lookup issues at each contacted peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Issue FIND_NODE; the lookup never terminates with a value.
    Node,
    /// Issue FIND_VALUE; the lookup terminates early if a responder holds
    /// the key.
    Value,
}

/// The result of a completed lookup.
#[derive(Debug, Clone)]
pub struct LookupResult {
    /// The K closest peers found to the target (populated in both modes;
    /// in [`Mode::Value`] this is only meaningful if `value` is `None`).
    pub closest: Vec<Peer>,
    /// The providers for the target key, present iff a contacted peer
    /// reported `found = true` in [`Mode::Value`].
    pub value: Option<kadnet_proto::wire::ProviderList>,
}

/// Run the iterative lookup for `target` against the shared reactor state,
/// bounded at `3 * k` total contacts so an adversarial or unresponsive
/// peer set can never keep this loop spinning forever.
pub async fn run(
    state: &Mutex<ReactorState>,
    local: &Peer,
    target: NodeId,
    mode: Mode,
    k: usize,
    timeout: Duration,
) -> LookupResult {
    let seed = {
        let guard = state.lock().await;
        guard.routing.closest(&target, k)
    };
    let mut working: Vec<(Peer, bool)> = seed.into_iter().map(|p| (p, false)).collect();
    let max_contacts = 3 * k;
    let mut contacts = 0usize;

    loop {
        let next = working
            .iter()
            .enumerate()
            .filter(|(_, (_, contacted))| !contacted)
            .min_by(|(_, (a, _)), (_, (b, _))| {
                a.id.distance(&target).cmp(&b.id.distance(&target))
            })
            .map(|(i, _)| i);
        let Some(idx) = next else { break };
        if contacts >= max_contacts {
            break;
        }
        contacts += 1;
        working[idx].1 = true;
        let peer_addr = working[idx].0.socket_addr();

        let body = match mode {
            Mode::Node => RpcBody::FindNode(TargetBody { target }),
            Mode::Value => RpcBody::FindValue(TargetBody { target }),
        };
        let request = RpcMessage {
            caller: local.clone(),
            body,
        };
        // Timeouts and wire-format mismatches leave the peer contacted but
        // otherwise unconsidered; the loop simply moves to the next
        // uncontacted candidate.
        let Ok(response) = rpc::call(peer_addr, request, k, timeout).await else {
            continue;
        };

        {
            let mut guard = state.lock().await;
            guard.routing.observe(response.caller.clone());
        }

        match response.body {
            RpcBody::FindValueResp(body) if body.found => {
                let closest = working.into_iter().map(|(p, _)| p).collect();
                return LookupResult {
                    closest,
                    value: Some(body.providers),
                };
            }
            RpcBody::FindValueResp(body) => {
                if merge_new(state, &mut working, body.closest.peers, &local.id).await == 0 {
                    break;
                }
            }
            RpcBody::FindNodeResp(body) => {
                if merge_new(state, &mut working, body.closest.peers, &local.id).await == 0 {
                    break;
                }
            }
            // An unexpected response shape for this call (e.g. a
            // misbehaving peer answering FIND_NODE with a PING_RESP) is
            // treated the same as a wire-format mismatch: ignored, peer
            // stays contacted, the lookup moves on to its next candidate
            // rather than letting one bad responder end it early.
            _ => continue,
        }
    }

    let mut closest: Vec<Peer> = working.into_iter().map(|(p, _)| p).collect();
    closest.sort_by(|a, b| a.id.distance(&target).cmp(&b.id.distance(&target)));
    closest.truncate(k);
    LookupResult {
        closest,
        value: None,
    }
}

/// Merge `incoming` peers into the working set, skipping ids already
/// present and the local node itself. Each peer actually added is also
/// recorded via `routing-table.observe` (spec.md §4.6 step 4) so a lookup
/// grows the routing table from third-hand peers it learns about, not just
/// the responders it directly contacts. Returns the number actually added.
async fn merge_new(
    state: &Mutex<ReactorState>,
    working: &mut Vec<(Peer, bool)>,
    incoming: Vec<Peer>,
    local_id: &NodeId,
) -> usize {
    let mut added = 0;
    for peer in incoming {
        if peer.id == *local_id {
            continue;
        }
        if working.iter().any(|(p, _)| p.id == peer.id) {
            continue;
        }
        {
            let mut guard = state.lock().await;
            guard.routing.observe(peer.clone());
        }
        working.push((peer, false));
        added += 1;
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use kadnet_proto::{ContentStore, RoutingTable};
    use std::net::SocketAddrV4;

    #[tokio::test]
    async fn self_lookup_on_empty_table_terminates_immediately_with_no_peers() {
        let local_id = NodeId::random();
        let local = Peer::new(local_id, "127.0.0.1:8182".parse::<SocketAddrV4>().unwrap());
        let state = Mutex::new(ReactorState {
            routing: RoutingTable::new(local_id, 4),
            store: ContentStore::new(),
        });
        let result = run(&state, &local, local_id, Mode::Node, 4, Duration::from_millis(50)).await;
        assert!(result.closest.is_empty());
        assert!(result.value.is_none());
    }
}
