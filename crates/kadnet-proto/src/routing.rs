//! The k-bucket routing table.
//!
//! The table holds [`B`](crate::nodeid::B) buckets, one per possible value
//! of [`NodeId::bucket_index`]. Each bucket is an insertion-ordered list of
//! at most `k` peers. Unlike a textbook Kademlia implementation, a bucket
//! that is already full silently drops the new peer rather than evicting a
//! stale one — there is no liveness pinging or LRU replacement in this
//! version; see the module-level note on the drop policy below.

use crate::error::ProtoError;
use crate::nodeid::{NodeId, B};
use crate::peer::Peer;

/// A single k-bucket: peers whose distance to the local node shares the
/// same [`NodeId::bucket_index`], in first-observed order.
#[derive(Clone, Debug, Default)]
struct KBucket {
    peers: Vec<Peer>,
}

impl KBucket {
    fn insert(&mut self, peer: Peer, capacity: usize) -> Result<(), ProtoError> {
        if self.peers.iter().any(|p| p.id == peer.id) {
            return Ok(());
        }
        if self.peers.len() >= capacity {
            // Bucket-full policy: drop silently. Last-seen-based eviction
            // (as standard Kademlia specifies) is a declared extension
            // point, not implemented here.
            return Err(ProtoError::BucketFull);
        }
        self.peers.push(peer);
        Ok(())
    }

    fn get(&self, id: &NodeId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == *id)
    }
}

/// The local node's k-bucket routing table.
#[derive(Clone, Debug)]
pub struct RoutingTable {
    local_id: NodeId,
    k: usize,
    buckets: [KBucket; B],
}

impl RoutingTable {
    /// Create an empty routing table for `local_id` with bucket capacity
    /// `k`. A recommended default is `k = 4`; tests may use `k` as low as 2.
    #[must_use]
    pub fn new(local_id: NodeId, k: usize) -> Self {
        Self {
            local_id,
            k,
            buckets: Default::default(),
        }
    }

    /// The local node's own identifier.
    #[must_use]
    pub const fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    /// This table's configured bucket capacity.
    #[must_use]
    pub const fn k(&self) -> usize {
        self.k
    }

    /// Observe a peer: idempotent. A no-op if `peer.id` is the local id, if
    /// the peer is already present in its bucket, or if that bucket is
    /// full. Returns whether the peer is now (or already was) present.
    pub fn observe(&mut self, peer: Peer) -> bool {
        if peer.id == self.local_id {
            return false;
        }
        // index into `distance`, not `peer.id` directly
        let Some(idx) = self.local_id.distance(&peer.id).bucket_index() else {
            return false;
        };
        match self.buckets[idx as usize].insert(peer, self.k) {
            Ok(()) => true,
            Err(ProtoError::BucketFull) => false,
            Err(_) => false,
        }
    }

    /// Look up a peer by id, if it's present in the table.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&Peer> {
        let idx = self.local_id.distance(id).bucket_index()?;
        self.buckets[idx as usize].get(id)
    }

    /// Select up to `n` peers close to `target`.
    ///
    /// Starts at the bucket the target itself would route to, collects its
    /// peers ordered by ascending distance to `target`, then expands
    /// outward to `i-1`/`i+1`, `i-2`/`i+2`, and so on
    /// until `n` peers have been collected or every bucket has been
    /// visited. The result is the concatenation of per-bucket sorted
    /// segments in spiral order — it is *not* guaranteed to be the global
    /// n-closest set; callers that need strict global ordering (the
    /// iterative lookup) sort the returned vector themselves.
    #[must_use]
    pub fn closest(&self, target: &NodeId, n: usize) -> Vec<Peer> {
        let mut out = Vec::with_capacity(n);
        let start = match self.local_id.distance(target).bucket_index() {
            Some(idx) => idx as i32,
            None => 0,
        };

        let mut visited = [false; B];
        let mut offset = 0i32;
        loop {
            if offset == 0 {
                self.collect_bucket(start, target, &mut visited, &mut out);
            } else {
                self.collect_bucket(start - offset, target, &mut visited, &mut out);
                self.collect_bucket(start + offset, target, &mut visited, &mut out);
            }
            if out.len() >= n || visited.iter().all(|&v| v) {
                break;
            }
            offset += 1;
            if offset as usize > B {
                break;
            }
        }
        out.truncate(n);
        out
    }

    fn collect_bucket(&self, idx: i32, target: &NodeId, visited: &mut [bool; B], out: &mut Vec<Peer>) {
        if idx < 0 || idx as usize >= B {
            return;
        }
        let idx = idx as usize;
        if visited[idx] {
            return;
        }
        visited[idx] = true;
        let mut peers: Vec<Peer> = self.buckets[idx].peers.clone();
        peers.sort_by(|a, b| a.id.distance(target).cmp(&b.id.distance(target)));
        out.extend(peers);
    }

    /// Total number of peers across all buckets.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.buckets.iter().map(|b| b.peers.len()).sum()
    }

    /// All peers across all buckets, in bucket order.
    #[must_use]
    pub fn all_peers(&self) -> Vec<Peer> {
        self.buckets.iter().flat_map(|b| b.peers.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_at_bucket(bucket: u8) -> Peer {
        let mut bytes = [0u8; 32];
        bytes[0] = 1 << bucket;
        Peer::new(NodeId::from_bytes(bytes), "127.0.0.1:1".parse().unwrap())
    }

    #[test]
    fn observe_rejects_self() {
        let local = NodeId::ZERO;
        let mut table = RoutingTable::new(local, 4);
        assert!(!table.observe(Peer::new(local, "127.0.0.1:1".parse().unwrap())));
        assert_eq!(table.peer_count(), 0);
    }

    #[test]
    fn observe_places_peer_in_matching_bucket() {
        let mut table = RoutingTable::new(NodeId::ZERO, 4);
        let peer = peer_at_bucket(3);
        assert!(table.observe(peer.clone()));
        assert_eq!(table.get(&peer.id).map(|p| p.id), Some(peer.id));
    }

    #[test]
    fn observe_is_idempotent() {
        let mut table = RoutingTable::new(NodeId::ZERO, 4);
        let peer = peer_at_bucket(2);
        table.observe(peer.clone());
        let before = table.peer_count();
        table.observe(peer.clone());
        table.observe(peer);
        assert_eq!(table.peer_count(), before);
    }

    #[test]
    fn bucket_full_drops_new_peer() {
        let mut table = RoutingTable::new(NodeId::ZERO, 2);
        // Two distinct peers that both land in bucket 3.
        let mut bytes_a = [0u8; 32];
        bytes_a[0] = 0b0000_1000; // bucket 3
        let mut bytes_b = [0u8; 32];
        bytes_b[0] = 0b0000_1001; // also bucket 3 (leading set bit is still bit 3)

        let a = Peer::new(NodeId::from_bytes(bytes_a), "127.0.0.1:1".parse().unwrap());
        let b = Peer::new(NodeId::from_bytes(bytes_b), "127.0.0.1:2".parse().unwrap());
        assert!(table.observe(a));
        assert!(table.observe(b));
        assert_eq!(table.peer_count(), 2);

        let mut bytes_c = [0u8; 32];
        bytes_c[0] = 0b0000_1010;
        let c = Peer::new(NodeId::from_bytes(bytes_c), "127.0.0.1:3".parse().unwrap());
        assert!(!table.observe(c.clone()));
        assert_eq!(table.peer_count(), 2);
        assert!(table.get(&c.id).is_none());
    }

    #[test]
    fn closest_returns_only_peers_present_in_table() {
        let mut table = RoutingTable::new(NodeId::ZERO, 4);
        for b in 0..8u8 {
            table.observe(peer_at_bucket(b));
        }
        let target = NodeId::random();
        let closest = table.closest(&target, 4);
        for peer in &closest {
            assert!(table.get(&peer.id).is_some());
        }
        assert!(closest.len() <= 4);
    }

    #[test]
    fn closest_on_empty_table_is_empty() {
        let table = RoutingTable::new(NodeId::ZERO, 4);
        assert!(table.closest(&NodeId::random(), 4).is_empty());
    }
}
