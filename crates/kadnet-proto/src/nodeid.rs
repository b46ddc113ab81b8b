//! Node and content identifiers for the Kademlia overlay.
//!
//! A [`NodeId`] is an opaque 256-bit value used both as a node's identity and
//! as a content-addressing key (the SHA-256 of a file's bytes). Distance
//! between two identifiers is their bitwise XOR, interpreted as an unsigned
//! 256-bit integer; routing and lookup both operate purely in terms of this
//! metric.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

/// Number of k-buckets a [`RoutingTable`](crate::routing::RoutingTable) holds.
///
/// Bucket assignment only ever looks at the leading non-zero byte of a
/// distance, which collapses the 256-bit distance space into `B` buckets
/// rather than one per bit.
pub const B: usize = 8;

/// 256-bit opaque identifier: a node's id, or a content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; 32]);

impl NodeId {
    /// Number of bits in a `NodeId`.
    pub const BITS: usize = 256;

    /// All-zero identifier; never a valid random or hashed id, only useful
    /// as a sentinel in tests.
    pub const ZERO: NodeId = NodeId([0u8; 32]);

    /// Generate a random identifier.
    ///
    /// Used for node identity: the reserved public-key field in the wire
    /// envelope is unused by the current protocol, so identity is simply
    /// random rather than derived from a key.
    #[must_use]
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes[..]);
        Self(bytes)
    }

    /// Compute the content identifier for a file's bytes: its SHA-256 digest.
    #[must_use]
    pub fn hash_content(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Raw bytes of this identifier.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Build an identifier from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Bytewise XOR distance to another identifier.
    #[must_use]
    pub fn distance(&self, other: &NodeId) -> NodeId {
        let mut result = [0u8; 32];
        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        NodeId(result)
    }

    /// Index of the leading non-zero byte, scanning most-significant first.
    /// `None` for the all-zero identifier.
    fn leading_nonzero_byte(&self) -> Option<usize> {
        self.0.iter().position(|&b| b != 0)
    }

    /// The bucket a distance routes to: the bit position (0 = least
    /// significant, 7 = most significant) of the highest set bit within the
    /// leading non-zero byte of the distance, scanning bytes most-significant
    /// first. `None` iff the distance is zero (target equals self).
    ///
    /// Call this on the result of [`NodeId::distance`], not on a bare id.
    #[must_use]
    pub fn bucket_index(&self) -> Option<u8> {
        let byte_idx = self.leading_nonzero_byte()?;
        let byte = self.0[byte_idx];
        Some(7 - byte.leading_zeros() as u8)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// Compare two distances as big-endian unsigned 256-bit integers.
#[must_use]
pub fn compare_distance(d1: &NodeId, d2: &NodeId) -> Ordering {
    d1.0.cmp(&d2.0)
}
