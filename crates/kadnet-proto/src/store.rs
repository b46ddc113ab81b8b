//! The content store: content hash to provider-set mapping used to answer
//! FIND_VALUE.

use crate::nodeid::NodeId;
use crate::peer::Peer;
use std::collections::HashMap;

/// The set of peers known to host a given content hash. Capped at `k`
/// entries; union-by-id on merge, with the earliest-seen entries retained
/// when a merge would overflow the cap.
#[derive(Clone, Debug, Default)]
pub struct ProviderSet {
    providers: Vec<Peer>,
}

impl ProviderSet {
    /// The providers currently recorded, in first-seen order.
    #[must_use]
    pub fn peers(&self) -> &[Peer] {
        &self.providers
    }

    /// Merge `incoming` into this set, preserving uniqueness by peer id and
    /// capping the result at `k` entries (earliest-seen retained).
    fn merge(&mut self, incoming: impl IntoIterator<Item = Peer>, k: usize) {
        for peer in incoming {
            if self.providers.iter().any(|p| p.id == peer.id) {
                continue;
            }
            if self.providers.len() < k {
                self.providers.push(peer);
            }
        }
    }
}

/// Maps a content hash to its [`ProviderSet`].
#[derive(Clone, Debug, Default)]
pub struct ContentStore {
    entries: HashMap<NodeId, ProviderSet>,
}

impl ContentStore {
    /// Create an empty content store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `providers` as hosting `key`. If no entry exists for `key` one
    /// is created; otherwise the incoming providers are unioned into the
    /// existing set, capped at `k`. Used for both a local publish (with
    /// `providers = [self]`) and an incoming STORE from a remote peer.
    pub fn put(&mut self, key: NodeId, providers: impl IntoIterator<Item = Peer>, k: usize) {
        self.entries.entry(key).or_default().merge(providers, k);
    }

    /// The provider set recorded for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &NodeId) -> Option<&ProviderSet> {
        self.entries.get(key)
    }

    /// Whether this store has an entry for `key` at all.
    #[must_use]
    pub fn contains(&self, key: &NodeId) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of distinct content keys held, for status reporting.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}
