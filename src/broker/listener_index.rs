//! Listener index
//!
//! Bookkeeping map from a subscriber identity to the connection ids currently
//! registered under it. Routing never reads this; it exists so callers can
//! look connections up by identity.
//!
//! Updates go through `DashMap`'s entry API, so concurrent changes to the same
//! identity are serialized on that identity's shard.

use std::collections::HashSet;

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct ListenerIndex {
    by_identity: DashMap<String, HashSet<String>>,
}

impl ListenerIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs `connection_id` with `identity`.
    pub(crate) fn add(&self, identity: &str, connection_id: &str) {
        self.by_identity
            .entry(identity.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    /// Removes one pairing. Unknown identities or connections are ignored.
    pub(crate) fn remove(&self, identity: &str, connection_id: &str) {
        if let Some(mut connections) = self.by_identity.get_mut(identity) {
            connections.remove(connection_id);
        }
        self.by_identity
            .remove_if(identity, |_, connections| connections.is_empty());
    }

    /// Connection ids registered under `identity` (lower-cased before lookup).
    pub fn connections(&self, identity: &str) -> Vec<String> {
        self.by_identity
            .get(&identity.to_lowercase())
            .map(|connections| connections.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `connection_id` is registered under `identity`.
    pub fn contains(&self, identity: &str, connection_id: &str) -> bool {
        self.by_identity
            .get(&identity.to_lowercase())
            .is_some_and(|connections| connections.contains(connection_id))
    }

    /// Identities with at least one live connection.
    pub fn identities(&self) -> Vec<String> {
        self.by_identity
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Every identity `connection_id` is listed under. Never more than one
    /// for a live subscriber.
    pub fn identities_of(&self, connection_id: &str) -> Vec<String> {
        self.by_identity
            .iter()
            .filter(|entry| entry.value().contains(connection_id))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of identities with at least one connection.
    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    /// True when no identity is registered.
    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }
}
