//! Follow progress over the peers presented in one draw.

use std::collections::{HashMap, HashSet};

use crate::core::handle::{handle_key, normalize_handle};
use crate::core::invariants::validate_peers;
use crate::core::types::Peer;
use crate::error::FlowError;

const PROFILE_BASE_URL: &str = "https://x.com";

/// Owns the peers to follow and the subset the visitor marked as followed.
///
/// Peers are identified by their normalized key (see [`handle_key`]), so
/// `"@Alice "` and `"alice"` refer to the same peer. The followed set is
/// always a subset of the peer keys.
#[derive(Debug, Clone, Default)]
pub struct FollowTracker {
    peers: Vec<Peer>,
    positions: HashMap<String, usize>,
    followed: HashSet<String>,
}

impl FollowTracker {
    /// Replace the peer list and clear all follow progress.
    pub fn initialize(&mut self, peers: Vec<Peer>) -> Result<(), FlowError> {
        let errors = validate_peers(&peers);
        if !errors.is_empty() {
            return Err(FlowError::invalid_input(errors.join("; ")));
        }
        self.positions = peers
            .iter()
            .enumerate()
            .map(|(index, peer)| (handle_key(&peer.handle), index))
            .collect();
        self.peers = peers;
        self.followed.clear();
        Ok(())
    }

    /// Record that the visitor followed `handle`.
    ///
    /// Returns `true` if this call changed the followed set; marking an
    /// already-followed peer is a successful no-op.
    pub fn mark_followed(&mut self, handle: &str) -> Result<bool, FlowError> {
        let key = handle_key(handle);
        if key.is_empty() {
            return Err(FlowError::invalid_input("peer handle must not be empty"));
        }
        if !self.positions.contains_key(&key) {
            return Err(FlowError::invalid_input(format!(
                "'{}' is not one of the presented peers",
                normalize_handle(handle)
            )));
        }
        Ok(self.followed.insert(key))
    }

    pub fn is_all_followed(&self) -> bool {
        !self.peers.is_empty() && self.followed.len() == self.peers.len()
    }

    /// Clear follow progress, keeping the peer list.
    pub fn reset(&mut self) {
        self.followed.clear();
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn has_peers(&self) -> bool {
        !self.peers.is_empty()
    }

    pub fn is_followed(&self, handle: &str) -> bool {
        self.followed.contains(&handle_key(handle))
    }

    pub fn followed_count(&self) -> usize {
        self.followed.len()
    }

    /// Normalized keys of followed peers, in presentation order.
    pub fn followed_keys(&self) -> Vec<String> {
        self.peers
            .iter()
            .map(|peer| handle_key(&peer.handle))
            .filter(|key| self.followed.contains(key))
            .collect()
    }

    /// Display handles of followed peers, in presentation order.
    pub fn followed_handles(&self) -> Vec<String> {
        self.peers
            .iter()
            .filter(|peer| self.is_followed(&peer.handle))
            .map(|peer| normalize_handle(&peer.handle))
            .collect()
    }

    /// Peers not yet marked, in presentation order.
    pub fn remaining(&self) -> impl Iterator<Item = &Peer> {
        self.peers
            .iter()
            .filter(|peer| !self.is_followed(&peer.handle))
    }

    /// Profile page a caller opens when the visitor goes to follow `handle`.
    pub fn profile_url(&self, handle: &str) -> Option<String> {
        let key = handle_key(handle);
        let index = *self.positions.get(&key)?;
        Some(format!(
            "{PROFILE_BASE_URL}/{}",
            normalize_handle(&self.peers[index].handle)
        ))
    }
}
