//! Peer-list invariants checked before a list is accepted.

use std::collections::HashSet;

use crate::core::handle::handle_key;
use crate::core::types::{DrawCount, Peer};

/// Check invariants of a peer list on its own:
/// - At least one peer
/// - Every handle normalizes to something non-empty
/// - No two handles share a normalized key
pub fn validate_peers(peers: &[Peer]) -> Vec<String> {
    let mut errors = Vec::new();
    if peers.is_empty() {
        errors.push("peer list is empty".to_string());
        return errors;
    }

    let mut seen = HashSet::new();
    for (index, peer) in peers.iter().enumerate() {
        let key = handle_key(&peer.handle);
        if key.is_empty() {
            errors.push(format!("peer {index}: handle is empty"));
            continue;
        }
        if !seen.insert(key) {
            errors.push(format!("peer {index}: duplicate handle '{}'", peer.handle));
        }
    }
    errors
}

/// Check a backend peer response against the request that produced it:
/// - Everything [`validate_peers`] checks
/// - Exactly `expected` entries
/// - The visitor's own handle is excluded
pub fn validate_peer_response(peers: &[Peer], expected: DrawCount, own_handle: &str) -> Vec<String> {
    let mut errors = validate_peers(peers);

    if !peers.is_empty() && peers.len() != expected.as_usize() {
        errors.push(format!(
            "expected {} peers, got {}",
            expected,
            peers.len()
        ));
    }

    let own_key = handle_key(own_handle);
    if peers.iter().any(|peer| handle_key(&peer.handle) == own_key) {
        errors.push(format!("peer list includes own handle '{own_handle}'"));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers(handles: &[&str]) -> Vec<Peer> {
        handles.iter().map(|h| Peer::new(*h, "sign")).collect()
    }

    #[test]
    fn reports_empty_list() {
        assert_eq!(validate_peers(&[]), vec!["peer list is empty"]);
    }

    #[test]
    fn duplicates_are_detected_after_normalization() {
        let errors = validate_peers(&peers(&["alice", "@Alice "]));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("duplicate handle"));
    }

    #[test]
    fn blank_handles_are_rejected() {
        let errors = validate_peers(&peers(&["alice", " @ "]));
        assert!(errors.iter().any(|e| e.contains("handle is empty")));
    }

    #[test]
    fn response_must_match_count_and_exclude_self() {
        let three = DrawCount::try_from(3).expect("count");
        let errors = validate_peer_response(&peers(&["a", "b", "Me"]), three, "@me");
        assert_eq!(errors, vec!["peer list includes own handle '@me'"]);

        let errors = validate_peer_response(&peers(&["a", "b"]), three, "me");
        assert_eq!(errors, vec!["expected 3 peers, got 2"]);

        assert!(validate_peer_response(&peers(&["a", "b", "c"]), three, "me").is_empty());
    }
}
