//! Stable exit codes for funnel CLI commands.

use crate::error::FlowError;

/// Command succeeded or the visitor quit normally.
pub const OK: i32 = 0;
/// Invalid arguments, configuration or out-of-order input.
pub const INVALID: i32 = 1;
/// The backend could not be reached or answered with garbage.
pub const UNAVAILABLE: i32 = 2;
/// The backend refused the request (registration, peers, generation).
pub const REJECTED: i32 = 3;

/// Exit code for a flow error that ends a CLI session.
pub fn for_error(err: &FlowError) -> i32 {
    match err {
        FlowError::InvalidInput(_) | FlowError::ClipboardUnavailable(_) => INVALID,
        FlowError::Transport(_) => UNAVAILABLE,
        FlowError::Registration(_) | FlowError::NoPeersFound(_) | FlowError::Generation(_) => {
            REJECTED
        }
    }
}
