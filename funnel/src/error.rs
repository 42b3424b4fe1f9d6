//! Categorized errors surfaced by the session flow.
//!
//! Every trigger on [`crate::flow::SessionFlow`] resolves to either an updated
//! state or one of these values. None of them is fatal to the process; at worst
//! the attempted transition does not happen.

use thiserror::Error;

/// How loudly a caller should surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Recoverable nuisance; the flow is unaffected.
    Warning,
    /// The attempted transition did not happen.
    Error,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Caller misuse: empty handle, unknown peer, out-of-order trigger.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Network unreachable, server-side failure or malformed payload.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend refused the registration.
    #[error("registration rejected: {0}")]
    Registration(String),

    /// The backend has no peers to offer for this affinity.
    #[error("no peers found: {0}")]
    NoPeersFound(String),

    /// The backend could not produce a message or post URL.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Local clipboard copy failed.
    #[error("clipboard unavailable: {0}")]
    ClipboardUnavailable(String),
}

impl FlowError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Only transport failures are safe to retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::ClipboardUnavailable(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Stable short name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Transport(_) => "transport",
            Self::Registration(_) => "registration",
            Self::NoPeersFound(_) => "no_peers_found",
            Self::Generation(_) => "generation",
            Self::ClipboardUnavailable(_) => "clipboard_unavailable",
        }
    }
}
