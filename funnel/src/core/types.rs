//! Shared deterministic types for the funnel core.
//!
//! These types define stable contracts between core components. They hold no
//! I/O handles and compare by value.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::handle::Affinity;

/// Soft length limit for outreach messages, in characters.
pub const MESSAGE_SOFT_LIMIT: usize = 280;

/// Number of peers to present, drawn from the fixed set `{2, 3, 4, 5, 6}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DrawCount(u8);

impl DrawCount {
    /// Every drawable value, in ascending order.
    pub const ALL: [DrawCount; 5] = [
        DrawCount(2),
        DrawCount(3),
        DrawCount(4),
        DrawCount(5),
        DrawCount(6),
    ];

    pub const MIN: DrawCount = DrawCount(2);
    pub const MAX: DrawCount = DrawCount(6);

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        usize::from(self.0)
    }
}

impl TryFrom<u8> for DrawCount {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN.0..=Self::MAX.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!(
                "draw count {value} outside {}..={}",
                Self::MIN.0,
                Self::MAX.0
            ))
        }
    }
}

impl From<DrawCount> for u8 {
    fn from(value: DrawCount) -> Self {
        value.0
    }
}

impl fmt::Display for DrawCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic generation tag for the live draw/peer/follow state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One candidate account to follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Handle as supplied by the backend.
    pub handle: String,
    /// The peer's reported project interest. Informational only.
    pub affinity: String,
}

impl Peer {
    pub fn new(handle: impl Into<String>, affinity: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            affinity: affinity.into(),
        }
    }
}

/// Per-visit record accumulated by the session flow.
///
/// Exists only once registration succeeded, so `session_id` is always set.
/// The peer list itself lives in the follow tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Normalized handle (no leading `@`, trimmed, non-empty).
    pub handle: String,
    pub affinity: Affinity,
    /// Opaque identifier issued by the backend.
    pub session_id: String,
    /// Set by a committed draw, cleared by restart.
    pub drawn_count: Option<DrawCount>,
}

/// Step of the funnel the visitor is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowState {
    Registering,
    Drawing,
    Reviewing,
    Outreach,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Registering => "registering",
            Self::Drawing => "drawing",
            Self::Reviewing => "reviewing",
            Self::Outreach => "outreach",
        };
        f.write_str(name)
    }
}

/// Backend-bound operation that can be in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Register,
    FetchPeers,
    GenerateMessage,
    PostIntent,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Register => "register",
            Self::FetchPeers => "fetch_peers",
            Self::GenerateMessage => "generate_message",
            Self::PostIntent => "post_intent",
        };
        f.write_str(name)
    }
}

/// Backend-generated text soliciting a reciprocal follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutreachMessage {
    text: String,
}

impl OutreachMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Length signal only; nothing in the core enforces the limit.
    pub fn exceeds_soft_limit(&self) -> bool {
        self.char_count() > MESSAGE_SOFT_LIMIT
    }
}
