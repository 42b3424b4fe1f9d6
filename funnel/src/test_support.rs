//! Test-only helpers: a scripted backend, clipboards and peer builders.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::core::handle::{ProjectCatalog, handle_key};
use crate::core::selector::RandomSelector;
use crate::core::types::Peer;
use crate::flow::SessionFlow;
use crate::io::backend::{
    Backend, BackendError, MessageRequest, PeersRequest, PostIntentRequest, Registration,
    RegisterRequest,
};
use crate::io::clipboard::Clipboard;

/// Project used by scripted sessions.
pub const TEST_PROJECT: &str = "SomeProject";

/// Create a peer sharing the test project.
pub fn peer(handle: &str) -> Peer {
    Peer::new(handle, TEST_PROJECT.to_lowercase())
}

/// Create peers for each handle, in order.
pub fn peers(handles: &[&str]) -> Vec<Peer> {
    handles.iter().map(|h| peer(h)).collect()
}

/// A flow over a one-project catalog with a seeded selector.
pub fn test_flow(seed: u64) -> SessionFlow {
    SessionFlow::new(
        ProjectCatalog::new([TEST_PROJECT, "Other"]),
        RandomSelector::seeded(seed),
    )
}

/// Request observed by [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Register(RegisterRequest),
    FetchPeers(PeersRequest),
    GenerateMessage(MessageRequest),
    PostIntent(PostIntentRequest),
}

/// Backend that replays queued results.
///
/// When a queue is empty the backend answers like a healthy service: it
/// registers everyone, serves the first `count` pool peers that are not the
/// visitor, and generates a short message naming the peers.
pub struct ScriptedBackend {
    pool: Vec<Peer>,
    registrations: Mutex<VecDeque<Result<Registration, BackendError>>>,
    peer_lists: Mutex<VecDeque<Result<Vec<Peer>, BackendError>>>,
    messages: Mutex<VecDeque<Result<String, BackendError>>>,
    post_urls: Mutex<VecDeque<Result<String, BackendError>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::with_pool(peers(&["ana", "ben", "cleo", "dev", "eli", "fay", "gus"]))
    }

    pub fn with_pool(pool: Vec<Peer>) -> Self {
        Self {
            pool,
            registrations: Mutex::new(VecDeque::new()),
            peer_lists: Mutex::new(VecDeque::new()),
            messages: Mutex::new(VecDeque::new()),
            post_urls: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_registration(&self, result: Result<Registration, BackendError>) {
        self.registrations.lock().expect("lock").push_back(result);
    }

    pub fn push_peers(&self, result: Result<Vec<Peer>, BackendError>) {
        self.peer_lists.lock().expect("lock").push_back(result);
    }

    pub fn push_message(&self, result: Result<String, BackendError>) {
        self.messages.lock().expect("lock").push_back(result);
    }

    pub fn push_post_url(&self, result: Result<String, BackendError>) {
        self.post_urls.lock().expect("lock").push_back(result);
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock").clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("lock").push(call);
    }

    /// Peers the healthy default would serve for `request`.
    pub fn default_peers(&self, request: &PeersRequest) -> Vec<Peer> {
        let own = handle_key(&request.exclude_handle);
        self.pool
            .iter()
            .filter(|p| handle_key(&p.handle) != own)
            .take(request.count.as_usize())
            .cloned()
            .collect()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn register(&self, request: &RegisterRequest) -> Result<Registration, BackendError> {
        self.record(Call::Register(request.clone()));
        let scripted = self.registrations.lock().expect("lock").pop_front();
        scripted.unwrap_or_else(|| {
            Ok(Registration {
                session_id: "session-1".to_string(),
                handle: request.handle.clone(),
                affinity: request.affinity.as_str().to_string(),
            })
        })
    }

    async fn fetch_peers(&self, request: &PeersRequest) -> Result<Vec<Peer>, BackendError> {
        self.record(Call::FetchPeers(request.clone()));
        let scripted = self.peer_lists.lock().expect("lock").pop_front();
        scripted.unwrap_or_else(|| Ok(self.default_peers(request)))
    }

    async fn generate_message(&self, request: &MessageRequest) -> Result<String, BackendError> {
        self.record(Call::GenerateMessage(request.clone()));
        let scripted = self.messages.lock().expect("lock").pop_front();
        scripted.unwrap_or_else(|| {
            let mentions: Vec<String> = request
                .peer_handles
                .iter()
                .map(|h| format!("@{h}"))
                .collect();
            Ok(format!(
                "Just followed {} - bullish on {}! Follow back?",
                mentions.join(" "),
                request.affinity
            ))
        })
    }

    async fn post_intent(&self, request: &PostIntentRequest) -> Result<String, BackendError> {
        self.record(Call::PostIntent(request.clone()));
        let scripted = self.post_urls.lock().expect("lock").pop_front();
        scripted.unwrap_or_else(|| Ok("https://x.com/intent/tweet?text=gm".to_string()))
    }
}

/// Clipboard that remembers what was copied, or always fails.
#[derive(Default)]
pub struct RecordingClipboard {
    copied: Mutex<Vec<String>>,
    unavailable: bool,
}

impl RecordingClipboard {
    pub fn unavailable() -> Self {
        Self {
            copied: Mutex::new(Vec::new()),
            unavailable: true,
        }
    }

    pub fn copied(&self) -> Vec<String> {
        self.copied.lock().expect("lock").clone()
    }
}

impl Clipboard for RecordingClipboard {
    fn copy(&self, text: &str) -> Result<()> {
        if self.unavailable {
            return Err(anyhow!("no clipboard in this environment"));
        }
        self.copied.lock().expect("lock").push(text.to_string());
        Ok(())
    }
}
