//! Session state machine: Registering → Drawing → Reviewing → Outreach.
//!
//! [`SessionFlow`] is the single owner of the live [`SessionRecord`] and
//! [`FollowTracker`]. Every trigger that needs the backend is split in two
//! halves so an event-loop caller can keep handling input while a request is
//! in flight:
//!
//! - `start_*` checks guards, marks the operation busy and returns a
//!   [`Ticket`] tagged with the current [`Epoch`].
//! - `apply_*` consumes the ticket together with the backend result. If the
//!   epoch moved on in the meantime (re-spin, refresh, reset, restart) the
//!   result is dropped and [`Completion::Discarded`] is returned.
//!
//! The async methods (`register`, `confirm_draw`, ...) chain both halves
//! around a [`Backend`] for callers that simply await each step.

use std::collections::BTreeSet;

use tracing::{debug, info, instrument, warn};

use crate::core::handle::{ProjectCatalog, normalize_handle};
use crate::core::invariants::validate_peer_response;
use crate::core::selector::{RandomSelector, SpinPlan, SpinSettings};
use crate::core::tracker::FollowTracker;
use crate::core::types::{Epoch, FlowState, OutreachMessage, Operation, Peer, SessionRecord};
use crate::error::FlowError;
use crate::io::backend::{
    Backend, BackendError, MessageRequest, PeersRequest, PostIntentRequest, Registration,
    RegisterRequest,
};
use crate::io::clipboard::Clipboard;

/// Handle for one in-flight backend operation.
#[derive(Debug)]
#[must_use = "a ticket must be applied or the operation stays busy"]
pub struct Ticket<R> {
    operation: Operation,
    epoch: Epoch,
    request: R,
}

impl<R> Ticket<R> {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Epoch the request was issued under.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn request(&self) -> &R {
        &self.request
    }
}

/// Outcome of applying a backend result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T> {
    Applied(T),
    /// The result belonged to an earlier epoch and was dropped.
    Discarded,
}

impl<T> Completion<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Discarded => None,
        }
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, Self::Discarded)
    }
}

/// One visitor's pass through the funnel.
#[derive(Debug)]
pub struct SessionFlow {
    catalog: ProjectCatalog,
    selector: RandomSelector,
    spin_settings: SpinSettings,
    state: FlowState,
    record: Option<SessionRecord>,
    tracker: FollowTracker,
    message: Option<OutreachMessage>,
    epoch: Epoch,
    busy: BTreeSet<Operation>,
    pending_error: Option<FlowError>,
}

impl SessionFlow {
    pub fn new(catalog: ProjectCatalog, selector: RandomSelector) -> Self {
        Self {
            catalog,
            selector,
            spin_settings: SpinSettings::default(),
            state: FlowState::Registering,
            record: None,
            tracker: FollowTracker::default(),
            message: None,
            epoch: Epoch::default(),
            busy: BTreeSet::new(),
            pending_error: None,
        }
    }

    pub fn with_spin_settings(mut self, settings: SpinSettings) -> Self {
        self.spin_settings = settings;
        self
    }

    // ------------------------------------------------------------------
    // Read-only accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Present once registration succeeded.
    pub fn record(&self) -> Option<&SessionRecord> {
        self.record.as_ref()
    }

    pub fn tracker(&self) -> &FollowTracker {
        &self.tracker
    }

    pub fn peers(&self) -> &[Peer] {
        self.tracker.peers()
    }

    pub fn message(&self) -> Option<&OutreachMessage> {
        self.message.as_ref()
    }

    pub fn catalog(&self) -> &ProjectCatalog {
        &self.catalog
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_busy(&self, operation: Operation) -> bool {
        self.busy.contains(&operation)
    }

    /// Operations currently in flight for this epoch.
    pub fn busy(&self) -> impl Iterator<Item = Operation> + '_ {
        self.busy.iter().copied()
    }

    /// Most recent failure, cleared by the next successful transition.
    pub fn pending_error(&self) -> Option<&FlowError> {
        self.pending_error.as_ref()
    }

    pub fn dismiss_error(&mut self) {
        self.pending_error = None;
    }

    // ------------------------------------------------------------------
    // Registering
    // ------------------------------------------------------------------

    pub fn start_register(
        &mut self,
        handle: &str,
        affinity: &str,
    ) -> Result<Ticket<RegisterRequest>, FlowError> {
        self.guard_state(&[FlowState::Registering], "register")?;
        self.guard_idle(Operation::Register)?;

        let handle = normalize_handle(handle);
        if handle.is_empty() {
            return Err(self.fail(FlowError::invalid_input("handle must not be empty")));
        }
        let Some(affinity) = self.catalog.resolve(affinity) else {
            return Err(self.fail(FlowError::invalid_input(format!(
                "unsupported project '{}'",
                affinity.trim()
            ))));
        };

        Ok(self.issue(Operation::Register, RegisterRequest { handle, affinity }))
    }

    pub fn apply_register(
        &mut self,
        ticket: Ticket<RegisterRequest>,
        result: Result<Registration, BackendError>,
    ) -> Result<Completion<()>, FlowError> {
        let Some(request) = self.settle(ticket) else {
            return Ok(Completion::Discarded);
        };
        let registration = result.map_err(|err| self.fail(classify(Operation::Register, err)))?;

        let session_id = registration.session_id.trim();
        if session_id.is_empty() {
            return Err(self.fail(FlowError::transport("registration returned an empty session id")));
        }
        if !registration.handle.eq_ignore_ascii_case(&request.handle) {
            debug!(sent = %request.handle, echoed = %registration.handle, "backend echoed a different handle");
        }

        info!(handle = %request.handle, affinity = %request.affinity, session_id, "registered");
        self.record = Some(SessionRecord {
            handle: request.handle,
            affinity: request.affinity,
            session_id: session_id.to_string(),
            drawn_count: None,
        });
        self.enter(FlowState::Drawing);
        Ok(Completion::Applied(()))
    }

    #[instrument(skip_all)]
    pub async fn register<B: Backend + ?Sized>(
        &mut self,
        backend: &B,
        handle: &str,
        affinity: &str,
    ) -> Result<Completion<()>, FlowError> {
        let ticket = self.start_register(handle, affinity)?;
        let result = backend.register(ticket.request()).await;
        self.apply_register(ticket, result)
    }

    // ------------------------------------------------------------------
    // Drawing
    // ------------------------------------------------------------------

    /// Draw a peer count and commit it.
    ///
    /// Re-spinning replaces an earlier commit and starts a new epoch, so any
    /// peer list still in flight for the old count is dropped on arrival.
    pub fn spin(&mut self) -> Result<SpinPlan, FlowError> {
        self.guard_state(&[FlowState::Drawing], "spin")?;
        let plan = self.selector.spin(&self.spin_settings);
        let record = self.record_mut("spin")?;
        if let Some(previous) = record.drawn_count {
            debug!(previous = previous.get(), next = plan.result().get(), "re-spin replaces committed draw");
        }
        record.drawn_count = Some(plan.result());
        self.advance_epoch();
        self.pending_error = None;
        info!(drawn = plan.result().get(), epoch = %self.epoch, "draw committed");
        Ok(plan)
    }

    pub fn start_confirm_draw(&mut self) -> Result<Ticket<PeersRequest>, FlowError> {
        self.guard_state(&[FlowState::Drawing], "confirm the draw")?;
        self.guard_idle(Operation::FetchPeers)?;
        let request = self.peers_request("confirm the draw")?;
        Ok(self.issue(Operation::FetchPeers, request))
    }

    /// Apply a peer list fetched by either `confirm_draw` or `refresh_peers`.
    pub fn apply_peers(
        &mut self,
        ticket: Ticket<PeersRequest>,
        result: Result<Vec<Peer>, BackendError>,
    ) -> Result<Completion<()>, FlowError> {
        let Some(request) = self.settle(ticket) else {
            return Ok(Completion::Discarded);
        };
        let peers = result.map_err(|err| self.fail(classify(Operation::FetchPeers, err)))?;

        if peers.is_empty() {
            return Err(self.fail(FlowError::NoPeersFound(format!(
                "no other users found for \"{}\"",
                request.affinity
            ))));
        }
        let errors = validate_peer_response(&peers, request.count, &request.exclude_handle);
        if !errors.is_empty() {
            warn!(errors = ?errors, "rejecting malformed peer list");
            return Err(self.fail(FlowError::transport(format!(
                "malformed peer list: {}",
                errors.join("; ")
            ))));
        }

        let count = peers.len();
        if let Err(err) = self.tracker.initialize(peers) {
            return Err(self.fail(FlowError::transport(format!("malformed peer list: {err}"))));
        }
        self.message = None;
        self.advance_epoch();
        self.enter(FlowState::Reviewing);
        info!(peers = count, epoch = %self.epoch, "peers ready for review");
        Ok(Completion::Applied(()))
    }

    #[instrument(skip_all)]
    pub async fn confirm_draw<B: Backend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> Result<Completion<()>, FlowError> {
        let ticket = self.start_confirm_draw()?;
        let result = backend.fetch_peers(ticket.request()).await;
        self.apply_peers(ticket, result)
    }

    // ------------------------------------------------------------------
    // Reviewing
    // ------------------------------------------------------------------

    /// Mark a presented peer as followed. Returns `true` if this was new.
    pub fn follow(&mut self, peer_handle: &str) -> Result<bool, FlowError> {
        self.guard_state(&[FlowState::Reviewing], "follow")?;
        let changed = self
            .tracker
            .mark_followed(peer_handle)
            .map_err(|err| self.fail(err))?;
        self.pending_error = None;
        debug!(
            peer = %normalize_handle(peer_handle),
            changed,
            followed = self.tracker.followed_count(),
            total = self.tracker.peers().len(),
            "follow recorded"
        );
        Ok(changed)
    }

    /// Re-fetch a peer list of the same size, discarding follow progress.
    pub fn start_refresh_peers(&mut self) -> Result<Ticket<PeersRequest>, FlowError> {
        self.guard_state(&[FlowState::Reviewing, FlowState::Outreach], "refresh peers")?;
        self.guard_idle(Operation::FetchPeers)?;
        let request = self.peers_request("refresh peers")?;
        Ok(self.issue(Operation::FetchPeers, request))
    }

    #[instrument(skip_all)]
    pub async fn refresh_peers<B: Backend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> Result<Completion<()>, FlowError> {
        let ticket = self.start_refresh_peers()?;
        let result = backend.fetch_peers(ticket.request()).await;
        self.apply_peers(ticket, result)
    }

    /// Clear follow progress and any generated message, keeping the peers.
    pub fn reset_review(&mut self) -> Result<(), FlowError> {
        if !self.tracker.has_peers() {
            return Err(self.fail(FlowError::invalid_input(
                "cannot reset the review before peers are loaded",
            )));
        }
        self.tracker.reset();
        self.message = None;
        self.advance_epoch();
        self.enter(FlowState::Reviewing);
        info!(epoch = %self.epoch, "review reset");
        Ok(())
    }

    pub fn start_generate_outreach(&mut self) -> Result<Ticket<MessageRequest>, FlowError> {
        self.guard_state(&[FlowState::Reviewing], "generate a message")?;
        self.guard_idle(Operation::GenerateMessage)?;
        if !self.tracker.is_all_followed() {
            return Err(self.fail(FlowError::invalid_input(format!(
                "follow every peer first ({}/{} followed)",
                self.tracker.followed_count(),
                self.tracker.peers().len()
            ))));
        }
        let affinity = self.record_mut("generate a message")?.affinity.clone();
        let request = MessageRequest {
            peer_handles: self.tracker.followed_handles(),
            affinity,
        };
        Ok(self.issue(Operation::GenerateMessage, request))
    }

    pub fn apply_generate_outreach(
        &mut self,
        ticket: Ticket<MessageRequest>,
        result: Result<String, BackendError>,
    ) -> Result<Completion<OutreachMessage>, FlowError> {
        if self.settle(ticket).is_none() {
            return Ok(Completion::Discarded);
        }
        let text = result.map_err(|err| self.fail(classify(Operation::GenerateMessage, err)))?;
        if text.trim().is_empty() {
            return Err(self.fail(FlowError::transport("backend returned an empty message")));
        }

        let message = OutreachMessage::new(text);
        if message.exceeds_soft_limit() {
            warn!(chars = message.char_count(), "outreach message exceeds soft length limit");
        }
        self.message = Some(message.clone());
        self.enter(FlowState::Outreach);
        info!(chars = message.char_count(), "outreach message ready");
        Ok(Completion::Applied(message))
    }

    #[instrument(skip_all)]
    pub async fn generate_outreach<B: Backend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> Result<Completion<OutreachMessage>, FlowError> {
        let ticket = self.start_generate_outreach()?;
        let result = backend.generate_message(ticket.request()).await;
        self.apply_generate_outreach(ticket, result)
    }

    // ------------------------------------------------------------------
    // Outreach
    // ------------------------------------------------------------------

    /// Copy the message locally. Failure is a warning and changes nothing.
    pub fn copy_to_clipboard<C: Clipboard + ?Sized>(&mut self, clipboard: &C) -> Result<(), FlowError> {
        let text = self.require_message("copy")?.text().to_string();
        match clipboard.copy(&text) {
            Ok(()) => {
                debug!(chars = text.chars().count(), "message copied");
                Ok(())
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "clipboard copy failed");
                Err(self.fail(FlowError::ClipboardUnavailable(format!("{err:#}"))))
            }
        }
    }

    pub fn start_post_intent(&mut self) -> Result<Ticket<PostIntentRequest>, FlowError> {
        let text = self.require_message("request a post link")?.text().to_string();
        self.guard_idle(Operation::PostIntent)?;
        Ok(self.issue(Operation::PostIntent, PostIntentRequest { text }))
    }

    /// Returns the external URL; the caller decides whether to open it.
    pub fn apply_post_intent(
        &mut self,
        ticket: Ticket<PostIntentRequest>,
        result: Result<String, BackendError>,
    ) -> Result<Completion<String>, FlowError> {
        if self.settle(ticket).is_none() {
            return Ok(Completion::Discarded);
        }
        let url = result.map_err(|err| self.fail(classify(Operation::PostIntent, err)))?;
        let url = url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(self.fail(FlowError::transport(format!("post url is not http(s): '{url}'"))));
        }
        self.pending_error = None;
        info!("post intent ready");
        Ok(Completion::Applied(url.to_string()))
    }

    #[instrument(skip_all)]
    pub async fn request_post_intent<B: Backend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> Result<Completion<String>, FlowError> {
        let ticket = self.start_post_intent()?;
        let result = backend.post_intent(ticket.request()).await;
        self.apply_post_intent(ticket, result)
    }

    /// Go back to drawing with the same handle and affinity.
    pub fn restart(&mut self) -> Result<(), FlowError> {
        self.guard_state(&[FlowState::Reviewing, FlowState::Outreach], "restart")?;
        self.record_mut("restart")?.drawn_count = None;
        self.tracker = FollowTracker::default();
        self.message = None;
        self.advance_epoch();
        self.enter(FlowState::Drawing);
        info!(epoch = %self.epoch, "session restarted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn guard_state(&mut self, allowed: &[FlowState], action: &str) -> Result<(), FlowError> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(self.fail(FlowError::invalid_input(format!(
            "cannot {action} while {}",
            self.state
        ))))
    }

    fn guard_idle(&mut self, operation: Operation) -> Result<(), FlowError> {
        if self.busy.contains(&operation) {
            return Err(self.fail(FlowError::invalid_input(format!(
                "{operation} is already in flight"
            ))));
        }
        Ok(())
    }

    fn require_message(&mut self, action: &str) -> Result<&OutreachMessage, FlowError> {
        if self.message.is_none() {
            return Err(self.fail(FlowError::invalid_input(format!(
                "cannot {action} before a message is generated"
            ))));
        }
        self.message
            .as_ref()
            .ok_or_else(|| FlowError::invalid_input("message disappeared"))
    }

    fn record_mut(&mut self, action: &str) -> Result<&mut SessionRecord, FlowError> {
        if self.record.is_none() {
            return Err(self.fail(FlowError::invalid_input(format!(
                "cannot {action} before registering"
            ))));
        }
        self.record
            .as_mut()
            .ok_or_else(|| FlowError::invalid_input("record disappeared"))
    }

    fn peers_request(&mut self, action: &str) -> Result<PeersRequest, FlowError> {
        let record = self.record_mut(action)?;
        let Some(count) = record.drawn_count else {
            let err = FlowError::invalid_input(format!("spin before trying to {action}"));
            return Err(self.fail(err));
        };
        Ok(PeersRequest {
            affinity: record.affinity.clone(),
            count,
            exclude_handle: record.handle.clone(),
        })
    }

    fn issue<R>(&mut self, operation: Operation, request: R) -> Ticket<R> {
        self.busy.insert(operation);
        debug!(%operation, epoch = %self.epoch, "operation started");
        Ticket {
            operation,
            epoch: self.epoch,
            request,
        }
    }

    /// Release a ticket. Returns its request if the ticket is still current.
    fn settle<R>(&mut self, ticket: Ticket<R>) -> Option<R> {
        if ticket.epoch != self.epoch {
            debug!(
                operation = %ticket.operation,
                issued = %ticket.epoch,
                live = %self.epoch,
                "discarding stale response"
            );
            return None;
        }
        self.busy.remove(&ticket.operation);
        Some(ticket.request)
    }

    /// Start a new generation; in-flight results from the old one are stale.
    fn advance_epoch(&mut self) {
        self.epoch = self.epoch.next();
        self.busy.clear();
    }

    fn enter(&mut self, next: FlowState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "state transition");
        }
        self.state = next;
        self.pending_error = None;
    }

    fn fail(&mut self, err: FlowError) -> FlowError {
        debug!(kind = err.kind(), err = %err, state = %self.state, "transition refused");
        self.pending_error = Some(err.clone());
        err
    }
}

/// Map a backend failure onto the error taxonomy.
///
/// Connectivity problems and 5xx responses are retryable transport errors;
/// 4xx answers are domain failures reported verbatim for the operation.
fn classify(operation: Operation, err: BackendError) -> FlowError {
    if err.is_server_side() {
        return FlowError::Transport(err.to_string());
    }
    match err {
        BackendError::Transport(message) => FlowError::Transport(message),
        BackendError::Rejected { message, .. } => match operation {
            Operation::Register => FlowError::Registration(message),
            Operation::FetchPeers => FlowError::NoPeersFound(message),
            Operation::GenerateMessage | Operation::PostIntent => FlowError::Generation(message),
        },
    }
}
