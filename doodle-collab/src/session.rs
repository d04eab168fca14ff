//! Client-side canvas session: one participant's view of one room.
//!
//! ```text
//!               ClientJoined(me), alone
//!   Detached ─────────────────────────────────────────────► Live
//!      │                                                      ▲
//!      │ ClientJoined(me), others present                     │ ReceiveCanvasState
//!      ▼                                                      │ (seed + buffered ops)
//!   AwaitingState ──────────────────────────────────────────┤
//!      │   buffers ReceiveOperation                          │ timeout / became host
//!      └──────────────────────────────────────────────────────┘ (empty log + buffered ops)
//! ```
//!
//! The session is a plain state machine. It consumes relay messages and
//! local edits and returns the client messages to send; the caller owns
//! the socket and the clock. Operations that arrive both in the host
//! snapshot and as a live broadcast are applied once, keyed by record id.
//!
//! Local undo and redo move the history cursor and tell peers with an
//! `Undo` / `Redo` notice. A peer's notice in the local log is a barrier:
//! undo and redo never step over one.

use std::time::{Duration, Instant};

use doodle_canvas::{
    ApplyOutcome, CanvasHistory, CanvasSnapshot, DrawableSet, HistoryConfig, Operation,
    OperationKind,
};

use crate::protocol::{ClientMessage, ConnectionId, Participant, ServerMessage};

/// Tuning for a [`CanvasSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a joiner waits for the host's snapshot before starting
    /// from an empty canvas.
    pub state_transfer_timeout: Duration,
    pub history: HistoryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_transfer_timeout: Duration::from_secs(5),
            history: HistoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not (yet) a member of the room.
    Detached,
    /// Joined a populated room; waiting for the host's snapshot.
    AwaitingState { since: Instant },
    Live,
}

pub struct CanvasSession {
    room_id: String,
    config: SessionConfig,
    connection: Option<ConnectionId>,
    state: SessionState,
    history: CanvasHistory,
    /// Operations received while awaiting state.
    buffered: Vec<Operation>,
    participants: Vec<Participant>,
}

impl CanvasSession {
    pub fn new(room_id: impl Into<String>, config: SessionConfig) -> Self {
        let history = CanvasHistory::with_config(config.history.clone());
        Self {
            room_id: room_id.into(),
            config,
            connection: None,
            state: SessionState::Detached,
            history,
            buffered: Vec::new(),
            participants: Vec::new(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == SessionState::Live
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn set_connection(&mut self, connection: ConnectionId) {
        self.connection = Some(connection);
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn host(&self) -> Option<&Participant> {
        self.participants.first()
    }

    pub fn is_host(&self) -> bool {
        self.connection.is_some() && self.host().map(|p| p.connection) == self.connection
    }

    pub fn history(&self) -> &CanvasHistory {
        &self.history
    }

    pub fn drawables(&self) -> &DrawableSet {
        self.history.drawables()
    }

    pub fn join_message(&self, display_name: impl Into<String>) -> ClientMessage {
        ClientMessage::JoinRoom {
            room_id: self.room_id.clone(),
            display_name: display_name.into(),
        }
    }

    pub fn leave_message(&mut self) -> ClientMessage {
        self.state = SessionState::Detached;
        self.participants.clear();
        ClientMessage::LeaveRoom {
            room_id: self.room_id.clone(),
        }
    }

    /// Feed one relay message. Returns messages to send back.
    pub fn handle(&mut self, msg: ServerMessage, now: Instant) -> Vec<ClientMessage> {
        match msg {
            ServerMessage::Welcome { connection } => {
                self.connection = Some(connection);
                Vec::new()
            }
            ServerMessage::ClientJoined {
                room_id,
                participant,
                participants,
            } if room_id == self.room_id => {
                self.participants = participants;
                if Some(participant.connection) == self.connection
                    && self.state == SessionState::Detached
                {
                    self.on_joined(now);
                }
                Vec::new()
            }
            ServerMessage::ClientLeft {
                room_id,
                participants,
                ..
            } if room_id == self.room_id => {
                self.participants = participants;
                if matches!(self.state, SessionState::AwaitingState { .. }) && self.is_host() {
                    log::info!(
                        "Host left room {} before sending state; continuing as host",
                        self.room_id
                    );
                    self.go_live_without_state();
                }
                Vec::new()
            }
            ServerMessage::ReceiveOperation { room_id, operation } if room_id == self.room_id => {
                self.on_remote_operation(operation);
                Vec::new()
            }
            ServerMessage::RequestCanvasState { room_id, requester } if room_id == self.room_id => {
                self.on_state_request(requester).into_iter().collect()
            }
            ServerMessage::ReceiveCanvasState { snapshot } => {
                self.on_state_received(snapshot);
                Vec::new()
            }
            ServerMessage::Error { code, message } => {
                log::warn!("Relay error in room {}: {code}: {message}", self.room_id);
                Vec::new()
            }
            other => {
                log::trace!("Session {} ignoring {}", self.room_id, other.name());
                Vec::new()
            }
        }
    }

    /// Advance timers. Returns true if the state-transfer wait expired.
    pub fn tick(&mut self, now: Instant) -> bool {
        let SessionState::AwaitingState { since } = self.state else {
            return false;
        };
        if now.saturating_duration_since(since) < self.config.state_transfer_timeout {
            return false;
        }
        log::warn!(
            "No canvas state for room {} after {:?}; starting from an empty canvas",
            self.room_id,
            self.config.state_transfer_timeout
        );
        self.go_live_without_state();
        true
    }

    /// Apply a local edit and return the broadcast for it.
    ///
    /// While awaiting state the edit is also kept with the buffered remote
    /// operations so it survives seeding.
    pub fn apply_local(&mut self, operation: Operation) -> Option<ClientMessage> {
        if self.state == SessionState::Detached {
            self.apply(operation);
            return None;
        }
        if matches!(self.state, SessionState::AwaitingState { .. }) {
            self.buffered.push(operation.clone());
        }
        self.apply(operation.clone());
        Some(ClientMessage::SendOperation {
            room_id: self.room_id.clone(),
            operation,
        })
    }

    /// Undo locally and return the notice for peers.
    pub fn undo(&mut self) -> Option<ClientMessage> {
        if self.history.peek_undo().is_some_and(is_peer_notice) {
            log::debug!("Undo in room {} blocked by a peer's undo/redo", self.room_id);
            return None;
        }
        let action = self.history.undo()?;
        self.broadcast(Operation::undo(action.target))
    }

    pub fn redo(&mut self) -> Option<ClientMessage> {
        if self.history.peek_redo().is_some_and(is_peer_notice) {
            log::debug!("Redo in room {} blocked by a peer's undo/redo", self.room_id);
            return None;
        }
        let action = self.history.redo()?;
        self.broadcast(Operation::redo(action.target))
    }

    fn broadcast(&self, operation: Operation) -> Option<ClientMessage> {
        if self.state == SessionState::Detached {
            return None;
        }
        Some(ClientMessage::SendOperation {
            room_id: self.room_id.clone(),
            operation,
        })
    }

    fn on_joined(&mut self, now: Instant) {
        if self.participants.len() <= 1 {
            log::info!("Joined empty room {}; live as host", self.room_id);
            self.state = SessionState::Live;
        } else {
            log::info!(
                "Joined room {} with {} participant(s); awaiting canvas state",
                self.room_id,
                self.participants.len() - 1
            );
            self.state = SessionState::AwaitingState { since: now };
        }
    }

    fn on_remote_operation(&mut self, operation: Operation) {
        match self.state {
            SessionState::Live => self.apply(operation),
            SessionState::AwaitingState { .. } => self.buffered.push(operation),
            SessionState::Detached => {
                log::debug!("Dropping operation for room {} while detached", self.room_id)
            }
        }
    }

    fn on_state_request(&self, requester: ConnectionId) -> Option<ClientMessage> {
        if !self.is_live() {
            log::warn!(
                "State requested by {} for room {} before this session is live",
                requester,
                self.room_id
            );
            return None;
        }
        log::debug!(
            "Sending canvas state ({} operations) to {}",
            self.history.len(),
            requester
        );
        Some(ClientMessage::SendCanvasStateToClient {
            target: requester,
            snapshot: self.history.snapshot(),
        })
    }

    fn on_state_received(&mut self, snapshot: CanvasSnapshot) {
        if !matches!(self.state, SessionState::AwaitingState { .. }) {
            log::debug!("Ignoring unsolicited canvas state for room {}", self.room_id);
            return;
        }
        log::info!(
            "Seeding room {} with {} operations (+{} buffered)",
            self.room_id,
            snapshot.operations.len(),
            self.buffered.len()
        );
        self.history.seed(snapshot);
        self.flush_buffer();
        self.state = SessionState::Live;
    }

    fn go_live_without_state(&mut self) {
        self.history = CanvasHistory::with_config(self.config.history.clone());
        self.flush_buffer();
        self.state = SessionState::Live;
    }

    /// Apply buffered operations the seeded log does not already hold.
    fn flush_buffer(&mut self) {
        for op in std::mem::take(&mut self.buffered) {
            if self.history.contains(op.id) {
                log::debug!("Skipping duplicate operation {}", op.id);
                continue;
            }
            self.apply(op);
        }
    }

    fn apply(&mut self, operation: Operation) {
        if let ApplyOutcome::PrunedEmptyErase { removed } = self.history.apply(operation) {
            log::trace!("Empty erase pruned {removed} operation(s) in {}", self.room_id);
        }
    }
}

/// `Undo` / `Redo` records only reach the local log from peers.
fn is_peer_notice(op: &Operation) -> bool {
    matches!(op.kind, OperationKind::Undo { .. } | OperationKind::Redo { .. })
}
