use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use super::item::AgentId;

/// Identity of one exchange session between `Opened` and `Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phases of one pairwise exchange session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No session yet
    Idle,
    /// Request sent or accepted, waiting for the session to open
    RequestPending,
    /// Session open, waiting for both "initialized" signals
    WaitingHandshake,
    /// Adder is placing items
    ItemsPending,
    /// Both sides exchanging ready and accept
    ReadySync,
    /// Cancel or close requested
    Closing,
    /// Session over
    Closed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "IDLE",
            SessionPhase::RequestPending => "REQUEST_PENDING",
            SessionPhase::WaitingHandshake => "WAITING_HANDSHAKE",
            SessionPhase::ItemsPending => "ITEMS_PENDING",
            SessionPhase::ReadySync => "READY_SYNC",
            SessionPhase::Closing => "CLOSING",
            SessionPhase::Closed => "CLOSED",
        }
    }

    /// Check if this phase can move to another phase
    pub fn can_transition_to(&self, target: SessionPhase) -> bool {
        use SessionPhase::*;

        match (self, target) {
            (Idle, RequestPending) => true,

            (RequestPending, WaitingHandshake) => true, // Opened
            (RequestPending, Closed) => true,           // Request declined

            (WaitingHandshake, ItemsPending) => true,
            (WaitingHandshake, ReadySync) => true, // Non-adder got "ready"
            (WaitingHandshake, Closing) => true,
            (WaitingHandshake, Closed) => true,

            (ItemsPending, ReadySync) => true,
            (ItemsPending, Closing) => true,
            (ItemsPending, Closed) => true,

            (ReadySync, Closing) => true,
            (ReadySync, Closed) => true,

            (Closing, Closed) => true,

            (Closed, RequestPending) => true, // Next session

            _ => false,
        }
    }

    /// Get valid next phases from the current phase
    pub fn valid_transitions(&self) -> Vec<SessionPhase> {
        use SessionPhase::*;

        match self {
            Idle => vec![RequestPending],
            RequestPending => vec![WaitingHandshake, Closed],
            WaitingHandshake => vec![ItemsPending, ReadySync, Closing, Closed],
            ItemsPending => vec![ReadySync, Closing, Closed],
            ReadySync => vec![Closing, Closed],
            Closing => vec![Closed],
            Closed => vec![RequestPending],
        }
    }

    /// Is a session open or about to open?
    pub fn is_live(&self) -> bool {
        !matches!(self, SessionPhase::Idle | SessionPhase::Closed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SessionPhase {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "IDLE" => Ok(SessionPhase::Idle),
            "REQUEST_PENDING" => Ok(SessionPhase::RequestPending),
            "WAITING_HANDSHAKE" => Ok(SessionPhase::WaitingHandshake),
            "ITEMS_PENDING" => Ok(SessionPhase::ItemsPending),
            "READY_SYNC" => Ok(SessionPhase::ReadySync),
            "CLOSING" => Ok(SessionPhase::Closing),
            "CLOSED" => Ok(SessionPhase::Closed),
            _ => Err(format!("Unknown session phase: {}", s)),
        }
    }
}

/// Recorded phase change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Per-agent view of the current exchange session.
///
/// Holds the phase plus the handshake flags the handler gates on. A new
/// `begin` supersedes whatever session came before.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    phase: SessionPhase,
    peer: Option<AgentId>,
    session: Option<SessionId>,
    pub local_initialized: bool,
    pub peer_initialized: bool,
    pub items_added: bool,
    pub local_ready: bool,
    pub peer_ready: bool,
    pub local_accepted: bool,
    pub pending_ready: bool,
    pub abandoned: bool,
    add_started: bool,
    history: Vec<SessionTransition>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            peer: None,
            session: None,
            local_initialized: false,
            peer_initialized: false,
            items_added: false,
            local_ready: false,
            peer_ready: false,
            local_accepted: false,
            pending_ready: false,
            abandoned: false,
            add_started: false,
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn peer(&self) -> Option<AgentId> {
        self.peer
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session
    }

    pub fn history(&self) -> &[SessionTransition] {
        &self.history
    }

    pub fn is_peer(&self, agent: AgentId) -> bool {
        self.peer == Some(agent)
    }

    /// Is `session` the session this machine is tracking?
    pub fn is_current(&self, session: SessionId) -> bool {
        self.session == Some(session)
    }

    /// Move to `target`, recording the change. Illegal moves are logged and ignored.
    pub fn transition(&mut self, target: SessionPhase, reason: &str) -> bool {
        if self.phase == target {
            return true;
        }
        if !self.phase.can_transition_to(target) {
            debug!(
                from = %self.phase,
                to = %target,
                reason,
                "Ignoring out-of-order session transition"
            );
            return false;
        }
        self.record(target, reason);
        true
    }

    fn record(&mut self, target: SessionPhase, reason: &str) {
        self.history.push(SessionTransition {
            from: self.phase,
            to: target,
            reason: reason.to_string(),
            at: Utc::now(),
        });
        self.phase = target;
    }

    /// Start tracking a fresh session with `peer`, superseding any prior one
    pub fn begin(&mut self, peer: AgentId) {
        let reason = if self.phase.is_live() {
            "superseded"
        } else {
            "request"
        };
        let history = std::mem::take(&mut self.history);
        *self = Self {
            peer: Some(peer),
            history,
            ..Self::new()
        };
        self.record(SessionPhase::RequestPending, reason);
    }

    /// Session object exists; this side counts as initialized
    pub fn opened(&mut self, session: SessionId) {
        self.session = Some(session);
        self.local_initialized = true;
        self.transition(SessionPhase::WaitingHandshake, "opened");
    }

    pub fn handshake_complete(&self) -> bool {
        self.local_initialized && self.peer_initialized
    }

    /// Claims the item-add phase. Returns false if it already ran this
    /// session or the handshake is not complete.
    pub fn start_adding(&mut self) -> bool {
        if self.add_started || !self.handshake_complete() {
            return false;
        }
        self.add_started = true;
        self.transition(SessionPhase::ItemsPending, "adding items");
        true
    }

    pub fn add_started(&self) -> bool {
        self.add_started
    }

    pub fn enter_ready_sync(&mut self, reason: &str) {
        self.transition(SessionPhase::ReadySync, reason);
    }

    pub fn closing(&mut self, reason: &str) {
        self.transition(SessionPhase::Closing, reason);
    }

    /// Ends the session. Returns false if nothing was open (double close).
    pub fn close(&mut self, reason: &str) -> bool {
        if !self.phase.is_live() {
            return false;
        }
        self.record(SessionPhase::Closed, reason);
        true
    }
}
