use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::config::BotConfig;
use crate::domain::{AgentId, Inventory, Item, ItemId, SessionId};
use crate::error::{Result, SessionError};

/// One open exchange session as seen from one side.
///
/// Every operation answers `Ok(true)` on success. `Ok(false)` means the
/// platform refused without an error; callers treat it like a failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeSession: Send + Sync {
    async fn cancel(&self) -> std::result::Result<bool, SessionError>;

    async fn set_ready(&self, ready: bool) -> std::result::Result<bool, SessionError>;

    /// Text message inside the session window
    async fn send_text(&self, text: &str) -> std::result::Result<bool, SessionError>;

    async fn accept(&self) -> std::result::Result<bool, SessionError>;

    async fn add_item(&self, item: ItemId) -> std::result::Result<bool, SessionError>;

    async fn remove_item(&self, item: ItemId) -> std::result::Result<bool, SessionError>;
}

/// The remote platform as one agent sees it
#[async_trait]
pub trait Platform: Send + Sync {
    fn agent_id(&self) -> AgentId;

    fn display_name(&self) -> String;

    /// Sends a trade request to `peer`. True once the peer accepted and the
    /// session opened.
    async fn open_trade(&self, peer: AgentId) -> Result<bool>;

    /// Releases the current session object, if any
    async fn close_trade(&self) -> Result<()>;

    async fn current_trade(&self) -> Option<Arc<dyn TradeSession>>;

    async fn own_inventory(&self) -> Result<Inventory>;

    async fn peer_inventory(&self, peer: AgentId) -> Result<Inventory>;

    /// Direct chat message outside any session
    async fn send_chat(&self, peer: AgentId, text: &str) -> Result<()>;

    /// Crafts the given items together. False if the platform rejected the recipe.
    async fn craft(&self, items: &[ItemId]) -> Result<bool>;

    async fn delete_item(&self, item: ItemId) -> Result<bool>;

    async fn set_crafting_mode(&self, enabled: bool) -> Result<()>;
}

/// Builds a connected [`Platform`] for one configured bot. Events for the
/// bot flow into `events`.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    async fn connect(
        &self,
        bot: &BotConfig,
        events: mpsc::UnboundedSender<AgentEvent>,
    ) -> Result<Arc<dyn Platform>>;
}

/// Reason a session reported an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeError {
    /// This side is still inside another session
    InitiatorAlreadyTrading,
    /// The peer is inside another session
    TargetAlreadyTrading,
    Other(String),
}

impl fmt::Display for TradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeError::InitiatorAlreadyTrading => write!(f, "initiator already trading"),
            TradeError::TargetAlreadyTrading => write!(f, "target already trading"),
            TradeError::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Lifecycle callbacks of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeEvent {
    Opened,
    Error(TradeError),
    Timeout,
    Closed,
    ItemAdded(Item),
    ItemRemoved(Item),
    /// Text the peer sent inside the session
    Message(String),
    ReadyChanged(bool),
    AcceptedByPeer,
}

impl TradeEvent {
    pub fn label(&self) -> &'static str {
        match self {
            TradeEvent::Opened => "opened",
            TradeEvent::Error(_) => "error",
            TradeEvent::Timeout => "timeout",
            TradeEvent::Closed => "closed",
            TradeEvent::ItemAdded(_) => "item_added",
            TradeEvent::ItemRemoved(_) => "item_removed",
            TradeEvent::Message(_) => "message",
            TradeEvent::ReadyChanged(_) => "ready_changed",
            TradeEvent::AcceptedByPeer => "accepted_by_peer",
        }
    }
}

/// Everything that can wake an agent worker
#[derive(Debug)]
pub enum AgentEvent {
    LoginCompleted,
    TradeRequest {
        peer: AgentId,
        reply: oneshot::Sender<bool>,
    },
    FriendRequest {
        peer: AgentId,
        reply: oneshot::Sender<bool>,
    },
    FriendRemoved {
        peer: AgentId,
    },
    Chat {
        sender: AgentId,
        text: String,
    },
    RoomChat {
        room: u64,
        sender: AgentId,
        text: String,
    },
    Trade {
        session: SessionId,
        peer: AgentId,
        event: TradeEvent,
    },
    /// Operator console text
    Operator(String),
    Shutdown,
}

impl AgentEvent {
    pub fn label(&self) -> &'static str {
        match self {
            AgentEvent::LoginCompleted => "login_completed",
            AgentEvent::TradeRequest { .. } => "trade_request",
            AgentEvent::FriendRequest { .. } => "friend_request",
            AgentEvent::FriendRemoved { .. } => "friend_removed",
            AgentEvent::Chat { .. } => "chat",
            AgentEvent::RoomChat { .. } => "room_chat",
            AgentEvent::Trade { event, .. } => event.label(),
            AgentEvent::Operator(_) => "operator",
            AgentEvent::Shutdown => "shutdown",
        }
    }
}
