//! Recording fakes for platform-level unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::crafting::craft_output;
use crate::domain::{AgentId, Inventory, Item, ItemId};
use crate::error::{FleetError, Result, SessionError};
use crate::exchange::{Platform, TradeAction, TradeSession};

/// Session that records every call and succeeds unless told otherwise
#[derive(Debug, Default)]
pub struct RecordingSession {
    actions: Mutex<Vec<TradeAction>>,
    refuse: Mutex<HashSet<&'static str>>,
}

impl RecordingSession {
    pub fn actions(&self) -> Vec<TradeAction> {
        self.actions.lock().unwrap().clone()
    }

    /// Make every call of `kind` ("cancel", "set_ready", "send_text", "accept", "add_item") answer false
    pub fn refuse(&self, kind: &'static str) {
        self.refuse.lock().unwrap().insert(kind);
    }

    fn record(&self, kind: &'static str, action: TradeAction) -> std::result::Result<bool, SessionError> {
        self.actions.lock().unwrap().push(action);
        Ok(!self.refuse.lock().unwrap().contains(kind))
    }
}

#[async_trait]
impl TradeSession for RecordingSession {
    async fn cancel(&self) -> std::result::Result<bool, SessionError> {
        self.record("cancel", TradeAction::Cancel)
    }

    async fn set_ready(&self, ready: bool) -> std::result::Result<bool, SessionError> {
        self.record("set_ready", TradeAction::SetReady(ready))
    }

    async fn send_text(&self, text: &str) -> std::result::Result<bool, SessionError> {
        self.record("send_text", TradeAction::SendText(text.to_string()))
    }

    async fn accept(&self) -> std::result::Result<bool, SessionError> {
        self.record("accept", TradeAction::Accept)
    }

    async fn add_item(&self, item: ItemId) -> std::result::Result<bool, SessionError> {
        self.record("add_item", TradeAction::AddItem(item))
    }

    async fn remove_item(&self, item: ItemId) -> std::result::Result<bool, SessionError> {
        self.record("remove_item", TradeAction::RemoveItem(item))
    }
}

/// In-memory platform that applies crafting rules and records outbound traffic
pub struct FakePlatform {
    id: AgentId,
    inventory: Mutex<Inventory>,
    peers: Mutex<HashMap<AgentId, Inventory>>,
    chats: Mutex<Vec<(AgentId, String)>>,
    opened: Mutex<Vec<AgentId>>,
    open_results: Mutex<VecDeque<bool>>,
    session: Mutex<Option<Arc<RecordingSession>>>,
    crafting: AtomicBool,
    closes: AtomicU64,
    next_item: AtomicU64,
}

impl FakePlatform {
    pub fn new(id: u64, inventory: Inventory) -> Self {
        Self {
            id: AgentId(id),
            inventory: Mutex::new(inventory),
            peers: Mutex::new(HashMap::new()),
            chats: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
            open_results: Mutex::new(VecDeque::new()),
            session: Mutex::new(None),
            crafting: AtomicBool::new(false),
            closes: AtomicU64::new(0),
            next_item: AtomicU64::new(1_000_000),
        }
    }

    pub fn inventory(&self) -> Inventory {
        self.inventory.lock().unwrap().clone()
    }

    pub fn set_inventory(&self, inventory: Inventory) {
        *self.inventory.lock().unwrap() = inventory;
    }

    pub fn set_peer_inventory(&self, peer: u64, inventory: Inventory) {
        self.peers.lock().unwrap().insert(AgentId(peer), inventory);
    }

    pub fn crafting_mode(&self) -> bool {
        self.crafting.load(Ordering::SeqCst)
    }

    pub fn chats(&self) -> Vec<(AgentId, String)> {
        self.chats.lock().unwrap().clone()
    }

    pub fn chats_to(&self, peer: u64) -> Vec<String> {
        self.chats()
            .into_iter()
            .filter(|(to, _)| *to == AgentId(peer))
            .map(|(_, text)| text)
            .collect()
    }

    pub fn opened(&self) -> Vec<AgentId> {
        self.opened.lock().unwrap().clone()
    }

    /// Queue answers for the next `open_trade` calls; default is true
    pub fn push_open_result(&self, accepted: bool) {
        self.open_results.lock().unwrap().push_back(accepted);
    }

    /// Installs a live session object without going through `open_trade`
    pub fn start_session(&self) -> Arc<RecordingSession> {
        let session = Arc::new(RecordingSession::default());
        *self.session.lock().unwrap() = Some(session.clone());
        session
    }

    pub fn session(&self) -> Option<Arc<RecordingSession>> {
        self.session.lock().unwrap().clone()
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Platform for FakePlatform {
    fn agent_id(&self) -> AgentId {
        self.id
    }

    fn display_name(&self) -> String {
        format!("fake-{}", self.id)
    }

    async fn open_trade(&self, peer: AgentId) -> Result<bool> {
        self.opened.lock().unwrap().push(peer);
        let accepted = self.open_results.lock().unwrap().pop_front().unwrap_or(true);
        if accepted {
            self.start_session();
        }
        Ok(accepted)
    }

    async fn close_trade(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn current_trade(&self) -> Option<Arc<dyn TradeSession>> {
        self.session()
            .map(|session| session as Arc<dyn TradeSession>)
    }

    async fn own_inventory(&self) -> Result<Inventory> {
        Ok(self.inventory())
    }

    async fn peer_inventory(&self, peer: AgentId) -> Result<Inventory> {
        self.peers
            .lock()
            .unwrap()
            .get(&peer)
            .cloned()
            .ok_or_else(|| FleetError::UnknownAgent(peer.to_string()))
    }

    async fn send_chat(&self, peer: AgentId, text: &str) -> Result<()> {
        self.chats.lock().unwrap().push((peer, text.to_string()));
        Ok(())
    }

    async fn craft(&self, items: &[ItemId]) -> Result<bool> {
        let mut inventory = self.inventory.lock().unwrap();
        let inputs: Vec<Item> = items.iter().filter_map(|id| inventory.get(*id).cloned()).collect();
        if inputs.len() != items.len() {
            return Ok(false);
        }
        let Some(tier) = craft_output(&inputs) else {
            return Ok(false);
        };
        inventory.items.retain(|item| !items.contains(&item.id));
        let id = self.next_item.fetch_add(1, Ordering::SeqCst);
        inventory.items.push(Item::metal(id, tier));
        Ok(true)
    }

    async fn delete_item(&self, item: ItemId) -> Result<bool> {
        let mut inventory = self.inventory.lock().unwrap();
        let before = inventory.items.len();
        inventory.items.retain(|i| i.id != item);
        Ok(before != inventory.items.len())
    }

    async fn set_crafting_mode(&self, enabled: bool) -> Result<()> {
        self.crafting.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}
