//! In-memory exchange for dry runs and tests.
//!
//! Models just enough of the remote platform for the protocol to run end to
//! end: trade requests, one session per agent, offers, ready and accept
//! flags, atomic transfer, and the crafting recipes. No wire format.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info};

use super::traits::{AgentEvent, Platform, PlatformConnector, TradeEvent, TradeSession};
use crate::config::BotConfig;
use crate::crafting::craft_output;
use crate::domain::{AgentId, Inventory, Item, ItemId, SessionId};
use crate::error::{FleetError, Result, SessionError};

/// How long a trade request waits for the peer's answer
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Starting inventories keyed by bot name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimFixture {
    #[serde(default)]
    pub inventories: HashMap<String, Inventory>,
}

impl SimFixture {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn with_inventory(mut self, bot: &str, inventory: Inventory) -> Self {
        self.inventories.insert(bot.to_string(), inventory);
        self
    }
}

#[derive(Debug)]
struct SimAgent {
    inventory: Inventory,
    crafting: bool,
    session: Option<SessionId>,
}

#[derive(Debug)]
struct SimSession {
    parties: [AgentId; 2],
    offers: HashMap<AgentId, Vec<ItemId>>,
    ready: HashSet<AgentId>,
    accepted: HashSet<AgentId>,
}

impl SimSession {
    fn other(&self, me: AgentId) -> AgentId {
        if self.parties[0] == me {
            self.parties[1]
        } else {
            self.parties[0]
        }
    }

    fn reset_flags(&mut self) {
        self.ready.clear();
        self.accepted.clear();
    }
}

#[derive(Debug, Default)]
struct SimState {
    agents: HashMap<AgentId, SimAgent>,
    sessions: HashMap<SessionId, SimSession>,
    next_item: u64,
}

struct SimShared {
    state: Mutex<SimState>,
    senders: DashMap<AgentId, mpsc::UnboundedSender<AgentEvent>>,
    fixture: SimFixture,
}

impl SimShared {
    fn emit(&self, to: AgentId, event: AgentEvent) {
        if let Some(tx) = self.senders.get(&to) {
            if tx.send(event).is_err() {
                debug!(agent_id = %to, "Dropping event for a stopped agent");
            }
        }
    }

    fn emit_trade(&self, to: AgentId, session: SessionId, peer: AgentId, event: TradeEvent) {
        self.emit(to, AgentEvent::Trade { session, peer, event });
    }

    /// Removes the session and tells both parties
    fn end_session(&self, state: &mut SimState, id: SessionId) {
        let Some(session) = state.sessions.remove(&id) else {
            return;
        };
        for party in session.parties {
            if let Some(agent) = state.agents.get_mut(&party) {
                if agent.session == Some(id) {
                    agent.session = None;
                }
            }
        }
        let [a, b] = session.parties;
        self.emit_trade(a, id, b, TradeEvent::Closed);
        self.emit_trade(b, id, a, TradeEvent::Closed);
    }

    fn transfer(state: &mut SimState, session: &SimSession) -> usize {
        let mut moved = 0;
        for (owner, ids) in &session.offers {
            let receiver = session.other(*owner);
            let items: Vec<Item> = match state.agents.get_mut(owner) {
                Some(agent) => {
                    let (leaving, staying): (Vec<Item>, Vec<Item>) = agent
                        .inventory
                        .items
                        .drain(..)
                        .partition(|item| ids.contains(&item.id));
                    agent.inventory.items = staying;
                    leaving
                }
                None => continue,
            };
            moved += items.len();
            if let Some(agent) = state.agents.get_mut(&receiver) {
                agent.inventory.items.extend(items);
            }
        }
        moved
    }
}

/// Shared in-memory platform; hand it to the fleet as its connector
#[derive(Clone)]
pub struct SimExchange {
    shared: Arc<SimShared>,
}

impl SimExchange {
    pub fn new(fixture: SimFixture) -> Self {
        Self {
            shared: Arc::new(SimShared {
                state: Mutex::new(SimState {
                    next_item: 1 << 40,
                    ..SimState::default()
                }),
                senders: DashMap::new(),
                fixture,
            }),
        }
    }

    /// Current inventory of a connected agent
    pub async fn inventory_of(&self, agent: AgentId) -> Option<Inventory> {
        let state = self.shared.state.lock().await;
        state.agents.get(&agent).map(|a| a.inventory.clone())
    }
}

#[async_trait]
impl PlatformConnector for SimExchange {
    async fn connect(&self, bot: &BotConfig, events: mpsc::UnboundedSender<AgentEvent>) -> Result<Arc<dyn Platform>> {
        let inventory = self
            .shared
            .fixture
            .inventories
            .get(&bot.name)
            .cloned()
            .unwrap_or_default();
        info!(name = %bot.name, items = inventory.len(), "Simulated login");

        {
            let mut state = self.shared.state.lock().await;
            state.agents.insert(
                bot.agent_id,
                SimAgent {
                    inventory,
                    crafting: false,
                    session: None,
                },
            );
        }
        self.shared.senders.insert(bot.agent_id, events.clone());
        events
            .send(AgentEvent::LoginCompleted)
            .map_err(|_| FleetError::ChannelClosed(bot.name.clone()))?;

        Ok(Arc::new(SimPlatform {
            shared: self.shared.clone(),
            id: bot.agent_id,
            name: bot.name.clone(),
        }))
    }
}

pub struct SimPlatform {
    shared: Arc<SimShared>,
    id: AgentId,
    name: String,
}

#[async_trait]
impl Platform for SimPlatform {
    fn agent_id(&self) -> AgentId {
        self.id
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    async fn open_trade(&self, peer: AgentId) -> Result<bool> {
        {
            let state = self.shared.state.lock().await;
            let busy = state.agents.get(&self.id).map_or(true, |a| a.session.is_some());
            if busy || !state.agents.contains_key(&peer) {
                return Ok(false);
            }
        }

        let (reply, answer) = oneshot::channel();
        self.shared.emit(peer, AgentEvent::TradeRequest { peer: self.id, reply });
        let accepted = matches!(tokio::time::timeout(REQUEST_TIMEOUT, answer).await, Ok(Ok(true)));
        if !accepted {
            return Ok(false);
        }

        let mut state = self.shared.state.lock().await;
        let free = |id: &AgentId| state.agents.get(id).is_some_and(|a| a.session.is_none());
        if !free(&self.id) || !free(&peer) {
            return Ok(false);
        }

        let id = SessionId::new();
        state.sessions.insert(
            id,
            SimSession {
                parties: [self.id, peer],
                offers: HashMap::new(),
                ready: HashSet::new(),
                accepted: HashSet::new(),
            },
        );
        for party in [self.id, peer] {
            if let Some(agent) = state.agents.get_mut(&party) {
                agent.session = Some(id);
            }
        }
        self.shared.emit_trade(self.id, id, peer, TradeEvent::Opened);
        self.shared.emit_trade(peer, id, self.id, TradeEvent::Opened);
        Ok(true)
    }

    async fn close_trade(&self) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if let Some(id) = state.agents.get(&self.id).and_then(|a| a.session) {
            self.shared.end_session(&mut state, id);
        }
        Ok(())
    }

    async fn current_trade(&self) -> Option<Arc<dyn TradeSession>> {
        let state = self.shared.state.lock().await;
        let session = state.agents.get(&self.id)?.session?;
        Some(Arc::new(SimTrade {
            shared: self.shared.clone(),
            session,
            me: self.id,
        }))
    }

    async fn own_inventory(&self) -> Result<Inventory> {
        self.peer_inventory(self.id).await
    }

    async fn peer_inventory(&self, peer: AgentId) -> Result<Inventory> {
        let state = self.shared.state.lock().await;
        state
            .agents
            .get(&peer)
            .map(|a| a.inventory.clone())
            .ok_or_else(|| FleetError::UnknownAgent(peer.to_string()))
    }

    async fn send_chat(&self, peer: AgentId, text: &str) -> Result<()> {
        if !self.shared.senders.contains_key(&peer) {
            return Err(FleetError::UnknownAgent(peer.to_string()));
        }
        self.shared.emit(
            peer,
            AgentEvent::Chat {
                sender: self.id,
                text: text.to_string(),
            },
        );
        Ok(())
    }

    async fn craft(&self, items: &[ItemId]) -> Result<bool> {
        let mut state = self.shared.state.lock().await;
        let next = state.next_item;
        let Some(agent) = state.agents.get_mut(&self.id) else {
            return Err(FleetError::UnknownAgent(self.id.to_string()));
        };
        if !agent.crafting {
            return Err(FleetError::Platform("not in crafting mode".to_string()));
        }

        let inputs: Vec<Item> = items
            .iter()
            .filter_map(|id| agent.inventory.get(*id).cloned())
            .collect();
        if inputs.len() != items.len() {
            return Ok(false);
        }
        let Some(tier) = craft_output(&inputs) else {
            return Ok(false);
        };
        agent.inventory.items.retain(|item| !items.contains(&item.id));
        agent.inventory.items.push(Item::metal(next, tier));
        state.next_item += 1;
        Ok(true)
    }

    async fn delete_item(&self, item: ItemId) -> Result<bool> {
        let mut state = self.shared.state.lock().await;
        let Some(agent) = state.agents.get_mut(&self.id) else {
            return Ok(false);
        };
        let before = agent.inventory.items.len();
        agent.inventory.items.retain(|i| i.id != item);
        Ok(before != agent.inventory.items.len())
    }

    async fn set_crafting_mode(&self, enabled: bool) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if let Some(agent) = state.agents.get_mut(&self.id) {
            agent.crafting = enabled;
        }
        Ok(())
    }
}

/// One side's handle on a simulated session
pub struct SimTrade {
    shared: Arc<SimShared>,
    session: SessionId,
    me: AgentId,
}

impl SimTrade {
    /// Runs `f` on the live session; a finished session is `SessionError::Closed`
    async fn with_session<F>(&self, f: F) -> std::result::Result<bool, SessionError>
    where
        F: FnOnce(&SimShared, &mut SimState) -> bool,
    {
        let mut state = self.shared.state.lock().await;
        if !state.sessions.contains_key(&self.session) {
            return Err(SessionError::Closed);
        }
        Ok(f(&self.shared, &mut state))
    }
}

#[async_trait]
impl TradeSession for SimTrade {
    async fn cancel(&self) -> std::result::Result<bool, SessionError> {
        let id = self.session;
        self.with_session(|shared, state| {
            shared.end_session(state, id);
            true
        })
        .await
    }

    async fn set_ready(&self, ready: bool) -> std::result::Result<bool, SessionError> {
        let (id, me) = (self.session, self.me);
        self.with_session(|shared, state| {
            let Some(session) = state.sessions.get_mut(&id) else {
                return false;
            };
            if ready {
                session.ready.insert(me);
            } else {
                session.ready.remove(&me);
                session.accepted.clear();
            }
            let other = session.other(me);
            shared.emit_trade(other, id, me, TradeEvent::ReadyChanged(ready));
            true
        })
        .await
    }

    async fn send_text(&self, text: &str) -> std::result::Result<bool, SessionError> {
        let (id, me) = (self.session, self.me);
        let text = text.to_string();
        self.with_session(|shared, state| {
            let Some(session) = state.sessions.get(&id) else {
                return false;
            };
            shared.emit_trade(session.other(me), id, me, TradeEvent::Message(text));
            true
        })
        .await
    }

    async fn accept(&self) -> std::result::Result<bool, SessionError> {
        let (id, me) = (self.session, self.me);
        self.with_session(|shared, state| {
            let Some(session) = state.sessions.get_mut(&id) else {
                return false;
            };
            if session.ready.len() < 2 {
                return false;
            }
            session.accepted.insert(me);
            let other = session.other(me);
            let complete = session.accepted.len() == 2;

            if complete {
                if let Some(session) = state.sessions.remove(&id) {
                    let moved = SimShared::transfer(state, &session);
                    debug!(session = %id, moved, "Simulated exchange went through");
                    // Put it back so end_session clears both sides and notifies them
                    state.sessions.insert(id, session);
                }
            }
            shared.emit_trade(other, id, me, TradeEvent::AcceptedByPeer);
            if complete {
                shared.end_session(state, id);
            }
            true
        })
        .await
    }

    async fn add_item(&self, item: ItemId) -> std::result::Result<bool, SessionError> {
        let (id, me) = (self.session, self.me);
        self.with_session(|shared, state| {
            let Some(found) = state
                .agents
                .get(&me)
                .and_then(|a| a.inventory.get(item))
                .filter(|i| i.tradable)
                .cloned()
            else {
                return false;
            };
            let Some(session) = state.sessions.get_mut(&id) else {
                return false;
            };
            let offers = session.offers.entry(me).or_default();
            if offers.contains(&item) {
                return false;
            }
            offers.push(item);
            session.reset_flags();
            shared.emit_trade(session.other(me), id, me, TradeEvent::ItemAdded(found));
            true
        })
        .await
    }

    async fn remove_item(&self, item: ItemId) -> std::result::Result<bool, SessionError> {
        let (id, me) = (self.session, self.me);
        self.with_session(|shared, state| {
            let found = state.agents.get(&me).and_then(|a| a.inventory.get(item)).cloned();
            let Some(session) = state.sessions.get_mut(&id) else {
                return false;
            };
            let offers = session.offers.entry(me).or_default();
            let before = offers.len();
            offers.retain(|offered| *offered != item);
            if before == offers.len() {
                return false;
            }
            session.reset_flags();
            if let Some(found) = found {
                shared.emit_trade(session.other(me), id, me, TradeEvent::ItemRemoved(found));
            }
            true
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MetalTier, Role};

    async fn connect(
        exchange: &SimExchange,
        name: &str,
        id: u64,
    ) -> (Arc<dyn Platform>, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let platform = exchange
            .connect(&BotConfig::new(name, id, Role::Giver), tx)
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(AgentEvent::LoginCompleted)));
        (platform, rx)
    }

    /// Answers the next trade request with `accept`
    fn answer_request(mut rx: mpsc::UnboundedReceiver<AgentEvent>, accept: bool) -> tokio::task::JoinHandle<mpsc::UnboundedReceiver<AgentEvent>> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let AgentEvent::TradeRequest { reply, .. } = event {
                    let _ = reply.send(accept);
                    break;
                }
            }
            rx
        })
    }

    fn next_trade(rx: &mut mpsc::UnboundedReceiver<AgentEvent>) -> Option<TradeEvent> {
        match rx.try_recv() {
            Ok(AgentEvent::Trade { event, .. }) => Some(event),
            _ => None,
        }
    }

    #[tokio::test]
    async fn accepted_exchange_moves_offered_items() {
        let fixture = SimFixture::default()
            .with_inventory("a", Inventory::new(vec![Item::new(1, 200), Item::new(2, 201)]));
        let exchange = SimExchange::new(fixture);
        let (a, mut a_rx) = connect(&exchange, "a", 10).await;
        let (b, b_rx) = connect(&exchange, "b", 20).await;

        let answering = answer_request(b_rx, true);
        assert!(a.open_trade(AgentId(20)).await.unwrap());
        let mut b_rx = answering.await.unwrap();
        assert_eq!(next_trade(&mut a_rx), Some(TradeEvent::Opened));
        assert_eq!(next_trade(&mut b_rx), Some(TradeEvent::Opened));

        let a_trade = a.current_trade().await.unwrap();
        let b_trade = b.current_trade().await.unwrap();
        assert!(a_trade.add_item(ItemId(1)).await.unwrap());
        assert!(!a_trade.add_item(ItemId(1)).await.unwrap());
        assert!(!a_trade.accept().await.unwrap());

        assert!(a_trade.set_ready(true).await.unwrap());
        assert!(b_trade.set_ready(true).await.unwrap());
        assert!(a_trade.accept().await.unwrap());
        assert!(b_trade.accept().await.unwrap());

        let a_inv = exchange.inventory_of(AgentId(10)).await.unwrap();
        let b_inv = exchange.inventory_of(AgentId(20)).await.unwrap();
        assert_eq!(a_inv.len(), 1);
        assert!(b_inv.contains(ItemId(1)));
        assert!(a.current_trade().await.is_none());
        assert!(matches!(a_trade.cancel().await, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn adding_items_resets_readiness() {
        let fixture = SimFixture::default()
            .with_inventory("a", Inventory::new(vec![Item::new(1, 200), Item::new(2, 201)]));
        let exchange = SimExchange::new(fixture);
        let (a, _a_rx) = connect(&exchange, "a", 10).await;
        let (b, b_rx) = connect(&exchange, "b", 20).await;
        let answering = answer_request(b_rx, true);
        assert!(a.open_trade(AgentId(20)).await.unwrap());
        let _b_rx = answering.await.unwrap();

        let a_trade = a.current_trade().await.unwrap();
        let b_trade = b.current_trade().await.unwrap();
        a_trade.add_item(ItemId(1)).await.unwrap();
        a_trade.set_ready(true).await.unwrap();
        b_trade.set_ready(true).await.unwrap();
        a_trade.add_item(ItemId(2)).await.unwrap();

        assert!(!a_trade.accept().await.unwrap());
    }

    #[tokio::test]
    async fn declined_request_opens_nothing() {
        let exchange = SimExchange::new(SimFixture::default());
        let (a, _a_rx) = connect(&exchange, "a", 10).await;
        let (_b, b_rx) = connect(&exchange, "b", 20).await;
        let answering = answer_request(b_rx, false);

        assert!(!a.open_trade(AgentId(20)).await.unwrap());
        answering.await.unwrap();
        assert!(a.current_trade().await.is_none());
    }

    #[tokio::test]
    async fn crafting_needs_crafting_mode() {
        let items = (0..3).map(|i| Item::metal(i, MetalTier::Scrap)).collect();
        let exchange = SimExchange::new(SimFixture::default().with_inventory("a", Inventory::new(items)));
        let (a, _rx) = connect(&exchange, "a", 10).await;
        let ids = [ItemId(0), ItemId(1), ItemId(2)];

        assert!(a.craft(&ids).await.is_err());
        a.set_crafting_mode(true).await.unwrap();
        assert!(a.craft(&ids).await.unwrap());
        let inv = a.own_inventory().await.unwrap();
        assert_eq!(inv.metal(MetalTier::Reclaimed).len(), 1);
        assert_eq!(inv.len(), 1);
    }

    #[test]
    fn fixture_parses_inventories_by_name() {
        let fixture = SimFixture::from_json_str(
            r#"{"inventories": {"giver-1": {"items": [{"id": 5, "defindex": 5000}]}}}"#,
        )
        .unwrap();
        let inv = &fixture.inventories["giver-1"];
        assert_eq!(inv.len(), 1);
        assert_eq!(inv.slots, 300);
    }
}
