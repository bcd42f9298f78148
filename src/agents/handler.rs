//! AgentHandler: reacts to platform and session events for one agent

use tracing::{debug, error, info, warn};

use super::context::AgentContext;
use super::roles::RoleBehavior;
use crate::config::pause;
use crate::domain::{
    AgentId, CratePolicy, HandshakeSignal, Item, ItemId, SessionId, SessionMachine, SessionPhase,
};
use crate::exchange::{AgentEvent, TradeAction, TradeError, TradeEvent};
use crate::fleet::OperatorCommand;

const NOT_ADMIN_REPLY: &str = "Invalid: User is not Admin";

pub struct AgentHandler {
    ctx: AgentContext,
    behavior: RoleBehavior,
    machine: SessionMachine,
    /// Items this side placed, or saw the peer place, in the current session
    session_items: Vec<ItemId>,
    halted: bool,
}

impl AgentHandler {
    pub fn new(ctx: AgentContext) -> Self {
        let behavior = RoleBehavior::for_role(ctx.role());
        Self {
            ctx,
            behavior,
            machine: SessionMachine::new(),
            session_items: Vec::new(),
            halted: false,
        }
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub async fn handle(&mut self, event: AgentEvent) {
        let event = if self.halted {
            match event {
                event @ (AgentEvent::Operator(_) | AgentEvent::Shutdown) => event,
                AgentEvent::TradeRequest { reply, .. } | AgentEvent::FriendRequest { reply, .. } => {
                    let _ = reply.send(false);
                    return;
                }
                other => {
                    debug!(event = other.label(), "Agent halted; dropping event");
                    return;
                }
            }
        } else {
            event
        };

        match event {
            AgentEvent::LoginCompleted => self.on_login().await,
            AgentEvent::TradeRequest { peer, reply } => {
                let accepted = self.behavior.accepts_request(&self.ctx, peer).await;
                if accepted {
                    info!(peer = %peer, "Accepting trade request");
                    self.reset_session(peer);
                } else {
                    info!(peer = %peer, "Declining trade request");
                }
                let _ = reply.send(accepted);
            }
            AgentEvent::FriendRequest { peer, reply } => {
                let accepted = self.behavior.accepts_friend(&self.ctx, peer).await;
                info!(peer = %peer, accepted, "Friend request");
                let _ = reply.send(accepted);
            }
            AgentEvent::FriendRemoved { peer } => {
                info!(peer = %peer, "Removed from friends");
            }
            AgentEvent::Chat { sender, text } => match HandshakeSignal::parse(&text) {
                Some(signal) => self.on_signal(sender, signal).await,
                None => self.on_chat(sender, &text).await,
            },
            AgentEvent::RoomChat { room, sender, text } => {
                debug!(room, sender = %sender, text = %text, "Room chat");
            }
            AgentEvent::Trade { session, peer, event } => self.on_trade(session, peer, event).await,
            AgentEvent::Operator(text) => self.on_operator(&text).await,
            AgentEvent::Shutdown => {}
        }
    }

    fn reset_session(&mut self, peer: AgentId) {
        self.machine.begin(peer);
    }

    fn is_adder(&self) -> bool {
        self.machine
            .peer()
            .is_some_and(|peer| self.behavior.is_adder(&self.ctx, peer))
    }

    fn halt(&mut self, reason: &str) {
        if !self.halted {
            info!(reason, "Agent halted");
            self.halted = true;
        }
    }

    // ---- login ----

    async fn on_login(&mut self) {
        info!(name = %self.ctx.bot.name, role = %self.ctx.role(), "Logged in");
        if let RoleBehavior::IntakeCoordinator(pipeline) = &mut self.behavior {
            pipeline.start(&self.ctx, &mut self.machine).await;
        } else if matches!(self.behavior, RoleBehavior::Giver) {
            self.giver_login().await;
        } else {
            self.ctx.registry.check_in(self.ctx.id(), None).await;
        }
    }

    async fn giver_login(&mut self) {
        let ctx = &self.ctx;
        if ctx.options.auto_craft_weapons {
            if let Err(e) = ctx.engine.consolidate(ctx.platform.as_ref()).await {
                warn!(error = %e, "Consolidation on login failed");
            }
        }
        if ctx.options.manage_crates {
            if let Err(e) = ctx
                .engine
                .delete_crates(ctx.platform.as_ref(), ctx.options.delete_crates, &ctx.options.saved_crates)
                .await
            {
                warn!(error = %e, "Crate deletion failed");
            }
        }

        let inventory = match ctx.platform.own_inventory().await {
            Ok(inventory) => inventory,
            Err(e) => {
                error!(error = %e, "Could not load inventory; checking in empty");
                ctx.registry.check_in(ctx.id(), None).await;
                self.halt("inventory unavailable");
                return;
            }
        };

        let items = inventory.trade_items(self.transfer_policy());
        let count = items.len();

        if inventory.free_to_play {
            ctx.registry.check_in(ctx.id(), Some(items)).await;
            warn!("Free-to-play account cannot trade");
            self.halt("free-to-play account");
        } else if count > 0 {
            ctx.registry.check_in_ready(ctx.id(), items).await;
            info!(items = count, "Ready to give items");
        } else {
            ctx.registry.check_in(ctx.id(), Some(items)).await;
            self.halt("nothing to give");
        }
    }

    fn transfer_policy(&self) -> CratePolicy {
        if self.ctx.options.manage_crates {
            self.ctx.options.transfer_crates
        } else {
            CratePolicy::None
        }
    }

    // ---- chat ----

    async fn on_chat(&mut self, sender: AgentId, text: &str) {
        if let RoleBehavior::IntakeCoordinator(_) = self.behavior {
            if !self.ctx.is_admin(sender).await {
                self.ctx.chat(sender, NOT_ADMIN_REPLY).await;
                return;
            }
        }
        debug!(sender = %sender, text, "Chat message");
    }

    async fn on_signal(&mut self, sender: AgentId, signal: HandshakeSignal) {
        let from_peer = self.machine.is_peer(sender);
        if !self.machine.phase().is_live() {
            debug!(sender = %sender, signal = %signal, "Signal outside a session; ignoring");
            return;
        }

        match signal {
            HandshakeSignal::Failed => {
                // Checked-in agents count as admins too; only configured operators may end someone else's session
                if !from_peer && !self.ctx.configured_admins.contains(&sender) {
                    debug!(sender = %sender, "Ignoring 'failed' from someone other than the peer");
                    return;
                }
                info!(sender = %sender, "Peer gave up on the session");
                self.machine.abandoned = true;
                self.cancel_and_close("peer failed").await;
            }
            _ if !from_peer => {
                debug!(sender = %sender, signal = %signal, "Signal from someone other than the peer");
            }
            HandshakeSignal::Initialized => {
                self.machine.peer_initialized = true;
                self.try_add_items().await;
                if self.machine.pending_ready && self.machine.handshake_complete() {
                    self.machine.pending_ready = false;
                    self.on_ready().await;
                }
            }
            HandshakeSignal::Ready => {
                if !self.machine.handshake_complete() {
                    debug!("Ready arrived before the handshake; holding it");
                    self.machine.pending_ready = true;
                    return;
                }
                self.on_ready().await;
            }
        }
    }

    async fn on_ready(&mut self) {
        if self.is_adder() {
            if !self.machine.items_added || self.machine.local_ready {
                return;
            }
            if self.ctx.act(TradeAction::SetReady(true)).await {
                self.machine.local_ready = true;
                self.machine.enter_ready_sync("adder ready");
            } else {
                self.cancel_and_close("could not set ready").await;
            }
        } else {
            if self.machine.phase() == SessionPhase::ReadySync {
                return;
            }
            pause(self.ctx.pacing.message_ms).await;
            if self.ctx.signal(HandshakeSignal::Ready).await {
                self.machine.enter_ready_sync("ready echoed");
            } else {
                self.cancel_and_close("could not echo ready").await;
            }
        }
    }

    // ---- session events ----

    async fn on_trade(&mut self, session: SessionId, peer: AgentId, event: TradeEvent) {
        if event == TradeEvent::Opened {
            if self.machine.is_peer(peer) && self.machine.phase() == SessionPhase::RequestPending {
                self.machine.opened(session);
                self.on_opened(peer).await;
            } else {
                debug!(peer = %peer, session = %session, "Unexpected session opened; ignoring");
            }
            return;
        }
        if !self.machine.is_current(session) {
            debug!(session = %session, event = event.label(), "Dropping stale session event");
            return;
        }

        match event {
            TradeEvent::Opened => {}
            TradeEvent::Error(e) => self.on_error(peer, e).await,
            TradeEvent::Timeout => self.on_timeout(peer).await,
            TradeEvent::Closed => self.on_closed().await,
            TradeEvent::ItemAdded(item) => self.on_item_moved(item, 1),
            TradeEvent::ItemRemoved(item) => self.on_item_moved(item, -1),
            TradeEvent::Message(text) => match HandshakeSignal::parse(&text) {
                Some(signal) => self.on_signal(peer, signal).await,
                None => debug!(text = %text, "Session message"),
            },
            TradeEvent::ReadyChanged(ready) => self.on_peer_ready(ready).await,
            TradeEvent::AcceptedByPeer => self.on_peer_accepted().await,
        }
    }

    async fn on_opened(&mut self, peer: AgentId) {
        info!(peer = %peer, "Session opened");
        self.session_items.clear();
        pause(self.ctx.pacing.message_ms).await;
        self.ctx.chat(peer, HandshakeSignal::Initialized.as_str()).await;
        self.try_add_items().await;
    }

    fn on_item_moved(&mut self, item: Item, delta: isize) {
        if self.is_adder() {
            return;
        }
        if delta > 0 {
            self.session_items.push(item.id);
        } else {
            self.session_items.retain(|id| *id != item.id);
        }
        if let RoleBehavior::IntakeCoordinator(pipeline) = &mut self.behavior {
            pipeline.note_received(delta);
        }
    }

    async fn try_add_items(&mut self) {
        if !self.is_adder() || !self.machine.start_adding() {
            return;
        }
        let Some(peer) = self.machine.peer() else {
            return;
        };

        let candidates = match self.behavior {
            RoleBehavior::Giver => self.ctx.registry.items_of(self.ctx.id()).await.unwrap_or_default(),
            _ => match self.ctx.platform.own_inventory().await {
                Ok(inventory) => inventory.non_crates(),
                Err(e) => {
                    error!(error = %e, "Could not read inventory to add items");
                    return self.cancel_and_close("inventory unavailable").await;
                }
            },
        };
        let live = match self.ctx.platform.own_inventory().await {
            Ok(inventory) => inventory,
            Err(e) => {
                error!(error = %e, "Could not refresh inventory to add items");
                return self.cancel_and_close("inventory unavailable").await;
            }
        };

        pause(self.ctx.pacing.add_item_ms).await;
        let mut attempted = 0;
        for item in candidates {
            if !live.get(item.id).is_some_and(|current| current.tradable) {
                debug!(item = %item.id, "Item no longer available; skipping");
                continue;
            }
            attempted += 1;
            if self.ctx.act(TradeAction::AddItem(item.id)).await {
                self.session_items.push(item.id);
                pause(self.ctx.pacing.post_add_ms).await;
            } else if attempted == 1 {
                warn!(item = %item.id, "First item could not be added; aborting");
                break;
            } else {
                warn!(item = %item.id, "Item could not be added; skipping");
            }
        }

        let added = self.session_items.len();
        if added > 0 {
            info!(peer = %peer, added, "Items added");
            self.machine.items_added = true;
            pause(self.ctx.pacing.message_ms).await;
            if !self.ctx.signal(HandshakeSignal::Ready).await {
                self.cancel_and_close("could not signal ready").await;
            }
        } else {
            self.on_nothing_added(peer).await;
        }
    }

    /// Items this agent could still hand over. An unreadable inventory counts as non-empty.
    async fn remaining_items(&self) -> usize {
        match self.ctx.platform.own_inventory().await {
            Ok(inventory) => match self.behavior {
                RoleBehavior::Giver => inventory.trade_items(self.transfer_policy()).len(),
                _ => inventory.non_crates().len(),
            },
            Err(e) => {
                warn!(error = %e, "Could not re-check inventory");
                1
            }
        }
    }

    async fn on_nothing_added(&mut self, peer: AgentId) {
        let remaining = self.remaining_items().await;

        self.ctx.chat(peer, HandshakeSignal::Failed.as_str()).await;
        if remaining > 0 {
            warn!(remaining, "Nothing could be added although items remain");
            self.close_session("nothing could be added").await;
            return;
        }

        info!("Inventory empty; leaving the pipeline");
        self.ctx.registry.retire(self.ctx.id()).await;
        self.ctx.act(TradeAction::Cancel).await;
        self.close_session("inventory empty").await;
        if self.behavior.halts_when_empty() {
            self.halt("inventory empty");
        }
    }

    async fn on_peer_ready(&mut self, ready: bool) {
        self.machine.peer_ready = ready;
        if !ready {
            return;
        }

        if self.is_adder() {
            if self.machine.local_ready && !self.machine.local_accepted {
                pause(self.ctx.pacing.accept_ms).await;
                if self.ctx.act(TradeAction::Accept).await {
                    self.machine.local_accepted = true;
                } else if self.verify_exchange().await {
                    info!("Accept reported failure but the items moved");
                    self.exchange_succeeded().await;
                } else {
                    self.cancel_and_close("accept failed").await;
                }
            }
        } else if self.machine.phase() == SessionPhase::ReadySync && !self.machine.local_ready {
            if self.ctx.act(TradeAction::SetReady(true)).await {
                self.machine.local_ready = true;
            } else {
                self.cancel_and_close("could not set ready").await;
            }
        }
    }

    async fn on_peer_accepted(&mut self) {
        if !self.machine.local_accepted {
            if !(self.machine.local_ready && self.machine.peer_ready) {
                warn!("Peer accepted before both sides were ready; ignoring");
                return;
            }
            pause(self.ctx.pacing.accept_ms).await;
            if self.ctx.act(TradeAction::Accept).await {
                self.machine.local_accepted = true;
            } else if !self.verify_exchange().await {
                return self.cancel_and_close("accept failed").await;
            }
        }
        self.exchange_succeeded().await;
    }

    /// Resolves an ambiguous accept by checking where the items are now
    async fn verify_exchange(&self) -> bool {
        if self.session_items.is_empty() {
            return false;
        }
        let inventory = if self.is_adder() {
            self.ctx.platform.own_inventory().await
        } else {
            match (&self.behavior, self.machine.peer()) {
                (RoleBehavior::IntakeCoordinator(_), Some(peer)) => self.ctx.platform.peer_inventory(peer).await,
                _ => return false,
            }
        };
        match inventory {
            Ok(inventory) => !self.session_items.iter().any(|id| inventory.contains(*id)),
            Err(e) => {
                warn!(error = %e, "Could not verify the exchange");
                false
            }
        }
    }

    async fn exchange_succeeded(&mut self) {
        let peer = self.machine.peer();
        let adder = self.is_adder();
        info!(peer = ?peer, items = self.session_items.len(), "Exchange complete");

        let mut halt_reason = None;
        match (&mut self.behavior, adder) {
            (RoleBehavior::Giver, true) => {
                self.ctx.registry.retire(self.ctx.id()).await;
            }
            (RoleBehavior::CrateHandler, true) => halt_reason = Some("crates delivered"),
            (RoleBehavior::IntakeCoordinator(_), true) => {}
            (RoleBehavior::IntakeCoordinator(pipeline), false) => {
                pipeline.commit_received();
                if let Some(peer) = peer {
                    self.ctx.registry.retire(peer).await;
                }
            }
            (RoleBehavior::FinalHolder, false) => halt_reason = Some("received the pipeline"),
            _ => {}
        }
        if let Some(reason) = halt_reason {
            self.halt(reason);
        }
        self.close_session("exchange complete").await;
    }

    async fn on_error(&mut self, peer: AgentId, error: TradeError) {
        warn!(peer = %peer, error = %error, "Session error");
        match self.behavior {
            RoleBehavior::IntakeCoordinator(_) => {
                if error == TradeError::InitiatorAlreadyTrading {
                    if let Some(front) = self.ctx.registry.front().await {
                        self.ctx.chat(front, HandshakeSignal::Failed.as_str()).await;
                    }
                    pause(self.ctx.pacing.already_trading_ms).await;
                }
                if self.ctx.bindings().final_holder == Some(peer) {
                    error!(peer = %peer, "Session with the final holder failed");
                    if let RoleBehavior::IntakeCoordinator(pipeline) = &mut self.behavior {
                        pipeline.mark_final_failed();
                    }
                    self.close_session("final holder error").await;
                } else if self.ctx.platform.current_trade().await.is_some() {
                    self.cancel_and_close("session error").await;
                } else {
                    self.close_session("session error").await;
                }
            }
            RoleBehavior::Giver => {
                self.ctx.chat(peer, &format!("Trade error: {}", error)).await;
                self.recover().await;
            }
            RoleBehavior::CrateHandler | RoleBehavior::FinalHolder => {}
        }
    }

    async fn on_timeout(&mut self, peer: AgentId) {
        warn!(peer = %peer, "Session timed out");
        match self.behavior {
            RoleBehavior::IntakeCoordinator(_) => {
                match self.ctx.platform.peer_inventory(peer).await {
                    Ok(inventory) if inventory.trade_items(self.transfer_policy()).is_empty() => {
                        info!(peer = %peer, "Peer has nothing left to give");
                        self.ctx.registry.retire(peer).await;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(peer = %peer, error = %e, "Could not inspect peer inventory"),
                }
                if self.ctx.bindings().final_holder != Some(peer) {
                    self.cancel_and_close("session timed out").await;
                }
            }
            RoleBehavior::Giver => self.recover().await,
            RoleBehavior::CrateHandler | RoleBehavior::FinalHolder => {}
        }
    }

    /// Giver-side recovery after an error or timeout
    async fn recover(&mut self) {
        if self.remaining_items().await > 0 {
            self.cancel_and_close("recovering").await;
        } else {
            self.ctx.registry.retire(self.ctx.id()).await;
            self.cancel_and_close("nothing left").await;
            self.halt("nothing left to give");
        }
    }

    /// Platform ended the session. Giver types whose items are gone leave the
    /// pipeline from their own side.
    async fn on_closed(&mut self) {
        if !self.machine.phase().is_live() {
            return;
        }
        if self.behavior.is_giver_type() && self.remaining_items().await == 0 {
            info!("Session closed with nothing left to give");
            self.ctx.registry.retire(self.ctx.id()).await;
            self.close_session("closed by platform").await;
            self.halt("nothing left to give");
            return;
        }
        self.close_session("closed by platform").await;
    }

    async fn cancel_and_close(&mut self, reason: &str) {
        self.machine.closing(reason);
        self.ctx.act(TradeAction::Cancel).await;
        self.close_session(reason).await;
    }

    /// Ends the current session once; the coordinator then advances its pipeline
    async fn close_session(&mut self, reason: &str) {
        if !self.machine.close(reason) {
            return;
        }
        debug!(reason, "Session closed");
        pause(self.ctx.pacing.close_ms).await;
        if let Err(e) = self.ctx.platform.close_trade().await {
            warn!(error = %e, "Could not release session");
        }

        let Some(peer) = self.machine.peer() else {
            return;
        };
        if let RoleBehavior::IntakeCoordinator(pipeline) = &mut self.behavior {
            pipeline.advance(&self.ctx, &mut self.machine, peer).await;
        }
    }

    // ---- operator ----

    async fn on_operator(&mut self, text: &str) {
        match OperatorCommand::parse(text) {
            OperatorCommand::Craft => {
                match self.ctx.engine.consolidate(self.ctx.platform.as_ref()).await {
                    Ok(report) => info!(crafts = report.crafts(), "Operator craft finished"),
                    Err(e) => warn!(error = %e, "Operator craft failed"),
                }
            }
            OperatorCommand::Stop => self.halt("operator stop"),
            OperatorCommand::Start => {
                if self.halted {
                    info!("Operator start; replaying login");
                    self.halted = false;
                    self.on_login().await;
                } else {
                    debug!("Agent already running");
                }
            }
            OperatorCommand::Status => {
                let snapshot = self.ctx.registry.snapshot().await;
                info!(
                    role = %self.behavior.role(),
                    phase = %self.machine.phase(),
                    peer = ?self.machine.peer(),
                    halted = self.halted,
                    registered = snapshot.registered,
                    expected = snapshot.expected_total,
                    ready = snapshot.ready.len(),
                    "Agent status"
                );
            }
            OperatorCommand::Unknown(other) => warn!(command = %other, "Unknown operator command"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BotConfig, FleetConfig, Pacing};
    use crate::coordinator::{RoleBindings, RoleRegistry};
    use crate::domain::{CratePolicy, Inventory, Role};
    use crate::testkit::FakePlatform;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    const INTAKE: u64 = 1;
    const FINAL: u64 = 3;
    const GIVER: u64 = 10;
    const OPERATOR: u64 = 50;

    async fn handler(role: Role, id: u64, inventory: Inventory) -> (AgentHandler, Arc<FakePlatform>) {
        handler_with(role, id, inventory, |_| {}).await
    }

    async fn handler_with(
        role: Role,
        id: u64,
        inventory: Inventory,
        configure: impl FnOnce(&mut FleetConfig),
    ) -> (AgentHandler, Arc<FakePlatform>) {
        let bindings = RoleBindings {
            intake: Some(AgentId(INTAKE)),
            crate_handler: None,
            final_holder: Some(AgentId(FINAL)),
        };
        let registry = Arc::new(RoleRegistry::new(bindings, 3, []));
        registry.check_in(AgentId(INTAKE), None).await;

        let mut config = FleetConfig::default();
        config.pacing = Pacing::none();
        config.fleet.admins = vec![AgentId(OPERATOR)];
        configure(&mut config);

        let platform = Arc::new(FakePlatform::new(id, inventory));
        let ctx = AgentContext::new(BotConfig::new("bot", id, role), platform.clone(), registry, &config);
        (AgentHandler::new(ctx), platform)
    }

    async fn request(handler: &mut AgentHandler, peer: u64) -> bool {
        let (reply, answer) = oneshot::channel();
        handler
            .handle(AgentEvent::TradeRequest {
                peer: AgentId(peer),
                reply,
            })
            .await;
        answer.await.unwrap()
    }

    fn chat(sender: u64, text: &str) -> AgentEvent {
        AgentEvent::Chat {
            sender: AgentId(sender),
            text: text.to_string(),
        }
    }

    fn trade(session: SessionId, peer: u64, event: TradeEvent) -> AgentEvent {
        AgentEvent::Trade {
            session,
            peer: AgentId(peer),
            event,
        }
    }

    fn giver_inventory() -> Inventory {
        Inventory::new(vec![Item::new(1, 200), Item::new(2, 201)])
    }

    #[tokio::test]
    async fn giver_only_trades_with_admins() {
        let (mut giver, _) = handler(Role::Giver, GIVER, giver_inventory()).await;

        assert!(!request(&mut giver, 99).await);
        assert_eq!(giver.machine().phase(), SessionPhase::Idle);

        assert!(request(&mut giver, INTAKE).await);
        assert_eq!(giver.machine().phase(), SessionPhase::RequestPending);
        assert!(giver.machine().is_peer(AgentId(INTAKE)));
    }

    #[tokio::test]
    async fn giver_runs_full_exchange_as_adder() {
        let (mut giver, platform) = handler(Role::Giver, GIVER, giver_inventory()).await;
        giver.handle(AgentEvent::LoginCompleted).await;
        assert_eq!(giver.context().registry.front().await, Some(AgentId(GIVER)));

        assert!(request(&mut giver, INTAKE).await);
        let session = platform.start_session();
        let id = SessionId::new();
        giver.handle(trade(id, INTAKE, TradeEvent::Opened)).await;
        assert_eq!(platform.chats_to(INTAKE), vec!["initialized".to_string()]);

        giver.handle(chat(INTAKE, "initialized")).await;
        assert_eq!(
            session.actions(),
            vec![
                TradeAction::AddItem(ItemId(1)),
                TradeAction::AddItem(ItemId(2)),
                TradeAction::SendText("ready".to_string()),
            ]
        );

        giver.handle(trade(id, INTAKE, TradeEvent::Message("ready".to_string()))).await;
        assert_eq!(giver.machine().phase(), SessionPhase::ReadySync);
        giver.handle(trade(id, INTAKE, TradeEvent::ReadyChanged(true))).await;
        giver.handle(trade(id, INTAKE, TradeEvent::AcceptedByPeer)).await;

        let actions = session.actions();
        assert_eq!(actions[3], TradeAction::SetReady(true));
        assert_eq!(actions[4], TradeAction::Accept);
        assert_eq!(giver.machine().phase(), SessionPhase::Closed);
        assert_eq!(platform.closes(), 1);
        assert_eq!(giver.context().registry.front().await, None);
    }

    #[tokio::test]
    async fn events_from_other_sessions_are_dropped() {
        let (mut giver, platform) = handler(Role::Giver, GIVER, giver_inventory()).await;
        assert!(request(&mut giver, INTAKE).await);
        platform.start_session();
        let id = SessionId::new();
        giver.handle(trade(id, INTAKE, TradeEvent::Opened)).await;

        giver.handle(trade(SessionId::new(), INTAKE, TradeEvent::Closed)).await;
        assert_eq!(giver.machine().phase(), SessionPhase::WaitingHandshake);
        assert_eq!(platform.closes(), 0);

        giver.handle(trade(id, INTAKE, TradeEvent::Closed)).await;
        assert_eq!(giver.machine().phase(), SessionPhase::Closed);
    }

    #[tokio::test]
    async fn early_ready_is_held_until_handshake_completes() {
        let (mut holder, platform) = handler(Role::FinalHolder, FINAL, Inventory::default()).await;
        assert!(request(&mut holder, INTAKE).await);
        let session = platform.start_session();
        let id = SessionId::new();
        holder.handle(trade(id, INTAKE, TradeEvent::Opened)).await;

        holder.handle(trade(id, INTAKE, TradeEvent::Message("ready".to_string()))).await;
        assert!(holder.machine().pending_ready);
        assert!(session.actions().is_empty());

        holder.handle(chat(INTAKE, "initialized")).await;
        assert!(!holder.machine().pending_ready);
        assert_eq!(session.actions(), vec![TradeAction::SendText("ready".to_string())]);
        assert_eq!(holder.machine().phase(), SessionPhase::ReadySync);

        holder.handle(trade(id, INTAKE, TradeEvent::ReadyChanged(true))).await;
        holder.handle(trade(id, INTAKE, TradeEvent::AcceptedByPeer)).await;
        assert_eq!(session.actions().last(), Some(&TradeAction::Accept));
        assert!(holder.is_halted());
    }

    #[tokio::test]
    async fn failed_signal_from_peer_abandons_session() {
        let (mut giver, platform) = handler(Role::Giver, GIVER, giver_inventory()).await;
        assert!(request(&mut giver, INTAKE).await);
        let session = platform.start_session();
        giver.handle(trade(SessionId::new(), INTAKE, TradeEvent::Opened)).await;

        // Strangers cannot end someone else's session
        giver.handle(chat(99, "failed")).await;
        assert!(!giver.machine().abandoned);

        giver.handle(chat(INTAKE, " failed ")).await;
        assert!(giver.machine().abandoned);
        assert_eq!(session.actions(), vec![TradeAction::Cancel]);
        assert_eq!(giver.machine().phase(), SessionPhase::Closed);
    }

    #[tokio::test]
    async fn giver_with_vanished_items_leaves_the_pipeline() {
        let (mut giver, platform) = handler(Role::Giver, GIVER, Inventory::default()).await;
        let registry = giver.context().registry.clone();
        registry.check_in(AgentId(GIVER), Some(vec![Item::new(1, 200)])).await;
        registry.enqueue_ready(AgentId(GIVER)).await;

        assert!(request(&mut giver, INTAKE).await);
        let session = platform.start_session();
        giver.handle(trade(SessionId::new(), INTAKE, TradeEvent::Opened)).await;
        giver.handle(chat(INTAKE, "initialized")).await;

        assert!(!session.actions().iter().any(|a| matches!(a, TradeAction::AddItem(_))));
        assert_eq!(
            platform.chats_to(INTAKE),
            vec!["initialized".to_string(), "failed".to_string()]
        );
        assert_eq!(registry.front().await, None);
        assert!(giver.is_halted());
    }

    #[tokio::test]
    async fn intake_answers_strangers_with_not_admin() {
        let (mut intake, platform) = handler(Role::IntakeCoordinator, INTAKE, Inventory::default()).await;

        intake.handle(chat(77, "hello")).await;
        intake.handle(chat(OPERATOR, "hello")).await;

        assert_eq!(platform.chats_to(77), vec![NOT_ADMIN_REPLY.to_string()]);
        assert!(platform.chats_to(OPERATOR).is_empty());
    }

    #[tokio::test]
    async fn halted_agent_declines_until_operator_start() {
        let (mut giver, _) = handler(Role::Giver, GIVER, giver_inventory()).await;
        giver.handle(AgentEvent::Operator("stop".to_string())).await;
        assert!(giver.is_halted());
        assert!(!request(&mut giver, INTAKE).await);

        giver.handle(AgentEvent::Operator("start".to_string())).await;
        assert!(!giver.is_halted());
        assert_eq!(giver.context().registry.front().await, Some(AgentId(GIVER)));
        assert!(request(&mut giver, INTAKE).await);
    }

    #[tokio::test]
    async fn empty_giver_halts_on_login() {
        let (mut giver, _) = handler(Role::Giver, GIVER, Inventory::default()).await;
        giver.handle(AgentEvent::LoginCompleted).await;

        assert!(giver.is_halted());
        assert!(giver.context().registry.is_registered(AgentId(GIVER)).await);
        assert_eq!(giver.context().registry.ready_len().await, 0);
    }

    #[tokio::test]
    async fn peer_accept_before_local_ready_is_ignored() {
        let (mut giver, platform) = handler(Role::Giver, GIVER, giver_inventory()).await;
        assert!(request(&mut giver, INTAKE).await);
        let session = platform.start_session();
        let id = SessionId::new();
        giver.handle(trade(id, INTAKE, TradeEvent::Opened)).await;
        giver.handle(chat(INTAKE, "initialized")).await;

        // Items are in, but SetReady has not gone out yet
        giver.handle(trade(id, INTAKE, TradeEvent::AcceptedByPeer)).await;

        assert!(!session.actions().contains(&TradeAction::Accept));
        assert!(!session.actions().contains(&TradeAction::SetReady(true)));
        assert!(giver.machine().phase().is_live());
    }

    #[tokio::test]
    async fn peer_ready_then_accept_without_local_ready_is_ignored() {
        let (mut holder, platform) = handler(Role::FinalHolder, FINAL, Inventory::default()).await;
        assert!(request(&mut holder, INTAKE).await);
        let session = platform.start_session();
        let id = SessionId::new();
        holder.handle(trade(id, INTAKE, TradeEvent::Opened)).await;

        // No "ready" exchanged yet, so the holder is not in ready sync
        holder.handle(trade(id, INTAKE, TradeEvent::ReadyChanged(true))).await;
        holder.handle(trade(id, INTAKE, TradeEvent::AcceptedByPeer)).await;

        assert!(holder.machine().peer_ready);
        assert!(!holder.machine().local_ready);
        assert!(session.actions().is_empty());
        assert!(!holder.is_halted());
    }

    #[tokio::test]
    async fn platform_close_with_empty_inventory_retires_giver() {
        let (mut giver, platform) = handler(Role::Giver, GIVER, giver_inventory()).await;
        giver.handle(AgentEvent::LoginCompleted).await;
        let registry = giver.context().registry.clone();
        assert_eq!(registry.front().await, Some(AgentId(GIVER)));

        assert!(request(&mut giver, INTAKE).await);
        platform.start_session();
        let id = SessionId::new();
        giver.handle(trade(id, INTAKE, TradeEvent::Opened)).await;

        // The items left with the exchange but the accept notice never came
        platform.set_inventory(Inventory::default());
        giver.handle(trade(id, INTAKE, TradeEvent::Closed)).await;

        assert_eq!(giver.machine().phase(), SessionPhase::Closed);
        assert_eq!(registry.front().await, None);
        assert!(giver.is_halted());
        assert_eq!(platform.closes(), 1);
    }

    #[tokio::test]
    async fn platform_close_with_items_left_keeps_giver_queued() {
        let (mut giver, platform) = handler(Role::Giver, GIVER, giver_inventory()).await;
        giver.handle(AgentEvent::LoginCompleted).await;

        assert!(request(&mut giver, INTAKE).await);
        platform.start_session();
        let id = SessionId::new();
        giver.handle(trade(id, INTAKE, TradeEvent::Opened)).await;
        giver.handle(trade(id, INTAKE, TradeEvent::Closed)).await;

        assert_eq!(giver.machine().phase(), SessionPhase::Closed);
        assert_eq!(giver.context().registry.front().await, Some(AgentId(GIVER)));
        assert!(!giver.is_halted());
    }

    #[tokio::test]
    async fn failed_from_a_checked_in_agent_is_not_enough() {
        let (mut giver, platform) = handler(Role::Giver, GIVER, giver_inventory()).await;
        giver.context().registry.check_in(AgentId(FINAL), None).await;
        assert!(request(&mut giver, INTAKE).await);
        let session = platform.start_session();
        giver.handle(trade(SessionId::new(), INTAKE, TradeEvent::Opened)).await;

        giver.handle(chat(FINAL, "failed")).await;
        assert!(!giver.machine().abandoned);
        assert!(session.actions().is_empty());

        giver.handle(chat(OPERATOR, "failed")).await;
        assert!(giver.machine().abandoned);
        assert_eq!(session.actions(), vec![TradeAction::Cancel]);
    }

    #[tokio::test]
    async fn intake_timeout_judges_peer_with_the_giver_crate_policy() {
        // Crate transfer is configured, but crate management is off, so givers keep their crates
        let (mut intake, platform) = handler_with(Role::IntakeCoordinator, INTAKE, Inventory::default(), |config| {
            config.options.manage_crates = false;
            config.options.transfer_crates = CratePolicy::Standard;
        })
        .await;
        let registry = intake.context().registry.clone();
        registry.check_in_ready(AgentId(GIVER), vec![Item::new(5, 5022)]).await;
        registry.check_in(AgentId(FINAL), None).await;
        platform.set_peer_inventory(GIVER, Inventory::new(vec![Item::new(5, 5022)]));

        assert!(request(&mut intake, GIVER).await);
        platform.start_session();
        let id = SessionId::new();
        intake.handle(trade(id, GIVER, TradeEvent::Opened)).await;
        intake.handle(trade(id, GIVER, TradeEvent::Timeout)).await;

        assert_eq!(registry.front().await, None);
        // Pipeline moved on to the final holder
        assert_eq!(platform.opened(), vec![AgentId(FINAL)]);
    }
}
