//! AgentContext: one agent's handles to the platform, the registry and its settings

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::{BotConfig, FleetConfig, Pacing, PipelineConfig, TradeOptions};
use crate::coordinator::{RoleBindings, RoleRegistry};
use crate::crafting::ConsolidationEngine;
use crate::domain::{AgentId, HandshakeSignal, Role};
use crate::exchange::{Platform, RetryExecutor, TradeAction};

pub struct AgentContext {
    pub bot: BotConfig,
    pub platform: Arc<dyn Platform>,
    pub registry: Arc<RoleRegistry>,
    pub executor: RetryExecutor,
    pub engine: ConsolidationEngine,
    pub pacing: Pacing,
    pub options: TradeOptions,
    pub pipeline: PipelineConfig,
    /// Admins from the fleet file, as opposed to agents that checked in
    pub configured_admins: HashSet<AgentId>,
}

impl AgentContext {
    pub fn new(
        bot: BotConfig,
        platform: Arc<dyn Platform>,
        registry: Arc<RoleRegistry>,
        config: &FleetConfig,
    ) -> Self {
        Self {
            bot,
            platform,
            registry,
            executor: RetryExecutor::new(
                config.pipeline.max_action_attempts,
                Duration::from_millis(config.pacing.cancel_pause_ms),
            ),
            engine: ConsolidationEngine::new(&config.pacing),
            pacing: config.pacing.clone(),
            options: config.options.clone(),
            pipeline: config.pipeline.clone(),
            configured_admins: config.fleet.admins.iter().copied().collect(),
        }
    }

    pub fn id(&self) -> AgentId {
        self.bot.agent_id
    }

    pub fn role(&self) -> Role {
        self.bot.role
    }

    pub fn bindings(&self) -> RoleBindings {
        self.registry.bindings()
    }

    /// Runs one session action through the retry executor
    pub async fn act(&self, action: TradeAction) -> bool {
        let session = self.platform.current_trade().await;
        self.executor.execute(session, &action).await
    }

    /// Sends a handshake signal inside the session window
    pub async fn signal(&self, signal: HandshakeSignal) -> bool {
        self.act(TradeAction::SendText(signal.as_str().to_string())).await
    }

    /// Direct chat; failures are logged, never propagated
    pub async fn chat(&self, peer: AgentId, text: &str) {
        if let Err(e) = self.platform.send_chat(peer, text).await {
            warn!(peer = %peer, error = %e, "Chat message failed");
        }
    }

    pub async fn is_admin(&self, peer: AgentId) -> bool {
        self.configured_admins.contains(&peer) || self.registry.is_admin(peer).await
    }
}
