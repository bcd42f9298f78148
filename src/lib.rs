pub mod agents;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod crafting;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod fleet;

#[cfg(test)]
pub(crate) mod testkit;

pub use agents::{AgentContext, AgentHandler, AgentWorker, RoleBehavior};
pub use config::{BotConfig, FleetConfig, FleetPlan, Pacing};
pub use coordinator::{PipelineOrchestrator, PipelineOutcome, RoleBindings, RoleRegistry};
pub use crafting::{ConsolidationEngine, ConsolidationReport};
pub use error::{FleetError, Result, SessionError};
pub use exchange::{
    AgentEvent, Platform, PlatformConnector, RetryExecutor, SimExchange, SimFixture, TradeAction,
    TradeEvent, TradeSession,
};
pub use fleet::{FleetManager, OperatorCommand};
