pub mod retry;
pub mod sim;
mod traits;

pub use retry::{RetryExecutor, TradeAction, DEFAULT_MAX_ATTEMPTS};
pub use sim::{SimExchange, SimFixture};
pub use traits::{
    AgentEvent, Platform, PlatformConnector, TradeError, TradeEvent, TradeSession,
};

#[cfg(test)]
pub use traits::MockTradeSession;
