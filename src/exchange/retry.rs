use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

use super::traits::TradeSession;
use crate::domain::ItemId;
use crate::error::SessionError;

/// Default number of calls before an action is given up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// One session operation the executor can retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeAction {
    Cancel,
    SetReady(bool),
    SendText(String),
    Accept,
    AddItem(ItemId),
    RemoveItem(ItemId),
}

impl TradeAction {
    pub fn label(&self) -> String {
        match self {
            TradeAction::Cancel => "cancel trade".to_string(),
            TradeAction::SetReady(true) => "set ready".to_string(),
            TradeAction::SetReady(false) => "unset ready".to_string(),
            TradeAction::SendText(text) => format!("send message '{}'", text),
            TradeAction::Accept => "accept trade".to_string(),
            TradeAction::AddItem(id) => format!("add item {}", id),
            TradeAction::RemoveItem(id) => format!("remove item {}", id),
        }
    }
}

/// Why a call counts as failed, or `None` when it succeeded
fn failure_reason(result: &std::result::Result<bool, SessionError>) -> Option<String> {
    match result {
        Ok(true) => None,
        Ok(false) => Some("refused by the session".to_string()),
        Err(e) => Some(e.to_string()),
    }
}

/// Bounded retry around single session operations
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    max_attempts: u32,
    cancel_pause: Duration,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Duration::from_millis(500))
    }
}

impl RetryExecutor {
    pub fn new(max_attempts: u32, cancel_pause: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            cancel_pause,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `op` until it returns `Ok(true)` or the attempts run out.
    /// Never fails; the caller decides what a `false` means.
    pub async fn attempt<F, Fut>(&self, label: &str, mut op: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<bool, SessionError>>,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let result = op().await;
            let Some(reason) = failure_reason(&result) else {
                return true;
            };

            if attempts >= self.max_attempts {
                warn!("{} attempt {} failed: {}", label, attempts, reason);
                error!("Could not {} after {} attempts", label, attempts);
                return false;
            }

            warn!("{} attempt {} failed: {}. Retrying...", label, attempts, reason);
        }
    }

    /// Runs one [`TradeAction`] against the current session. A missing
    /// session fails every attempt without a call.
    pub async fn execute(&self, session: Option<Arc<dyn TradeSession>>, action: &TradeAction) -> bool {
        let label = action.label();
        let ok = self
            .attempt(&label, || {
                let session = session.clone();
                let action = action.clone();
                async move {
                    let Some(session) = session else {
                        return Err(SessionError::NoActiveSession);
                    };
                    match action {
                        TradeAction::Cancel => session.cancel().await,
                        TradeAction::SetReady(ready) => session.set_ready(ready).await,
                        TradeAction::SendText(text) => session.send_text(&text).await,
                        TradeAction::Accept => session.accept().await,
                        TradeAction::AddItem(id) => session.add_item(id).await,
                        TradeAction::RemoveItem(id) => session.remove_item(id).await,
                    }
                }
            })
            .await;

        if !ok && *action == TradeAction::Cancel && !self.cancel_pause.is_zero() {
            sleep(self.cancel_pause).await;
        }
        ok
    }
}
