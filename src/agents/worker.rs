use tokio::sync::mpsc;
use tracing::{debug, info};

use super::handler::AgentHandler;
use crate::exchange::AgentEvent;

/// Owns one agent's event stream and feeds it to the handler, one event at a time
pub struct AgentWorker {
    handler: AgentHandler,
    events: mpsc::UnboundedReceiver<AgentEvent>,
}

impl AgentWorker {
    pub fn new(handler: AgentHandler, events: mpsc::UnboundedReceiver<AgentEvent>) -> Self {
        Self { handler, events }
    }

    /// Runs until `Shutdown` or until every sender is gone
    pub async fn run(mut self) -> AgentHandler {
        info!("Agent worker started");
        while let Some(event) = self.events.recv().await {
            if matches!(event, AgentEvent::Shutdown) {
                info!("Shutdown requested");
                break;
            }
            debug!(event = event.label(), "Handling event");
            self.handler.handle(event).await;
        }
        info!("Agent worker stopped");
        self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentContext;
    use crate::config::{BotConfig, FleetConfig, Pacing};
    use crate::coordinator::{PipelineOutcome, RoleBindings, RoleRegistry};
    use crate::domain::{AgentId, Inventory, Role};
    use crate::testkit::FakePlatform;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn operator_commands_sent_during_the_intake_wait_run_after_it() {
        let bindings = RoleBindings {
            intake: Some(AgentId(1)),
            ..RoleBindings::default()
        };
        // Two expected, only the intake ever checks in: the wait runs to its timeout
        let registry = Arc::new(RoleRegistry::new(bindings, 2, []));
        let mut config = FleetConfig::default();
        config.pacing = Pacing::none();
        config.pipeline.wait_timeout_secs = 1;
        let platform = Arc::new(FakePlatform::new(1, Inventory::default()));
        let ctx = AgentContext::new(
            BotConfig::new("intake", 1, Role::IntakeCoordinator),
            platform,
            registry.clone(),
            &config,
        );

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(AgentEvent::LoginCompleted).unwrap();
        tx.send(AgentEvent::Operator("stop".to_string())).unwrap();
        drop(tx);

        let handler = tokio::time::timeout(
            Duration::from_secs(10),
            AgentWorker::new(AgentHandler::new(ctx), rx).run(),
        )
        .await
        .unwrap();

        assert!(matches!(registry.outcome(), Some(PipelineOutcome::Abandoned(_))));
        assert!(handler.is_halted());
    }
}
