//! FleetManager: builds the registry, starts every agent in role order and
//! tears the fleet down again

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

use crate::agents::{AgentContext, AgentHandler, AgentWorker};
use crate::config::{pause, BotConfig, FleetConfig, FleetPlan};
use crate::coordinator::{PipelineOutcome, RoleRegistry};
use crate::error::{FleetError, Result};
use crate::exchange::{AgentEvent, PlatformConnector};

struct RunningAgent {
    bot: BotConfig,
    events: mpsc::UnboundedSender<AgentEvent>,
    task: JoinHandle<AgentHandler>,
}

pub struct FleetManager {
    config: FleetConfig,
    plan: FleetPlan,
    registry: Arc<RoleRegistry>,
    connector: Arc<dyn PlatformConnector>,
    agents: Vec<RunningAgent>,
}

impl FleetManager {
    pub fn new(config: FleetConfig, connector: Arc<dyn PlatformConnector>) -> Result<Self> {
        let plan = config.resolve()?;
        let registry = Arc::new(RoleRegistry::new(
            plan.bindings,
            plan.expected_total,
            config.fleet.admins.iter().copied(),
        ));
        Ok(Self {
            config,
            plan,
            registry,
            connector,
            agents: Vec::new(),
        })
    }

    pub fn registry(&self) -> Arc<RoleRegistry> {
        self.registry.clone()
    }

    pub fn plan(&self) -> &FleetPlan {
        &self.plan
    }

    /// Names of the started agents, in start order
    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.bot.name.clone()).collect()
    }

    /// Connects and spawns every launched bot, staggered
    pub async fn start(&mut self) -> Result<()> {
        let launch = self.plan.launch.clone();
        for (index, bot) in launch.into_iter().enumerate() {
            if index > 0 {
                pause(self.config.fleet.start_stagger_ms).await;
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let platform = self.connector.connect(&bot, tx.clone()).await?;
            let ctx = AgentContext::new(bot.clone(), platform, self.registry.clone(), &self.config);
            let worker = AgentWorker::new(AgentHandler::new(ctx), rx);

            let span = info_span!("agent", name = %bot.name, role = %bot.role);
            let task = tokio::spawn(worker.run().instrument(span));
            info!(name = %bot.name, role = %bot.role, agent_id = %bot.agent_id, "Agent started");

            self.agents.push(RunningAgent {
                bot,
                events: tx,
                task,
            });
        }
        Ok(())
    }

    /// Forwards operator text to one agent, addressed by start index or name
    pub fn send_command(&self, target: &str, text: &str) -> Result<()> {
        let agent = match target.parse::<usize>() {
            Ok(index) => self.agents.get(index),
            Err(_) => self.agents.iter().find(|a| a.bot.name == target),
        }
        .ok_or_else(|| FleetError::UnknownAgent(target.to_string()))?;

        agent
            .events
            .send(AgentEvent::Operator(text.to_string()))
            .map_err(|_| FleetError::ChannelClosed(agent.bot.name.clone()))
    }

    /// Waits for the intake coordinator to publish how the pipeline ended
    pub async fn wait_for_pipeline(&self, timeout: Duration) -> Option<PipelineOutcome> {
        self.registry.wait_finished(timeout).await
    }

    /// Stops every worker and waits for them
    pub async fn shutdown(self) -> Result<()> {
        for agent in &self.agents {
            if agent.events.send(AgentEvent::Shutdown).is_err() {
                warn!(name = %agent.bot.name, "Worker already gone");
            }
        }

        let names: Vec<String> = self.agents.iter().map(|a| a.bot.name.clone()).collect();
        let results = join_all(self.agents.into_iter().map(|a| a.task)).await;
        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                warn!(name = %name, error = %e, "Worker ended abnormally");
            }
        }
        info!("Fleet stopped");
        Ok(())
    }
}
