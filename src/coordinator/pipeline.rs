//! Pipeline Orchestrator: the intake coordinator's scheduling loop

use std::collections::HashMap;
use tracing::{error, info, warn};

use super::registry::{PipelineOutcome, WaitOutcome};
use crate::agents::AgentContext;
use crate::config::pause;
use crate::domain::{AgentId, SessionMachine};

/// Where the pipeline goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Session with this peer just ended (or never opened)
    Closed(AgentId),
    /// Pick the next peer from the queue or the singleton roles
    Route,
    Open(AgentId),
    /// Hand everything to the final holder
    Deliver,
}

#[derive(Debug, Default)]
pub struct PipelineOrchestrator {
    crate_visited: bool,
    final_requested: bool,
    final_failed: bool,
    attempts: HashMap<AgentId, u32>,
    items_moved: usize,
    session_received: isize,
}

impl PipelineOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items_moved(&self) -> usize {
        self.items_moved
    }

    pub fn attempts_for(&self, peer: AgentId) -> u32 {
        self.attempts.get(&peer).copied().unwrap_or(0)
    }

    /// Item appeared (+1) or vanished (-1) on the peer's side of the current session
    pub fn note_received(&mut self, delta: isize) {
        self.session_received += delta;
    }

    /// Current receiving session went through
    pub fn commit_received(&mut self) {
        self.items_moved += self.session_received.max(0) as usize;
        self.session_received = 0;
    }

    /// The final holder session failed; closing it abandons the pipeline
    pub fn mark_final_failed(&mut self) {
        self.final_failed = true;
    }

    /// Check in, then wait for the first ready agent.
    ///
    /// The wait runs on the intake's own worker, so events sent to the intake
    /// meanwhile (operator commands included) queue and are handled in order
    /// once the wait ends. It ends on the first ready agent, on full check-in,
    /// or after `pipeline.wait_timeout_secs`.
    pub async fn start(&mut self, ctx: &AgentContext, machine: &mut SessionMachine) {
        ctx.registry.check_in(ctx.id(), None).await;
        ctx.registry.add_admin(ctx.id()).await;

        match ctx.registry.wait_for_work(ctx.pipeline.wait_timeout()).await {
            WaitOutcome::Ready(front) => self.run(ctx, machine, Step::Open(front)).await,
            WaitOutcome::AllCheckedIn => {
                info!("No agents available for trade");
                ctx.registry.finish(PipelineOutcome::NoAgents);
            }
            WaitOutcome::TimedOut => {
                warn!(
                    timeout_secs = ctx.pipeline.wait_timeout_secs,
                    "Timed out waiting for agents to check in"
                );
                ctx.registry
                    .finish(PipelineOutcome::Abandoned("timed out waiting for agents".to_string()));
            }
        }
    }

    /// Called after every closed session
    pub async fn advance(&mut self, ctx: &AgentContext, machine: &mut SessionMachine, closed: AgentId) {
        self.run(ctx, machine, Step::Closed(closed)).await;
    }

    async fn run(&mut self, ctx: &AgentContext, machine: &mut SessionMachine, first: Step) {
        let bindings = ctx.bindings();
        let mut step = first;

        loop {
            step = match step {
                Step::Closed(peer) if bindings.final_holder == Some(peer) => {
                    let outcome = if self.final_failed {
                        PipelineOutcome::Abandoned("final holder session failed".to_string())
                    } else {
                        PipelineOutcome::Completed {
                            items_moved: self.items_moved,
                        }
                    };
                    ctx.registry.finish(outcome);
                    return;
                }
                Step::Closed(peer) if bindings.crate_handler == Some(peer) => Step::Deliver,
                Step::Closed(peer) => {
                    if machine.abandoned && machine.is_peer(peer) {
                        info!(peer = %peer, "Peer abandoned the session; retiring it");
                        ctx.registry.retire(peer).await;
                    }
                    Step::Route
                }

                Step::Route => match ctx.registry.front().await {
                    Some(front) => Step::Open(front),
                    None if !ctx.registry.all_checked_in().await => {
                        info!("Waiting for more agents; queued events resume afterwards");
                        match ctx.registry.wait_for_work(ctx.pipeline.wait_timeout()).await {
                            WaitOutcome::Ready(front) => Step::Open(front),
                            WaitOutcome::AllCheckedIn => Step::Route,
                            WaitOutcome::TimedOut => {
                                warn!("Timed out waiting for more agents");
                                ctx.registry.finish(PipelineOutcome::Abandoned(
                                    "timed out waiting for agents".to_string(),
                                ));
                                return;
                            }
                        }
                    }
                    None => match bindings.crate_handler {
                        Some(crate_handler) if !self.crate_visited => {
                            self.crate_visited = true;
                            info!(peer = %crate_handler, "Ready queue drained; visiting crate handler");
                            Step::Open(crate_handler)
                        }
                        Some(_) => Step::Deliver,
                        None => {
                            info!("No crate handler configured");
                            Step::Deliver
                        }
                    },
                },

                Step::Deliver => {
                    if self.final_requested {
                        ctx.registry.finish(PipelineOutcome::Abandoned(
                            "final holder already visited".to_string(),
                        ));
                        return;
                    }
                    let Some(final_holder) = bindings.final_holder else {
                        info!("No final holder configured; items stay with the intake coordinator");
                        ctx.registry.finish(PipelineOutcome::Completed {
                            items_moved: self.items_moved,
                        });
                        return;
                    };
                    self.final_requested = true;
                    if ctx.options.auto_craft_weapons {
                        if let Err(e) = ctx.engine.consolidate(ctx.platform.as_ref()).await {
                            warn!(error = %e, "Consolidation before delivery failed");
                        }
                    }
                    Step::Open(final_holder)
                }

                Step::Open(peer) => {
                    let singleton =
                        bindings.final_holder == Some(peer) || bindings.crate_handler == Some(peer);
                    if !singleton {
                        let attempts = self.attempts.entry(peer).or_insert(0);
                        if *attempts >= ctx.pipeline.max_attempts_per_peer {
                            warn!(peer = %peer, attempts = *attempts, "Too many attempts; retiring peer");
                            ctx.registry.retire(peer).await;
                            step = Step::Route;
                            continue;
                        }
                        *attempts += 1;
                    }

                    if self.open(ctx, machine, peer).await {
                        return;
                    }
                    if bindings.final_holder == Some(peer) {
                        error!(peer = %peer, "Could not open a session with the final holder");
                        self.final_failed = true;
                    } else {
                        pause(ctx.pacing.retry_ms).await;
                    }
                    Step::Closed(peer)
                }
            };
        }
    }

    async fn open(&mut self, ctx: &AgentContext, machine: &mut SessionMachine, peer: AgentId) -> bool {
        self.check_capacity(ctx).await;
        self.session_received = 0;
        machine.begin(peer);
        pause(ctx.pacing.request_ms).await;

        match ctx.platform.open_trade(peer).await {
            Ok(true) => {
                info!(peer = %peer, "Trade session opened");
                true
            }
            Ok(false) => {
                warn!(peer = %peer, "Trade request declined");
                machine.close("request declined");
                false
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "Trade request failed");
                machine.close("request failed");
                false
            }
        }
    }

    async fn check_capacity(&self, ctx: &AgentContext) {
        let mut inventory = match ctx.platform.own_inventory().await {
            Ok(inventory) => inventory,
            Err(e) => {
                warn!(error = %e, "Could not read own inventory before trading");
                return;
            }
        };

        if inventory.near_capacity(ctx.pipeline.capacity_margin) {
            if ctx.options.auto_craft_weapons {
                info!(items = inventory.len(), slots = inventory.slots, "Backpack nearly full; consolidating");
                if let Err(e) = ctx.engine.consolidate(ctx.platform.as_ref()).await {
                    warn!(error = %e, "Consolidation failed");
                }
                match ctx.platform.own_inventory().await {
                    Ok(fresh) => inventory = fresh,
                    Err(e) => warn!(error = %e, "Could not refresh inventory after consolidation"),
                }
            } else {
                warn!(items = inventory.len(), slots = inventory.slots, "Backpack nearly full");
            }
        }

        if inventory.at_capacity() {
            error!(items = inventory.len(), slots = inventory.slots, "Backpack full; trade may fail");
        }
    }
}
