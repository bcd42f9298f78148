//! Role Registry: fleet-wide scheduling state shared by every agent worker

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::domain::{AgentId, Item};

/// Singleton role holders resolved once from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBindings {
    pub intake: Option<AgentId>,
    pub crate_handler: Option<AgentId>,
    pub final_holder: Option<AgentId>,
}

/// How the pipeline ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineOutcome {
    /// Final holder session closed
    Completed { items_moved: usize },
    /// Everyone checked in and nobody had items to give
    NoAgents,
    /// Gave up waiting or lost a required peer
    Abandoned(String),
}

/// Result of waiting for the ready queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Front of the ready queue
    Ready(AgentId),
    /// Queue empty and every expected agent checked in
    AllCheckedIn,
    TimedOut,
}

/// Point-in-time copy of the registry for status output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub registered: usize,
    pub expected_total: usize,
    pub ready: Vec<AgentId>,
    pub admins: usize,
    pub outcome: Option<PipelineOutcome>,
}

#[derive(Debug, Default)]
struct RegistryState {
    registered: HashSet<AgentId>,
    ready: VecDeque<AgentId>,
    items: HashMap<AgentId, Option<Vec<Item>>>,
    admins: HashSet<AgentId>,
}

/// Shared registry. Every mutation bumps a version so waiters wake without polling.
#[derive(Debug)]
pub struct RoleRegistry {
    state: RwLock<RegistryState>,
    bindings: RoleBindings,
    expected_total: usize,
    version: watch::Sender<u64>,
    outcome: watch::Sender<Option<PipelineOutcome>>,
}

impl RoleRegistry {
    pub fn new(
        bindings: RoleBindings,
        expected_total: usize,
        admins: impl IntoIterator<Item = AgentId>,
    ) -> Self {
        let (version, _) = watch::channel(0);
        let (outcome, _) = watch::channel(None);
        Self {
            state: RwLock::new(RegistryState {
                admins: admins.into_iter().collect(),
                ..RegistryState::default()
            }),
            bindings,
            expected_total,
            version,
            outcome,
        }
    }

    pub fn bindings(&self) -> RoleBindings {
        self.bindings
    }

    pub fn expected_total(&self) -> usize {
        self.expected_total
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Registers an agent with its tradable items (`None` for attendance only).
    /// Every agent that checks in becomes an admin.
    pub async fn check_in(&self, agent: AgentId, items: Option<Vec<Item>>) {
        {
            let mut state = self.state.write().await;
            state.registered.insert(agent);
            state.admins.insert(agent);
            state.items.insert(agent, items);
            debug!(
                agent_id = %agent,
                registered = state.registered.len(),
                expected = self.expected_total,
                "Agent checked in"
            );
        }
        self.bump();
    }

    /// Checks in with items and joins the ready queue in one step, so waiters
    /// never see the agent registered but not yet queued
    pub async fn check_in_ready(&self, agent: AgentId, items: Vec<Item>) {
        {
            let mut state = self.state.write().await;
            state.registered.insert(agent);
            state.admins.insert(agent);
            state.items.insert(agent, Some(items));
            if !state.ready.contains(&agent) {
                state.ready.push_back(agent);
            }
            debug!(
                agent_id = %agent,
                registered = state.registered.len(),
                ready = state.ready.len(),
                "Agent checked in ready"
            );
        }
        self.bump();
    }

    /// Appends to the ready queue. False if already queued.
    pub async fn enqueue_ready(&self, agent: AgentId) -> bool {
        let added = {
            let mut state = self.state.write().await;
            if state.ready.contains(&agent) {
                false
            } else {
                state.ready.push_back(agent);
                true
            }
        };
        if added {
            self.bump();
        }
        added
    }

    pub async fn front(&self) -> Option<AgentId> {
        self.state.read().await.ready.front().copied()
    }

    /// Drops an agent from the ready queue. Idempotent.
    pub async fn retire(&self, agent: AgentId) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            let before = state.ready.len();
            state.ready.retain(|queued| *queued != agent);
            before != state.ready.len()
        };
        if removed {
            info!(agent_id = %agent, "Agent retired from ready queue");
            self.bump();
        }
        removed
    }

    pub async fn items_of(&self, agent: AgentId) -> Option<Vec<Item>> {
        self.state.read().await.items.get(&agent).cloned().flatten()
    }

    pub async fn is_admin(&self, agent: AgentId) -> bool {
        self.state.read().await.admins.contains(&agent)
    }

    pub async fn add_admin(&self, agent: AgentId) {
        let added = self.state.write().await.admins.insert(agent);
        if added {
            self.bump();
        }
    }

    pub async fn is_registered(&self, agent: AgentId) -> bool {
        self.state.read().await.registered.contains(&agent)
    }

    pub async fn registered_count(&self) -> usize {
        self.state.read().await.registered.len()
    }

    pub async fn ready_len(&self) -> usize {
        self.state.read().await.ready.len()
    }

    pub async fn all_checked_in(&self) -> bool {
        self.registered_count().await >= self.expected_total
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.read().await;
        RegistrySnapshot {
            registered: state.registered.len(),
            expected_total: self.expected_total,
            ready: state.ready.iter().copied().collect(),
            admins: state.admins.len(),
            outcome: self.outcome.borrow().clone(),
        }
    }

    /// Waits until the ready queue has a front agent or everyone checked in
    pub async fn wait_for_work(&self, timeout: Duration) -> WaitOutcome {
        let mut changes = self.version.subscribe();
        let deadline = Instant::now() + timeout;

        loop {
            changes.borrow_and_update();
            {
                let state = self.state.read().await;
                if let Some(front) = state.ready.front() {
                    return WaitOutcome::Ready(*front);
                }
                if state.registered.len() >= self.expected_total {
                    return WaitOutcome::AllCheckedIn;
                }
            }

            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return WaitOutcome::TimedOut,
            }
        }
    }

    /// Publishes the pipeline outcome. Only the first call wins.
    pub fn finish(&self, outcome: PipelineOutcome) -> bool {
        let mut published = false;
        self.outcome.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(outcome.clone());
            published = true;
            true
        });
        if published {
            info!(outcome = ?outcome, "Pipeline finished");
        }
        published
    }

    pub fn outcome(&self) -> Option<PipelineOutcome> {
        self.outcome.borrow().clone()
    }

    /// Waits for [`RoleRegistry::finish`]. `None` on timeout.
    pub async fn wait_finished(&self, timeout: Duration) -> Option<PipelineOutcome> {
        let mut rx = self.outcome.subscribe();
        let outcome = match tokio::time::timeout(timeout, rx.wait_for(|o| o.is_some())).await {
            Ok(Ok(outcome)) => outcome.clone(),
            _ => None,
        };
        outcome
    }
}
