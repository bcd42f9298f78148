use crate::coordinator::PipelineOrchestrator;
use crate::domain::{AgentId, Role};

use super::context::AgentContext;

/// Role-specific behaviour, selected once when the handler is built
#[derive(Debug)]
pub enum RoleBehavior {
    Giver,
    IntakeCoordinator(PipelineOrchestrator),
    CrateHandler,
    FinalHolder,
}

impl RoleBehavior {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Giver => RoleBehavior::Giver,
            Role::IntakeCoordinator => RoleBehavior::IntakeCoordinator(PipelineOrchestrator::new()),
            Role::CrateHandler => RoleBehavior::CrateHandler,
            Role::FinalHolder => RoleBehavior::FinalHolder,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            RoleBehavior::Giver => Role::Giver,
            RoleBehavior::IntakeCoordinator(_) => Role::IntakeCoordinator,
            RoleBehavior::CrateHandler => Role::CrateHandler,
            RoleBehavior::FinalHolder => Role::FinalHolder,
        }
    }

    /// Does this side place the items in a session with `peer`?
    pub fn is_adder(&self, ctx: &AgentContext, peer: AgentId) -> bool {
        match self {
            RoleBehavior::Giver | RoleBehavior::CrateHandler => true,
            RoleBehavior::IntakeCoordinator(_) => ctx.bindings().final_holder == Some(peer),
            RoleBehavior::FinalHolder => false,
        }
    }

    /// Roles that hand items over and give up once they have nothing left
    pub fn is_giver_type(&self) -> bool {
        matches!(self, RoleBehavior::Giver | RoleBehavior::CrateHandler)
    }

    /// Should the agent halt once its inventory has nothing left to add?
    pub fn halts_when_empty(&self) -> bool {
        !matches!(self, RoleBehavior::FinalHolder)
    }

    pub async fn accepts_request(&self, ctx: &AgentContext, peer: AgentId) -> bool {
        let bindings = ctx.bindings();
        match self {
            RoleBehavior::Giver => ctx.is_admin(peer).await,
            RoleBehavior::IntakeCoordinator(_) => {
                bindings.final_holder == Some(peer)
                    || bindings.crate_handler == Some(peer)
                    || ctx.is_admin(peer).await
            }
            RoleBehavior::CrateHandler | RoleBehavior::FinalHolder => {
                bindings.intake == Some(peer) || ctx.configured_admins.contains(&peer)
            }
        }
    }

    pub async fn accepts_friend(&self, ctx: &AgentContext, peer: AgentId) -> bool {
        match self {
            RoleBehavior::Giver | RoleBehavior::IntakeCoordinator(_) => ctx.is_admin(peer).await,
            RoleBehavior::CrateHandler | RoleBehavior::FinalHolder => self.accepts_request(ctx, peer).await,
        }
    }
}
