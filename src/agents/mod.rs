//! Trade agents
//!
//! Each configured bot runs as one `AgentWorker` task that owns its event
//! receiver and drives an `AgentHandler`. The handler consults its
//! `RoleBehavior` for everything that differs between roles.

pub mod context;
pub mod handler;
pub mod roles;
pub mod worker;

pub use context::AgentContext;
pub use handler::AgentHandler;
pub use roles::RoleBehavior;
pub use worker::AgentWorker;
