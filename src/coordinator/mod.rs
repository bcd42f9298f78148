//! Fleet coordination
//!
//! The role registry every worker shares, and the intake coordinator's
//! pipeline that walks the ready queue towards the final holder.

pub mod pipeline;
pub mod registry;

pub use pipeline::PipelineOrchestrator;
pub use registry::{
    PipelineOutcome, RegistrySnapshot, RoleBindings, RoleRegistry, WaitOutcome,
};
