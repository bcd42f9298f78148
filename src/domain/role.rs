use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed behavioural category of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Hands its items to the intake coordinator, then retires
    #[default]
    #[serde(alias = "giving")]
    Giver,
    /// Drives the pipeline: receives from every giver, delivers to the final holder
    #[serde(alias = "receiving")]
    IntakeCoordinator,
    /// Optional detour visited once the ready queue drains
    #[serde(alias = "crate")]
    CrateHandler,
    /// Terminal consumer of the whole pipeline
    #[serde(alias = "main")]
    FinalHolder,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Giver => "giver",
            Role::IntakeCoordinator => "intake_coordinator",
            Role::CrateHandler => "crate_handler",
            Role::FinalHolder => "final_holder",
        }
    }

    /// Roles that at most one agent may hold
    pub fn is_singleton(&self) -> bool {
        !matches!(self, Role::Giver)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "giver" | "giving" => Ok(Role::Giver),
            "intake_coordinator" | "intake" | "receiving" => Ok(Role::IntakeCoordinator),
            "crate_handler" | "crate" => Ok(Role::CrateHandler),
            "final_holder" | "final" | "main" => Ok(Role::FinalHolder),
            _ => Err(format!("Unknown role: {}", raw)),
        }
    }
}
