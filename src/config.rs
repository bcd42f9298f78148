use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::coordinator::RoleBindings;
use crate::domain::{AgentId, CratePolicy, Role};
use crate::error::{FleetError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub fleet: FleetSection,
    #[serde(default)]
    pub options: TradeOptions,
    #[serde(default)]
    pub pacing: Pacing,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub bots: Vec<BotConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FleetSection {
    /// Start every configured bot, ignoring per-bot `auto_start`
    pub auto_start_all: bool,
    /// Accounts allowed to command agents and trade with givers
    pub admins: Vec<AgentId>,
    /// Delay between consecutive bot starts
    pub start_stagger_ms: u64,
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            auto_start_all: false,
            admins: Vec::new(),
            start_stagger_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TradeOptions {
    /// Smelt weapons and combine metal before giving and before the final delivery
    pub auto_craft_weapons: bool,
    /// Run crate deletion on giver login
    pub manage_crates: bool,
    pub delete_crates: CratePolicy,
    pub transfer_crates: CratePolicy,
    /// Crate series never deleted
    pub saved_crates: Vec<u32>,
}

/// Protocol delays in milliseconds
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Pacing {
    /// Before sending a trade request
    pub request_ms: u64,
    /// Before the first item add
    pub add_item_ms: u64,
    /// Between consecutive item adds
    pub post_add_ms: u64,
    /// Before sending a handshake message
    pub message_ms: u64,
    pub accept_ms: u64,
    /// Before releasing a closed session
    pub close_ms: u64,
    /// Back-off after the platform reports this side already trading
    pub already_trading_ms: u64,
    /// After each craft
    pub craft_ms: u64,
    /// Before re-reading the inventory between crafting stages
    pub inventory_refresh_ms: u64,
    /// Before reopening a peer whose request failed
    pub retry_ms: u64,
    /// After an exhausted cancel
    pub cancel_pause_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            request_ms: 200,
            add_item_ms: 500,
            post_add_ms: 50,
            message_ms: 100,
            accept_ms: 100,
            close_ms: 150,
            already_trading_ms: 5000,
            craft_ms: 100,
            inventory_refresh_ms: 300,
            retry_ms: 1000,
            cancel_pause_ms: 500,
        }
    }
}

impl Pacing {
    /// All delays zero; used by tests and `--fast` dry runs
    pub fn none() -> Self {
        Self {
            request_ms: 0,
            add_item_ms: 0,
            post_add_ms: 0,
            message_ms: 0,
            accept_ms: 0,
            close_ms: 0,
            already_trading_ms: 0,
            craft_ms: 0,
            inventory_refresh_ms: 0,
            retry_ms: 0,
            cancel_pause_ms: 0,
        }
    }
}

/// Sleeps for `ms` on the calling task; zero returns immediately
pub async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum wait for the ready queue before the pipeline is abandoned
    pub wait_timeout_secs: u64,
    /// Opens per peer before it is retired
    pub max_attempts_per_peer: u32,
    /// Free slots below which the coordinator consolidates
    pub capacity_margin: usize,
    /// Calls per session action in the retry executor
    pub max_action_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 300,
            max_attempts_per_peer: 3,
            capacity_margin: 20,
            max_action_attempts: 5,
        }
    }
}

impl PipelineConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One configured bot account
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BotConfig {
    pub name: String,
    pub agent_id: AgentId,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

fn default_auto_start() -> bool {
    true
}

impl BotConfig {
    pub fn new(name: &str, agent_id: u64, role: Role) -> Self {
        Self {
            name: name.to_string(),
            agent_id: AgentId(agent_id),
            role,
            auto_start: true,
        }
    }
}

/// Validated view of the configuration the fleet runs from
#[derive(Debug, Clone)]
pub struct FleetPlan {
    pub bindings: RoleBindings,
    /// Agents expected to check in
    pub expected_total: usize,
    /// Bots to start, in start order
    pub launch: Vec<BotConfig>,
}

impl FleetConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let env_name = std::env::var("TRADEFLEET_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("pipeline.wait_timeout_secs", 300)?
            // Load the fleet file
            .add_source(File::from(config_dir.join("fleet.toml")).required(false))
            // Load environment-specific overrides (e.g., config/production.toml)
            .add_source(File::from(config_dir.join(format!("{}.toml", env_name))).required(false))
            // Override with environment variables (TRADEFLEET__PIPELINE__WAIT_TIMEOUT_SECS, etc.)
            .add_source(
                Environment::with_prefix("TRADEFLEET")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Parse an inline TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| FleetError::Validation(format!("invalid fleet file: {}", e)))
    }

    fn launched(&self) -> impl Iterator<Item = &BotConfig> {
        let all = self.fleet.auto_start_all;
        self.bots.iter().filter(move |bot| all || bot.auto_start)
    }

    /// Validate the bot list and resolve role bindings and start order
    pub fn resolve(&self) -> Result<FleetPlan> {
        let mut errors = Vec::new();
        let mut names = HashSet::new();
        let mut ids = HashSet::new();

        for bot in &self.bots {
            if bot.name.trim().is_empty() {
                errors.push(format!("bot {} has an empty name", bot.agent_id));
            }
            if !names.insert(bot.name.as_str()) {
                errors.push(format!("duplicate bot name '{}'", bot.name));
            }
            if !ids.insert(bot.agent_id) {
                errors.push(format!("duplicate agent id {}", bot.agent_id));
            }
        }

        let mut bindings = RoleBindings::default();
        for bot in self.launched() {
            let slot = match bot.role {
                Role::Giver => continue,
                Role::IntakeCoordinator => &mut bindings.intake,
                Role::CrateHandler => &mut bindings.crate_handler,
                Role::FinalHolder => &mut bindings.final_holder,
            };
            if slot.is_some() {
                errors.push(format!("more than one {} configured", bot.role));
            } else {
                *slot = Some(bot.agent_id);
            }
        }
        if bindings.intake.is_none() {
            errors.push("no intake_coordinator among the started bots".to_string());
        }
        if self.pipeline.max_action_attempts == 0 {
            errors.push("pipeline.max_action_attempts must be at least 1".to_string());
        }

        if !errors.is_empty() {
            return Err(FleetError::Validation(errors.join("; ")));
        }

        let rank = |role: Role| match role {
            Role::IntakeCoordinator => 0,
            Role::CrateHandler => 1,
            Role::FinalHolder => 2,
            Role::Giver => 3,
        };
        let mut launch: Vec<BotConfig> = self.launched().cloned().collect();
        // Stable sort keeps file order among givers
        launch.sort_by_key(|bot| rank(bot.role));

        Ok(FleetPlan {
            bindings,
            expected_total: launch.len(),
            launch,
        })
    }
}
