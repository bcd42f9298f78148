use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabled::{Table, Tabled};

use crate::config::{FleetConfig, FleetPlan};
use crate::error::Result;

#[derive(Parser)]
#[command(name = "tradefleet")]
#[command(author = "Tradefleet Team")]
#[command(version = "0.1.0")]
#[command(about = "Role-based trade coordination for a fleet of item-exchange bots", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding fleet.toml and environment overrides
    #[arg(short, long, default_value = "config", env = "TRADEFLEET_CONFIG_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the whole fleet against the in-memory exchange
    Simulate {
        /// JSON file with starting inventories keyed by bot name
        #[arg(short, long)]
        inventory: Option<PathBuf>,
        /// Give up waiting for the pipeline after this many seconds
        #[arg(long, default_value = "120")]
        timeout_secs: u64,
        /// Skip every pacing pause
        #[arg(long)]
        fast: bool,
    },
    /// Validate the configuration and print the start order
    CheckConfig,
}

#[derive(Tabled)]
struct LaunchRow {
    #[tabled(rename = "#")]
    index: usize,
    name: String,
    #[tabled(rename = "agent id")]
    agent_id: String,
    role: String,
}

/// Renders the start order as a table
pub fn launch_table(plan: &FleetPlan) -> String {
    let rows = plan.launch.iter().enumerate().map(|(index, bot)| LaunchRow {
        index,
        name: bot.name.clone(),
        agent_id: bot.agent_id.to_string(),
        role: bot.role.to_string(),
    });
    Table::new(rows).to_string()
}

pub fn check_config(config: &FleetConfig) -> Result<()> {
    let plan = config.resolve()?;
    println!("{}", launch_table(&plan));
    println!(
        "{} agents expected, {} admins, auto craft {}, crate handling {}",
        plan.expected_total,
        config.fleet.admins.len(),
        if config.options.auto_craft_weapons { "on" } else { "off" },
        if config.options.manage_crates { "on" } else { "off" },
    );
    Ok(())
}
