use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};
use tradefleet::cli::{self, Cli, Commands};
use tradefleet::config::{FleetConfig, Pacing};
use tradefleet::coordinator::PipelineOutcome;
use tradefleet::error::Result;
use tradefleet::exchange::{SimExchange, SimFixture};
use tradefleet::fleet::FleetManager;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = FleetConfig::load_from(&cli.config_dir)?;

    match cli.command {
        Commands::CheckConfig => {
            init_logging_simple();
            cli::check_config(&config)?;
        }
        Commands::Simulate {
            inventory,
            timeout_secs,
            fast,
        } => {
            init_logging(&config.logging);
            let fixture = match inventory {
                Some(path) => SimFixture::from_path(path)?,
                None => SimFixture::default(),
            };
            run_simulation(config, fixture, Duration::from_secs(timeout_secs), fast).await?;
        }
    }

    Ok(())
}

async fn run_simulation(
    mut config: FleetConfig,
    fixture: SimFixture,
    timeout: Duration,
    fast: bool,
) -> Result<()> {
    if fast {
        config.pacing = Pacing::none();
        config.fleet.start_stagger_ms = 0;
    }

    let exchange = SimExchange::new(fixture);
    let mut manager = FleetManager::new(config, Arc::new(exchange.clone()))?;
    manager.start().await?;
    info!(agents = ?manager.agent_names(), "Fleet running, type '<agent> <command>' to steer it");

    let deadline = Instant::now() + timeout;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let outcome = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::select! {
            outcome = manager.wait_for_pipeline(remaining) => break outcome,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    let Some((target, text)) = line.split_once(' ') else {
                        if !line.is_empty() {
                            warn!("Expected '<agent> <command>', got '{}'", line);
                        }
                        continue;
                    };
                    if let Err(e) = manager.send_command(target, text) {
                        warn!(error = %e, "Could not deliver command");
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "Stopped reading operator input");
                    stdin_open = false;
                }
            },
            _ = signal::ctrl_c() => {
                info!("Interrupted");
                break None;
            }
        }
    };

    match &outcome {
        Some(PipelineOutcome::Completed { items_moved }) => {
            info!(items_moved, "Pipeline completed");
        }
        Some(PipelineOutcome::NoAgents) => info!("Pipeline had nothing to collect"),
        Some(PipelineOutcome::Abandoned(reason)) => error!(reason = %reason, "Pipeline abandoned"),
        None => warn!("Pipeline did not finish in time"),
    }

    if let Some(holder) = manager.registry().bindings().final_holder {
        if let Some(inventory) = exchange.inventory_of(holder).await {
            info!(agent_id = %holder, items = inventory.len(), "Final holder inventory");
        }
    }

    manager.shutdown().await
}
