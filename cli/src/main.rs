mod cli;
mod feed;
mod stdout_sink;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use common::logger::init_logger;
use publisher::{MarketDataProcessor, PublisherConfig};
use publisher::IncidentState;
use tracing::{info, warn};

use cli::Cli;
use feed::{SyntheticFeed, load_replay, pump, switch_after};
use stdout_sink::StdoutSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger("market-publisher", cli.json_logs);

    let mut config = PublisherConfig::from_env().context("load publisher config")?;
    if let Some(scenario) = &cli.scenario {
        config.initial_scenario = scenario.clone();
    }

    let processor = Arc::new(MarketDataProcessor::with_process_sampler(
        config,
        Arc::new(StdoutSink::new()),
    )?);
    processor.start().await?;

    // 1. Producer
    let every = cli.feed_interval();
    let feeder = match &cli.replay {
        Some(path) => {
            let snapshots = load_replay(path, &cli.pair, cli.levels)?;
            tokio::spawn(pump(processor.clone(), snapshots, every))
        }
        None => {
            let synthetic = SyntheticFeed::new(&cli.pair, cli.base_price, cli.levels, cli.seed);
            tokio::spawn(pump(processor.clone(), synthetic, every))
        }
    };

    // 2. Scenario sequence
    let switcher = cli
        .scenario_switch()
        .map(|(after, tag)| tokio::spawn(switch_after(processor.clone(), after, tag)));

    // 3. Lifecycle transitions
    let mut states = processor.subscribe_state();
    let watcher = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            match state {
                IncidentState::Degraded => warn!(?state, "processor degraded"),
                _ => info!(?state, "processor state changed"),
            }
        }
    });

    // 4. Run until interrupted or stopped by an incident
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("listen for ctrl-c")?;
            info!("interrupt received");
        }
        _ = processor.wait_stopped() => {
            info!("processor stopped itself");
        }
    }

    processor.stop().await;
    feeder.abort();
    watcher.abort();
    if let Some(handle) = switcher {
        handle.abort();
    }

    let status = processor.status();
    info!(
        received = status.received_count,
        processed = status.processed_count,
        dropped = status.dropped_count,
        incident_triggered = status.incident_triggered,
        uptime_seconds = status.uptime_seconds,
        "market publisher exited"
    );
    Ok(())
}
