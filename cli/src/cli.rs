use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use rust_decimal::Decimal;

#[derive(Debug, Parser)]
#[clap(name = "market-publisher", version)]
pub struct Cli {
    /// Scenario active at start (overrides PUBLISHER_INITIAL_SCENARIO)
    #[clap(long)]
    pub scenario: Option<String>,

    /// Snapshots fed into the processor per second
    #[clap(long, default_value = "20")]
    pub rate: u32,

    /// Scenario to switch to after `--switch-after-secs`
    #[clap(long, default_value = "burst-mode")]
    pub switch_to: String,

    /// Seconds before switching scenario; 0 keeps the initial one
    #[clap(long, default_value = "10")]
    pub switch_after_secs: u64,

    /// Replay a recorded `{"updates": [...]}` file instead of generating data
    #[clap(long)]
    pub replay: Option<PathBuf>,

    /// Trading pair stamped on every snapshot
    #[clap(long, default_value = "BTCUSDT")]
    pub pair: String,

    /// Starting mid price of the synthetic random walk
    #[clap(long, default_value = "120000.00")]
    pub base_price: Decimal,

    /// Depth levels per side (at most 15 are kept)
    #[clap(long, default_value = "15")]
    pub levels: usize,

    /// Seed of the synthetic generator
    #[clap(long, default_value = "7")]
    pub seed: u64,

    /// Emit logs as JSON
    #[clap(long)]
    pub json_logs: bool,
}

impl Cli {
    pub fn feed_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.rate.max(1)))
    }

    pub fn scenario_switch(&self) -> Option<(Duration, String)> {
        (self.switch_after_secs > 0)
            .then(|| (Duration::from_secs(self.switch_after_secs), self.switch_to.clone()))
    }
}
