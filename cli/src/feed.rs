//! Snapshot producers: a seeded random walk or a recorded replay file.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use corelib::binance::parse_depth_update;
use corelib::{OrderSnapshot, PriceLevel, TOP_LEVELS};
use publisher::{MarketDataProcessor, Sink};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{info, warn};

/// Random-walk order book generator. Same seed, same stream.
pub struct SyntheticFeed {
    pair: String,
    levels: usize,
    mid: Decimal,
    sequence_id: u64,
    rng: ChaCha8Rng,
}

impl SyntheticFeed {
    pub fn new(pair: impl Into<String>, base_price: Decimal, levels: usize, seed: u64) -> Self {
        Self {
            pair: pair.into(),
            levels: levels.clamp(1, TOP_LEVELS),
            mid: base_price.round_dp(2),
            sequence_id: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Next snapshot. Always strictly ordered with a positive spread.
    pub fn next_snapshot(&mut self) -> OrderSnapshot {
        let cent = Decimal::new(1, 2);
        let tick = Decimal::new(50, 2);

        // Moves of up to ±5 bps per update.
        let move_bps = Decimal::from(self.rng.gen_range(-5i64..=5));
        self.mid = (self.mid + self.mid * move_bps / Decimal::from(10_000))
            .round_dp(2)
            .max(Decimal::ONE);

        let spread_bps = Decimal::from(self.rng.gen_range(1i64..=4));
        let half_spread = (self.mid * spread_bps / Decimal::from(20_000))
            .round_dp(2)
            .max(cent);

        let best_bid = self.mid - half_spread;
        let best_ask = self.mid + half_spread;

        let mut bids = Vec::with_capacity(self.levels);
        let mut asks = Vec::with_capacity(self.levels);
        for i in 0..self.levels {
            let offset = tick * Decimal::from(i as u64);
            bids.push(PriceLevel::new(best_bid - offset, self.quantity()));
            asks.push(PriceLevel::new(best_ask + offset, self.quantity()));
        }

        self.sequence_id += 1;
        OrderSnapshot::new(&self.pair, self.sequence_id, Utc::now(), bids, asks, TOP_LEVELS)
    }

    fn quantity(&mut self) -> Decimal {
        Decimal::new(self.rng.gen_range(1..=50_000), 4)
    }
}

#[derive(Debug, Deserialize)]
struct ReplayFile {
    updates: Vec<serde_json::Value>,
}

/// Loads a replay file, keeping only updates that parse and validate.
pub fn load_replay(path: &Path, pair: &str, levels: usize) -> anyhow::Result<Vec<OrderSnapshot>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("read replay file {}", path.display()))?;
    let file: ReplayFile = serde_json::from_str(&body)
        .with_context(|| format!("parse replay file {}", path.display()))?;

    let levels = levels.clamp(1, TOP_LEVELS);
    let total = file.updates.len();
    let snapshots: Vec<_> = file
        .updates
        .iter()
        .enumerate()
        .filter_map(|(idx, raw)| {
            match parse_depth_update(raw, pair, levels).and_then(|s| s.validate().map(|()| s)) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(index = idx, error = %e, "replay update skipped");
                    None
                }
            }
        })
        .collect();

    info!(path = %path.display(), total, usable = snapshots.len(), "replay loaded");
    Ok(snapshots)
}

/// Feeds `source` at a fixed cadence until it runs dry or the processor
/// stops accepting.
pub async fn pump<S, I>(processor: Arc<MarketDataProcessor<S>>, source: I, every: Duration)
where
    S: Sink,
    I: IntoIterator<Item = OrderSnapshot>,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut fed = 0u64;
    for snapshot in source {
        ticker.tick().await;
        if !processor.enqueue(snapshot) {
            info!(fed, "processor no longer accepting snapshots");
            return;
        }
        fed += 1;
    }
    info!(fed, "feed exhausted");
}

/// Switches scenario once after `after`.
pub async fn switch_after<S: Sink>(processor: Arc<MarketDataProcessor<S>>, after: Duration, tag: String) {
    sleep(after).await;
    let previous = processor.switch_scenario(tag.clone());
    info!(from = %previous, to = %tag, "scheduled scenario switch");
}

impl Iterator for SyntheticFeed {
    type Item = OrderSnapshot;

    fn next(&mut self) -> Option<OrderSnapshot> {
        Some(self.next_snapshot())
    }
}
