//! Binance partial-depth payloads (`<symbol>@depth20@100ms` stream shape).
//!
//! ```json
//! {"stream": "btcusdt@depth20@100ms",
//!  "data": {"lastUpdateId": 42, "bids": [["120000.00", "1.2500"]], "asks": [...]}}
//! ```

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::SnapshotError;
use crate::models::{OrderSnapshot, PriceLevel};

#[derive(Debug, Clone, Deserialize)]
pub struct DepthEnvelope {
    pub data: DepthPayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthPayload {
    pub last_update_id: u64,
    #[serde(default)]
    pub bids: Vec<[Decimal; 2]>,
    #[serde(default)]
    pub asks: Vec<[Decimal; 2]>,
}

impl DepthEnvelope {
    /// Converts the payload into a snapshot stamped with the current time.
    /// The result is not validated; callers run [`OrderSnapshot::validate`].
    pub fn into_snapshot(self, pair: &str, top_levels: usize) -> OrderSnapshot {
        let received_at = Utc::now();
        let to_levels = |raw: Vec<[Decimal; 2]>| {
            raw.into_iter()
                .take(top_levels)
                .map(|[price, quantity]| PriceLevel::new(price, quantity))
                .collect::<Vec<_>>()
        };

        OrderSnapshot::new(
            pair,
            self.data.last_update_id,
            received_at,
            to_levels(self.data.bids),
            to_levels(self.data.asks),
            top_levels,
        )
    }
}

/// Parses a raw depth update into a snapshot.
pub fn parse_depth_update(
    raw: &serde_json::Value,
    pair: &str,
    top_levels: usize,
) -> Result<OrderSnapshot, SnapshotError> {
    let envelope = DepthEnvelope::deserialize(raw)
        .map_err(|e| SnapshotError::Malformed(e.to_string()))?;
    Ok(envelope.into_snapshot(pair, top_levels))
}
