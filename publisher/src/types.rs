use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use corelib::{OrderSnapshot, PriceLevel};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::PublisherError;
use crate::incident::IncidentState;

/// A snapshot after it went through the processing loop.
#[derive(Clone, Debug, Serialize)]
pub struct ProcessedRecord {
    pub pair: String,
    pub sequence_id: u64,
    pub received_at: DateTime<Utc>,
    pub parsed_at: DateTime<Utc>,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,

    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub mid_price: Decimal,
    pub spread: Decimal,

    /// Wall time spent in the processing step, injected delay included.
    pub processing_time_ms: f64,
    /// Items still buffered when the record was emitted.
    pub queue_size_at_emit: usize,
}

impl ProcessedRecord {
    /// Fails for snapshots that slipped past validation without a usable top
    /// of book, including books whose derived prices overflow.
    pub fn build(
        snapshot: OrderSnapshot,
        processing_time_ms: f64,
        queue_size_at_emit: usize,
    ) -> Result<Self, PublisherError> {
        let sequence_id = snapshot.sequence_id;
        let derived = *snapshot.derived().map_err(|e| PublisherError::RecordBuild {
            sequence_id,
            reason: e.to_string(),
        })?;

        if derived.spread <= Decimal::ZERO {
            return Err(PublisherError::RecordBuild {
                sequence_id,
                reason: format!("non-positive spread {}", derived.spread),
            });
        }

        let pair = snapshot.pair.clone();
        let (received_at, parsed_at) = (snapshot.received_at, snapshot.parsed_at);
        let (bids, asks) = snapshot.into_levels();

        Ok(Self {
            pair,
            sequence_id,
            received_at,
            parsed_at,
            bids,
            asks,
            best_bid: derived.best_bid,
            best_ask: derived.best_ask,
            mid_price: derived.mid_price,
            spread: derived.spread,
            processing_time_ms,
            queue_size_at_emit,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Clone, Debug, Serialize)]
pub struct HeartbeatSnapshot {
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub queue_size: usize,
    pub memory_usage_mb: f64,
    pub active_clients: usize,
    pub scenario_tag: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct IncidentRecord {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub timestamp: DateTime<Utc>,
    pub details: BTreeMap<String, serde_json::Value>,
    pub scenario_tag: String,
    pub uptime_seconds: f64,
}

/// Point-in-time view returned by the status query.
#[derive(Clone, Debug, Serialize)]
pub struct ProcessorStatus {
    pub running: bool,
    pub state: IncidentState,
    pub uptime_seconds: f64,
    pub received_count: u64,
    pub processed_count: u64,
    pub dropped_count: u64,
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub throughput_per_sec: f64,
    pub memory_usage_mb: f64,
    pub memory_threshold_mb: f64,
    pub current_scenario: String,
    pub current_delay_ms: u64,
    pub incident_triggered: bool,
}
