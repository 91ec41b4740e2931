#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use corelib::{OrderSnapshot, PriceLevel};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::Instant;

use publisher::{
    HeartbeatSnapshot, IncidentRecord, MemorySampler, ProcessedRecord, PublisherError, Sink,
};

// -----------------------
// Recording sink
// -----------------------

#[derive(Debug)]
pub enum SinkEvent {
    Processed(ProcessedRecord),
    Heartbeat(HeartbeatSnapshot),
    Incident(IncidentRecord),
}

/// Sink that forwards every notification to a channel so tests can await
/// them in order.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
    /// `on_processed` fails for this sequence id.
    pub fail_sequence: Mutex<Option<u64>>,
    pub fail_heartbeats: AtomicBool,
    /// `on_heartbeat` panics instead of failing.
    pub panic_heartbeats: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            fail_sequence: Mutex::new(None),
            fail_heartbeats: AtomicBool::new(false),
            panic_heartbeats: AtomicBool::new(false),
        };
        (Arc::new(sink), rx)
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn on_processed(&self, record: ProcessedRecord) -> anyhow::Result<()> {
        if *self.fail_sequence.lock() == Some(record.sequence_id) {
            anyhow::bail!("client went away");
        }
        let _ = self.tx.send(SinkEvent::Processed(record));
        Ok(())
    }

    async fn on_heartbeat(&self, heartbeat: HeartbeatSnapshot) -> anyhow::Result<()> {
        if self.panic_heartbeats.load(Ordering::Relaxed) {
            panic!("heartbeat listener bug");
        }
        if self.fail_heartbeats.load(Ordering::Relaxed) {
            anyhow::bail!("heartbeat channel closed");
        }
        let _ = self.tx.send(SinkEvent::Heartbeat(heartbeat));
        Ok(())
    }

    async fn on_incident(&self, incident: IncidentRecord) -> anyhow::Result<()> {
        let _ = self.tx.send(SinkEvent::Incident(incident));
        Ok(())
    }
}

/// Waits for the next processed record, skipping other events.
pub async fn next_processed(rx: &mut mpsc::UnboundedReceiver<SinkEvent>) -> ProcessedRecord {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("processed record within timeout")
            .expect("sink channel open");
        if let SinkEvent::Processed(record) = event {
            return record;
        }
    }
}

/// Waits for the incident record, skipping other events.
pub async fn next_incident(rx: &mut mpsc::UnboundedReceiver<SinkEvent>) -> IncidentRecord {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(600), rx.recv())
            .await
            .expect("incident within timeout")
            .expect("sink channel open");
        if let SinkEvent::Incident(incident) = event {
            return incident;
        }
    }
}

/// Everything already delivered, without waiting.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<SinkEvent>) -> Vec<SinkEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

// -----------------------
// Samplers
// -----------------------

pub struct FixedSampler(pub f64);

impl MemorySampler for FixedSampler {
    fn sample_mb(&self) -> Result<f64, PublisherError> {
        Ok(self.0)
    }
}

pub struct FailingSampler;

impl MemorySampler for FailingSampler {
    fn sample_mb(&self) -> Result<f64, PublisherError> {
        Err(PublisherError::ResourceSample("procfs unavailable".into()))
    }
}

/// Walks through `values`, one per `step` of (tokio) time since creation,
/// then holds the last value.
pub struct StepSampler {
    origin: Instant,
    step: Duration,
    values: Vec<f64>,
}

impl StepSampler {
    pub fn new(step: Duration, values: Vec<f64>) -> Self {
        Self {
            origin: Instant::now(),
            step,
            values,
        }
    }
}

impl MemorySampler for StepSampler {
    fn sample_mb(&self) -> Result<f64, PublisherError> {
        let idx = (self.origin.elapsed().as_millis() / self.step.as_millis()) as usize;
        Ok(self.values[idx.min(self.values.len() - 1)])
    }
}

// -----------------------
// Snapshots
// -----------------------

fn level(price_cents: i64) -> PriceLevel {
    PriceLevel::new(Decimal::new(price_cents, 2), Decimal::new(15, 1))
}

/// A valid book around 120 000.00.
pub fn snapshot(sequence_id: u64) -> OrderSnapshot {
    OrderSnapshot::new(
        "BTCUSDT",
        sequence_id,
        Utc::now(),
        vec![level(12_000_000), level(11_999_900)],
        vec![level(12_000_100), level(12_000_200)],
        15,
    )
}

/// Valid ordering, but mid price and spread overflow `Decimal`.
pub fn overflowing_snapshot(sequence_id: u64) -> OrderSnapshot {
    OrderSnapshot::new(
        "BTCUSDT",
        sequence_id,
        Utc::now(),
        vec![PriceLevel::new(Decimal::MAX - Decimal::ONE, Decimal::ONE)],
        vec![PriceLevel::new(Decimal::MAX, Decimal::ONE)],
        15,
    )
}

/// Best bid above best ask; rejected when the record is built.
pub fn crossed_snapshot(sequence_id: u64) -> OrderSnapshot {
    OrderSnapshot::new(
        "BTCUSDT",
        sequence_id,
        Utc::now(),
        vec![level(12_000_500)],
        vec![level(12_000_100)],
        15,
    )
}
