//! Notification boundary between the processing core and the transport.
//!
//! The core hands every emitted structure to a [`Sink`]; serialisation and
//! fan-out to connected clients are the sink's concern.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use common::logger::warn_if_slow;
use futures::FutureExt;
use tracing::warn;

use crate::error::PublisherError;
use crate::metrics::counters::Counters;
use crate::types::{HeartbeatSnapshot, IncidentRecord, ProcessedRecord};

/// Receiver of the three notification streams.
///
/// Implementations may be slow or fail; errors are logged and counted by the
/// caller and never stop the emitting loop.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    async fn on_processed(&self, record: ProcessedRecord) -> anyhow::Result<()>;

    async fn on_heartbeat(&self, heartbeat: HeartbeatSnapshot) -> anyhow::Result<()>;

    async fn on_incident(&self, incident: IncidentRecord) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkChannel {
    Processed,
    Heartbeat,
    Incident,
}

impl SinkChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            SinkChannel::Processed => "on_processed",
            SinkChannel::Heartbeat => "on_heartbeat",
            SinkChannel::Incident => "on_incident",
        }
    }
}

/// Awaits one sink call, isolating its failure (error or panic). Returns
/// whether it succeeded.
pub(crate) async fn deliver<F>(
    channel: SinkChannel,
    slow_after: Duration,
    counters: &Counters,
    call: F,
) -> bool
where
    F: Future<Output = anyhow::Result<()>>,
{
    let outcome = AssertUnwindSafe(warn_if_slow(channel.as_str(), slow_after, call))
        .catch_unwind()
        .await;

    let reason = match outcome {
        Ok(Ok(())) => return true,
        Ok(Err(e)) => format!("{e:#}"),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };

    Counters::bump(&counters.sink_failures);
    let err = PublisherError::SinkInvocation {
        channel: channel.as_str(),
        reason,
    };
    warn!(error = %err, "sink notification failed");
    false
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Sink that only logs. Useful when no transport is attached.
pub struct TracingSink;

#[async_trait]
impl Sink for TracingSink {
    async fn on_processed(&self, record: ProcessedRecord) -> anyhow::Result<()> {
        tracing::debug!(
            sequence_id = record.sequence_id,
            mid_price = %record.mid_price,
            processing_time_ms = record.processing_time_ms,
            "processed snapshot"
        );
        Ok(())
    }

    async fn on_heartbeat(&self, heartbeat: HeartbeatSnapshot) -> anyhow::Result<()> {
        tracing::debug!(
            status = ?heartbeat.status,
            queue_size = heartbeat.queue_size,
            memory_usage_mb = heartbeat.memory_usage_mb,
            "heartbeat"
        );
        Ok(())
    }

    async fn on_incident(&self, incident: IncidentRecord) -> anyhow::Result<()> {
        tracing::warn!(kind = %incident.type_tag, "incident alert");
        Ok(())
    }
}
