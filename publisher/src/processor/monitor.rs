use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::ProcessorInner;
use crate::incident::MEMORY_THRESHOLD_EXCEEDED;
use crate::sink::Sink;

/// Samples memory on a fixed cadence and fires the incident latch on the
/// first reading above the threshold.
pub(super) async fn run<S: Sink>(
    inner: Arc<ProcessorInner<S>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let every = inner.config.monitor_interval;
    let threshold_mb = inner.config.memory_threshold_mb;

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(every_ms = every.as_millis() as u64, threshold_mb, "resource monitor started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {}
        }

        let memory_usage_mb = match inner.sampler.sample_mb() {
            Ok(mb) => mb,
            Err(e) => {
                warn!(error = %e, "memory sample failed; no breach assumed");
                continue;
            }
        };

        debug!(memory_usage_mb, threshold_mb, "memory sampled");

        if memory_usage_mb <= threshold_mb || inner.incident.is_triggered() {
            continue;
        }

        let details = BTreeMap::from([
            ("memory_usage_mb".to_string(), json!(memory_usage_mb)),
            ("threshold_mb".to_string(), json!(threshold_mb)),
            ("queue_size".to_string(), json!(inner.queue.len())),
        ]);
        inner.trigger_incident(MEMORY_THRESHOLD_EXCEEDED, details);
    }

    info!("resource monitor stopped");
}
