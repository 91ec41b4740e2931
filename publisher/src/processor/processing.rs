use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info};

use super::ProcessorInner;
use crate::metrics::counters::Counters;
use crate::sink::{Sink, SinkChannel, deliver};
use crate::types::ProcessedRecord;

/// Dequeue, wait the scenario delay, build the record, hand it to the sink.
pub(super) async fn run<S: Sink>(
    inner: Arc<ProcessorInner<S>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("processing loop started");

    loop {
        let snapshot = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            next = inner.queue.dequeue() => match next {
                Some(snapshot) => snapshot,
                None => break,
            },
        };

        let started = Instant::now();
        // Read once per item; a switch mid-delay applies to the next one.
        let (scenario, delay) = inner.delay.current();

        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = sleep(delay) => {}
        }

        let processing_time_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let sequence_id = snapshot.sequence_id;

        let record = match ProcessedRecord::build(snapshot, processing_time_ms, inner.queue.len()) {
            Ok(record) => record,
            Err(e) => {
                Counters::bump(&inner.counters.record_failures);
                error!(error = %e, "skipping snapshot");
                continue;
            }
        };

        debug!(sequence_id, processing_time_ms, scenario = %scenario, "snapshot processed");

        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = deliver(
                SinkChannel::Processed,
                inner.config.slow_sink_warning,
                &inner.counters,
                inner.sink.on_processed(record),
            ) => {}
        }

        let processed = Counters::bump(&inner.counters.processed);
        if processed % inner.config.processed_log_every == 0 {
            inner.log_processing_metrics();
        }
    }

    info!("processing loop stopped");
}
