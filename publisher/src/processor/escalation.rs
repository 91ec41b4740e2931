use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, info};

use super::ProcessorInner;
use crate::sink::{Sink, SinkChannel, deliver};
use crate::types::IncidentRecord;

/// Emits the latched incident, then stops the processor once the grace
/// period elapses. An explicit stop cuts every step short.
pub(super) async fn run<S: Sink>(
    inner: Arc<ProcessorInner<S>>,
    mut events: mpsc::UnboundedReceiver<IncidentRecord>,
    mut shutdown: broadcast::Receiver<()>,
) {
    // The latch admits a single record.
    let record = tokio::select! {
        biased;
        _ = shutdown.recv() => return,
        next = events.recv() => match next {
            Some(record) => record,
            None => return,
        },
    };

    tokio::select! {
        biased;
        _ = shutdown.recv() => return,
        _ = deliver(
            SinkChannel::Incident,
            inner.config.slow_sink_warning,
            &inner.counters,
            inner.sink.on_incident(record),
        ) => {}
    }

    let grace = inner.config.grace_period;
    inner.incident.begin_shutdown();
    info!(grace_secs = grace.as_secs_f64(), "graceful shutdown scheduled");

    tokio::select! {
        biased;
        _ = shutdown.recv() => {
            debug!("grace period cut short by stop");
            return;
        }
        _ = sleep(grace) => {}
    }

    inner.shutdown("incident grace period elapsed").await;
}
