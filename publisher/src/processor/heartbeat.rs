use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{error, info};

use super::ProcessorInner;
use crate::sink::{Sink, SinkChannel, deliver};

pub(super) async fn run<S: Sink>(
    inner: Arc<ProcessorInner<S>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let every = inner.config.heartbeat_interval;
    let backoff = inner.config.heartbeat_error_backoff;

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(every_ms = every.as_millis() as u64, "heartbeat loop started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {}
        }

        match inner.build_heartbeat() {
            Ok(heartbeat) => {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    _ = deliver(
                        SinkChannel::Heartbeat,
                        inner.config.slow_sink_warning,
                        &inner.counters,
                        inner.sink.on_heartbeat(heartbeat),
                    ) => {}
                }
            }
            Err(e) => {
                error!(error = %e, backoff_ms = backoff.as_millis() as u64, "heartbeat skipped");
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    _ = sleep(backoff) => {}
                }
            }
        }
    }

    info!("heartbeat loop stopped");
}
