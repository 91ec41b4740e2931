//! The market data processor: owner of the ingest queue, the three
//! background loops and the incident controller task.
//!
//! ```text
//! producer ──enqueue──▶ BoundedIngestQueue ──▶ processing loop ──▶ Sink::on_processed
//!                                   heartbeat loop ─────────────▶ Sink::on_heartbeat
//!                monitor loop ──trigger──▶ controller task ─────▶ Sink::on_incident
//!                                                 └── grace ──▶ shutdown
//! ```
//!
//! Lifecycle: constructed → started → (incident) → stopped. A stopped
//! processor cannot be restarted.

mod escalation;
mod heartbeat;
mod monitor;
mod processing;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use common::logger::{TraceId, child_span, root_span};
use corelib::OrderSnapshot;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, warn};

use crate::config::PublisherConfig;
use crate::delay::DelayPolicy;
use crate::error::PublisherError;
use crate::incident::{IncidentController, IncidentState};
use crate::memory::{MemorySampler, ProcessRssSampler};
use crate::metrics::counters::Counters;
use crate::queue::{BoundedIngestQueue, Enqueued};
use crate::sink::Sink;
use crate::types::{HeartbeatSnapshot, IncidentRecord, ProcessorStatus};

pub struct MarketDataProcessor<S: Sink> {
    inner: Arc<ProcessorInner<S>>,
}

pub(crate) struct ProcessorInner<S: Sink> {
    pub(crate) config: PublisherConfig,
    pub(crate) queue: BoundedIngestQueue<OrderSnapshot>,
    pub(crate) delay: DelayPolicy,
    pub(crate) counters: Counters,
    pub(crate) incident: IncidentController,
    pub(crate) sink: Arc<S>,
    pub(crate) sampler: Arc<dyn MemorySampler>,

    active_clients: AtomicUsize,
    created_at: Instant,
    started_at: Mutex<Option<Instant>>,
    trace_id: TraceId,

    shutdown_tx: broadcast::Sender<()>,
    incident_rx: Mutex<Option<mpsc::UnboundedReceiver<IncidentRecord>>>,
    /// Serialises start/stop so that exactly one caller performs the
    /// transition to STOPPED.
    tasks: tokio::sync::Mutex<TaskSet>,
}

#[derive(Default)]
struct TaskSet {
    started: bool,
    loops: Vec<(&'static str, JoinHandle<()>)>,
    controller: Option<JoinHandle<()>>,
}

impl<S: Sink> MarketDataProcessor<S> {
    pub fn new(
        config: PublisherConfig,
        sink: Arc<S>,
        sampler: Arc<dyn MemorySampler>,
    ) -> Result<Self, PublisherError> {
        config.validate()?;

        let (incident, incident_rx) = IncidentController::new();
        let (shutdown_tx, _) = broadcast::channel(1);

        let inner = ProcessorInner {
            queue: BoundedIngestQueue::new(config.queue_capacity),
            delay: DelayPolicy::new(
                config.scenario_delays.clone(),
                config.default_delay_ms,
                config.initial_scenario.clone(),
            ),
            counters: Counters::default(),
            incident,
            sink,
            sampler,
            active_clients: AtomicUsize::new(0),
            created_at: Instant::now(),
            started_at: Mutex::new(None),
            trace_id: TraceId::new(),
            shutdown_tx,
            incident_rx: Mutex::new(Some(incident_rx)),
            tasks: tokio::sync::Mutex::new(TaskSet::default()),
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Processor sampling this process's resident memory.
    pub fn with_process_sampler(
        config: PublisherConfig,
        sink: Arc<S>,
    ) -> Result<Self, PublisherError> {
        Self::new(config, sink, Arc::new(ProcessRssSampler))
    }

    /// Spawns the processing, heartbeat and monitor loops and the incident
    /// controller task. Must be called from within a tokio runtime.
    pub async fn start(&self) -> Result<(), PublisherError> {
        let inner = &self.inner;
        let mut tasks = inner.tasks.lock().await;

        if inner.incident.state() == IncidentState::Stopped {
            return Err(PublisherError::Stopped);
        }
        if tasks.started {
            return Err(PublisherError::AlreadyStarted);
        }
        let events = inner
            .incident_rx
            .lock()
            .take()
            .ok_or(PublisherError::AlreadyStarted)?;

        tasks.started = true;
        *inner.started_at.lock() = Some(Instant::now());

        let root = root_span("market_data_processor", &inner.trace_id);
        let task_span = |name: &'static str| root.in_scope(|| child_span(name));

        tasks.loops.push((
            "processing",
            tokio::spawn(
                processing::run(inner.clone(), inner.shutdown_tx.subscribe())
                    .instrument(task_span("processing")),
            ),
        ));
        tasks.loops.push((
            "heartbeat",
            tokio::spawn(
                heartbeat::run(inner.clone(), inner.shutdown_tx.subscribe())
                    .instrument(task_span("heartbeat")),
            ),
        ));
        tasks.loops.push((
            "monitor",
            tokio::spawn(
                monitor::run(inner.clone(), inner.shutdown_tx.subscribe())
                    .instrument(task_span("monitor")),
            ),
        ));
        tasks.controller = Some(tokio::spawn(
            escalation::run(inner.clone(), events, inner.shutdown_tx.subscribe())
                .instrument(task_span("incident_controller")),
        ));

        root.in_scope(|| {
            info!(
                capacity = inner.queue.capacity(),
                scenario = %inner.delay.current_tag(),
                memory_threshold_mb = inner.config.memory_threshold_mb,
                grace_secs = inner.config.grace_period.as_secs_f64(),
                "market data processor started"
            )
        });
        Ok(())
    }

    /// Buffers one validated snapshot. Never waits.
    ///
    /// Returns `false` once the processor is stopped.
    pub fn enqueue(&self, snapshot: OrderSnapshot) -> bool {
        self.inner.enqueue(snapshot)
    }

    /// Changes the active scenario; effective from the next dequeued item.
    /// Returns the previous tag.
    pub fn switch_scenario(&self, tag: impl Into<String>) -> String {
        self.inner.delay.switch(tag)
    }

    /// Connection count reported in heartbeats; owned by the transport.
    pub fn set_active_clients(&self, n: usize) {
        self.inner.active_clients.store(n, Ordering::Relaxed);
    }

    /// Fires the incident latch by hand (the monitor does this on a memory
    /// breach). Returns `false` if the latch already fired.
    pub fn trigger_incident(
        &self,
        kind: &str,
        details: BTreeMap<String, serde_json::Value>,
    ) -> bool {
        self.inner.trigger_incident(kind, details)
    }

    pub fn status(&self) -> ProcessorStatus {
        self.inner.status()
    }

    pub fn state(&self) -> IncidentState {
        self.inner.incident.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<IncidentState> {
        self.inner.incident.subscribe()
    }

    /// Resolves once the processor reached STOPPED, by any path.
    pub async fn wait_stopped(&self) {
        let mut rx = self.inner.incident.subscribe();
        // The sender lives in `inner`, so this only ends on STOPPED.
        let _ = rx.wait_for(|s| *s == IncidentState::Stopped).await;
    }

    /// Stops immediately, skipping any pending grace window.
    ///
    /// Returns `true` if this call performed the transition to STOPPED and
    /// `false` if the processor was already stopped.
    pub async fn stop(&self) -> bool {
        let transitioned = self.inner.shutdown("stop requested").await;

        // Taken after the lock is released: the controller task may itself be
        // waiting on it to finish a grace-period shutdown.
        let controller = self.inner.tasks.lock().await.controller.take();
        if let Some(handle) = controller {
            join_task("incident_controller", handle).await;
        }

        transitioned
    }
}

impl<S: Sink> ProcessorInner<S> {
    fn enqueue(&self, snapshot: OrderSnapshot) -> bool {
        if self.incident.state() == IncidentState::Stopped {
            debug!(sequence_id = snapshot.sequence_id, "snapshot rejected; processor stopped");
            return false;
        }

        let sequence_id = snapshot.sequence_id;
        match self.queue.enqueue(snapshot) {
            Err(rejected) => {
                debug!(sequence_id = rejected.sequence_id, "snapshot rejected; queue closed");
                false
            }
            Ok(outcome) => {
                if let Enqueued::Evicted(oldest) = outcome {
                    Counters::bump(&self.counters.dropped);
                    warn!(
                        dropped_sequence_id = oldest.sequence_id,
                        sequence_id,
                        capacity = self.queue.capacity(),
                        total_evicted = self.queue.evicted(),
                        "queue full, dropping oldest snapshot"
                    );
                }

                let received = Counters::bump(&self.counters.received);
                if received % self.config.received_log_every == 0 {
                    info!(
                        queue_size = self.queue.len(),
                        capacity = self.queue.capacity(),
                        received,
                        "queue status"
                    );
                }
                true
            }
        }
    }

    pub(crate) fn uptime_seconds(&self) -> f64 {
        let since = (*self.started_at.lock()).unwrap_or(self.created_at);
        since.elapsed().as_secs_f64()
    }

    pub(crate) fn trigger_incident(
        &self,
        kind: &str,
        details: BTreeMap<String, serde_json::Value>,
    ) -> bool {
        if self.incident.is_triggered() {
            return false;
        }

        self.incident.trigger(IncidentRecord {
            type_tag: kind.to_string(),
            timestamp: Utc::now(),
            details,
            scenario_tag: self.delay.current_tag(),
            uptime_seconds: self.uptime_seconds(),
        })
    }

    /// Fails only when the memory sample fails.
    pub(crate) fn build_heartbeat(&self) -> Result<HeartbeatSnapshot, PublisherError> {
        let memory_usage_mb = self.sampler.sample_mb()?;

        Ok(HeartbeatSnapshot {
            timestamp: Utc::now(),
            status: self.incident.health(),
            queue_size: self.queue.len(),
            memory_usage_mb,
            active_clients: self.active_clients.load(Ordering::Relaxed),
            scenario_tag: self.delay.current_tag(),
        })
    }

    pub(crate) fn status(&self) -> ProcessorStatus {
        let state = self.incident.state();
        let started = self.started_at.lock().is_some();
        let uptime_seconds = self.uptime_seconds();
        let processed_count = Counters::read(&self.counters.processed);
        let (current_scenario, delay) = self.delay.current();

        let memory_usage_mb = self.sampler.sample_mb().unwrap_or_else(|e| {
            debug!(error = %e, "memory sample unavailable for status");
            0.0
        });

        ProcessorStatus {
            running: started && state != IncidentState::Stopped,
            state,
            uptime_seconds,
            received_count: Counters::read(&self.counters.received),
            processed_count,
            dropped_count: Counters::read(&self.counters.dropped),
            queue_size: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            throughput_per_sec: if uptime_seconds > 0.0 {
                processed_count as f64 / uptime_seconds
            } else {
                0.0
            },
            memory_usage_mb,
            memory_threshold_mb: self.config.memory_threshold_mb,
            current_scenario,
            current_delay_ms: delay.as_millis() as u64,
            incident_triggered: self.incident.is_triggered(),
        }
    }

    pub(crate) fn log_processing_metrics(&self) {
        let s = self.status();
        info!(
            uptime_seconds = s.uptime_seconds,
            processed = s.processed_count,
            received = s.received_count,
            dropped = s.dropped_count,
            queue_size = s.queue_size,
            throughput_per_sec = s.throughput_per_sec,
            memory_usage_mb = s.memory_usage_mb,
            scenario = %s.current_scenario,
            delay_ms = s.current_delay_ms,
            "processing metrics"
        );
    }

    /// Signals every loop, awaits each, closes the queue and marks STOPPED.
    ///
    /// Never awaits the controller task, which may be the caller.
    pub(crate) async fn shutdown(&self, reason: &'static str) -> bool {
        let mut tasks = self.tasks.lock().await;

        if self.incident.state() == IncidentState::Stopped {
            debug!(reason, "already stopped");
            return false;
        }

        self.incident.begin_shutdown();
        info!(reason, "market data processor stopping");

        // No receivers when never started.
        let _ = self.shutdown_tx.send(());

        for (name, handle) in tasks.loops.drain(..) {
            join_task(name, handle).await;
        }

        self.queue.close();
        self.incident.mark_stopped();

        info!(
            reason,
            received = Counters::read(&self.counters.received),
            processed = Counters::read(&self.counters.processed),
            dropped = Counters::read(&self.counters.dropped),
            record_failures = Counters::read(&self.counters.record_failures),
            sink_failures = Counters::read(&self.counters.sink_failures),
            "market data processor stopped"
        );
        true
    }
}

/// Awaits one task; abnormal exits are logged and swallowed.
async fn join_task(name: &'static str, handle: JoinHandle<()>) {
    match handle.await {
        Ok(()) => debug!(task = name, "task exited"),
        Err(e) if e.is_cancelled() => debug!(task = name, "task cancelled"),
        Err(e) => {
            let err = PublisherError::ShutdownStep {
                task: name,
                reason: e.to_string(),
            };
            warn!(error = %err, "shutdown step failed");
        }
    }
}
