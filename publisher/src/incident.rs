//! Incident latch and lifecycle state machine.
//!
//! ```text
//! HEALTHY ──trigger──▶ DEGRADED ──▶ SHUTTING_DOWN ──grace / stop()──▶ STOPPED
//!    └──────────────────── stop() ───────▲
//! ```
//!
//! The latch fires at most once per processor lifetime. Triggering never
//! stops anything directly: the record is posted to the controller task,
//! which owns the grace window and the shutdown.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::types::{HealthStatus, IncidentRecord};

/// Incident kind raised by the resource monitor.
pub const MEMORY_THRESHOLD_EXCEEDED: &str = "memory_threshold_exceeded";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    Healthy,
    Degraded,
    ShuttingDown,
    Stopped,
}

pub struct IncidentController {
    state: watch::Sender<IncidentState>,
    triggered: AtomicBool,
    events: mpsc::UnboundedSender<IncidentRecord>,
}

impl IncidentController {
    /// Returns the controller and the receiving end consumed by the
    /// controller task.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<IncidentRecord>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(IncidentState::Healthy);

        (
            Self {
                state,
                triggered: AtomicBool::new(false),
                events,
            },
            rx,
        )
    }

    /// Fires the latch and posts `record` for emission.
    ///
    /// Returns `false` without side effects if the latch already fired or
    /// the processor is stopped.
    pub fn trigger(&self, record: IncidentRecord) -> bool {
        if self.state() == IncidentState::Stopped {
            debug!(kind = %record.type_tag, "incident ignored; processor stopped");
            return false;
        }
        if self
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(kind = %record.type_tag, "incident already latched");
            return false;
        }

        self.state.send_if_modified(|s| {
            if *s == IncidentState::Healthy {
                *s = IncidentState::Degraded;
                true
            } else {
                false
            }
        });

        warn!(
            kind = %record.type_tag,
            scenario = %record.scenario_tag,
            uptime_seconds = record.uptime_seconds,
            details = ?record.details,
            "INCIDENT TRIGGERED"
        );

        if self.events.send(record).is_err() {
            warn!("incident controller task is gone; alert not emitted");
        }
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Degraded from the moment the latch fires, for the rest of the lifetime.
    pub fn health(&self) -> HealthStatus {
        if self.is_triggered() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn state(&self) -> IncidentState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<IncidentState> {
        self.state.subscribe()
    }

    /// `HEALTHY | DEGRADED → SHUTTING_DOWN`. Returns whether it transitioned.
    pub(crate) fn begin_shutdown(&self) -> bool {
        self.state.send_if_modified(|s| match *s {
            IncidentState::Healthy | IncidentState::Degraded => {
                *s = IncidentState::ShuttingDown;
                true
            }
            IncidentState::ShuttingDown | IncidentState::Stopped => false,
        })
    }

    /// `* → STOPPED`. Returns whether it transitioned.
    pub(crate) fn mark_stopped(&self) -> bool {
        self.state.send_if_modified(|s| {
            if *s == IncidentState::Stopped {
                false
            } else {
                *s = IncidentState::Stopped;
                true
            }
        })
    }
}
