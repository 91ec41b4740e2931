use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub received: Arc<AtomicU64>,
    pub processed: Arc<AtomicU64>,

    // loss and failure reasons
    pub dropped: Arc<AtomicU64>,
    pub record_failures: Arc<AtomicU64>,
    pub sink_failures: Arc<AtomicU64>,
}

impl Counters {
    /// Increments `counter` and returns the new value.
    pub fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
