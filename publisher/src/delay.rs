use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{info, warn};

/// Maps the active scenario tag to the processing delay injected per item.
///
/// The table is fixed at construction; only the active tag changes. Unknown
/// tags are accepted and resolve to the default delay.
pub struct DelayPolicy {
    delays: BTreeMap<String, u64>,
    default_ms: u64,
    active: RwLock<String>,
}

impl DelayPolicy {
    pub fn new(
        delays: BTreeMap<String, u64>,
        default_ms: u64,
        initial_tag: impl Into<String>,
    ) -> Self {
        Self {
            delays,
            default_ms,
            active: RwLock::new(initial_tag.into()),
        }
    }

    /// Delay configured for `tag`, or the default.
    pub fn delay_ms_for(&self, tag: &str) -> u64 {
        self.delays.get(tag).copied().unwrap_or(self.default_ms)
    }

    pub fn current_tag(&self) -> String {
        self.active.read().clone()
    }

    /// Active tag and its delay, read under one lock.
    pub fn current(&self) -> (String, Duration) {
        let tag = self.active.read().clone();
        let delay = Duration::from_millis(self.delay_ms_for(&tag));
        (tag, delay)
    }

    /// Swaps the active tag, returning the previous one.
    pub fn switch(&self, tag: impl Into<String>) -> String {
        let tag = tag.into();
        let delay_ms = self.delay_ms_for(&tag);
        if !self.delays.contains_key(&tag) {
            warn!(
                tag = %tag,
                known = ?self.known_tags().collect::<Vec<_>>(),
                default_ms = self.default_ms,
                "unknown scenario; default delay applies"
            );
        }
        let previous = std::mem::replace(&mut *self.active.write(), tag.clone());

        info!(
            from = %previous,
            to = %tag,
            delay_ms,
            "scenario switched"
        );
        previous
    }

    pub fn known_tags(&self) -> impl Iterator<Item = &str> {
        self.delays.keys().map(String::as_str)
    }
}
