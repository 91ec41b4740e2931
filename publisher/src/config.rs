use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::PublisherError;

#[derive(Clone, Debug)]
pub struct PublisherConfig {
    // =========================
    // Ingest configuration
    // =========================
    /// Maximum number of snapshots buffered between the producer and the
    /// processing loop.
    ///
    /// When full, the oldest snapshot is evicted to make room:
    /// - the producer never blocks
    /// - the buffer stays representative of "now"
    pub queue_capacity: usize,

    // =========================
    // Scenario configuration
    // =========================
    /// Injected processing delay per scenario tag (milliseconds).
    ///
    /// High-delay scenarios are what builds backlog and memory pressure.
    pub scenario_delays: BTreeMap<String, u64>,

    /// Delay applied to tags missing from `scenario_delays`.
    pub default_delay_ms: u64,

    /// Scenario active at construction.
    pub initial_scenario: String,

    // =========================
    // Health configuration
    // =========================
    /// Resident memory (MB) above which the incident latch fires.
    pub memory_threshold_mb: f64,

    /// Cadence of heartbeat emission, independent of traffic.
    pub heartbeat_interval: Duration,

    /// Pause after a failed heartbeat build before the next attempt.
    pub heartbeat_error_backoff: Duration,

    /// Cadence of resource sampling.
    pub monitor_interval: Duration,

    /// Time between incident trigger and full shutdown. The processor keeps
    /// serving, reporting degraded, during this window.
    pub grace_period: Duration,

    // =========================
    // Observability
    // =========================
    /// Sink calls slower than this are reported on the `performance` target.
    pub slow_sink_warning: Duration,

    /// Log queue occupancy every N accepted snapshots.
    pub received_log_every: u64,

    /// Log processing metrics every N processed snapshots.
    pub processed_log_every: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        let scenario_delays = [
            ("stable-mode", 10),
            ("burst-mode", 100),
            ("gradual-spike", 50),
            ("extreme-spike", 200),
        ]
        .into_iter()
        .map(|(tag, ms)| (tag.to_string(), ms))
        .collect();

        Self {
            queue_capacity: 10_000,

            scenario_delays,
            default_delay_ms: 50,
            initial_scenario: "stable-mode".to_string(),

            memory_threshold_mb: 150.0,
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_error_backoff: Duration::from_secs(1),
            monitor_interval: Duration::from_secs(5),
            grace_period: Duration::from_secs(30),

            slow_sink_warning: Duration::from_millis(250),
            received_log_every: 100,
            processed_log_every: 50,
        }
    }
}

impl PublisherConfig {
    /// Reads `PUBLISHER_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, PublisherError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injected variable source.
    ///
    /// Recognised keys:
    /// - `PUBLISHER_QUEUE_CAPACITY`
    /// - `PUBLISHER_SCENARIO_DELAYS` (`tag=ms,tag=ms`, merged over the defaults)
    /// - `PUBLISHER_DEFAULT_DELAY_MS`
    /// - `PUBLISHER_INITIAL_SCENARIO`
    /// - `PUBLISHER_MEMORY_THRESHOLD_MB`
    /// - `PUBLISHER_HEARTBEAT_INTERVAL_MS`
    /// - `PUBLISHER_MONITOR_INTERVAL_MS`
    /// - `PUBLISHER_GRACE_PERIOD_SECS`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PublisherError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("PUBLISHER_QUEUE_CAPACITY") {
            cfg.queue_capacity = parse("PUBLISHER_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("PUBLISHER_SCENARIO_DELAYS") {
            cfg.scenario_delays.extend(parse_delay_table(&v)?);
        }
        if let Some(v) = lookup("PUBLISHER_DEFAULT_DELAY_MS") {
            cfg.default_delay_ms = parse("PUBLISHER_DEFAULT_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("PUBLISHER_INITIAL_SCENARIO") {
            cfg.initial_scenario = v.trim().to_string();
        }
        if let Some(v) = lookup("PUBLISHER_MEMORY_THRESHOLD_MB") {
            cfg.memory_threshold_mb = parse("PUBLISHER_MEMORY_THRESHOLD_MB", &v)?;
        }
        if let Some(v) = lookup("PUBLISHER_HEARTBEAT_INTERVAL_MS") {
            cfg.heartbeat_interval =
                Duration::from_millis(parse("PUBLISHER_HEARTBEAT_INTERVAL_MS", &v)?);
        }
        if let Some(v) = lookup("PUBLISHER_MONITOR_INTERVAL_MS") {
            cfg.monitor_interval =
                Duration::from_millis(parse("PUBLISHER_MONITOR_INTERVAL_MS", &v)?);
        }
        if let Some(v) = lookup("PUBLISHER_GRACE_PERIOD_SECS") {
            cfg.grace_period = Duration::from_secs(parse("PUBLISHER_GRACE_PERIOD_SECS", &v)?);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values that would make the loops spin or the queue unusable.
    pub fn validate(&self) -> Result<(), PublisherError> {
        if self.queue_capacity == 0 {
            return Err(PublisherError::Config("queue_capacity must be >= 1".into()));
        }
        if self.heartbeat_interval.is_zero() || self.monitor_interval.is_zero() {
            return Err(PublisherError::Config(
                "heartbeat and monitor intervals must be non-zero".into(),
            ));
        }
        if self.received_log_every == 0 || self.processed_log_every == 0 {
            return Err(PublisherError::Config("log cadences must be >= 1".into()));
        }
        if !self.memory_threshold_mb.is_finite() {
            return Err(PublisherError::Config(
                "memory_threshold_mb must be finite".into(),
            ));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, PublisherError> {
    raw.trim()
        .parse()
        .map_err(|_| PublisherError::Config(format!("{key}: cannot parse {raw:?}")))
}

fn parse_delay_table(raw: &str) -> Result<BTreeMap<String, u64>, PublisherError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (tag, ms) = entry.split_once('=').ok_or_else(|| {
                PublisherError::Config(format!("PUBLISHER_SCENARIO_DELAYS: bad entry {entry:?}"))
            })?;
            Ok((tag.trim().to_string(), parse("PUBLISHER_SCENARIO_DELAYS", ms)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_mirror_incident_profile() {
        let cfg = PublisherConfig::default();

        assert_eq!(cfg.queue_capacity, 10_000);
        assert_eq!(cfg.scenario_delays["burst-mode"], 100);
        assert_eq!(cfg.initial_scenario, "stable-mode");
        assert_eq!(cfg.memory_threshold_mb, 150.0);
        assert_eq!(cfg.grace_period, Duration::from_secs(30));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let cfg = PublisherConfig::from_lookup(lookup(&[
            ("PUBLISHER_QUEUE_CAPACITY", "3"),
            ("PUBLISHER_SCENARIO_DELAYS", "burst-mode=250, replay=0"),
            ("PUBLISHER_MEMORY_THRESHOLD_MB", "512.5"),
            ("PUBLISHER_HEARTBEAT_INTERVAL_MS", "200"),
            ("PUBLISHER_GRACE_PERIOD_SECS", "2"),
        ]))
        .unwrap();

        assert_eq!(cfg.queue_capacity, 3);
        assert_eq!(cfg.scenario_delays["burst-mode"], 250);
        assert_eq!(cfg.scenario_delays["replay"], 0);
        assert_eq!(cfg.scenario_delays["stable-mode"], 10);
        assert_eq!(cfg.memory_threshold_mb, 512.5);
        assert_eq!(cfg.heartbeat_interval, Duration::from_millis(200));
        assert_eq!(cfg.grace_period, Duration::from_secs(2));
    }

    #[test]
    fn unparsable_value_is_a_config_error() {
        let err = PublisherConfig::from_lookup(lookup(&[("PUBLISHER_QUEUE_CAPACITY", "lots")]))
            .unwrap_err();
        assert!(matches!(err, PublisherError::Config(_)));

        let err =
            PublisherConfig::from_lookup(lookup(&[("PUBLISHER_SCENARIO_DELAYS", "burst-mode")]))
                .unwrap_err();
        assert!(err.to_string().contains("bad entry"));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = PublisherConfig::from_lookup(lookup(&[("PUBLISHER_QUEUE_CAPACITY", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }
}
