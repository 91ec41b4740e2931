use async_trait::async_trait;
use chrono::{DateTime, Utc};
use publisher::{HeartbeatSnapshot, IncidentRecord, ProcessedRecord, Sink};
use serde::Serialize;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

/// Wire envelope shared by every published message.
#[derive(Debug, Serialize)]
struct Envelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: T,
    timestamp: DateTime<Utc>,
}

fn encode<T: Serialize>(kind: &str, data: T) -> anyhow::Result<String> {
    Ok(serde_json::to_string(&Envelope {
        kind,
        data,
        timestamp: Utc::now(),
    })?)
}

/// Publishes one JSON line per notification on stdout.
///
/// Writes go through tokio's stdout, so a slow reader stalls only the calling
/// loop (and shows up as a slow sink call), never a runtime worker.
pub struct StdoutSink {
    // Whole lines only; the three loops publish concurrently.
    out: Mutex<Stdout>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }

    async fn publish(&self, mut line: String) -> anyhow::Result<()> {
        line.push('\n');
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn on_processed(&self, record: ProcessedRecord) -> anyhow::Result<()> {
        self.publish(encode("orderbook_update", record)?).await
    }

    async fn on_heartbeat(&self, heartbeat: HeartbeatSnapshot) -> anyhow::Result<()> {
        self.publish(encode("heartbeat", heartbeat)?).await
    }

    async fn on_incident(&self, incident: IncidentRecord) -> anyhow::Result<()> {
        self.publish(encode("incident_alert", incident)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use publisher::HealthStatus;
    use serde_json::Value;
    use std::collections::BTreeMap;

    #[test]
    fn heartbeat_envelope_shape() {
        let hb = HeartbeatSnapshot {
            timestamp: Utc::now(),
            status: HealthStatus::Degraded,
            queue_size: 12,
            memory_usage_mb: 151.5,
            active_clients: 2,
            scenario_tag: "burst-mode".into(),
        };

        let v: Value = serde_json::from_str(&encode("heartbeat", hb).unwrap()).unwrap();

        assert_eq!(v["type"], "heartbeat");
        assert_eq!(v["data"]["status"], "degraded");
        assert_eq!(v["data"]["queue_size"], 12);
        assert!(v["timestamp"].is_string());
    }

    #[tokio::test]
    async fn concurrent_publishes_succeed() {
        let sink = std::sync::Arc::new(StdoutSink::new());
        let hb = HeartbeatSnapshot {
            timestamp: Utc::now(),
            status: HealthStatus::Healthy,
            queue_size: 0,
            memory_usage_mb: 12.0,
            active_clients: 0,
            scenario_tag: "stable-mode".into(),
        };

        let (a, b) = tokio::join!(sink.on_heartbeat(hb.clone()), sink.on_heartbeat(hb));
        assert!(a.is_ok() && b.is_ok());
    }

    #[test]
    fn incident_envelope_keeps_type_tag() {
        let incident = IncidentRecord {
            type_tag: "memory_threshold_exceeded".into(),
            timestamp: Utc::now(),
            details: BTreeMap::from([("memory_usage_mb".to_string(), serde_json::json!(160.0))]),
            scenario_tag: "extreme-spike".into(),
            uptime_seconds: 42.0,
        };

        let v: Value = serde_json::from_str(&encode("incident_alert", incident).unwrap()).unwrap();

        assert_eq!(v["type"], "incident_alert");
        assert_eq!(v["data"]["type"], "memory_threshold_exceeded");
        assert_eq!(v["data"]["details"]["memory_usage_mb"], 160.0);
    }
}
