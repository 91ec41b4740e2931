mod support;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::{Instant, sleep};

use publisher::{
    HealthStatus, IncidentState, MEMORY_THRESHOLD_EXCEEDED, MarketDataProcessor, PublisherConfig,
};
use support::{
    FixedSampler, RecordingSink, SinkEvent, StepSampler, drain, next_incident, next_processed,
    snapshot,
};

fn config_with_grace(grace: Duration) -> PublisherConfig {
    PublisherConfig {
        grace_period: grace,
        ..PublisherConfig::default()
    }
}

// -----------------------
// Memory breach → grace → stop
// -----------------------

#[tokio::test(start_paused = true)]
async fn memory_breach_fires_once_and_stops_after_grace() {
    let (sink, mut rx) = RecordingSink::new();
    let sampler = StepSampler::new(Duration::from_secs(5), vec![100.0, 120.0, 160.0, 140.0]);
    let p = MarketDataProcessor::new(PublisherConfig::default(), sink, Arc::new(sampler)).unwrap();
    p.start().await.unwrap();

    let incident = next_incident(&mut rx).await;
    let triggered_at = Instant::now();

    assert_eq!(incident.type_tag, MEMORY_THRESHOLD_EXCEEDED);
    assert_eq!(incident.details["memory_usage_mb"], json!(160.0));
    assert_eq!(incident.details["threshold_mb"], json!(150.0));
    assert_eq!(incident.details["queue_size"], json!(0));
    assert_eq!(incident.scenario_tag, "stable-mode");
    assert!(incident.uptime_seconds >= 10.0);
    assert_eq!(p.state(), IncidentState::ShuttingDown);

    p.wait_stopped().await;
    assert!(triggered_at.elapsed() >= Duration::from_secs(30));

    let after: Vec<SinkEvent> = drain(&mut rx);
    assert!(after.iter().all(|e| !matches!(e, SinkEvent::Incident(_))));
    let heartbeats: Vec<_> = after
        .iter()
        .filter_map(|e| match e {
            SinkEvent::Heartbeat(hb) => Some(hb),
            _ => None,
        })
        .collect();
    assert!(!heartbeats.is_empty());
    assert!(heartbeats.iter().all(|hb| hb.status == HealthStatus::Degraded));

    let status = p.status();
    assert!(!status.running);
    assert!(status.incident_triggered);
    assert_eq!(status.state, IncidentState::Stopped);

    assert!(!p.stop().await);
}

#[tokio::test(start_paused = true)]
async fn reading_at_threshold_is_not_a_breach() {
    let (sink, mut rx) = RecordingSink::new();
    let p = MarketDataProcessor::new(PublisherConfig::default(), sink, Arc::new(FixedSampler(150.0)))
        .unwrap();
    p.start().await.unwrap();

    sleep(Duration::from_secs(20)).await;

    assert!(!p.status().incident_triggered);
    assert_eq!(p.state(), IncidentState::Healthy);
    p.stop().await;
    assert!(drain(&mut rx).iter().all(|e| !matches!(e, SinkEvent::Incident(_))));
}

// -----------------------
// Grace window
// -----------------------

#[tokio::test(start_paused = true)]
async fn processor_keeps_serving_during_grace() {
    let (sink, mut rx) = RecordingSink::new();
    let p = MarketDataProcessor::new(
        config_with_grace(Duration::from_secs(2)),
        sink,
        Arc::new(FixedSampler(40.0)),
    )
    .unwrap();
    p.start().await.unwrap();

    assert!(p.trigger_incident("manual_injection", BTreeMap::new()));
    assert!(!p.trigger_incident("manual_injection", BTreeMap::new()));
    let triggered_at = Instant::now();

    let status = p.status();
    assert!(status.incident_triggered);
    assert_eq!(status.state, IncidentState::Degraded);

    let incident = next_incident(&mut rx).await;
    assert_eq!(incident.type_tag, "manual_injection");
    assert_eq!(p.state(), IncidentState::ShuttingDown);

    assert!(p.enqueue(snapshot(1)));
    assert_eq!(next_processed(&mut rx).await.sequence_id, 1);

    sleep(Duration::from_millis(1_900).saturating_sub(triggered_at.elapsed())).await;
    assert_ne!(p.state(), IncidentState::Stopped);
    assert!(p.status().running);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(p.state(), IncidentState::Stopped);
    assert!(!p.enqueue(snapshot(2)));
}

#[tokio::test(start_paused = true)]
async fn stop_during_grace_is_immediate() {
    let (sink, mut rx) = RecordingSink::new();
    let p = MarketDataProcessor::new(
        config_with_grace(Duration::from_secs(30)),
        sink,
        Arc::new(FixedSampler(40.0)),
    )
    .unwrap();
    p.start().await.unwrap();

    p.trigger_incident("manual_injection", BTreeMap::new());
    next_incident(&mut rx).await;

    let before = Instant::now();
    assert!(p.stop().await);
    assert!(before.elapsed() < Duration::from_secs(1));
    assert_eq!(p.state(), IncidentState::Stopped);

    // The cancelled grace window must not produce a second shutdown.
    sleep(Duration::from_secs(60)).await;
    assert!(!p.stop().await);
}

// -----------------------
// Stop semantics
// -----------------------

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let (sink, _rx) = RecordingSink::new();
    let p = MarketDataProcessor::new(PublisherConfig::default(), sink, Arc::new(FixedSampler(40.0)))
        .unwrap();
    p.start().await.unwrap();

    assert!(p.stop().await);
    assert!(!p.stop().await);
    assert_eq!(p.state(), IncidentState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn concurrent_stops_transition_once() {
    let (sink, _rx) = RecordingSink::new();
    let p = MarketDataProcessor::new(PublisherConfig::default(), sink, Arc::new(FixedSampler(40.0)))
        .unwrap();
    p.start().await.unwrap();

    let (a, b) = tokio::join!(p.stop(), p.stop());
    assert!(a ^ b);
}

#[tokio::test(start_paused = true)]
async fn nothing_is_emitted_after_stop() {
    let (sink, mut rx) = RecordingSink::new();
    let p = MarketDataProcessor::new(PublisherConfig::default(), sink, Arc::new(FixedSampler(40.0)))
        .unwrap();
    p.start().await.unwrap();
    p.enqueue(snapshot(1));
    next_processed(&mut rx).await;

    p.stop().await;
    drain(&mut rx);

    assert!(!p.trigger_incident("manual_injection", BTreeMap::new()));
    assert!(!p.enqueue(snapshot(2)));
    sleep(Duration::from_secs(10)).await;

    assert!(drain(&mut rx).is_empty());
    let status = p.status();
    assert!(!status.incident_triggered);
    assert_eq!(status.received_count, 1);
}

#[tokio::test(start_paused = true)]
async fn wait_stopped_resolves_on_manual_stop() {
    let (sink, _rx) = RecordingSink::new();
    let p = Arc::new(
        MarketDataProcessor::new(PublisherConfig::default(), sink, Arc::new(FixedSampler(40.0)))
            .unwrap(),
    );
    p.start().await.unwrap();

    let waiter = {
        let p = p.clone();
        tokio::spawn(async move { p.wait_stopped().await })
    };

    sleep(Duration::from_secs(1)).await;
    assert!(!waiter.is_finished());

    p.stop().await;
    waiter.await.unwrap();
}
