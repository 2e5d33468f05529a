mod support;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use common::api::{ActionKind, ActionRequest};
use engine::dispatch;
use engine::endpoint::DynEndpointClient;
use engine::monitor::{monitor_loop, MonitorOptions, MonitorSummary};
use engine::sink::CsvFileSink;

use support::{fast_config, target, InstrumentedClient, MemorySink};

#[tokio::test]
async fn persists_exactly_the_requested_cycles_spaced_by_the_interval() {
    let client = Arc::new(InstrumentedClient::default());
    let sink = MemorySink::default();
    let targets = vec![target("10.0.0.1"), target("10.0.0.2")];
    let interval = Duration::from_millis(80);

    let (_tx, rx) = watch::channel(false);
    let summary = monitor_loop(
        &targets,
        &ActionRequest::new(ActionKind::Metrics),
        client as DynEndpointClient,
        &fast_config(),
        &sink,
        rx,
        MonitorOptions {
            interval,
            max_cycles: Some(3),
        },
    )
    .await
    .expect("monitor run");

    assert_eq!(summary.cycles, 3);

    let reports = sink.reports();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.total == 2));

    for pair in reports.windows(2) {
        let gap = pair[1].timestamp - pair[0].timestamp;
        let gap = gap.to_std().expect("monotonic timestamps");
        assert!(
            gap >= interval.mul_f64(0.75),
            "cycles must be spaced by the interval, observed gap {gap:?}"
        );
    }
}

#[tokio::test]
async fn cancellation_during_sleep_prevents_a_further_cycle() {
    let client = Arc::new(InstrumentedClient::default());
    let sink = Arc::new(MemorySink::default());
    let targets = vec![target("10.0.0.1")];
    let interval = Duration::from_millis(300);

    let (tx, rx) = watch::channel(false);
    let loop_sink = sink.clone();
    let handle = tokio::spawn({
        let targets = targets.clone();
        let cfg = fast_config();
        async move {
            monitor_loop(
                &targets,
                &ActionRequest::new(ActionKind::Status),
                client as DynEndpointClient,
                &cfg,
                loop_sink.as_ref(),
                rx,
                MonitorOptions {
                    interval,
                    max_cycles: None,
                },
            )
            .await
        }
    });

    // Wait for the third report, then cancel inside the following sleep.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while sink.count() < 3 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "three cycles should have completed by now"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tx.send(true).expect("send shutdown");

    let summary: MonitorSummary = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop must stop promptly")
        .expect("loop task must not panic")
        .expect("loop must exit cleanly");

    assert_eq!(summary.cycles, 3);
    // No fourth report may appear after cancellation.
    tokio::time::sleep(interval * 2).await;
    assert_eq!(sink.count(), 3);
}

#[tokio::test]
async fn monitoring_appends_a_growing_csv_history() {
    let client = Arc::new(InstrumentedClient::default());
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fleet_history.csv");
    let sink = CsvFileSink::appending(&path);
    let targets = vec![target("10.0.0.1"), target("10.0.0.2")];

    let (_tx, rx) = watch::channel(false);
    let summary = monitor_loop(
        &targets,
        &ActionRequest::new(ActionKind::Metrics),
        client as DynEndpointClient,
        &fast_config(),
        &sink,
        rx,
        MonitorOptions {
            interval: Duration::from_millis(30),
            max_cycles: Some(2),
        },
    )
    .await
    .expect("monitor run");

    assert_eq!(summary.cycles, 2);
    assert_eq!(summary.persist_failures, 0);

    let body = std::fs::read_to_string(&path).expect("history exists");
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 5, "header + 2 cycles x 2 targets");
    assert!(lines[0].starts_with("timestamp,"));
}

#[tokio::test]
async fn monitor_rejects_engine_misconfiguration_before_any_cycle() {
    let client = Arc::new(InstrumentedClient::default());
    let sink = MemorySink::default();
    let targets = vec![target("10.0.0.1")];
    let cfg = engine::config::EngineConfig {
        max_concurrency: 0,
        ..fast_config()
    };

    let (_tx, rx) = watch::channel(false);
    let err = monitor_loop(
        &targets,
        &ActionRequest::new(ActionKind::Status),
        client.clone() as DynEndpointClient,
        &cfg,
        &sink,
        rx,
        MonitorOptions {
            interval: Duration::from_millis(20),
            max_cycles: Some(1),
        },
    )
    .await
    .expect_err("must reject");

    assert!(err.to_string().contains("max_concurrency"));
    assert_eq!(sink.count(), 0);
    assert_eq!(client.connect_calls(), 0);
}

#[tokio::test]
async fn one_shot_cycle_and_monitor_share_dispatch_semantics() {
    let client = Arc::new(InstrumentedClient::default());
    let targets = vec![target("10.0.0.1"), target("10.0.0.2")];

    let (_tx, rx) = watch::channel(false);
    let report = dispatch::run_cycle(
        &targets,
        &ActionRequest::detailed_status(),
        client as DynEndpointClient,
        &fast_config(),
        rx,
    )
    .await
    .expect("cycle runs");

    assert_eq!(report.total, 2);
    assert_eq!(report.action, ActionKind::Status);
    assert!(report.is_all_success());
}
