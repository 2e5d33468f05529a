//! Interval monitoring: repeat dispatch + aggregate + persist until cancelled.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use common::api::{ActionRequest, Target};

use crate::config::EngineConfig;
use crate::dispatch;
use crate::endpoint::DynEndpointClient;
use crate::sink::ReportSink;
use crate::telemetry;

pub struct MonitorOptions {
    pub interval: Duration,
    /// Stop after this many cycles; `None` runs until cancelled.
    pub max_cycles: Option<u64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MonitorSummary {
    pub cycles: u64,
    pub persist_failures: u64,
}

/// Run dispatch cycles on a fixed interval until cancelled or the cycle cap
/// is reached.
///
/// The first cycle starts immediately. Cancellation during the sleep stops
/// the loop without starting another cycle; cancellation during a cycle lets
/// that cycle finish and persist before stopping. A sink failure is logged
/// and counted, never fatal — a single bad write must not end a long
/// monitoring run. Only engine misconfiguration aborts the loop.
pub async fn monitor_loop(
    targets: &[Target],
    action: &ActionRequest,
    client: DynEndpointClient,
    cfg: &EngineConfig,
    sink: &dyn ReportSink,
    mut shutdown: watch::Receiver<bool>,
    options: MonitorOptions,
) -> anyhow::Result<MonitorSummary> {
    cfg.validate()?;

    let interval = options.interval.max(Duration::from_millis(10));
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut summary = MonitorSummary::default();

    info!(
        targets = targets.len(),
        action = %action.kind,
        interval_secs = interval.as_secs_f64(),
        "monitoring started"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let report = dispatch::run_cycle(
                    targets,
                    action,
                    client.clone(),
                    cfg,
                    shutdown.clone(),
                )
                .await?;

                summary.cycles += 1;

                if let Err(err) = sink.write(&report) {
                    summary.persist_failures += 1;
                    telemetry::record_persist_failure();
                    warn!(error = %err, cycle = summary.cycles, "failed to persist cycle report; continuing");
                }

                info!(
                    cycle = summary.cycles,
                    total = report.total,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    skipped = report.skipped,
                    "monitoring cycle complete"
                );

                if options.max_cycles.is_some_and(|max| summary.cycles >= max) {
                    break;
                }
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(cycles = summary.cycles, "monitoring stopped");
    Ok(summary)
}
