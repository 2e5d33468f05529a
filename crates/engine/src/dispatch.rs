//! Bounded-concurrency fan-out of one action across the target list.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::StreamExt;
use tokio::sync::watch;
use tracing::debug;

use common::api::{ActionKind, ActionOutcome, ActionRequest, CycleReport, ErrorClass, Target};

use crate::aggregate;
use crate::config::EngineConfig;
use crate::endpoint::DynEndpointClient;
use crate::retry;
use crate::telemetry;

/// Apply `action` to every target with at most `max_concurrency` in flight.
///
/// Returns exactly one outcome per target, in registry order regardless of
/// completion order. Per-target failures, retries, and timeouts never escape
/// as errors; only engine-level misconfiguration fails the call before any
/// dispatch begins.
pub async fn dispatch(
    targets: &[Target],
    action: &ActionRequest,
    client: DynEndpointClient,
    cfg: &EngineConfig,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Vec<ActionOutcome>> {
    cfg.validate()?;
    validate_action(action)?;

    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let policy = cfg.retry_policy();
    let target_timeout = cfg.target_timeout();

    let mut units = futures_util::stream::iter(targets.iter().cloned().enumerate().map(
        |(idx, target)| {
            let client = client.clone();
            let action = action.clone();
            let policy = policy.clone();
            let shutdown = shutdown.clone();
            async move {
                // Shared with the retry wrapper so a timed-out target still
                // reports how many attempts it got through.
                let attempts = Arc::new(AtomicU32::new(0));
                let started = Instant::now();

                let result = tokio::time::timeout(
                    target_timeout,
                    retry::run_with_retry(
                        client.as_ref(),
                        &target,
                        &action,
                        &policy,
                        shutdown,
                        attempts.clone(),
                    ),
                )
                .await;

                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(_) => retry::failure_outcome(
                        &target,
                        &action,
                        ErrorClass::Timeout,
                        format!("target deadline of {target_timeout:?} exceeded"),
                        attempts.load(Ordering::SeqCst),
                        started.elapsed(),
                    ),
                };

                (idx, outcome)
            }
        },
    ))
    .buffer_unordered(cfg.max_concurrency.max(1));

    let mut indexed: Vec<(usize, ActionOutcome)> = Vec::with_capacity(targets.len());
    while let Some(pair) = units.next().await {
        debug!(
            endpoint = %pair.1.address,
            outcome = pair.1.kind.as_str(),
            attempts = pair.1.attempts,
            "target completed"
        );
        indexed.push(pair);
    }

    indexed.sort_by_key(|(idx, _)| *idx);
    Ok(indexed.into_iter().map(|(_, outcome)| outcome).collect())
}

/// One full dispatch + aggregate pass, with cycle metrics recorded.
pub async fn run_cycle(
    targets: &[Target],
    action: &ActionRequest,
    client: DynEndpointClient,
    cfg: &EngineConfig,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<CycleReport> {
    let started = Instant::now();
    let outcomes = dispatch(targets, action, client, cfg, shutdown).await?;
    let report = aggregate::aggregate(action.kind, outcomes);
    telemetry::record_cycle(&report, started.elapsed());
    Ok(report)
}

fn validate_action(action: &ActionRequest) -> anyhow::Result<()> {
    if action.kind == ActionKind::SetPowerPolicy
        && action.policy.as_deref().map_or(true, |p| p.trim().is_empty())
    {
        anyhow::bail!("set-power-policy requires a non-empty policy value");
    }
    Ok(())
}
