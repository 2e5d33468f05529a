//! Bounded retry with jittered exponential backoff around one endpoint action.
//!
//! Every action kind goes through this one wrapper so retry semantics are
//! identical and testable in one place. Terminal and auth failures are never
//! retried; only transient ones are worth another attempt.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::watch;
use tracing::warn;

use common::api::{
    ActionOutcome, ActionPayload, ActionRequest, ErrorClass, OutcomeKind, Target,
};

use crate::endpoint::{EndpointClient, EndpointError};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per target, including the first one.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

/// Exponential backoff capped at `max`, plus up to 50% random jitter so a
/// fleet of failing targets does not retry in lockstep.
pub fn backoff_with_jitter(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
    let mut backoff = base.saturating_mul(exp);
    if backoff > max {
        backoff = max;
    }
    let jitter_max = backoff.as_millis() / 2;
    let jitter_ms: u128 = rand::rng().random_range(0..=jitter_max.max(1));
    backoff + Duration::from_millis(jitter_ms as u64)
}

/// Apply one action to one target, retrying transient failures.
///
/// Always produces an outcome; endpoint failures never escape as errors.
/// `attempts_made` is shared with the dispatcher so a timed-out target still
/// reports how far it got.
pub async fn run_with_retry(
    client: &dyn EndpointClient,
    target: &Target,
    action: &ActionRequest,
    policy: &RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
    attempts_made: Arc<AtomicU32>,
) -> ActionOutcome {
    let started = Instant::now();

    if *shutdown.borrow() {
        return skipped_outcome(target, action, "cancelled before dispatch", 0, started.elapsed());
    }

    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        attempts_made.store(attempt, Ordering::Relaxed);

        let result = tokio::select! {
            _ = shutdown.changed() => {
                return skipped_outcome(
                    target,
                    action,
                    "cancelled while in flight",
                    attempt,
                    started.elapsed(),
                );
            }
            res = attempt_once(client, target, action) => res,
        };

        match result {
            Ok(payload) => {
                return success_outcome(target, action, payload, attempt, started.elapsed());
            }
            Err(err) => {
                if !err.is_retryable() || attempt >= max_attempts {
                    return failure_outcome(
                        target,
                        action,
                        err.class(),
                        err.to_string(),
                        attempt,
                        started.elapsed(),
                    );
                }

                let backoff =
                    backoff_with_jitter(policy.backoff_base, policy.backoff_max, attempt);
                warn!(
                    endpoint = %target.address,
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis(),
                    error = %err,
                    "attempt failed, backing off"
                );

                tokio::select! {
                    _ = shutdown.changed() => {
                        return skipped_outcome(
                            target,
                            action,
                            "cancelled during backoff",
                            attempt,
                            started.elapsed(),
                        );
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }
}

async fn attempt_once(
    client: &dyn EndpointClient,
    target: &Target,
    action: &ActionRequest,
) -> Result<ActionPayload, EndpointError> {
    let session = client.connect(target).await?;
    let result = client.perform(target, &session, action).await;
    client.close(session).await;
    result
}

pub fn success_outcome(
    target: &Target,
    action: &ActionRequest,
    payload: ActionPayload,
    attempts: u32,
    elapsed: Duration,
) -> ActionOutcome {
    ActionOutcome {
        address: target.address.clone(),
        name: target.name.clone(),
        group: target.group.clone(),
        action: action.kind,
        kind: OutcomeKind::Success,
        payload: Some(payload),
        error_class: None,
        error: None,
        attempts,
        elapsed_ms: elapsed.as_millis() as u64,
    }
}

pub fn failure_outcome(
    target: &Target,
    action: &ActionRequest,
    class: ErrorClass,
    message: String,
    attempts: u32,
    elapsed: Duration,
) -> ActionOutcome {
    ActionOutcome {
        address: target.address.clone(),
        name: target.name.clone(),
        group: target.group.clone(),
        action: action.kind,
        kind: OutcomeKind::Failed,
        payload: None,
        error_class: Some(class),
        error: Some(message),
        attempts,
        elapsed_ms: elapsed.as_millis() as u64,
    }
}

pub fn skipped_outcome(
    target: &Target,
    action: &ActionRequest,
    reason: &str,
    attempts: u32,
    elapsed: Duration,
) -> ActionOutcome {
    ActionOutcome {
        address: target.address.clone(),
        name: target.name.clone(),
        group: target.group.clone(),
        action: action.kind,
        kind: OutcomeKind::Skipped,
        payload: None,
        error_class: None,
        error: Some(reason.to_string()),
        attempts,
        elapsed_ms: elapsed.as_millis() as u64,
    }
}
