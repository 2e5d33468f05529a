//! Shared DTOs used across the engine and CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One managed endpoint (server BMC or storage-cluster control plane).
///
/// Immutable for the duration of a dispatch cycle; the registry replaces
/// targets wholesale between monitoring iterations, never patches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// IP address or hostname of the management endpoint.
    pub address: String,
    /// Optional human-readable name (falls back to the address in output).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional group/cluster label used for report rollups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub username: String,
    /// Password or API token. Never serialized into reports.
    #[serde(skip_serializing)]
    pub secret: String,
    /// Optional authentication domain (storage clusters use `local` style domains).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_domain: Option<String>,
}

impl Target {
    /// Group label used for rollups; ungrouped targets share one bucket.
    pub fn group_label(&self) -> &str {
        self.group.as_deref().unwrap_or(UNGROUPED)
    }
}

/// Rollup bucket for targets without a group label.
pub const UNGROUPED: &str = "ungrouped";

/// Named operation applied uniformly to every target in a cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// Inventory and health query (model, serial, power state, health).
    Status,
    PowerOn,
    /// Graceful OS shutdown via the BMC.
    PowerOffGraceful,
    /// Immediate power cut.
    PowerOffForced,
    GetPowerPolicy,
    SetPowerPolicy,
    /// Power draw and CPU utilization readings.
    Metrics,
}

impl ActionKind {
    /// Canonical kebab-case representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Status => "status",
            ActionKind::PowerOn => "power-on",
            ActionKind::PowerOffGraceful => "power-off-graceful",
            ActionKind::PowerOffForced => "power-off-forced",
            ActionKind::GetPowerPolicy => "get-power-policy",
            ActionKind::SetPowerPolicy => "set-power-policy",
            ActionKind::Metrics => "metrics",
        }
    }

    /// Whether dispatch must pass the confirmation gate first.
    ///
    /// Matches the operations the interactive tool prompted for: anything
    /// that changes endpoint state, not just the forced power cut.
    pub fn requires_confirmation(&self) -> bool {
        matches!(
            self,
            ActionKind::PowerOn
                | ActionKind::PowerOffGraceful
                | ActionKind::PowerOffForced
                | ActionKind::SetPowerPolicy
        )
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action plus its parameters, constructed once per invocation/cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub kind: ActionKind,
    /// Target policy value for `set-power-policy`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    /// Fetch the expensive extras (watts, CPU) on `status`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub detailed: bool,
}

impl ActionRequest {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            policy: None,
            detailed: false,
        }
    }

    pub fn set_power_policy(policy: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::SetPowerPolicy,
            policy: Some(policy.into()),
            detailed: false,
        }
    }

    pub fn detailed_status() -> Self {
        Self {
            kind: ActionKind::Status,
            policy: None,
            detailed: true,
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Failure classification driving retry decisions (wire format lowercase).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Network timeout, connection refused, 5xx, rate-limited. Retried.
    Transient,
    /// Malformed request, unexpected 4xx. Not retried.
    Terminal,
    /// Credentials rejected. Not retried.
    Auth,
    /// Per-target deadline exceeded. Terminal for the cycle.
    Timeout,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Terminal => "terminal",
            ErrorClass::Auth => "auth",
            ErrorClass::Timeout => "timeout",
        }
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

/// Action-specific structured data carried by a successful outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionPayload {
    Status(StatusPayload),
    Metrics(MetricsPayload),
    Power(PowerPayload),
    Policy(PolicyPayload),
}

/// Inventory and health snapshot of one system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatusPayload {
    pub model: Option<String>,
    pub serial: Option<String>,
    pub power_state: Option<String>,
    pub health: Option<String>,
    pub bios_version: Option<String>,
    /// Present only for detailed status queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watts: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MetricsPayload {
    pub watts: Option<f64>,
    pub cpu_percent: Option<f64>,
}

/// Result of a power transition request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerPayload {
    /// Reset type submitted to the endpoint (`On`, `GracefulShutdown`, `ForceOff`).
    pub reset_type: String,
    /// False when the system was already in the requested state.
    pub state_changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PolicyPayload {
    pub policy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
}

/// Terminal disposition of one target within one cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Success,
    Failed,
    Skipped,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Failed => "failed",
            OutcomeKind::Skipped => "skipped",
        }
    }
}

/// Result of applying one action to one target. Immutable once produced;
/// exactly one exists per target per dispatch cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub action: ActionKind,
    pub kind: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ActionPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempts actually made, including the successful one.
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl ActionOutcome {
    pub fn group_label(&self) -> &str {
        self.group.as_deref().unwrap_or(UNGROUPED)
    }

    pub fn is_failed(&self) -> bool {
        self.kind == OutcomeKind::Failed
    }
}

/// Per-group subtotal within a cycle report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRollup {
    pub group: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Aggregation of all outcomes for one dispatch cycle.
///
/// Counts are always consistent with the outcome list and the outcome list
/// preserves registry order regardless of completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: ActionKind,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Rollups sorted by group label for deterministic output.
    pub groups: Vec<GroupRollup>,
    pub outcomes: Vec<ActionOutcome>,
}

impl CycleReport {
    /// Overall success means no target failed (skipped targets do not fail a run).
    pub fn is_all_success(&self) -> bool {
        self.failed == 0
    }

    /// Sum of power readings across successful outcomes, when present.
    pub fn total_watts(&self) -> Option<f64> {
        let readings: Vec<f64> = self
            .outcomes
            .iter()
            .filter_map(|o| match &o.payload {
                Some(ActionPayload::Metrics(m)) => m.watts,
                Some(ActionPayload::Status(s)) => s.watts,
                _ => None,
            })
            .collect();
        if readings.is_empty() {
            None
        } else {
            Some(readings.iter().sum())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kind_round_trips_kebab_case() {
        let json = serde_json::to_string(&ActionKind::PowerOffGraceful).expect("serialize");
        assert_eq!(json, "\"power-off-graceful\"");
        let parsed: ActionKind = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, ActionKind::PowerOffGraceful);
        assert_eq!(parsed.as_str(), "power-off-graceful");
    }

    #[test]
    fn mutating_actions_require_confirmation() {
        assert!(ActionKind::PowerOffForced.requires_confirmation());
        assert!(ActionKind::PowerOn.requires_confirmation());
        assert!(ActionKind::SetPowerPolicy.requires_confirmation());
        assert!(!ActionKind::Status.requires_confirmation());
        assert!(!ActionKind::Metrics.requires_confirmation());
        assert!(!ActionKind::GetPowerPolicy.requires_confirmation());
    }

    #[test]
    fn secrets_never_serialize() {
        let target = Target {
            address: "10.0.0.1".into(),
            name: None,
            group: Some("rack-a".into()),
            username: "Administrator".into(),
            secret: "hunter2".into(),
            auth_domain: None,
        };
        let json = serde_json::to_string(&target).expect("serialize");
        assert!(!json.contains("hunter2"));
        assert!(json.contains("10.0.0.1"));
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(ErrorClass::Transient.is_retryable());
        assert!(!ErrorClass::Terminal.is_retryable());
        assert!(!ErrorClass::Auth.is_retryable());
        assert!(!ErrorClass::Timeout.is_retryable());
    }

    #[test]
    fn total_watts_sums_metrics_and_status_readings() {
        let outcome = |watts: Option<f64>| ActionOutcome {
            address: "10.0.0.1".into(),
            name: None,
            group: None,
            action: ActionKind::Metrics,
            kind: OutcomeKind::Success,
            payload: Some(ActionPayload::Metrics(MetricsPayload {
                watts,
                cpu_percent: None,
            })),
            error_class: None,
            error: None,
            attempts: 1,
            elapsed_ms: 5,
        };

        let report = CycleReport {
            cycle_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: ActionKind::Metrics,
            total: 3,
            succeeded: 3,
            failed: 0,
            skipped: 0,
            groups: Vec::new(),
            outcomes: vec![outcome(Some(210.0)), outcome(Some(190.0)), outcome(None)],
        };

        assert_eq!(report.total_watts(), Some(400.0));
        assert!(report.is_all_success());
    }
}
