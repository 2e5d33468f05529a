//! Confirmation gate for destructive batch actions.
//!
//! One decision per batch, never per target. The decision is pure so command
//! handlers stay testable; reading the operator's answer from a terminal is
//! the caller's job.

use tracing::warn;

use common::api::ActionRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Granted,
    Declined,
}

impl Confirmation {
    pub fn is_granted(&self) -> bool {
        matches!(self, Confirmation::Granted)
    }
}

/// Decide whether dispatch may proceed for a whole batch.
///
/// Non-mutating actions pass unconditionally. The `assume_yes` bypass is
/// explicit, audited behavior, never a silent default.
pub fn evaluate(
    action: &ActionRequest,
    target_count: usize,
    answer: Option<&str>,
    assume_yes: bool,
) -> Confirmation {
    if !action.kind.requires_confirmation() {
        return Confirmation::Granted;
    }

    if assume_yes {
        warn!(
            action = %action.kind,
            targets = target_count,
            "confirmation bypassed via --yes"
        );
        return Confirmation::Granted;
    }

    match answer.map(|a| a.trim().to_ascii_lowercase()) {
        Some(a) if a == "y" || a == "yes" => Confirmation::Granted,
        _ => Confirmation::Declined,
    }
}
