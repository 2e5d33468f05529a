//! Pure aggregation of per-target outcomes into one cycle report.

use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use common::api::{ActionKind, ActionOutcome, CycleReport, GroupRollup, OutcomeKind};

/// Build a [`CycleReport`] from the outcomes of one dispatch cycle.
///
/// Outcome ordering is preserved as given (the dispatcher already restored
/// registry order); rollups are keyed by group label and sorted. An empty
/// outcome list produces an all-zero report, not an error.
pub fn aggregate(action: ActionKind, outcomes: Vec<ActionOutcome>) -> CycleReport {
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;
    let mut groups: BTreeMap<String, GroupRollup> = BTreeMap::new();

    for outcome in &outcomes {
        let rollup = groups
            .entry(outcome.group_label().to_string())
            .or_insert_with(|| GroupRollup {
                group: outcome.group_label().to_string(),
                total: 0,
                succeeded: 0,
                failed: 0,
                skipped: 0,
            });
        rollup.total += 1;

        match outcome.kind {
            OutcomeKind::Success => {
                succeeded += 1;
                rollup.succeeded += 1;
            }
            OutcomeKind::Failed => {
                failed += 1;
                rollup.failed += 1;
            }
            OutcomeKind::Skipped => {
                skipped += 1;
                rollup.skipped += 1;
            }
        }
    }

    CycleReport {
        cycle_id: Uuid::new_v4(),
        timestamp: Utc::now(),
        action,
        total: outcomes.len(),
        succeeded,
        failed,
        skipped,
        groups: groups.into_values().collect(),
        outcomes,
    }
}
