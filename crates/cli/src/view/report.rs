//! Cycle report rendering for operators.

use common::api::{ActionOutcome, ActionPayload, CycleReport, OutcomeKind, UNGROUPED};

use super::table::render_table;

/// Render the per-target table, group rollups, and summary line.
pub fn render_report(report: &CycleReport) -> String {
    let mut sections = Vec::new();

    let headers = [
        "ADDRESS", "NAME", "GROUP", "OUTCOME", "ATTEMPTS", "TIME_MS", "DETAIL",
    ];
    let rows: Vec<Vec<String>> = report
        .outcomes
        .iter()
        .map(|outcome| {
            vec![
                outcome.address.clone(),
                outcome.name.clone().unwrap_or_default(),
                outcome.group.clone().unwrap_or_default(),
                outcome.kind.as_str().to_string(),
                outcome.attempts.to_string(),
                outcome.elapsed_ms.to_string(),
                detail_column(outcome),
            ]
        })
        .collect();
    sections.push(render_table(&headers, &rows));

    if report.groups.iter().any(|g| g.group != UNGROUPED) {
        let rollups: Vec<String> = report
            .groups
            .iter()
            .map(|g| format!("  {}: {}/{} succeeded", g.group, g.succeeded, g.total))
            .collect();
        sections.push(format!("Per-group:\n{}", rollups.join("\n")));
    }

    let mut summary = format!(
        "{} complete: {}/{} succeeded ({} failed, {} skipped)",
        report.action, report.succeeded, report.total, report.failed, report.skipped
    );
    if let Some(total) = report.total_watts() {
        let readings = watt_readings(report);
        summary.push_str(&format!(
            "\nTotal power: {total:.1}W across {readings} of {} endpoints",
            report.total
        ));
        if readings > 0 {
            summary.push_str(&format!(" (avg {:.1}W)", total / readings as f64));
        }
    }
    sections.push(summary);

    sections.join("\n\n")
}

fn watt_readings(report: &CycleReport) -> usize {
    report
        .outcomes
        .iter()
        .filter(|o| match &o.payload {
            Some(ActionPayload::Metrics(m)) => m.watts.is_some(),
            Some(ActionPayload::Status(s)) => s.watts.is_some(),
            _ => false,
        })
        .count()
}

fn detail_column(outcome: &ActionOutcome) -> String {
    if outcome.kind != OutcomeKind::Success {
        let class = outcome
            .error_class
            .map(|c| format!("[{}] ", c.as_str()))
            .unwrap_or_default();
        return format!("{class}{}", outcome.error.clone().unwrap_or_default());
    }

    match &outcome.payload {
        Some(ActionPayload::Status(s)) => {
            let mut parts = Vec::new();
            if let Some(power) = &s.power_state {
                parts.push(format!("Pwr: {power}"));
            }
            if let Some(health) = &s.health {
                parts.push(format!("Health: {health}"));
            }
            if let Some(model) = &s.model {
                parts.push(model.clone());
            }
            if let Some(serial) = &s.serial {
                parts.push(format!("S/N: {serial}"));
            }
            if let Some(watts) = s.watts {
                parts.push(format!("{watts:.0}W"));
            }
            if let Some(cpu) = s.cpu_percent {
                parts.push(format!("CPU: {cpu:.1}%"));
            }
            parts.join(" | ")
        }
        Some(ActionPayload::Metrics(m)) => {
            let watts = m
                .watts
                .map(|w| format!("{w:.0}W"))
                .unwrap_or_else(|| "power unknown".into());
            let cpu = m
                .cpu_percent
                .map(|c| format!("CPU: {c:.1}%"))
                .unwrap_or_else(|| "CPU unknown".into());
            format!("{watts} | {cpu}")
        }
        Some(ActionPayload::Power(p)) => {
            if p.state_changed {
                format!("reset: {}", p.reset_type)
            } else {
                "already in requested state".into()
            }
        }
        Some(ActionPayload::Policy(p)) => match (&p.policy, p.allowed.is_empty()) {
            (Some(policy), true) => policy.clone(),
            (Some(policy), false) => format!("{policy} (allowed: {})", p.allowed.join(", ")),
            (None, _) => "no policy attribute exposed".into(),
        },
        None => String::new(),
    }
}
