//! Report sinks: durable, row-oriented persistence of cycle reports.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use common::api::{ActionPayload, CycleReport};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable destination for one cycle report.
///
/// A sink failure never aborts the cycle that produced the report; the
/// monitoring loop logs it and keeps going.
pub trait ReportSink: Send + Sync {
    fn write(&self, report: &CycleReport) -> Result<(), SinkError>;
}

/// Row-oriented CSV history, one row per target outcome.
///
/// Monitoring mode appends so the file grows into a history; one-shot mode
/// truncates for a fresh snapshot. The header is written whenever the file
/// is empty.
pub struct CsvFileSink {
    path: PathBuf,
    append: bool,
}

const CSV_HEADER: &str = "timestamp,cycle_id,action,address,name,group,outcome,attempts,\
                          elapsed_ms,error_class,error,power_state,health,model,serial,watts,cpu_percent";

impl CsvFileSink {
    pub fn appending(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append: true,
        }
    }

    pub fn truncating(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append: false,
        }
    }

    fn open(&self) -> Result<File, SinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = if self.append {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?
        } else {
            File::create(&self.path)?
        };
        Ok(file)
    }
}

impl ReportSink for CsvFileSink {
    fn write(&self, report: &CycleReport) -> Result<(), SinkError> {
        let mut file = self.open()?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{CSV_HEADER}")?;
        }

        let timestamp = report.timestamp.to_rfc3339();
        for outcome in &report.outcomes {
            let (power_state, health, model, serial, watts, cpu) = payload_columns(outcome.payload.as_ref());
            let row = [
                timestamp.clone(),
                report.cycle_id.to_string(),
                report.action.as_str().to_string(),
                outcome.address.clone(),
                outcome.name.clone().unwrap_or_default(),
                outcome.group.clone().unwrap_or_default(),
                outcome.kind.as_str().to_string(),
                outcome.attempts.to_string(),
                outcome.elapsed_ms.to_string(),
                outcome
                    .error_class
                    .map(|c| c.as_str().to_string())
                    .unwrap_or_default(),
                outcome.error.clone().unwrap_or_default(),
                power_state,
                health,
                model,
                serial,
                watts,
                cpu,
            ];
            let encoded: Vec<String> = row.iter().map(|cell| escape_csv(cell)).collect();
            writeln!(file, "{}", encoded.join(","))?;
        }

        file.flush()?;
        debug!(path = %self.path.display(), rows = report.outcomes.len(), "report persisted");
        Ok(())
    }
}

/// One timestamped JSON file per cycle.
pub struct JsonSnapshotSink {
    dir: PathBuf,
}

impl JsonSnapshotSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn snapshot_path(&self, report: &CycleReport) -> PathBuf {
        let stamp = report.timestamp.format("%Y%m%dT%H%M%SZ");
        let short_id = &report.cycle_id.to_string()[..8];
        self.dir.join(format!("report-{stamp}-{short_id}.json"))
    }
}

impl ReportSink for JsonSnapshotSink {
    fn write(&self, report: &CycleReport) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.snapshot_path(report);
        let body = serde_json::to_vec_pretty(report)?;
        std::fs::write(&path, body)?;
        debug!(path = %path.display(), "snapshot persisted");
        Ok(())
    }
}

/// Writes to every inner sink; reports the first failure after trying all.
pub struct FanoutSink {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Box<dyn ReportSink>>) -> Self {
        Self { sinks }
    }
}

impl ReportSink for FanoutSink {
    fn write(&self, report: &CycleReport) -> Result<(), SinkError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(err) = sink.write(report) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn payload_columns(
    payload: Option<&ActionPayload>,
) -> (String, String, String, String, String, String) {
    let mut power_state = String::new();
    let mut health = String::new();
    let mut model = String::new();
    let mut serial = String::new();
    let mut watts = String::new();
    let mut cpu = String::new();

    match payload {
        Some(ActionPayload::Status(s)) => {
            power_state = s.power_state.clone().unwrap_or_default();
            health = s.health.clone().unwrap_or_default();
            model = s.model.clone().unwrap_or_default();
            serial = s.serial.clone().unwrap_or_default();
            watts = s.watts.map(|w| w.to_string()).unwrap_or_default();
            cpu = s.cpu_percent.map(|c| c.to_string()).unwrap_or_default();
        }
        Some(ActionPayload::Metrics(m)) => {
            watts = m.watts.map(|w| w.to_string()).unwrap_or_default();
            cpu = m.cpu_percent.map(|c| c.to_string()).unwrap_or_default();
        }
        Some(ActionPayload::Power(p)) => {
            power_state = p.reset_type.clone();
        }
        Some(ActionPayload::Policy(p)) => {
            power_state = p.policy.clone().unwrap_or_default();
        }
        None => {}
    }

    (power_state, health, model, serial, watts, cpu)
}

fn escape_csv(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Convenience for the monitoring loop: path per cycle for inspection/tests.
pub fn snapshot_path_for(dir: &Path, report: &CycleReport) -> PathBuf {
    JsonSnapshotSink::new(dir).snapshot_path(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::api::{ActionKind, ActionOutcome, OutcomeKind, StatusPayload};
    use uuid::Uuid;

    fn report_with(addresses: &[&str]) -> CycleReport {
        let outcomes = addresses
            .iter()
            .map(|addr| ActionOutcome {
                address: addr.to_string(),
                name: None,
                group: Some("rack,a".into()),
                action: ActionKind::Status,
                kind: OutcomeKind::Success,
                payload: Some(ActionPayload::Status(StatusPayload {
                    power_state: Some("On".into()),
                    ..StatusPayload::default()
                })),
                error_class: None,
                error: None,
                attempts: 1,
                elapsed_ms: 9,
            })
            .collect::<Vec<_>>();

        CycleReport {
            cycle_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: ActionKind::Status,
            total: outcomes.len(),
            succeeded: outcomes.len(),
            failed: 0,
            skipped: 0,
            groups: Vec::new(),
            outcomes,
        }
    }

    #[test]
    fn appending_sink_writes_header_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.csv");
        let sink = CsvFileSink::appending(&path);

        sink.write(&report_with(&["10.0.0.1", "10.0.0.2"]))
            .expect("first write");
        sink.write(&report_with(&["10.0.0.1"])).expect("second write");

        let body = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4, "header + 3 rows");
        assert!(lines[0].starts_with("timestamp,cycle_id,action"));
        assert_eq!(
            body.matches("timestamp,cycle_id").count(),
            1,
            "header must not repeat on append"
        );
    }

    #[test]
    fn truncating_sink_replaces_previous_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("status.csv");
        let sink = CsvFileSink::truncating(&path);

        sink.write(&report_with(&["10.0.0.1", "10.0.0.2"]))
            .expect("first write");
        sink.write(&report_with(&["10.0.0.3"])).expect("second write");

        let body = std::fs::read_to_string(&path).expect("read");
        assert!(!body.contains("10.0.0.1"));
        assert!(body.contains("10.0.0.3"));
    }

    #[test]
    fn csv_cells_with_commas_are_quoted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.csv");
        let sink = CsvFileSink::appending(&path);

        sink.write(&report_with(&["10.0.0.1"])).expect("write");

        let body = std::fs::read_to_string(&path).expect("read");
        assert!(body.contains("\"rack,a\""), "group cell must be quoted: {body}");
    }

    #[test]
    fn json_snapshot_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = JsonSnapshotSink::new(dir.path());
        let report = report_with(&["10.0.0.1"]);

        sink.write(&report).expect("write");

        let path = snapshot_path_for(dir.path(), &report);
        let body = std::fs::read_to_string(&path).expect("snapshot exists");
        let parsed: CycleReport = serde_json::from_str(&body).expect("parse");
        assert_eq!(parsed.cycle_id, report.cycle_id);
        assert_eq!(parsed.total, 1);
    }

    #[test]
    fn fanout_reports_first_failure_but_tries_all() {
        struct Failing;
        impl ReportSink for Failing {
            fn write(&self, _report: &CycleReport) -> Result<(), SinkError> {
                Err(SinkError::Io(std::io::Error::other("disk full")))
            }
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.csv");
        let fanout = FanoutSink::new(vec![
            Box::new(Failing),
            Box::new(CsvFileSink::appending(&path)),
        ]);

        let err = fanout.write(&report_with(&["10.0.0.1"])).expect_err("fails");
        assert!(err.to_string().contains("disk full"));
        assert!(path.exists(), "healthy sink must still receive the report");
    }
}
