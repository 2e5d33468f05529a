//! Target source parsing: the collaborator boundary between input files and
//! the engine's registry.
//!
//! Accepts the CSV layout the fleet inventory exports use: a header row
//! naming `ip`/`address`, `username`, `password`, and optionally
//! `cluster`/`group` and `name` columns (case-insensitive, any order), or a
//! headerless three-column file in that order. Delimiter may be a comma,
//! semicolon, or tab.

use std::path::Path;

use anyhow::Context;

use engine::registry::{Registry, TargetRecord};

use crate::args::GlobalArgs;

/// Resolve the target registry from CLI globals: bulk file or single endpoint.
pub fn load_targets(globals: &GlobalArgs) -> anyhow::Result<Registry> {
    if let Some(path) = &globals.file {
        let records = read_records_from_csv(path)?;
        return Registry::from_records(records);
    }

    if let Some(ip) = &globals.ip {
        let secret = globals.password.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "password required for single-endpoint mode; pass --password or set BMCFLEET_CLI_PASSWORD"
            )
        })?;
        let registry = Registry::single(TargetRecord {
            address: ip.clone(),
            username: globals.username.clone(),
            secret,
            ..TargetRecord::default()
        })?;
        return Ok(registry);
    }

    anyhow::bail!("no targets given; pass --file <csv> or --ip <address>")
}

pub fn read_records_from_csv(path: &Path) -> anyhow::Result<Vec<TargetRecord>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read target file {}", path.display()))?;
    parse_records(&body)
}

fn parse_records(body: &str) -> anyhow::Result<Vec<TargetRecord>> {
    let mut lines = body.lines().filter(|l| !l.trim().is_empty());
    let Some(first) = lines.next() else {
        return Ok(Vec::new());
    };

    let delimiter = detect_delimiter(first);
    let header = split_line(first, delimiter);
    let columns = ColumnMap::from_header(&header);

    let mut records = Vec::new();

    // A header row that maps no known column is data in disguise.
    if columns.is_none() {
        if let Some(record) = positional_record(&header) {
            records.push(record);
        }
    }

    let columns = columns.unwrap_or(ColumnMap {
        address: 0,
        username: 1,
        password: 2,
        group: Some(3),
        name: None,
    });
    for line in lines {
        let cells = split_line(line, delimiter);
        records.push(columns.record_from(&cells));
    }

    Ok(records)
}

fn detect_delimiter(header: &str) -> char {
    [',', ';', '\t']
        .into_iter()
        .max_by_key(|d| header.matches(*d).count())
        .unwrap_or(',')
}

/// Minimal quote-aware splitter; fleet exports occasionally quote the
/// cluster column.
fn split_line(line: &str, delimiter: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                cells.push(current.trim().to_string());
                current = String::new();
            }
            c => current.push(c),
        }
    }
    cells.push(current.trim().to_string());
    cells
}

#[derive(Debug)]
struct ColumnMap {
    address: usize,
    username: usize,
    password: usize,
    group: Option<usize>,
    name: Option<usize>,
}

impl ColumnMap {
    /// Map header names to columns; `None` when the row carries no known
    /// header (headerless positional file).
    fn from_header(header: &[String]) -> Option<ColumnMap> {
        let address = find_column(header, &["ip", "address", "host"])?;
        Some(ColumnMap {
            address,
            username: find_column(header, &["username", "user"]).unwrap_or(1),
            password: find_column(header, &["password", "secret", "token"]).unwrap_or(2),
            group: find_column(header, &["cluster", "group"]),
            name: find_column(header, &["name", "hostname"]),
        })
    }

    fn record_from(&self, cells: &[String]) -> TargetRecord {
        let cell = |idx: usize| cells.get(idx).cloned().unwrap_or_default();
        let optional = |idx: Option<usize>| {
            idx.map(cell).filter(|v| !v.is_empty())
        };

        TargetRecord {
            address: cell(self.address),
            username: cell(self.username),
            secret: cell(self.password),
            group: optional(self.group),
            name: optional(self.name),
            auth_domain: None,
        }
    }
}

fn find_column(header: &[String], candidates: &[&str]) -> Option<usize> {
    // Exact (case-insensitive) match wins over substring match.
    for candidate in candidates {
        if let Some(idx) = header
            .iter()
            .position(|col| col.eq_ignore_ascii_case(candidate))
        {
            return Some(idx);
        }
    }
    for candidate in candidates {
        if let Some(idx) = header
            .iter()
            .position(|col| col.to_ascii_lowercase().contains(candidate))
        {
            return Some(idx);
        }
    }
    None
}

fn positional_record(cells: &[String]) -> Option<TargetRecord> {
    if cells.len() < 3 || cells[0].is_empty() {
        return None;
    }
    Some(TargetRecord {
        address: cells[0].clone(),
        username: cells[1].clone(),
        secret: cells[2].clone(),
        group: cells.get(3).cloned().filter(|v| !v.is_empty()),
        name: None,
        auth_domain: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headered_csv_with_cluster_column() {
        let records = parse_records(
            "ip,username,password,cluster\n\
             10.0.0.1,admin,pw1,rack-a\n\
             10.0.0.2,admin,pw2,rack-b\n",
        )
        .expect("parse");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].address, "10.0.0.1");
        assert_eq!(records[0].group.as_deref(), Some("rack-a"));
        assert_eq!(records[1].secret, "pw2");
    }

    #[test]
    fn header_matching_is_case_insensitive_and_reordered() {
        let records = parse_records(
            "Password;Cluster;IP_Address;Username\n\
             pw;lab;10.0.0.9;root\n",
        )
        .expect("parse");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].address, "10.0.0.9");
        assert_eq!(records[0].username, "root");
        assert_eq!(records[0].secret, "pw");
        assert_eq!(records[0].group.as_deref(), Some("lab"));
    }

    #[test]
    fn headerless_three_column_file_maps_positionally() {
        let records = parse_records("10.0.0.1,admin,pw\n10.0.0.2,admin,pw\n").expect("parse");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].address, "10.0.0.1");
        assert_eq!(records[0].username, "admin");
    }

    #[test]
    fn quoted_cells_keep_embedded_delimiters() {
        let records = parse_records(
            "ip,username,password,cluster\n\
             10.0.0.1,admin,\"p,w\",\"rack, east\"\n",
        )
        .expect("parse");

        assert_eq!(records[0].secret, "p,w");
        assert_eq!(records[0].group.as_deref(), Some("rack, east"));
    }

    #[test]
    fn tab_delimited_files_are_detected() {
        let records =
            parse_records("ip\tusername\tpassword\n10.0.0.1\tadmin\tpw\n").expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].address, "10.0.0.1");
    }

    #[test]
    fn empty_file_yields_no_records() {
        let records = parse_records("").expect("parse");
        assert!(records.is_empty());
    }

    #[test]
    fn registry_rejects_rows_missing_required_fields() {
        let records = parse_records(
            "ip,username,password\n\
             10.0.0.1,admin,pw\n\
             ,admin,pw\n",
        )
        .expect("parse");

        let registry = Registry::from_records(records).expect("partial load");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.rejected(), 1);
    }
}
