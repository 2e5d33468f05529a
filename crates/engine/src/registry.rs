//! Target registry: validated, ordered list of endpoints for one run.

use thiserror::Error;
use tracing::warn;

use common::api::Target;

/// Raw record as produced by a target source (bulk file row or CLI flags).
/// Parsing the source format is the caller's concern; validation happens here.
#[derive(Debug, Clone, Default)]
pub struct TargetRecord {
    pub address: String,
    pub name: Option<String>,
    pub group: Option<String>,
    pub username: String,
    pub secret: String,
    pub auth_domain: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("record {row}: address is empty")]
    EmptyAddress { row: usize },
    #[error("record {row} ({address}): username is empty")]
    EmptyUsername { row: usize, address: String },
    #[error("record {row} ({address}): secret is empty")]
    EmptySecret { row: usize, address: String },
}

/// Ordered target list, immutable for the life of a dispatch cycle.
///
/// Duplicates are permitted; the registry does not enforce fleet-wide
/// uniqueness. Reloading between monitoring iterations replaces the whole
/// registry, never patches targets in place.
#[derive(Debug, Clone)]
pub struct Registry {
    targets: Vec<Target>,
    rejected: usize,
}

impl Registry {
    /// Build a registry from raw records, preserving input order.
    ///
    /// Invalid rows are rejected individually (logged, counted) without
    /// failing the rows around them; a non-empty source where every row is
    /// invalid fails the load outright.
    pub fn from_records(
        records: impl IntoIterator<Item = TargetRecord>,
    ) -> anyhow::Result<Registry> {
        let mut targets = Vec::new();
        let mut rejected = 0usize;
        let mut first_error: Option<ValidationError> = None;
        let mut total = 0usize;

        for (idx, record) in records.into_iter().enumerate() {
            total += 1;
            match validate_record(idx + 1, record) {
                Ok(target) => targets.push(target),
                Err(err) => {
                    warn!(error = %err, "rejecting target record");
                    rejected += 1;
                    first_error.get_or_insert(err);
                }
            }
        }

        if total > 0 && targets.is_empty() {
            match first_error {
                Some(err) => {
                    anyhow::bail!("no valid targets in source ({rejected} rejected, first: {err})")
                }
                None => anyhow::bail!("no valid targets in source"),
            }
        }

        Ok(Registry { targets, rejected })
    }

    /// Single-endpoint interactive mode.
    pub fn single(record: TargetRecord) -> Result<Registry, ValidationError> {
        let target = validate_record(1, record)?;
        Ok(Registry {
            targets: vec![target],
            rejected: 0,
        })
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Rows dropped during the load.
    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

fn validate_record(row: usize, record: TargetRecord) -> Result<Target, ValidationError> {
    let address = record.address.trim().to_string();
    if address.is_empty() {
        return Err(ValidationError::EmptyAddress { row });
    }

    let username = record.username.trim().to_string();
    if username.is_empty() {
        return Err(ValidationError::EmptyUsername { row, address });
    }

    if record.secret.is_empty() {
        return Err(ValidationError::EmptySecret { row, address });
    }

    Ok(Target {
        address,
        name: normalize_optional(record.name),
        group: normalize_optional(record.group),
        username,
        secret: record.secret,
        auth_domain: normalize_optional(record.auth_domain),
    })
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
