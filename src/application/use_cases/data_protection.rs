//! Data Protection Service for uploaded datasets
//!
//! Advisory PII detection run by the upload gate:
//! - Identifier patterns matched against text cells (email, phone, ...)
//! - Column-name hints for confidential fields (password, token, ...)
//!
//! Findings never block an upload and never quote cell values.

use regex::Regex;
use tracing::{debug, info};

use crate::domain::dataset::RawTable;
use crate::domain::error::{AppError, Result};
use crate::domain::pii_policy::PiiPolicy;
use crate::domain::upload::PiiWarning;

const CONFIDENTIAL_COLUMN_KIND: &str = "confidential_column";

pub struct DataProtectionService {
    enabled: bool,
    value_patterns: Vec<(String, Regex)>,
    confidential_column_names: Vec<String>,
    max_rows_scanned: usize,
}

impl DataProtectionService {
    pub fn new(policy: &PiiPolicy) -> Result<Self> {
        let value_patterns = policy
            .value_patterns
            .iter()
            .map(|p| {
                Regex::new(&p.regex)
                    .map(|re| (p.name.clone(), re))
                    .map_err(|e| {
                        AppError::ValidationError(format!(
                            "PII pattern '{}' is invalid: {}",
                            p.name, e
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            enabled: policy.enabled,
            value_patterns,
            confidential_column_names: policy
                .confidential_column_names
                .iter()
                .map(|n| normalize_column_name(n))
                .collect(),
            max_rows_scanned: policy.max_rows_scanned,
        })
    }

    /// Scan a table; at most one warning per (column, kind).
    pub fn scan(&self, table: &RawTable) -> Vec<PiiWarning> {
        if !self.enabled {
            return Vec::new();
        }

        let row_limit = match self.max_rows_scanned {
            0 => table.rows.len(),
            n => n.min(table.rows.len()),
        };
        let mut warnings = Vec::new();

        for (idx, column) in table.headers.iter().enumerate() {
            if self.is_confidential_column(column) {
                warnings.push(PiiWarning {
                    column: column.clone(),
                    kind: CONFIDENTIAL_COLUMN_KIND.to_string(),
                    message: format!("Column '{}' looks like it holds confidential data", column),
                });
            }

            for (name, pattern) in &self.value_patterns {
                let hit = table.rows[..row_limit]
                    .iter()
                    .filter_map(|row| row.get(idx).and_then(|cell| cell.as_text()))
                    .any(|text| pattern.is_match(text));
                if hit {
                    debug!(pattern = %name, "PII pattern matched");
                    warnings.push(PiiWarning {
                        column: column.clone(),
                        kind: name.clone(),
                        message: format!("Column '{}' may contain {} data", column, name),
                    });
                }
            }
        }

        if !warnings.is_empty() {
            info!(count = warnings.len(), "Potential PII detected in upload");
        }
        warnings
    }

    /// Token-bounded match, so `user_token` hits `token` but `classname`
    /// does not hit `ssn`.
    pub fn is_confidential_column(&self, column: &str) -> bool {
        let padded = format!("_{}_", normalize_column_name(column));
        self.confidential_column_names
            .iter()
            .any(|fragment| padded.contains(&format!("_{}_", fragment)))
    }
}

fn normalize_column_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}
