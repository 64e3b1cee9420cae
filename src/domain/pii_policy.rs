use serde::{Deserialize, Serialize};

/// One identifier pattern checked against cell values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiPattern {
    /// Short label shown in warnings, e.g. "email"
    pub name: String,
    /// Regular expression matched anywhere in the cell text
    pub regex: String,
}

impl PiiPattern {
    pub fn new(name: &str, regex: &str) -> Self {
        Self {
            name: name.to_string(),
            regex: regex.to_string(),
        }
    }
}

/// Which identifier patterns trigger an advisory warning.
///
/// Scope is policy, not contract: deployments replace or extend the defaults
/// through configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PiiPolicy {
    pub enabled: bool,
    pub value_patterns: Vec<PiiPattern>,
    /// Header fragments (lowercase) that mark a column as confidential
    pub confidential_column_names: Vec<String>,
    /// Rows examined per column; 0 scans every row
    pub max_rows_scanned: usize,
}

impl Default for PiiPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            value_patterns: vec![
                PiiPattern::new("email", r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"),
                PiiPattern::new("phone", r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b"),
                PiiPattern::new("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
                PiiPattern::new("credit_card", r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b"),
            ],
            confidential_column_names: [
                "password",
                "passwd",
                "token",
                "secret",
                "api_key",
                "ssn",
                "social_security",
                "credit_card",
                "iban",
                "bank_account",
                "passport",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_rows_scanned: 0,
        }
    }
}

impl PiiPolicy {
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for pattern in &self.value_patterns {
            if pattern.name.trim().is_empty() {
                return Err("pii pattern name must not be empty".to_string());
            }
            regex::Regex::new(&pattern.regex).map_err(|e| {
                format!("pii pattern '{}' is not a valid regex: {}", pattern.name, e)
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_patterns_compile() {
        assert!(PiiPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let policy = PiiPolicy {
            value_patterns: vec![PiiPattern::new("broken", "([a-z")],
            ..Default::default()
        };
        let err = policy.validate().unwrap_err();
        assert!(err.contains("broken"));
    }
}
