// ============================================================
// CONTENT SCANNER
// ============================================================
// Raw-container and cell-text threat detection for uploads

use once_cell::sync::Lazy;
use regex::bytes::Regex as BytesRegex;
use regex::RegexSet;
use serde::Serialize;

use crate::domain::dataset::RawTable;

/// Container entries that carry macros or embedded executables.
static CONTAINER_MARKERS: Lazy<BytesRegex> = Lazy::new(|| {
    BytesRegex::new(r"(?i-u)vbaProject\.bin|activeX/|oleObject|xl/embeddings/").unwrap()
});

/// (label, pattern) pairs for cell text. Labels end up in logs only.
const CELL_PATTERNS: &[(&str, &str)] = &[
    // Script injection
    ("script_tag", r"(?i)<script\b"),
    ("javascript_url", r"(?i)javascript:"),
    ("vbscript_url", r"(?i)vbscript:"),
    ("event_handler", r"(?i)<[^>]*\son\w+\s*="),
    ("active_tag", r"(?i)<(?:iframe|object|embed|form)\b"),
    // SQL injection
    ("sql_select", r"(?i)\bselect\s+.+\s+from\b"),
    ("sql_insert", r"(?i)\binsert\s+into\b"),
    ("sql_update", r"(?i)\bupdate\s+.+\s+set\b"),
    ("sql_delete", r"(?i)\bdelete\s+from\b"),
    ("sql_drop", r"(?i)\bdrop\s+(?:table|database)\b"),
    ("sql_union", r"(?i)\bunion\s+select\b"),
    ("sql_tautology", r"(?i)\bor\s+1\s*=\s*1\b|'\s*or\s*'[^']*'\s*=\s*'"),
    // Command injection
    ("shell_chain", r"(?i);\s*(?:rm\s+-rf|cat\s+/etc/|wget\s+|curl\s+)|\|\s*nc\s+|&&\s*rm\s+"),
    // Formula / DDE injection
    ("dde_formula", r"(?i)^\s*[=+\-@]\s*(?:cmd|powershell|mshta)\s*\|"),
    // Path traversal
    ("path_traversal", r"\.\./|\.\.\\|/etc/passwd|/etc/shadow|(?i:c:\\windows)"),
    // Code evaluation
    ("code_eval", r"(?i)\b(?:eval|exec|system|shell_exec|base64_decode)\s*\("),
];

static CELL_PATTERN_SET: Lazy<RegexSet> =
    Lazy::new(|| RegexSet::new(CELL_PATTERNS.iter().map(|(_, p)| *p)).unwrap());

/// What the scanner found. The offending cell text is never carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreatFinding {
    EmbeddedObject { marker: String },
    SuspiciousPattern { column: String, pattern: &'static str },
    OversizedCell { column: String, chars: usize },
}

impl ThreatFinding {
    pub fn user_message(&self, max_cell_chars: usize) -> String {
        match self {
            ThreatFinding::EmbeddedObject { .. } => {
                "The file contains macros or embedded objects, which are not accepted.".to_string()
            }
            ThreatFinding::SuspiciousPattern { column, .. } => format!(
                "Suspicious content detected in column \"{}\". Please review your data.",
                column
            ),
            ThreatFinding::OversizedCell { column, .. } => format!(
                "Cell content in column \"{}\" exceeds the size limit of {} characters.",
                column, max_cell_chars
            ),
        }
    }
}

pub struct ContentScanner {
    max_cell_chars: usize,
}

impl ContentScanner {
    pub fn new(max_cell_chars: usize) -> Self {
        Self { max_cell_chars }
    }

    pub fn max_cell_chars(&self) -> usize {
        self.max_cell_chars
    }

    /// Look for macro/embedded-object entries in the raw container bytes.
    ///
    /// Zip entry names are stored uncompressed, so this works without
    /// inflating anything.
    pub fn scan_container(&self, content: &[u8]) -> Option<ThreatFinding> {
        CONTAINER_MARKERS.find(content).map(|m| ThreatFinding::EmbeddedObject {
            marker: String::from_utf8_lossy(m.as_bytes()).into_owned(),
        })
    }

    /// Scan headers and every text cell; stops at the first finding.
    pub fn scan_table(&self, table: &RawTable) -> Option<ThreatFinding> {
        for header in &table.headers {
            if let Some(finding) = self.scan_text(header, header) {
                return Some(finding);
            }
        }

        for row in &table.rows {
            for (idx, cell) in row.iter().enumerate() {
                let Some(text) = cell.as_text() else {
                    continue;
                };
                let column = table.headers.get(idx).map(String::as_str).unwrap_or("?");
                if let Some(finding) = self.scan_text(column, text) {
                    return Some(finding);
                }
            }
        }

        None
    }

    fn scan_text(&self, column: &str, text: &str) -> Option<ThreatFinding> {
        // Byte length bounds char count from above.
        if text.len() > self.max_cell_chars {
            let chars = text.chars().count();
            if chars > self.max_cell_chars {
                return Some(ThreatFinding::OversizedCell {
                    column: column.to_string(),
                    chars,
                });
            }
        }

        CELL_PATTERN_SET
            .matches(text)
            .iter()
            .next()
            .map(|idx| ThreatFinding::SuspiciousPattern {
                column: column.to_string(),
                pattern: CELL_PATTERNS[idx].0,
            })
    }
}
