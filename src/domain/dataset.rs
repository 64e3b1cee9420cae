// ============================================================
// DATASET TYPES
// ============================================================
// Tabular data produced by the upload gate

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    /// ISO-8601 text as read from the workbook
    DateTime(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) if f.is_finite() => Some(*f),
            _ => None,
        }
    }

    /// Text content of string-like cells (text and date-time).
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) | CellValue::DateTime(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Text(s) | CellValue::DateTime(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Boolean,
    DateTime,
    Text,
    Empty,
}

impl ColumnKind {
    /// Infer a column kind from its cells. Mixed columns are text.
    pub fn infer<'a>(cells: impl IntoIterator<Item = &'a CellValue>) -> Self {
        let mut kind: Option<ColumnKind> = None;
        for cell in cells {
            if cell.is_empty() {
                continue;
            }
            let cell_kind = match cell {
                CellValue::Int(_) | CellValue::Float(_) => ColumnKind::Numeric,
                CellValue::Bool(_) => ColumnKind::Boolean,
                CellValue::DateTime(_) => ColumnKind::DateTime,
                _ => ColumnKind::Text,
            };
            match kind {
                None => kind = Some(cell_kind),
                Some(k) if k != cell_kind => return ColumnKind::Text,
                _ => {}
            }
        }
        kind.unwrap_or(ColumnKind::Empty)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// Worksheet content as read from the workbook, before the gate has
/// finished with it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub sheet_name: String,
    pub sheet_count: usize,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }
}

/// A validated dataset owned by one session.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedDataset {
    filename: String,
    sheet_name: String,
    sheet_count: usize,
    columns: Vec<Column>,
    #[serde(skip)]
    rows: Vec<Vec<CellValue>>,
    content_sha256: String,
}

impl ParsedDataset {
    /// Only the upload gate builds datasets, and only after a passing verdict.
    pub(crate) fn from_validated(
        table: RawTable,
        sanitized_filename: String,
        content_sha256: String,
    ) -> Self {
        let RawTable {
            sheet_name,
            sheet_count,
            headers,
            rows,
        } = table;

        let columns = headers
            .into_iter()
            .enumerate()
            .map(|(idx, name)| Column {
                kind: ColumnKind::infer(rows.iter().filter_map(|row| row.get(idx))),
                name,
            })
            .collect();

        Self {
            filename: sanitized_filename,
            sheet_name,
            sheet_count,
            columns,
            rows,
            content_sha256,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn sheet_count(&self) -> usize {
        self.sheet_count
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn content_sha256(&self) -> &str {
        &self.content_sha256
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Cells of one column, top to bottom. Short rows yield `Empty`.
    pub fn column_cells(&self, idx: usize) -> impl Iterator<Item = &CellValue> + '_ {
        const EMPTY: &CellValue = &CellValue::Empty;
        self.rows.iter().map(move |row| row.get(idx).unwrap_or(EMPTY))
    }

    pub fn columns_of_kind(&self, kind: ColumnKind) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Rough in-memory footprint, used for session warnings.
    pub fn estimated_bytes(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.iter())
            .map(|cell| {
                std::mem::size_of::<CellValue>()
                    + match cell {
                        CellValue::Text(s) | CellValue::DateTime(s) => s.len(),
                        _ => 0,
                    }
            })
            .sum()
    }
}
