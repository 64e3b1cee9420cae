//! Dataset Profiler
//!
//! Statistics computed once per upload and reused by the dataset endpoints
//! and the chat context:
//! - Summary counts (rows, columns, missing cells, duplicates, kinds)
//! - Per-column profiles (numeric moments and quartiles, text frequencies)
//! - Quality report (completeness, uniqueness, IQR outliers)

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::domain::dataset::{CellValue, Column, ColumnKind, ParsedDataset};

const MB: f64 = 1024.0 * 1024.0;

const CONTEXT_MAX_COLUMN_NAMES: usize = 10;
const CONTEXT_MAX_KIND_NUMERIC: usize = 5;
const CONTEXT_MAX_KIND_CATEGORICAL: usize = 5;
const CONTEXT_MAX_KIND_DATETIME: usize = 3;
const CONTEXT_SAMPLE_COLUMNS: usize = 5;
const CONTEXT_SAMPLE_VALUES: usize = 3;
const CONTEXT_SAMPLE_CHARS: usize = 30;
const CONTEXT_MAX_MISSING_COLUMNS: usize = 5;
const MAX_SUGGESTED_QUESTIONS: usize = 8;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatasetSummary {
    pub total_rows: usize,
    pub total_columns: usize,
    pub missing_values: usize,
    pub duplicate_rows: usize,
    pub estimated_memory_mb: f64,
    pub numeric_columns: usize,
    pub categorical_columns: usize,
    pub datetime_columns: usize,
    pub boolean_columns: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NumericStats {
    pub mean: f64,
    /// Sample standard deviation; absent with fewer than two values
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub q25: f64,
    pub q75: f64,
    pub outlier_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TextStats {
    pub most_frequent: Option<String>,
    pub most_frequent_count: usize,
    /// Length figures are only reported for long-form text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub count: usize,
    pub null_count: usize,
    pub null_percentage: f64,
    pub unique_count: usize,
    pub unique_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextStats>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QualityReport {
    pub missing_data_percentage: f64,
    pub duplicate_rows: usize,
    pub lowest_column_completeness: f64,
    /// Absent when the dataset has no categorical columns
    pub avg_categorical_uniqueness: Option<f64>,
    pub potential_outliers: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatasetProfile {
    pub summary: DatasetSummary,
    pub columns: Vec<ColumnProfile>,
    pub quality: QualityReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetPreview {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<CellValue>>,
    pub total_rows: usize,
    pub truncated: bool,
}

pub struct DatasetProfiler;

impl DatasetProfiler {
    pub fn profile(dataset: &ParsedDataset) -> DatasetProfile {
        let rows = dataset.row_count();
        let columns: Vec<ColumnProfile> = dataset
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| Self::column_profile(dataset, idx, column))
            .collect();

        let missing_values: usize = columns.iter().map(|c| c.null_count).sum();
        let duplicate_rows = Self::duplicate_rows(dataset);
        let count_kind = |kind| dataset.columns().iter().filter(|c| c.kind == kind).count();

        let summary = DatasetSummary {
            total_rows: rows,
            total_columns: dataset.column_count(),
            missing_values,
            duplicate_rows,
            estimated_memory_mb: dataset.estimated_bytes() as f64 / MB,
            numeric_columns: count_kind(ColumnKind::Numeric),
            categorical_columns: count_kind(ColumnKind::Text),
            datetime_columns: count_kind(ColumnKind::DateTime),
            boolean_columns: count_kind(ColumnKind::Boolean),
        };

        let categorical: Vec<f64> = columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Text)
            .map(|c| c.unique_percentage)
            .collect();

        let quality = QualityReport {
            missing_data_percentage: percentage(missing_values, rows * dataset.column_count()),
            duplicate_rows,
            lowest_column_completeness: columns
                .iter()
                .map(|c| 100.0 - c.null_percentage)
                .fold(100.0, f64::min),
            avg_categorical_uniqueness: (!categorical.is_empty())
                .then(|| categorical.iter().sum::<f64>() / categorical.len() as f64),
            potential_outliers: columns
                .iter()
                .filter_map(|c| c.numeric.as_ref())
                .map(|n| n.outlier_count)
                .sum(),
        };

        DatasetProfile {
            summary,
            columns,
            quality,
        }
    }

    fn column_profile(dataset: &ParsedDataset, idx: usize, column: &Column) -> ColumnProfile {
        let rows = dataset.row_count();
        let present: Vec<&CellValue> =
            dataset.column_cells(idx).filter(|c| !c.is_empty()).collect();
        let null_count = rows - present.len();
        let unique_count = present
            .iter()
            .map(|c| c.to_string())
            .collect::<HashSet<_>>()
            .len();

        let numeric = match column.kind {
            ColumnKind::Numeric => {
                numeric_stats(present.iter().filter_map(|c| c.as_f64()).collect())
            }
            _ => None,
        };
        let text = match column.kind {
            ColumnKind::Text => Some(text_stats(&present)),
            _ => None,
        };

        ColumnProfile {
            name: column.name.clone(),
            kind: column.kind,
            count: present.len(),
            null_count,
            null_percentage: percentage(null_count, rows),
            unique_count,
            unique_percentage: percentage(unique_count, rows),
            numeric,
            text,
        }
    }

    /// Rows identical to an earlier row.
    fn duplicate_rows(dataset: &ParsedDataset) -> usize {
        let width = dataset.column_count();
        let mut seen = HashSet::new();
        dataset
            .rows()
            .iter()
            .filter(|row| {
                let key: Vec<String> = (0..width)
                    .map(|i| match row.get(i) {
                        Some(cell) if !cell.is_empty() => format!("{:?}", cell),
                        _ => String::new(),
                    })
                    .collect();
                !seen.insert(key)
            })
            .count()
    }

    pub fn preview(dataset: &ParsedDataset, max_rows: usize) -> DatasetPreview {
        DatasetPreview {
            columns: dataset.columns().to_vec(),
            rows: dataset
                .rows()
                .iter()
                .take(max_rows)
                .map(|row| {
                    let mut row = row.clone();
                    row.resize(dataset.column_count(), CellValue::Empty);
                    row
                })
                .collect(),
            total_rows: dataset.row_count(),
            truncated: dataset.row_count() > max_rows,
        }
    }

    /// Compact plain-text description of the dataset for the model.
    pub fn chat_context(dataset: &ParsedDataset) -> String {
        let mut parts = Vec::new();
        parts.push(format!(
            "Dataset has {} rows and {} columns.",
            dataset.row_count(),
            dataset.column_count()
        ));

        let names: Vec<&str> = dataset.columns().iter().map(|c| c.name.as_str()).collect();
        if !names.is_empty() {
            parts.push(format!(
                "Column names: {}",
                head(&names, CONTEXT_MAX_COLUMN_NAMES)
            ));
            if names.len() > CONTEXT_MAX_COLUMN_NAMES {
                parts.push(format!(
                    "... and {} more columns.",
                    names.len() - CONTEXT_MAX_COLUMN_NAMES
                ));
            }
        }

        for (label, kind, limit) in [
            ("Numeric columns", ColumnKind::Numeric, CONTEXT_MAX_KIND_NUMERIC),
            ("Categorical columns", ColumnKind::Text, CONTEXT_MAX_KIND_CATEGORICAL),
            ("Date/time columns", ColumnKind::DateTime, CONTEXT_MAX_KIND_DATETIME),
        ] {
            let of_kind = dataset.columns_of_kind(kind);
            if !of_kind.is_empty() {
                parts.push(format!("{}: {}", label, head(&of_kind, limit)));
            }
        }

        let samples: Vec<String> = dataset
            .columns()
            .iter()
            .enumerate()
            .take(CONTEXT_SAMPLE_COLUMNS)
            .filter_map(|(idx, column)| {
                let values = sample_values(dataset, idx);
                (!values.is_empty()).then(|| format!("  - {}: {}", column.name, values.join(", ")))
            })
            .collect();
        if !samples.is_empty() {
            parts.push("Sample values:".to_string());
            parts.extend(samples);
        }

        let missing: Vec<&str> = dataset
            .columns()
            .iter()
            .enumerate()
            .filter(|(idx, _)| dataset.column_cells(*idx).any(CellValue::is_empty))
            .map(|(_, c)| c.name.as_str())
            .collect();
        if !missing.is_empty() {
            parts.push(format!(
                "Columns with missing values: {}",
                head(&missing, CONTEXT_MAX_MISSING_COLUMNS)
            ));
        }

        parts.join("\n")
    }

    /// Starter questions derived from column kinds and missing data.
    pub fn suggested_questions(dataset: &ParsedDataset) -> Vec<String> {
        let mut questions: Vec<String> = [
            "What columns are in this dataset?",
            "How many rows and columns does this data have?",
            "Are there any missing values in the data?",
            "What are the main data types in this dataset?",
        ]
        .iter()
        .map(|q| q.to_string())
        .collect();

        let numeric = dataset.columns_of_kind(ColumnKind::Numeric);
        let categorical = dataset.columns_of_kind(ColumnKind::Text);

        if let Some(first) = numeric.first() {
            if let Some(second) = numeric.get(1) {
                questions.push(format!(
                    "What's the relationship between {} and {}?",
                    first, second
                ));
                questions.push("Which numeric columns might be correlated?".to_string());
            }
            questions.push(format!("What's the distribution of {}?", first));
        }

        if let Some(first) = categorical.first() {
            questions.push(format!("What are the unique values in {}?", first));
            questions.push(format!("How should I analyze the {} column?", first));
        }

        if let (Some(num), Some(cat)) = (numeric.first(), categorical.first()) {
            questions.push(format!("How does {} vary by {}?", num, cat));
        }

        let has_missing = (0..dataset.column_count())
            .any(|idx| dataset.column_cells(idx).any(CellValue::is_empty));
        if has_missing {
            questions.push("How should I handle the missing values in this dataset?".to_string());
        }

        questions.extend(
            [
                "What visualizations would you recommend for this data?",
                "How can I clean this data?",
                "What insights can I get from this dataset?",
            ]
            .iter()
            .map(|q| q.to_string()),
        );

        questions.truncate(MAX_SUGGESTED_QUESTIONS);
        questions
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn head(items: &[&str], limit: usize) -> String {
    items.iter().take(limit).copied().collect::<Vec<_>>().join(", ")
}

/// First distinct non-empty values, each cut to a short prefix.
fn sample_values(dataset: &ParsedDataset, idx: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    dataset
        .column_cells(idx)
        .filter(|c| !c.is_empty())
        .map(|c| c.to_string())
        .filter(|v| seen.insert(v.clone()))
        .take(CONTEXT_SAMPLE_VALUES)
        .map(|v| v.chars().take(CONTEXT_SAMPLE_CHARS).collect())
        .collect()
}

/// Quantile with linear interpolation between closest ranks.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn numeric_stats(mut values: Vec<f64>) -> Option<NumericStats> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.len() > 1).then(|| {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        var.sqrt()
    });

    let q25 = quantile(&values, 0.25);
    let q75 = quantile(&values, 0.75);
    let iqr = q75 - q25;
    let (lower, upper) = (q25 - 1.5 * iqr, q75 + 1.5 * iqr);

    Some(NumericStats {
        mean,
        std,
        min: values[0],
        max: values[values.len() - 1],
        median: quantile(&values, 0.5),
        q25,
        q75,
        outlier_count: values.iter().filter(|v| **v < lower || **v > upper).count(),
    })
}

fn text_stats(present: &[&CellValue]) -> TextStats {
    let values: Vec<String> = present.iter().map(|c| c.to_string()).collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in &values {
        *counts.entry(v.as_str()).or_insert(0) += 1;
    }
    // Highest count wins; ties go to the smallest value.
    let most_frequent = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(v, c)| (v.to_string(), *c));

    let lengths: Vec<usize> = values.iter().map(|v| v.chars().count()).collect();
    let avg_length = (!lengths.is_empty())
        .then(|| lengths.iter().sum::<usize>() as f64 / lengths.len() as f64);
    let long_form = avg_length.map_or(false, |avg| avg > 10.0);

    TextStats {
        most_frequent: most_frequent.as_ref().map(|(v, _)| v.clone()),
        most_frequent_count: most_frequent.map_or(0, |(_, c)| c),
        avg_length: avg_length.filter(|_| long_form),
        min_length: lengths.iter().min().copied().filter(|_| long_form),
        max_length: lengths.iter().max().copied().filter(|_| long_form),
    }
}
