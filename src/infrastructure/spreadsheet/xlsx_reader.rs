// ============================================================
// XLSX READER
// ============================================================
// Read the first non-empty worksheet of an in-memory workbook

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, DataType, Reader, Xlsx};
use tracing::debug;
use zip::ZipArchive;

use crate::domain::app_config::GateLimits;
use crate::domain::dataset::{CellValue, RawTable};
use crate::domain::error::{AppError, Result};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Workbook reader. Operates on bytes only; nothing touches the filesystem.
///
/// Cells are streamed and kept sparse until the sheet is known to fit the
/// row, column and cell ceilings, so a tiny file naming a far-away cell
/// cannot force a huge allocation.
#[derive(Debug)]
pub struct XlsxReader {
    limits: GateLimits,
}

/// Populated cells of one sheet row, keyed by absolute column.
struct SparseRow {
    row: u32,
    last_col: u32,
    cells: Vec<(u32, CellValue)>,
}

#[derive(Default)]
struct SparseSheet {
    rows: Vec<SparseRow>,
    min_col: u32,
    max_col: u32,
    last_col_sum: u64,
}

impl SparseSheet {
    /// Cells the dense table would hold: every row from the leftmost
    /// column to its own last populated column.
    fn dense_cells(&self) -> u64 {
        let rows = self.rows.len() as u64;
        self.last_col_sum + rows - rows * u64::from(self.min_col)
    }

    fn insert(&mut self, row: u32, col: u32, value: CellValue, limits: &GateLimits) -> Result<()> {
        if let Some(first) = self.rows.first() {
            if row.saturating_sub(first.row) as usize > limits.max_rows {
                return Err(AppError::DatasetTooLarge(format!(
                    "Worksheet spans more than {} data rows.",
                    limits.max_rows
                )));
            }
            self.min_col = self.min_col.min(col);
            self.max_col = self.max_col.max(col);
        } else {
            self.min_col = col;
            self.max_col = col;
        }

        if (self.max_col - self.min_col) as usize >= limits.max_columns {
            return Err(AppError::DatasetTooLarge(format!(
                "Worksheet spans more than {} columns.",
                limits.max_columns
            )));
        }

        match self.rows.last_mut() {
            Some(current) if current.row == row => {
                if col > current.last_col {
                    self.last_col_sum += u64::from(col - current.last_col);
                    current.last_col = col;
                }
                current.cells.push((col, value));
            }
            _ => {
                self.last_col_sum += u64::from(col);
                self.rows.push(SparseRow {
                    row,
                    last_col: col,
                    cells: vec![(col, value)],
                });
            }
        }

        if self.dense_cells() > limits.max_cells as u64 {
            return Err(AppError::DatasetTooLarge(format!(
                "Worksheet holds more than {} cells.",
                limits.max_cells
            )));
        }
        Ok(())
    }

    /// Header row padded to the sheet width, then body rows. Body rows end
    /// at their last populated column.
    fn into_table(self) -> Option<(Vec<String>, Vec<Vec<CellValue>>)> {
        let min_col = self.min_col;
        let width = (self.max_col - min_col) as usize + 1;

        let mut rows = self.rows.into_iter().map(|sparse| {
            let mut dense = vec![CellValue::Empty; (sparse.last_col - min_col) as usize + 1];
            for (col, value) in sparse.cells {
                dense[(col - min_col) as usize] = value;
            }
            dense
        });

        let mut header_row = rows.next()?;
        header_row.resize(width, CellValue::Empty);
        Some((unique_headers(&header_row), rows.collect()))
    }
}

impl XlsxReader {
    pub fn new(limits: GateLimits) -> Self {
        Self { limits }
    }

    /// Parse the first worksheet that holds any data.
    ///
    /// The first populated row of the sheet becomes the header. Blank header
    /// cells are named `Unnamed: <index>` and repeated names get a `.<n>`
    /// suffix. Blank rows are dropped.
    pub fn read_first_table(&self, content: &[u8]) -> Result<RawTable> {
        self.check_expanded_size(content)?;

        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(content))
            .map_err(|e| AppError::ParseError(format!("Failed to open workbook: {}", e)))?;

        let sheet_names = workbook.sheet_names();
        let sheet_count = sheet_names.len();

        for sheet_name in &sheet_names {
            let Some(sheet) = self.read_sheet(&mut workbook, sheet_name)? else {
                continue;
            };

            if let Some((headers, rows)) = sheet.into_table() {
                debug!(
                    sheet = %sheet_name,
                    rows = rows.len(),
                    columns = headers.len(),
                    "Worksheet selected"
                );
                return Ok(RawTable {
                    sheet_name: sheet_name.clone(),
                    sheet_count,
                    headers,
                    rows,
                });
            }
        }

        Err(AppError::UnsupportedFormat(
            "No data found in any worksheet.".to_string(),
        ))
    }

    /// Stream one sheet's populated cells. `None` when the sheet is unreadable.
    fn read_sheet(
        &self,
        workbook: &mut Xlsx<Cursor<&[u8]>>,
        sheet_name: &str,
    ) -> Result<Option<SparseSheet>> {
        let mut cells = match workbook.worksheet_cells_reader(sheet_name) {
            Ok(cells) => cells,
            Err(e) => {
                // A broken sheet is skipped; later sheets may still be fine.
                debug!(sheet = %sheet_name, error = %e, "Skipping unreadable worksheet");
                return Ok(None);
            }
        };

        let mut sheet = SparseSheet::default();
        loop {
            let cell = match cells.next_cell() {
                Ok(Some(cell)) => cell,
                Ok(None) => break,
                Err(e) => {
                    debug!(sheet = %sheet_name, error = %e, "Skipping unreadable worksheet");
                    return Ok(None);
                }
            };
            let value = convert_cell(&Data::from(cell.get_value().clone()));
            if value.is_empty() {
                continue;
            }
            let (row, col) = cell.get_position();
            sheet.insert(row, col, value, &self.limits)?;
        }
        Ok(Some(sheet))
    }

    /// Sum of the entries' declared uncompressed sizes, from the central
    /// directory. Nothing is inflated here.
    fn check_expanded_size(&self, content: &[u8]) -> Result<()> {
        let mut archive = ZipArchive::new(Cursor::new(content))
            .map_err(|e| AppError::ParseError(format!("Failed to open workbook: {}", e)))?;

        let mut total: u64 = 0;
        for idx in 0..archive.len() {
            let entry = archive
                .by_index_raw(idx)
                .map_err(|e| {
                    AppError::ParseError(format!("Failed to read workbook entry: {}", e))
                })?;
            total = total.saturating_add(entry.size());
        }

        if total > self.limits.max_uncompressed_bytes {
            debug!(total, "Workbook expands past the ceiling");
            return Err(AppError::DatasetTooLarge(format!(
                "Workbook expands to more than {:.0} MB.",
                self.limits.max_uncompressed_bytes as f64 / BYTES_PER_MB
            )));
        }
        Ok(())
    }
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::DateTimeIso(s) => CellValue::DateTime(s.clone()),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        other => other
            .as_datetime()
            .map(|dt| CellValue::DateTime(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
            .or_else(|| other.as_f64().map(CellValue::Float))
            .unwrap_or(CellValue::Empty),
    }
}

fn unique_headers(header_row: &[CellValue]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    header_row
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let base = match cell.to_string().trim() {
                "" => format!("Unnamed: {}", idx),
                name => name.to_string(),
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}
