// ============================================================
// SPREADSHEET MODULE
// ============================================================
// Workbook parsing and content threat scanning

pub mod content_scanner;
pub mod xlsx_reader;

#[cfg(test)]
pub(crate) mod test_workbook;

pub use content_scanner::ContentScanner;
pub use xlsx_reader::XlsxReader;
