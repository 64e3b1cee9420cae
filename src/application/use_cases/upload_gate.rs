//! Upload Validation Gate
//!
//! Every uploaded file passes through here before any of its data is used.
//! Checks run in a fixed order and stop at the first blocking failure:
//!
//! 1. size ceiling (and empty files)
//! 2. extension, declared MIME type and container signature
//! 3. content scan: macro/embedded-object markers, parse, cell patterns
//! 4. filename sanitization
//! 5. row and column ceilings
//! 6. advisory PII scan
//!
//! The gate is synchronous and keeps no state between calls.

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::application::use_cases::data_protection::DataProtectionService;
use crate::domain::app_config::GateLimits;
use crate::domain::dataset::{ParsedDataset, RawTable};
use crate::domain::error::{AppError, Result};
use crate::domain::pii_policy::PiiPolicy;
use crate::domain::upload::{
    GateRule, RejectionKind, UploadCandidate, ValidationVerdict, Violation, XLSX_EXTENSION,
    XLSX_MIME_TYPE,
};
use crate::infrastructure::security::sanitize_filename;
use crate::infrastructure::spreadsheet::{ContentScanner, XlsxReader};

/// Used when nothing of the declared filename survives sanitization.
pub const FALLBACK_FILENAME: &str = "upload.xlsx";

/// Local file header signature that opens every `.xlsx` container.
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Verdict plus, on a pass, the dataset built from the validated content.
#[derive(Debug)]
pub struct GateOutcome {
    pub verdict: ValidationVerdict,
    pub dataset: Option<ParsedDataset>,
}

impl GateOutcome {
    fn rejected(violation: Violation, content_sha256: Option<String>) -> Self {
        warn!(
            rule = ?violation.rule,
            kind = ?violation.kind,
            "Upload rejected"
        );
        Self {
            verdict: ValidationVerdict::rejected(vec![violation], content_sha256),
            dataset: None,
        }
    }

    /// The dataset, or the first violation as an error.
    pub fn into_result(self) -> Result<(ValidationVerdict, ParsedDataset)> {
        match self.dataset {
            Some(dataset) if self.verdict.passed => Ok((self.verdict, dataset)),
            _ => Err(self.verdict.to_error().unwrap_or_else(|| {
                AppError::Internal("Rejected verdict without violations".to_string())
            })),
        }
    }
}

pub struct UploadGate {
    limits: GateLimits,
    reader: XlsxReader,
    scanner: ContentScanner,
    protection: DataProtectionService,
}

impl UploadGate {
    pub fn new(limits: GateLimits, pii: &PiiPolicy) -> Result<Self> {
        limits.validate().map_err(AppError::ValidationError)?;
        Ok(Self {
            scanner: ContentScanner::new(limits.max_cell_chars),
            reader: XlsxReader::new(limits),
            protection: DataProtectionService::new(pii)?,
            limits,
        })
    }

    pub fn limits(&self) -> &GateLimits {
        &self.limits
    }

    pub fn validate(&self, candidate: UploadCandidate) -> GateOutcome {
        debug!(?candidate, "Validating upload");

        if let Some(violation) = self.check_size(&candidate) {
            return GateOutcome::rejected(violation, None);
        }
        if let Some(violation) = Self::check_format(&candidate) {
            return GateOutcome::rejected(violation, None);
        }

        let content_sha256 = hex::encode(Sha256::digest(&candidate.content));

        let table = match self.scan_content(&candidate.content) {
            Ok(table) => table,
            Err(violation) => return GateOutcome::rejected(violation, Some(content_sha256)),
        };

        let sanitized = sanitize_filename(&candidate.declared_name, FALLBACK_FILENAME);
        if sanitized != candidate.declared_name {
            info!("Declared filename rewritten during sanitization");
        }

        if let Some(violation) = self.check_dimensions(&table) {
            return GateOutcome::rejected(violation, Some(content_sha256));
        }

        let warnings = self.protection.scan(&table);

        info!(
            rows = table.row_count(),
            columns = table.column_count(),
            warnings = warnings.len(),
            sha256 = %content_sha256,
            "Upload accepted"
        );

        let dataset =
            ParsedDataset::from_validated(table, sanitized.clone(), content_sha256.clone());
        GateOutcome {
            verdict: ValidationVerdict::accepted(sanitized, warnings, content_sha256),
            dataset: Some(dataset),
        }
    }

    fn check_size(&self, candidate: &UploadCandidate) -> Option<Violation> {
        let size = candidate.effective_size();
        if size > self.limits.max_file_bytes {
            return Some(Violation::new(
                GateRule::FileSize,
                RejectionKind::FileTooLarge,
                format!(
                    "File size ({:.1} MB) exceeds the maximum allowed size of {:.0} MB.",
                    size as f64 / BYTES_PER_MB,
                    self.limits.max_file_bytes as f64 / BYTES_PER_MB
                ),
            ));
        }
        if candidate.content.is_empty() {
            return Some(Violation::new(
                GateRule::FileSize,
                RejectionKind::UnsupportedFormat,
                "The file appears to be empty.",
            ));
        }
        None
    }

    fn check_format(candidate: &UploadCandidate) -> Option<Violation> {
        let extension_ok = candidate
            .declared_name
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map_or(false, |(_, ext)| ext.eq_ignore_ascii_case(XLSX_EXTENSION));
        if !extension_ok {
            return Some(Violation::new(
                GateRule::Format,
                RejectionKind::UnsupportedFormat,
                "Only Excel workbooks with the .xlsx extension are accepted.",
            ));
        }

        let mime = candidate
            .declared_mime
            .split(';')
            .next()
            .unwrap_or("")
            .trim();
        if !mime.eq_ignore_ascii_case(XLSX_MIME_TYPE) {
            return Some(Violation::new(
                GateRule::Format,
                RejectionKind::UnsupportedFormat,
                "The declared file type is not an Excel workbook.",
            ));
        }

        if !candidate.content.starts_with(ZIP_SIGNATURE) {
            return Some(Violation::new(
                GateRule::Format,
                RejectionKind::UnsupportedFormat,
                "The file content is not an Excel workbook.",
            ));
        }
        None
    }

    fn scan_content(&self, content: &[u8]) -> std::result::Result<RawTable, Violation> {
        if let Some(finding) = self.scanner.scan_container(content) {
            debug!(?finding, "Container scan hit");
            return Err(Violation::new(
                GateRule::ContentScan,
                RejectionKind::SuspiciousContent,
                finding.user_message(self.scanner.max_cell_chars()),
            ));
        }

        let table = self.reader.read_first_table(content).map_err(|e| {
            debug!(error = %e, "Workbook parse failed");
            match e {
                // Sheet extent or expanded size already past a ceiling
                AppError::DatasetTooLarge(msg) => {
                    Violation::new(GateRule::DatasetSize, RejectionKind::DatasetTooLarge, msg)
                }
                AppError::UnsupportedFormat(msg) => {
                    Violation::new(GateRule::ContentScan, RejectionKind::UnsupportedFormat, msg)
                }
                _ => Violation::new(
                    GateRule::ContentScan,
                    RejectionKind::UnsupportedFormat,
                    "The file could not be read as an Excel workbook.",
                ),
            }
        })?;

        if let Some(finding) = self.scanner.scan_table(&table) {
            debug!(?finding, "Cell scan hit");
            return Err(Violation::new(
                GateRule::ContentScan,
                RejectionKind::SuspiciousContent,
                finding.user_message(self.scanner.max_cell_chars()),
            ));
        }

        Ok(table)
    }

    fn check_dimensions(&self, table: &RawTable) -> Option<Violation> {
        if table.row_count() > self.limits.max_rows {
            return Some(Violation::new(
                GateRule::DatasetSize,
                RejectionKind::DatasetTooLarge,
                format!(
                    "Dataset has too many rows ({}). Maximum allowed: {}.",
                    table.row_count(),
                    self.limits.max_rows
                ),
            ));
        }
        if table.column_count() > self.limits.max_columns {
            return Some(Violation::new(
                GateRule::DatasetSize,
                RejectionKind::DatasetTooLarge,
                format!(
                    "Dataset has too many columns ({}). Maximum allowed: {}.",
                    table.column_count(),
                    self.limits.max_columns
                ),
            ));
        }
        None
    }
}
