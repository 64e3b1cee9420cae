// ============================================================
// UPLOAD TYPES
// ============================================================
// What the client sent, and what the gate decided about it

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::AppError;

/// The only content type accepted for uploads.
pub const XLSX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// The only extension accepted for uploads (compared case-insensitively).
pub const XLSX_EXTENSION: &str = "xlsx";

/// One uploaded file, exactly as the client declared it.
///
/// Lives for the duration of a single request and is never written to disk.
pub struct UploadCandidate {
    pub content: Vec<u8>,
    pub declared_name: String,
    pub declared_mime: String,
    pub size: u64,
}

impl UploadCandidate {
    pub fn new(
        content: Vec<u8>,
        declared_name: impl Into<String>,
        declared_mime: impl Into<String>,
    ) -> Self {
        let size = content.len() as u64;
        Self {
            content,
            declared_name: declared_name.into(),
            declared_mime: declared_mime.into(),
            size,
        }
    }

    /// Override the declared byte size (e.g. from `Content-Length`).
    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Size used by the size check: whichever of declared and actual is larger.
    pub fn effective_size(&self) -> u64 {
        self.size.max(self.content.len() as u64)
    }
}

impl fmt::Debug for UploadCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Content stays out of debug output.
        f.debug_struct("UploadCandidate")
            .field("declared_name", &self.declared_name)
            .field("declared_mime", &self.declared_mime)
            .field("size", &self.size)
            .field("content_len", &self.content.len())
            .finish()
    }
}

/// Blocking gate rules, in the order they are applied. Filename
/// sanitization sits between content scan and dataset size but never rejects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateRule {
    FileSize,
    Format,
    ContentScan,
    DatasetSize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    FileTooLarge,
    UnsupportedFormat,
    SuspiciousContent,
    DatasetTooLarge,
}

/// A single violated rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violation {
    pub rule: GateRule,
    pub kind: RejectionKind,
    pub message: String,
}

impl Violation {
    pub fn new(rule: GateRule, kind: RejectionKind, message: impl Into<String>) -> Self {
        Self {
            rule,
            kind,
            message: message.into(),
        }
    }

    pub fn to_error(&self) -> AppError {
        let msg = self.message.clone();
        match self.kind {
            RejectionKind::FileTooLarge => AppError::FileTooLarge(msg),
            RejectionKind::UnsupportedFormat => AppError::UnsupportedFormat(msg),
            RejectionKind::SuspiciousContent => AppError::SuspiciousContent(msg),
            RejectionKind::DatasetTooLarge => AppError::DatasetTooLarge(msg),
        }
    }
}

/// Advisory finding; never blocks an upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PiiWarning {
    pub column: String,
    pub kind: String,
    pub message: String,
}

/// Outcome of validating one upload attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub passed: bool,
    pub violations: Vec<Violation>,
    pub sanitized_filename: Option<String>,
    pub warnings: Vec<PiiWarning>,
    /// SHA-256 of the content, once the gate got far enough to read it.
    pub content_sha256: Option<String>,
}

impl ValidationVerdict {
    pub fn rejected(violations: Vec<Violation>, content_sha256: Option<String>) -> Self {
        Self {
            passed: false,
            violations,
            sanitized_filename: None,
            warnings: Vec::new(),
            content_sha256,
        }
    }

    pub fn accepted(
        sanitized_filename: String,
        warnings: Vec<PiiWarning>,
        content_sha256: String,
    ) -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
            sanitized_filename: Some(sanitized_filename),
            warnings,
            content_sha256: Some(content_sha256),
        }
    }

    /// The first violated rule as an error, if the verdict is a rejection.
    pub fn to_error(&self) -> Option<AppError> {
        self.violations.first().map(Violation::to_error)
    }
}
