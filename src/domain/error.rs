use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppError {
    // Upload gate rejections
    FileTooLarge(String),
    UnsupportedFormat(String),
    SuspiciousContent(String),
    DatasetTooLarge(String),
    // Chat gating
    RateLimited { retry_after_seconds: i64 },
    ApiCredentialMissing,
    // Ambient
    Internal(String),
    NotFound(String),
    ValidationError(String),
    ParseError(String),
    LLMError(String),
    SecurityError(String),
    IoError(String),
}

impl AppError {
    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::FileTooLarge(_) => "file_too_large",
            AppError::UnsupportedFormat(_) => "unsupported_format",
            AppError::SuspiciousContent(_) => "suspicious_content",
            AppError::DatasetTooLarge(_) => "dataset_too_large",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::ApiCredentialMissing => "api_credential_missing",
            AppError::Internal(_) => "internal",
            AppError::NotFound(_) => "not_found",
            AppError::ValidationError(_) => "validation_error",
            AppError::ParseError(_) => "parse_error",
            AppError::LLMError(_) => "llm_error",
            AppError::SecurityError(_) => "security_error",
            AppError::IoError(_) => "io_error",
        }
    }

    /// Short message that is safe to show to the end user.
    ///
    /// Gate rejections carry messages written for the user already. Errors
    /// that wrap library or I/O failures collapse to a generic sentence; their
    /// detail only goes to the server log.
    pub fn user_message(&self) -> String {
        match self {
            AppError::FileTooLarge(msg)
            | AppError::UnsupportedFormat(msg)
            | AppError::SuspiciousContent(msg)
            | AppError::DatasetTooLarge(msg)
            | AppError::ValidationError(msg)
            | AppError::NotFound(msg) => msg.clone(),
            AppError::RateLimited {
                retry_after_seconds,
            } => format!(
                "Too many questions in a short time. Try again in {} seconds.",
                retry_after_seconds
            ),
            AppError::ApiCredentialMissing => {
                "The chat service is not configured: no language-model API key is available."
                    .to_string()
            }
            AppError::LLMError(_) => {
                "The language-model service could not answer. Please try again later.".to_string()
            }
            AppError::ParseError(_) => "The request could not be understood.".to_string(),
            AppError::Internal(_) | AppError::SecurityError(_) | AppError::IoError(_) => {
                "Something went wrong while processing the request.".to_string()
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::FileTooLarge(msg) => write!(f, "File too large: {}", msg),
            AppError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            AppError::SuspiciousContent(msg) => write!(f, "Suspicious content: {}", msg),
            AppError::DatasetTooLarge(msg) => write!(f, "Dataset too large: {}", msg),
            AppError::RateLimited {
                retry_after_seconds,
            } => write!(f, "Rate limited: retry after {}s", retry_after_seconds),
            AppError::ApiCredentialMissing => write!(f, "API credential missing"),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AppError::LLMError(msg) => write!(f, "LLM error: {}", msg),
            AppError::SecurityError(msg) => write!(f, "Security error: {}", msg),
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
