use serde::{Deserialize, Serialize};

use super::llm_config::LLMConfig;
use super::pii_policy::PiiPolicy;

const MB: u64 = 1024 * 1024;
const MAX_WINDOW_SECONDS: u64 = 24 * 60 * 60;
const MAX_IDLE_TIMEOUT_MINUTES: u64 = 7 * 24 * 60;

/// Complete service configuration, assembled by
/// `infrastructure::config::ConfigService::load`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gate: GateLimits,
    pub rate_limit: RateLimitConfig,
    pub session: SessionConfig,
    pub pii: PiiPolicy,
    pub llm: LLMConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Browser origins allowed by CORS. Empty means any origin.
    pub allowed_origins: Vec<String>,
    /// Rows returned by the dataset preview endpoint
    pub preview_rows: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            allowed_origins: Vec::new(),
            preview_rows: 100,
        }
    }
}

/// Ceilings enforced by the upload gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateLimits {
    pub max_file_bytes: u64,
    pub max_rows: usize,
    pub max_columns: usize,
    pub max_cell_chars: usize,
    /// Ceiling on rows x columns actually materialised from a sheet
    pub max_cells: usize,
    /// Ceiling on the summed uncompressed size of the workbook's entries
    pub max_uncompressed_bytes: u64,
}

impl Default for GateLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 50 * MB,
            max_rows: 1_000_000,
            max_columns: 1_000,
            max_cell_chars: 10_000,
            max_cells: 10_000_000,
            max_uncompressed_bytes: 256 * MB,
        }
    }
}

impl GateLimits {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_file_bytes == 0 {
            return Err("gate.max_file_bytes must be > 0".to_string());
        }
        if self.max_rows == 0 {
            return Err("gate.max_rows must be > 0".to_string());
        }
        if self.max_columns == 0 {
            return Err("gate.max_columns must be > 0".to_string());
        }
        if self.max_cell_chars == 0 {
            return Err("gate.max_cell_chars must be > 0".to_string());
        }
        if self.max_cells == 0 {
            return Err("gate.max_cells must be > 0".to_string());
        }
        if self.max_uncompressed_bytes == 0 {
            return Err("gate.max_uncompressed_bytes must be > 0".to_string());
        }
        Ok(())
    }
}

/// Outbound language-model call budget, per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum calls admitted inside one window
    pub max_calls: u32,
    /// Window length in seconds
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 10,
            window_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity after which a session and all its data are dropped
    pub idle_timeout_minutes: u64,
    /// Dataset footprint above which the session status carries a warning
    pub large_dataset_warning_bytes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: 120,
            large_dataset_warning_bytes: 100 * MB,
        }
    }
}

impl AppConfig {
    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        self.gate.validate()?;
        if self.rate_limit.max_calls == 0 {
            return Err("rate_limit.max_calls must be > 0".to_string());
        }
        if !(1..=MAX_WINDOW_SECONDS).contains(&self.rate_limit.window_seconds) {
            return Err(format!(
                "rate_limit.window_seconds must be between 1 and {}",
                MAX_WINDOW_SECONDS
            ));
        }
        if !(1..=MAX_IDLE_TIMEOUT_MINUTES).contains(&self.session.idle_timeout_minutes) {
            return Err(format!(
                "session.idle_timeout_minutes must be between 1 and {}",
                MAX_IDLE_TIMEOUT_MINUTES
            ));
        }
        self.pii.validate()?;
        Ok(())
    }
}
