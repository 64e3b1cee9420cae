use crate::domain::error::{AppError, Result};
use keyring::Entry;

/// Read-only view of the OS credential store, used as the last fallback when
/// the LLM API key is not configured through the environment or config file.
pub struct KeyringManager {
    service: String,
}

impl KeyringManager {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// `Ok(None)` when no entry exists for `key`.
    pub fn get_secret(&self, key: &str) -> Result<Option<String>> {
        let entry = Entry::new(&self.service, key)
            .map_err(|e| AppError::SecurityError(format!("Failed to create entry: {}", e)))?;

        match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AppError::SecurityError(format!(
                "Failed to read credential: {}",
                e
            ))),
        }
    }
}
