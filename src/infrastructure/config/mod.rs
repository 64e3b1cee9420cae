use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::app_config::AppConfig;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::security::keyring::KeyringManager;

pub const DEFAULT_CONFIG_FILE: &str = "sheetchat.toml";
pub const ENV_PREFIX: &str = "SHEETCHAT_";
const KEYRING_SERVICE: &str = "sheetchat";
const KEYRING_ACCOUNT: &str = "openai_api_key";

/// Assembles `AppConfig` from defaults, `sheetchat.toml` and the environment.
pub struct ConfigService {
    keyring: KeyringManager,
    config_file: PathBuf,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::with_config_file(DEFAULT_CONFIG_FILE)
    }

    pub fn with_config_file(path: impl AsRef<Path>) -> Self {
        Self {
            keyring: KeyringManager::new(KEYRING_SERVICE),
            config_file: path.as_ref().to_path_buf(),
        }
    }

    /// Later layers win: defaults, config file, `SHEETCHAT_*` env
    /// (`__` separates sections), then `OPENAI_API_KEY`.
    pub fn figment(&self) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(&self.config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(
                Env::raw()
                    .only(&["OPENAI_API_KEY"])
                    .map(|_| "llm.api_key".into()),
            )
    }

    pub fn load(&self) -> Result<AppConfig> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable .env"),
        }

        let mut config: AppConfig = self
            .figment()
            .extract()
            .map_err(|e| AppError::ValidationError(format!("Invalid configuration: {}", e)))?;

        config.validate().map_err(AppError::ValidationError)?;
        Url::parse(&config.llm.base_url).map_err(|e| {
            AppError::ValidationError(format!("Invalid llm.base_url: {}", e))
        })?;

        if config.llm.credential().is_none() {
            config.llm.api_key = self.keyring_api_key();
        }

        info!(
            config_file = %self.config_file.display(),
            model = %config.llm.model,
            credential_present = config.llm.credential().is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn keyring_api_key(&self) -> Option<String> {
        match self.keyring.get_secret(KEYRING_ACCOUNT) {
            Ok(secret) => secret,
            Err(e) => {
                // Headless hosts often have no secret service at all.
                debug!(service = self.keyring.service(), error = %e, "Keyring unavailable");
                None
            }
        }
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}
