pub mod app_config;
pub mod dataset;
pub mod error;
pub mod llm_config;
pub mod pii_policy;
pub mod upload;
