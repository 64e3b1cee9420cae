pub mod config;
pub mod llm_clients;
pub mod response;
pub mod security;
pub mod spreadsheet;
