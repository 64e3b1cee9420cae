pub mod chat;
pub mod data_protection;
pub mod dataset_profiler;
pub mod rate_limiter;
pub mod session_store;
pub mod upload_gate;
