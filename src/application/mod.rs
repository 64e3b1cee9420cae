pub mod use_cases;

pub use use_cases::chat::ChatUseCase;
pub use use_cases::session_store::SessionStore;
pub use use_cases::upload_gate::UploadGate;
