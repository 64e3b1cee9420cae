use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::application::{ChatUseCase, SessionStore, UploadGate};
use crate::domain::error::AppError;
use crate::infrastructure::config::ConfigService;
use crate::infrastructure::llm_clients::{LLMClient, OpenAIClient};
use crate::interfaces::http::{add_event, start_server, HttpState};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn startup_error(err: AppError) -> io::Error {
    error!(error = %err, "Startup failed");
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

pub async fn run() -> io::Result<()> {
    init_tracing();

    let config = ConfigService::new().load().map_err(startup_error)?;

    let llm_client: Arc<dyn LLMClient + Send + Sync> = Arc::new(
        OpenAIClient::new(Duration::from_secs(config.llm.request_timeout_secs))
            .map_err(startup_error)?,
    );
    let gate = Arc::new(UploadGate::new(config.gate, &config.pii).map_err(startup_error)?);
    let sessions = Arc::new(SessionStore::new(config.session, config.rate_limit));
    let chat = Arc::new(ChatUseCase::new(
        llm_client,
        Arc::clone(&sessions),
        config.llm.clone(),
    ));

    let events = Arc::new(Mutex::new(Vec::new()));
    if !chat.is_available() {
        add_event(
            &events,
            "WARN",
            "Config",
            "No API credential configured; chat is disabled",
        );
    }

    info!(
        max_file_bytes = config.gate.max_file_bytes,
        max_rows = config.gate.max_rows,
        max_columns = config.gate.max_columns,
        "Upload gate ready"
    );

    let state = HttpState {
        sessions,
        gate,
        chat,
        events,
        preview_rows: config.server.preview_rows,
    };
    start_server(state, &config.server)?.await
}
