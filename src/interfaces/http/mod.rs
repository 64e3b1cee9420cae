use crate::application::use_cases::chat::ChatUseCase;
use crate::application::use_cases::dataset_profiler::{
    DatasetPreview, DatasetProfiler, DatasetSummary,
};
use crate::application::use_cases::session_store::{LoadedDataset, SessionStore};
use crate::application::use_cases::upload_gate::UploadGate;
use crate::domain::app_config::ServerConfig;
use crate::domain::error::{AppError, Result};
use crate::domain::upload::{PiiWarning, UploadCandidate, ValidationVerdict};
use actix_cors::Cors;
use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError};
use actix_web::http::header::{self, HeaderMap};
use actix_web::http::StatusCode;
use actix_web::{
    delete, dev::Server, get, post, web, App, HttpRequest, HttpResponse, HttpServer, ResponseError,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};
use uuid::Uuid;
use validator::Validate;

const MAX_SECURITY_EVENTS: usize = 100;

/// Security-relevant outcome kept for the operator view.
///
/// Messages carry rule and error codes only: no session ids, filenames or
/// cell content.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SecurityEvent {
    pub time: String,
    pub level: String,
    pub source: String,
    pub message: String,
}

pub struct HttpState {
    pub sessions: Arc<SessionStore>,
    pub gate: Arc<UploadGate>,
    pub chat: Arc<ChatUseCase>,
    pub events: Arc<Mutex<Vec<SecurityEvent>>>,
    pub preview_rows: usize,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UploadQuery {
    #[validate(length(min = 1, max = 1024))]
    pub filename: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 50000))]
    pub question: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

#[derive(Serialize)]
struct DatasetView<'a> {
    filename: &'a str,
    sheet_name: &'a str,
    sheet_count: usize,
    content_sha256: &'a str,
    uploaded_at: DateTime<Utc>,
    summary: &'a DatasetSummary,
    warnings: &'a [PiiWarning],
    preview: DatasetPreview,
}

impl<'a> DatasetView<'a> {
    fn new(data: &'a LoadedDataset, preview_rows: usize) -> Self {
        Self {
            filename: data.dataset.filename(),
            sheet_name: data.dataset.sheet_name(),
            sheet_count: data.dataset.sheet_count(),
            content_sha256: data.dataset.content_sha256(),
            uploaded_at: data.uploaded_at,
            summary: &data.profile.summary,
            warnings: &data.warnings,
            preview: DatasetProfiler::preview(&data.dataset, preview_rows),
        }
    }
}

#[derive(Serialize)]
struct UploadResponse<'a> {
    verdict: &'a ValidationVerdict,
    dataset: DatasetView<'a>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    active_sessions: usize,
    chat_available: bool,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::SuspiciousContent(_)
            | AppError::DatasetTooLarge(_)
            | AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ApiCredentialMissing => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::LLMError(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_)
            | AppError::ParseError(_)
            | AppError::SecurityError(_)
            | AppError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, code = self.code(), "Request failed");
        } else {
            debug!(error = %self, code = self.code(), "Request rejected");
        }

        let mut response = HttpResponse::build(status);
        if let AppError::RateLimited {
            retry_after_seconds,
        } = self
        {
            response.insert_header((header::RETRY_AFTER, retry_after_seconds.to_string()));
        }
        response.json(ErrorBody {
            error: self.code(),
            message: self.user_message(),
        })
    }
}

#[post("/sessions")]
async fn create_session(data: web::Data<HttpState>) -> Result<HttpResponse> {
    let status = data.sessions.create()?;
    Ok(HttpResponse::Created().json(status))
}

#[get("/sessions/{id}")]
async fn session_status(
    data: web::Data<HttpState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let status = data.sessions.status(path.into_inner())?;
    Ok(HttpResponse::Ok().json(status))
}

#[delete("/sessions/{id}")]
async fn end_session(
    data: web::Data<HttpState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    data.sessions.end(path.into_inner())?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/sessions/{id}/upload")]
async fn upload(
    data: web::Data<HttpState>,
    path: web::Path<Uuid>,
    query: web::Query<UploadQuery>,
    req: HttpRequest,
    mut payload: web::Payload,
) -> Result<HttpResponse> {
    let session_id = path.into_inner();
    query
        .validate()
        .map_err(|e| AppError::ValidationError(format!("Invalid filename parameter: {}", e)))?;
    // Unknown sessions fail before the body is read.
    data.sessions.status(session_id)?;

    let cap = data.gate.limits().max_file_bytes.saturating_add(1);
    let content = match read_capped(&mut payload, cap).await {
        Ok(content) => content,
        Err(err) => {
            discard_dataset(&data, session_id);
            return Err(err);
        }
    };

    let mut candidate = UploadCandidate::new(
        content,
        query.into_inner().filename,
        header_str(req.headers(), header::CONTENT_TYPE).unwrap_or_default(),
    );
    if let Some(declared) = header_str(req.headers(), header::CONTENT_LENGTH)
        .and_then(|v| v.parse::<u64>().ok())
    {
        candidate = candidate.with_declared_size(declared);
    }

    let gate = Arc::clone(&data.gate);
    let joined = tokio::task::spawn_blocking(
        move || -> Result<(ValidationVerdict, LoadedDataset)> {
            let (verdict, dataset) = gate.validate(candidate).into_result()?;
            let loaded = LoadedDataset::new(dataset, verdict.warnings.clone());
            Ok((verdict, loaded))
        },
    )
    .await;

    let (verdict, loaded) = match joined {
        Ok(Ok(accepted)) => accepted,
        Ok(Err(err)) => {
            add_event(
                &data.events,
                "WARN",
                "UploadGate",
                &format!("Upload rejected: {}", err.code()),
            );
            discard_dataset(&data, session_id);
            return Err(err);
        }
        Err(join_err) => {
            return Err(AppError::Internal(format!(
                "Upload validation task failed: {}",
                join_err
            )))
        }
    };

    if !verdict.warnings.is_empty() {
        add_event(
            &data.events,
            "INFO",
            "DataProtection",
            &format!(
                "Upload accepted with {} PII warning(s)",
                verdict.warnings.len()
            ),
        );
    }

    let loaded = data.sessions.set_dataset(session_id, loaded)?;
    info!(rows = loaded.dataset.row_count(), "Dataset loaded");
    Ok(HttpResponse::Ok().json(UploadResponse {
        verdict: &verdict,
        dataset: DatasetView::new(&loaded, data.preview_rows),
    }))
}

#[get("/sessions/{id}/dataset")]
async fn get_dataset(
    data: web::Data<HttpState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let loaded = require_dataset(&data, path.into_inner())?;
    Ok(HttpResponse::Ok().json(DatasetView::new(&loaded, data.preview_rows)))
}

#[delete("/sessions/{id}/dataset")]
async fn clear_dataset(
    data: web::Data<HttpState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    data.sessions.clear_data(path.into_inner())?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/sessions/{id}/dataset/profile")]
async fn get_profile(
    data: web::Data<HttpState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let loaded = require_dataset(&data, path.into_inner())?;
    Ok(HttpResponse::Ok().json(&loaded.profile))
}

#[post("/sessions/{id}/chat")]
async fn ask(
    data: web::Data<HttpState>,
    path: web::Path<Uuid>,
    req: web::Json<ChatRequest>,
) -> Result<HttpResponse> {
    req.validate()
        .map_err(|e| AppError::ValidationError(format!("Invalid chat request: {}", e)))?;

    match data.chat.ask(path.into_inner(), &req.question).await {
        Ok(reply) => Ok(HttpResponse::Ok().json(reply)),
        Err(err) => {
            match &err {
                AppError::RateLimited { .. } => {
                    add_event(&data.events, "WARN", "RateLimiter", "Chat rate limit exceeded")
                }
                AppError::ApiCredentialMissing => add_event(
                    &data.events,
                    "ERROR",
                    "Chat",
                    "Chat unavailable: no API credential configured",
                ),
                _ => {}
            }
            Err(err)
        }
    }
}

#[get("/sessions/{id}/chat")]
async fn chat_history(
    data: web::Data<HttpState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let history = data.chat.history(path.into_inner())?;
    Ok(HttpResponse::Ok().json(history))
}

#[get("/sessions/{id}/chat/suggestions")]
async fn chat_suggestions(
    data: web::Data<HttpState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let questions = data.chat.suggested_questions(path.into_inner())?;
    Ok(HttpResponse::Ok().json(questions))
}

#[get("/security/events")]
async fn security_events(data: web::Data<HttpState>) -> HttpResponse {
    let events = data.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    HttpResponse::Ok().json(&*events)
}

#[get("/health")]
async fn health(data: web::Data<HttpState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        active_sessions: data.sessions.active_sessions()?,
        chat_available: data.chat.is_available(),
    }))
}

// A rejected upload replaces whatever was loaded before.
fn discard_dataset(data: &HttpState, session_id: Uuid) {
    if let Err(err) = data.sessions.clear_data(session_id) {
        debug!(error = %err, "Could not clear session after rejected upload");
    }
}

fn require_dataset(data: &HttpState, session_id: Uuid) -> Result<Arc<LoadedDataset>> {
    data.sessions
        .dataset(session_id)?
        .ok_or_else(|| {
            AppError::NotFound("No dataset has been uploaded in this session.".to_string())
        })
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Read at most `cap` bytes of the body. Anything beyond is never buffered;
/// a body that hits the cap is left for the size check to reject.
async fn read_capped(payload: &mut web::Payload, cap: u64) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| AppError::IoError(format!("Failed to read upload: {}", e)))?;
        let remaining = cap.saturating_sub(body.len() as u64);
        if chunk.len() as u64 >= remaining {
            body.extend_from_slice(&chunk[..remaining as usize]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

pub fn add_event(events: &Mutex<Vec<SecurityEvent>>, level: &str, source: &str, message: &str) {
    let entry = SecurityEvent {
        time: Utc::now().to_rfc3339(),
        level: level.to_string(),
        source: source.to_string(),
        message: message.to_string(),
    };
    let mut events = events.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    events.push(entry);
    if events.len() > MAX_SECURITY_EVENTS {
        events.remove(0);
    }
}

// Extractor failures answer in the same JSON shape as every other error and
// never echo parser detail.
fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    debug!(error = %err, "Rejected query string");
    AppError::ValidationError("Invalid or missing query parameters.".to_string()).into()
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    debug!(error = %err, "Rejected JSON body");
    AppError::ValidationError("Request body must be a valid JSON object.".to_string()).into()
}

fn path_error(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    debug!(error = %err, "Rejected path parameter");
    AppError::NotFound("Session not found or expired.".to_string()).into()
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::QueryConfig::default().error_handler(query_error))
            .app_data(web::JsonConfig::default().error_handler(json_error))
            .app_data(web::PathConfig::default().error_handler(path_error))
            .service(create_session)
            .service(session_status)
            .service(end_session)
            .service(upload)
            .service(get_profile)
            .service(get_dataset)
            .service(clear_dataset)
            .service(chat_suggestions)
            .service(chat_history)
            .service(ask)
            .service(security_events)
            .service(health),
    );
}

fn cors(config: &ServerConfig) -> Cors {
    if config.allowed_origins.is_empty() {
        return Cors::permissive();
    }
    config
        .allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allow_any_method()
        .allow_any_header()
        .expose_headers([header::RETRY_AFTER])
}

pub fn start_server(state: HttpState, config: &ServerConfig) -> std::io::Result<Server> {
    let state = web::Data::new(state);
    let server_config = config.clone();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(cors(&server_config))
            .app_data(state.clone())
            .configure(routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run();

    info!(host = %config.host, port = config.port, "HTTP server listening");
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::rate_limiter::RateLimitConfig;
    use crate::domain::app_config::{GateLimits, SessionConfig};
    use crate::domain::llm_config::LLMConfig;
    use crate::domain::pii_policy::PiiPolicy;
    use crate::domain::upload::XLSX_MIME_TYPE;
    use crate::infrastructure::llm_clients::LLMClient;
    use crate::infrastructure::spreadsheet::test_workbook::{
        numbered_rows, TestCell, WorkbookBuilder,
    };
    use actix_web::test;
    use async_trait::async_trait;

    struct EchoClient;

    #[async_trait]
    impl LLMClient for EchoClient {
        async fn generate(&self, _config: &LLMConfig, _system: &str, user: &str) -> Result<String> {
            Ok(format!("You asked: {}", user))
        }
    }

    fn state(
        limits: GateLimits,
        rate_limit: RateLimitConfig,
        api_key: Option<&str>,
    ) -> web::Data<HttpState> {
        let sessions = Arc::new(SessionStore::new(SessionConfig::default(), rate_limit));
        let llm_config = LLMConfig {
            api_key: api_key.map(str::to_string),
            ..LLMConfig::default()
        };
        web::Data::new(HttpState {
            gate: Arc::new(UploadGate::new(limits, &PiiPolicy::default()).unwrap()),
            chat: Arc::new(ChatUseCase::new(
                Arc::new(EchoClient),
                Arc::clone(&sessions),
                llm_config,
            )),
            sessions,
            events: Arc::new(Mutex::new(Vec::new())),
            preview_rows: 2,
        })
    }

    fn default_state() -> web::Data<HttpState> {
        state(GateLimits::default(), RateLimitConfig::default(), Some("sk-test"))
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state.clone()).configure(routes)).await
        };
    }

    macro_rules! new_session {
        ($app:expr) => {{
            let req = test::TestRequest::post().uri("/api/sessions").to_request();
            let body: serde_json::Value = test::call_and_read_body_json(&$app, req).await;
            body["session_id"].as_str().unwrap().parse::<Uuid>().unwrap()
        }};
    }

    fn upload_request(id: Uuid, filename: &str, mime: &str, body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri(&format!("/api/sessions/{}/upload?filename={}", id, filename))
            .insert_header((header::CONTENT_TYPE, mime.to_string()))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn test_upload_then_read_dataset() {
        let state = default_state();
        let app = app!(state);
        let id = new_session!(app);

        let bytes = WorkbookBuilder::new().sheet("Data", numbered_rows(5)).build();
        let req = upload_request(id, "report.xlsx", XLSX_MIME_TYPE, bytes).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["verdict"]["passed"], true);
        assert_eq!(body["dataset"]["summary"]["total_rows"], 5);
        assert_eq!(body["dataset"]["preview"]["rows"].as_array().unwrap().len(), 2);

        let req = test::TestRequest::get()
            .uri(&format!("/api/sessions/{}/dataset/profile", id))
            .to_request();
        let profile: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(profile["columns"][0]["name"], "id");
    }

    #[actix_web::test]
    async fn test_rejections_map_to_status_codes() {
        let limits = GateLimits {
            max_file_bytes: 1024,
            ..GateLimits::default()
        };
        let small = state(limits, RateLimitConfig::default(), Some("sk-test"));
        let app = app!(small);
        let id = new_session!(app);

        let req = upload_request(id, "big.xlsx", XLSX_MIME_TYPE, vec![b'x'; 5000]).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "file_too_large");

        let state = default_state();
        let app = app!(state);
        let id = new_session!(app);

        let bytes = WorkbookBuilder::new().sheet("Data", numbered_rows(1)).build();
        let req = upload_request(id, "data.csv", XLSX_MIME_TYPE, bytes).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "unsupported_format");

        let rows = vec![
            vec![TestCell::text("c")],
            vec![TestCell::text("<script>x</script>")],
        ];
        let bytes = WorkbookBuilder::new().sheet("Data", rows).build();
        let req = upload_request(id, "a.xlsx", XLSX_MIME_TYPE, bytes).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "suspicious_content");
    }

    #[actix_web::test]
    async fn test_rejected_upload_discards_previous_dataset() {
        let state = default_state();
        let app = app!(state);
        let id = new_session!(app);

        let bytes = WorkbookBuilder::new().sheet("Data", numbered_rows(3)).build();
        let req = upload_request(id, "good.xlsx", XLSX_MIME_TYPE, bytes).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        let req = test::TestRequest::post()
            .uri(&format!("/api/sessions/{}/chat", id))
            .set_json(serde_json::json!({ "question": "How many rows?" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let rows = vec![
            vec![TestCell::text("c")],
            vec![TestCell::text("<script>x</script>")],
        ];
        let bytes = WorkbookBuilder::new().sheet("Data", rows).build();
        let req = upload_request(id, "bad.xlsx", XLSX_MIME_TYPE, bytes).to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let req = test::TestRequest::get()
            .uri(&format!("/api/sessions/{}/dataset", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri(&format!("/api/sessions/{}", id))
            .to_request();
        let status: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(status["has_dataset"], false);

        let req = test::TestRequest::get()
            .uri(&format!("/api/sessions/{}/chat", id))
            .to_request();
        let history: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(history.as_array().map(Vec::len), Some(0));
    }

    #[actix_web::test]
    async fn test_missing_query_parameter_is_json_validation_error() {
        let state = default_state();
        let app = app!(state);
        let id = new_session!(app);

        let req = test::TestRequest::post()
            .uri(&format!("/api/sessions/{}/upload", id))
            .insert_header((header::CONTENT_TYPE, XLSX_MIME_TYPE))
            .set_payload(b"PK\x03\x04".to_vec())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "validation_error");
        assert!(!body["message"].as_str().unwrap_or_default().contains("filename"));
    }

    #[actix_web::test]
    async fn test_malformed_chat_body_is_json_validation_error() {
        let state = default_state();
        let app = app!(state);
        let id = new_session!(app);

        let req = test::TestRequest::post()
            .uri(&format!("/api/sessions/{}/chat", id))
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{\"question\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "validation_error");
        assert!(!body["message"].as_str().unwrap_or_default().contains("EOF"));
    }

    #[actix_web::test]
    async fn test_malformed_session_id_is_json_not_found() {
        let state = default_state();
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/api/sessions/not-a-uuid/dataset")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "not_found");
    }

    #[actix_web::test]
    async fn test_security_events_do_not_leak_names() {
        let state = default_state();
        let app = app!(state);
        let id = new_session!(app);

        let body = b"PK\x03\x04".to_vec();
        let req = upload_request(id, "secret-payroll.csv", XLSX_MIME_TYPE, body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let req = test::TestRequest::get().uri("/api/security/events").to_request();
        let events: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let text = events.to_string();
        assert!(text.contains("unsupported_format"));
        assert!(!text.contains("payroll"));
        assert!(!text.contains(&id.to_string()));
    }

    #[actix_web::test]
    async fn test_chat_rate_limit_returns_retry_after() {
        let state = state(
            GateLimits::default(),
            RateLimitConfig {
                max_calls: 1,
                window_seconds: 60,
            },
            Some("sk-test"),
        );
        let app = app!(state);
        let id = new_session!(app);
        let bytes = WorkbookBuilder::new().sheet("Data", numbered_rows(3)).build();
        test::call_service(&app, upload_request(id, "a.xlsx", XLSX_MIME_TYPE, bytes).to_request())
            .await;

        let ask_request = || {
            test::TestRequest::post()
                .uri(&format!("/api/sessions/{}/chat", id))
                .set_json(serde_json::json!({ "question": "How many rows?" }))
                .to_request()
        };

        let resp = test::call_service(&app, ask_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let reply: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(reply["content"], "You asked: How many rows?");

        let resp = test::call_service(&app, ask_request()).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key(header::RETRY_AFTER));
    }

    #[actix_web::test]
    async fn test_chat_without_credential_is_unavailable() {
        let state = state(GateLimits::default(), RateLimitConfig::default(), None);
        let app = app!(state);
        let id = new_session!(app);
        let bytes = WorkbookBuilder::new().sheet("Data", numbered_rows(3)).build();
        test::call_service(&app, upload_request(id, "a.xlsx", XLSX_MIME_TYPE, bytes).to_request())
            .await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/sessions/{}/chat", id))
            .set_json(serde_json::json!({ "question": "How many rows?" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "api_credential_missing");
    }

    #[actix_web::test]
    async fn test_ended_session_is_not_found() {
        let state = default_state();
        let app = app!(state);
        let id = new_session!(app);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/sessions/{}", id))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NO_CONTENT
        );

        let req = test::TestRequest::get()
            .uri(&format!("/api/sessions/{}", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_health() {
        let state = default_state();
        let app = app!(state);
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["chat_available"], true);
    }
}
