use crate::application::use_cases::dataset_profiler::DatasetProfiler;
use crate::application::use_cases::rate_limiter::RateLimitResult;
use crate::application::use_cases::session_store::SessionStore;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{ChatMessage, LLMConfig};
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::{clean_llm_response, sanitize_question};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct ChatUseCase {
    llm_client: Arc<dyn LLMClient + Send + Sync>,
    sessions: Arc<SessionStore>,
    config: LLMConfig,
}

impl ChatUseCase {
    pub fn new(
        llm_client: Arc<dyn LLMClient + Send + Sync>,
        sessions: Arc<SessionStore>,
        config: LLMConfig,
    ) -> Self {
        Self {
            llm_client,
            sessions,
            config,
        }
    }

    pub fn is_available(&self) -> bool {
        self.config.credential().is_some()
    }

    /// Answer one question about the session's dataset.
    ///
    /// Cheap local checks (dataset, question, credential) run before the
    /// rate limiter, so a misconfigured service never burns quota.
    pub async fn ask(&self, session_id: Uuid, question: &str) -> Result<ChatMessage> {
        let data = self.sessions.dataset(session_id)?.ok_or_else(|| {
            AppError::ValidationError("Upload a spreadsheet before asking questions.".to_string())
        })?;

        let question = sanitize_question(question);
        if question.is_empty() {
            return Err(AppError::ValidationError(
                "Question must not be empty.".to_string(),
            ));
        }

        if !self.is_available() {
            warn!("Chat requested without a configured API credential");
            return Err(AppError::ApiCredentialMissing);
        }

        if let RateLimitResult::Exceeded {
            retry_after_seconds,
        } = self.sessions.check_rate_limit(session_id)?
        {
            warn!(retry_after_seconds, "Chat rate limit exceeded");
            return Err(AppError::RateLimited {
                retry_after_seconds,
            });
        }

        let system_prompt = format!(
            "You are a helpful data analyst assistant. Answer questions about the user's \
             spreadsheet using only the dataset information below. If the answer cannot be \
             determined from it, say so briefly.\n\nDataset information:\n{}",
            data.chat_context
        );

        let raw_result = self
            .llm_client
            .generate(&self.config, &system_prompt, &question)
            .await?;

        let answer = clean_llm_response(&raw_result);
        if answer.is_empty() {
            return Err(AppError::LLMError("Empty response from model".to_string()));
        }

        let reply = ChatMessage::assistant(answer);
        self.sessions
            .append_history(session_id, [ChatMessage::user(question), reply.clone()])?;
        info!(chars = reply.content.len(), "Chat answer stored");

        Ok(reply)
    }

    pub fn history(&self, session_id: Uuid) -> Result<Vec<ChatMessage>> {
        self.sessions.history(session_id)
    }

    pub fn suggested_questions(&self, session_id: Uuid) -> Result<Vec<String>> {
        let data = self.sessions.dataset(session_id)?.ok_or_else(|| {
            AppError::ValidationError("Upload a spreadsheet to get suggestions.".to_string())
        })?;
        Ok(DatasetProfiler::suggested_questions(&data.dataset))
    }
}
