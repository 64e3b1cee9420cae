//! Session Store
//!
//! Explicit per-session state, keyed by random UUID:
//! - the validated dataset with its profile and PII warnings
//! - chat history
//! - the session's own rate limiter
//!
//! Idle sessions are torn down lazily: every store access first sweeps
//! sessions past the idle timeout. There is no background worker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::use_cases::dataset_profiler::{DatasetProfile, DatasetProfiler};
use crate::application::use_cases::rate_limiter::{
    RateLimitConfig, RateLimitResult, RateLimitStatus, RateLimiter,
};
use crate::domain::app_config::SessionConfig;
use crate::domain::dataset::ParsedDataset;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::ChatMessage;
use crate::domain::upload::PiiWarning;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const LARGE_DATASET_WARNING: &str =
    "Large dataset in session. Consider processing in smaller chunks.";
const LONG_SESSION_WARNING: &str =
    "Session has been active for a long time. Consider refreshing for security.";

/// A dataset that passed the upload gate, with what was derived from it.
#[derive(Debug)]
pub struct LoadedDataset {
    pub dataset: ParsedDataset,
    pub profile: DatasetProfile,
    /// Model-facing summary, built once per upload
    pub chat_context: String,
    pub warnings: Vec<PiiWarning>,
    pub uploaded_at: DateTime<Utc>,
    /// In-memory footprint, measured once at upload
    pub estimated_bytes: u64,
}

impl LoadedDataset {
    pub fn new(dataset: ParsedDataset, warnings: Vec<PiiWarning>) -> Self {
        Self {
            profile: DatasetProfiler::profile(&dataset),
            chat_context: DatasetProfiler::chat_context(&dataset),
            estimated_bytes: dataset.estimated_bytes() as u64,
            dataset,
            warnings,
            uploaded_at: Utc::now(),
        }
    }
}

struct Session {
    created_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
    data: Option<Arc<LoadedDataset>>,
    history: Vec<ChatMessage>,
    rate_limiter: RateLimiter,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub has_dataset: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_filename: Option<String>,
    pub message_count: usize,
    pub rate_limit: RateLimitStatus,
    pub warnings: Vec<String>,
}

pub struct SessionStore {
    config: SessionConfig,
    rate_limit: RateLimitConfig,
    clock: Clock,
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl SessionStore {
    pub fn new(config: SessionConfig, rate_limit: RateLimitConfig) -> Self {
        Self::with_clock(config, rate_limit, Arc::new(Utc::now))
    }

    pub fn with_clock(config: SessionConfig, rate_limit: RateLimitConfig, clock: Clock) -> Self {
        Self {
            config,
            rate_limit,
            clock,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn idle_timeout(&self) -> Duration {
        Duration::minutes(self.config.idle_timeout_minutes as i64)
    }

    /// Lock, sweep expired sessions, and hand back the map with `now`.
    fn lock(&self) -> Result<(MutexGuard<'_, HashMap<Uuid, Session>>, DateTime<Utc>)> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| AppError::Internal("Session store lock poisoned".to_string()))?;
        let now = (self.clock)();
        let timeout = self.idle_timeout();

        let before = sessions.len();
        sessions.retain(|_, s| now - s.last_active_at <= timeout);
        let expired = before - sessions.len();
        if expired > 0 {
            info!(expired, remaining = sessions.len(), "Expired idle sessions");
        }
        Ok((sessions, now))
    }

    /// Run `f` on a live session after touching it.
    fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session, DateTime<Utc>) -> T,
    ) -> Result<T> {
        let (mut sessions, now) = self.lock()?;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Session not found or expired.".to_string()))?;
        session.last_active_at = now;
        Ok(f(session, now))
    }

    pub fn create(&self) -> Result<SessionStatus> {
        let (mut sessions, now) = self.lock()?;
        let id = Uuid::new_v4();
        let mut session = Session {
            created_at: now,
            last_active_at: now,
            data: None,
            history: Vec::new(),
            rate_limiter: RateLimiter::new(self.rate_limit),
        };
        let status = self.status_of(id, &mut session, now);
        sessions.insert(id, session);
        info!(active = sessions.len(), "Session created");
        Ok(status)
    }

    pub fn status(&self, id: Uuid) -> Result<SessionStatus> {
        self.with_session(id, |session, now| self.status_of(id, session, now))
    }

    fn status_of(&self, id: Uuid, session: &mut Session, now: DateTime<Utc>) -> SessionStatus {
        let mut warnings = Vec::new();
        if let Some(data) = &session.data {
            if data.estimated_bytes > self.config.large_dataset_warning_bytes {
                warnings.push(LARGE_DATASET_WARNING.to_string());
            }
        }
        if now - session.created_at > self.idle_timeout() {
            warnings.push(LONG_SESSION_WARNING.to_string());
        }

        SessionStatus {
            session_id: id,
            created_at: session.created_at,
            last_active_at: session.last_active_at,
            expires_at: session.last_active_at + self.idle_timeout(),
            has_dataset: session.data.is_some(),
            dataset_filename: session.data.as_ref().map(|d| d.dataset.filename().to_string()),
            message_count: session.history.len(),
            rate_limit: session.rate_limiter.status_at(now),
            warnings,
        }
    }

    /// Remove the session and everything it holds.
    pub fn end(&self, id: Uuid) -> Result<()> {
        let (mut sessions, _) = self.lock()?;
        if sessions.remove(&id).is_none() {
            return Err(AppError::NotFound("Session not found or expired.".to_string()));
        }
        info!(active = sessions.len(), "Session ended");
        Ok(())
    }

    /// Replace the session's dataset. The chat history belongs to the old
    /// dataset and is dropped with it.
    pub fn set_dataset(&self, id: Uuid, data: LoadedDataset) -> Result<Arc<LoadedDataset>> {
        let data = Arc::new(data);
        self.with_session(id, |session, _| {
            session.data = Some(Arc::clone(&data));
            session.history.clear();
        })?;
        debug!(rows = data.dataset.row_count(), "Dataset attached to session");
        Ok(data)
    }

    pub fn dataset(&self, id: Uuid) -> Result<Option<Arc<LoadedDataset>>> {
        self.with_session(id, |session, _| session.data.clone())
    }

    /// Drop dataset and chat history; the session and its rate-limit
    /// counters stay.
    pub fn clear_data(&self, id: Uuid) -> Result<()> {
        self.with_session(id, |session, _| {
            session.data = None;
            session.history.clear();
        })
    }

    pub fn history(&self, id: Uuid) -> Result<Vec<ChatMessage>> {
        self.with_session(id, |session, _| session.history.clone())
    }

    pub fn append_history(
        &self,
        id: Uuid,
        messages: impl IntoIterator<Item = ChatMessage>,
    ) -> Result<()> {
        self.with_session(id, |session, _| session.history.extend(messages))
    }

    /// Admit and record one outbound model call, or report when to retry.
    pub fn check_rate_limit(&self, id: Uuid) -> Result<RateLimitResult> {
        self.with_session(id, |session, now| session.rate_limiter.check_and_record_at(now))
    }

    pub fn active_sessions(&self) -> Result<usize> {
        let (sessions, _) = self.lock()?;
        Ok(sessions.len())
    }
}
