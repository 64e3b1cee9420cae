//! Rate Limiter for language-model calls
//!
//! One limiter lives inside each chat session:
//! - Sliding window: a call counts while it is younger than the window
//! - Excess calls fail immediately with a retry hint (no queueing)
//! - State is dropped together with the session

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use crate::domain::app_config::RateLimitConfig;

/// Rate limit check result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Call admitted and recorded
    Allowed,
    /// Window is full
    Exceeded { retry_after_seconds: i64 },
}

#[cfg(test)]
impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

/// Rate limit status for one session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub calls_in_window: u32,
    pub max_calls: u32,
    pub window_seconds: u64,
    pub remaining: u32,
    pub is_rate_limited: bool,
    pub retry_after_seconds: Option<i64>,
}

/// Sliding-window limiter for one session
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    calls: VecDeque<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            calls: VecDeque::new(),
        }
    }

    fn window(&self) -> Duration {
        Duration::seconds(self.config.window_seconds as i64)
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let window = self.window();
        while let Some(oldest) = self.calls.front() {
            if now - *oldest >= window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn retry_after(&self, now: DateTime<Utc>) -> i64 {
        self.calls
            .front()
            .map(|oldest| {
                let wait = (*oldest + self.window()) - now;
                // Round up so a retry at the hinted time is admitted.
                let secs = wait.num_seconds() + i64::from(wait.num_milliseconds() % 1000 > 0);
                secs.max(1)
            })
            .unwrap_or(1)
    }

    /// Check if a call at `now` is allowed and, when it is, record it.
    pub fn check_and_record_at(&mut self, now: DateTime<Utc>) -> RateLimitResult {
        self.prune(now);

        if self.calls.len() >= self.config.max_calls as usize {
            let retry_after_seconds = self.retry_after(now);
            debug!(
                calls = self.calls.len(),
                retry_after_seconds, "Rate limit exceeded"
            );
            return RateLimitResult::Exceeded {
                retry_after_seconds,
            };
        }

        self.calls.push_back(now);
        RateLimitResult::Allowed
    }

    pub fn status_at(&mut self, now: DateTime<Utc>) -> RateLimitStatus {
        self.prune(now);
        let calls_in_window = self.calls.len() as u32;
        let is_rate_limited = calls_in_window >= self.config.max_calls;

        RateLimitStatus {
            calls_in_window,
            max_calls: self.config.max_calls,
            window_seconds: self.config.window_seconds,
            remaining: self.config.max_calls.saturating_sub(calls_in_window),
            is_rate_limited,
            retry_after_seconds: is_rate_limited.then(|| self.retry_after(now)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::default())
    }

    #[test]
    fn test_eleventh_call_in_window_is_limited() {
        let mut rl = limiter();
        let start = Utc::now();

        for i in 0..10 {
            let now = start + Duration::seconds(i);
            assert_eq!(rl.check_and_record_at(now), RateLimitResult::Allowed);
        }

        let result = rl.check_and_record_at(start + Duration::seconds(30));
        assert_eq!(
            result,
            RateLimitResult::Exceeded {
                retry_after_seconds: 30
            }
        );
    }

    #[test]
    fn test_calls_recover_after_window() {
        let mut rl = limiter();
        let start = Utc::now();
        for _ in 0..10 {
            assert!(rl.check_and_record_at(start).is_allowed());
        }
        assert!(!rl.check_and_record_at(start + Duration::seconds(59)).is_allowed());
        assert!(rl.check_and_record_at(start + Duration::seconds(60)).is_allowed());
    }

    #[test]
    fn test_window_slides_one_call_at_a_time() {
        let mut rl = RateLimiter::new(RateLimitConfig {
            max_calls: 2,
            window_seconds: 10,
        });
        let start = Utc::now();
        assert!(rl.check_and_record_at(start).is_allowed());
        assert!(rl.check_and_record_at(start + Duration::seconds(5)).is_allowed());
        assert!(!rl.check_and_record_at(start + Duration::seconds(9)).is_allowed());
        // the first call has aged out, the second has not
        assert!(rl.check_and_record_at(start + Duration::seconds(10)).is_allowed());
        assert!(!rl.check_and_record_at(start + Duration::seconds(11)).is_allowed());
    }

    #[test]
    fn test_rejected_calls_are_not_recorded() {
        let mut rl = RateLimiter::new(RateLimitConfig {
            max_calls: 1,
            window_seconds: 60,
        });
        let start = Utc::now();
        assert!(rl.check_and_record_at(start).is_allowed());
        for i in 1..20 {
            assert!(!rl.check_and_record_at(start + Duration::seconds(i)).is_allowed());
        }
        assert_eq!(rl.status_at(start + Duration::seconds(30)).calls_in_window, 1);
        assert!(rl.check_and_record_at(start + Duration::seconds(60)).is_allowed());
    }

    #[test]
    fn test_status_reports_remaining_and_retry() {
        let mut rl = RateLimiter::new(RateLimitConfig {
            max_calls: 2,
            window_seconds: 60,
        });
        let start = Utc::now();

        let status = rl.status_at(start);
        assert_eq!(status.remaining, 2);
        assert!(!status.is_rate_limited);
        assert_eq!(status.retry_after_seconds, None);

        rl.check_and_record_at(start);
        rl.check_and_record_at(start);
        let status = rl.status_at(start + Duration::milliseconds(500));
        assert_eq!(status.remaining, 0);
        assert!(status.is_rate_limited);
        assert_eq!(status.retry_after_seconds, Some(60));
    }
}
