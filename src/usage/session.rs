//! Session Tracking
//!
//! A session is one continuous period of delegation activity. Consecutive
//! events whose gap is within the session timeout belong to the same session.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::event::UsageEvent;

/// Default gap after which a new session starts (1 hour)
pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 3600;

/// Contents of `current_session.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Identifier, `session_<unix seconds of first event>`
    pub session_id: String,

    /// Timestamp of the first event in the session
    pub start_time: DateTime<Utc>,

    /// Timestamp of the latest event in the session
    pub last_activity: DateTime<Utc>,

    #[serde(default)]
    pub total_requests: u64,

    #[serde(default)]
    pub total_tokens: u64,

    #[serde(default)]
    pub successful_requests: u64,
}

impl SessionState {
    /// Open an empty session starting at `start`
    pub fn start(start: DateTime<Utc>) -> Self {
        Self {
            session_id: format!("session_{}", start.timestamp()),
            start_time: start,
            last_activity: start,
            total_requests: 0,
            total_tokens: 0,
            successful_requests: 0,
        }
    }

    /// Whether an event at `timestamp` continues this session
    pub fn continues_at(&self, timestamp: DateTime<Utc>, timeout: Duration) -> bool {
        timestamp - self.last_activity <= timeout
    }

    /// Count one event against this session
    pub fn record(&mut self, event: &UsageEvent) {
        if event.timestamp > self.last_activity {
            self.last_activity = event.timestamp;
        }
        self.total_requests += 1;
        self.total_tokens += event.tokens_used;
        if event.success {
            self.successful_requests += 1;
        }
    }

    /// Attribute `event` to `previous` or to a fresh session
    ///
    /// A new session begins when there is no previous session or the gap
    /// since its last activity exceeds `timeout`.
    pub fn advance(previous: Option<SessionState>, event: &UsageEvent, timeout: Duration) -> Self {
        let mut session = match previous {
            Some(session) if session.continues_at(event.timestamp, timeout) => session,
            _ => SessionState::start(event.timestamp),
        };
        session.record(event);
        session
    }

    /// Share of successful requests, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64 * 100.0
        }
    }
}
