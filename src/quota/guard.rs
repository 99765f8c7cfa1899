//! Quota Guard
//!
//! Admission decisions for a prospective request, computed from the usage
//! store's working view.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::limits::QuotaLimits;
use super::status::QuotaStatus;
use crate::usage::{UsageEvent, UsageStore};

pub const REQUEST_RATE_REASON: &str = "Request rate limit reached - wait 1 minute";
pub const TOKEN_RATE_REASON: &str = "Token rate limit would be exceeded - wait or split task";
pub const DAILY_TOKENS_REASON: &str = "Daily token quota would be exceeded - wait for reset";

/// Usage counters relevant to quota decisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUsage {
    pub requests_last_minute: u64,
    pub tokens_last_minute: u64,
    /// Tokens of successful requests since the last daily reset
    pub daily_tokens: u64,
    /// All requests since the last daily reset
    pub daily_requests: u64,
}

impl CurrentUsage {
    /// Count `events` as of `now`
    ///
    /// The minute window holds events strictly newer than `now - 60s`.
    pub fn from_events<'e, I>(events: I, last_reset: DateTime<Utc>, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'e UsageEvent>,
    {
        let minute_ago = now - Duration::seconds(60);
        let mut usage = CurrentUsage::default();

        for event in events {
            if event.timestamp > minute_ago {
                usage.requests_last_minute += 1;
                usage.tokens_last_minute += event.tokens_used;
            }
            if event.timestamp >= last_reset {
                usage.daily_requests += 1;
                if event.success {
                    usage.daily_tokens += event.tokens_used;
                }
            }
        }
        usage
    }
}

/// Result of an admission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    pub allowed: bool,
    pub reasons: Vec<String>,
}

impl Admission {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reasons: Vec::new(),
        }
    }

    pub fn denied(reasons: Vec<String>) -> Self {
        Self {
            allowed: false,
            reasons,
        }
    }
}

/// Decide whether a request of `estimated_tokens` fits within `limits`
///
/// Every applicable reason is collected.
pub fn evaluate_admission(
    usage: &CurrentUsage,
    estimated_tokens: u64,
    limits: &QuotaLimits,
) -> Admission {
    let mut reasons = Vec::new();

    if usage.requests_last_minute.saturating_add(1) > limits.requests_per_minute {
        reasons.push(REQUEST_RATE_REASON.to_string());
    }
    if usage.tokens_last_minute.saturating_add(estimated_tokens) > limits.tokens_per_minute {
        reasons.push(TOKEN_RATE_REASON.to_string());
    }
    if usage.daily_tokens.saturating_add(estimated_tokens) > limits.tokens_per_day {
        reasons.push(DAILY_TOKENS_REASON.to_string());
    }

    if reasons.is_empty() {
        Admission::allowed()
    } else {
        Admission::denied(reasons)
    }
}

/// Quota view over a usage store, optionally scoped to one service
#[derive(Debug, Clone)]
pub struct QuotaGuard<'a> {
    store: &'a UsageStore,
    service: Option<String>,
}

impl<'a> QuotaGuard<'a> {
    /// Guard counting every service's usage
    pub fn new(store: &'a UsageStore) -> Self {
        Self {
            store,
            service: None,
        }
    }

    /// Guard counting only `service`'s usage
    pub fn for_service(store: &'a UsageStore, service: impl Into<String>) -> Self {
        Self {
            store,
            service: Some(service.into()),
        }
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn current_usage(&self) -> CurrentUsage {
        self.current_usage_at(Utc::now())
    }

    pub fn current_usage_at(&self, now: DateTime<Utc>) -> CurrentUsage {
        let snapshot = self.store.snapshot();
        let scoped = snapshot
            .events
            .iter()
            .filter(|e| self.service.as_deref().is_none_or(|s| e.service == s));
        CurrentUsage::from_events(scoped, snapshot.last_reset, now)
    }

    /// Check whether a request of `estimated_tokens` may proceed
    pub fn can_handle(&self, estimated_tokens: u64, limits: &QuotaLimits) -> Admission {
        self.can_handle_at(estimated_tokens, limits, Utc::now())
    }

    pub fn can_handle_at(
        &self,
        estimated_tokens: u64,
        limits: &QuotaLimits,
        now: DateTime<Utc>,
    ) -> Admission {
        evaluate_admission(&self.current_usage_at(now), estimated_tokens, limits)
    }

    pub fn status(&self, limits: &QuotaLimits) -> QuotaStatus {
        self.status_at(limits, Utc::now())
    }

    pub fn status_at(&self, limits: &QuotaLimits, now: DateTime<Utc>) -> QuotaStatus {
        QuotaStatus::evaluate(self.current_usage_at(now), limits)
    }
}
