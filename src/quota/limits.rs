//! Quota Limits
//!
//! Per-service request and token limits.

use serde::{Deserialize, Serialize};

/// Default limits (Gemini free tier)
pub const DEFAULT_REQUESTS_PER_MINUTE: u64 = 60;
pub const DEFAULT_REQUESTS_PER_DAY: u64 = 1_000;
pub const DEFAULT_TOKENS_PER_MINUTE: u64 = 32_000;
pub const DEFAULT_TOKENS_PER_DAY: u64 = 1_000_000;

/// Request and token limits for one service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaLimits {
    pub requests_per_minute: u64,
    pub requests_per_day: u64,
    pub tokens_per_minute: u64,
    pub tokens_per_day: u64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            requests_per_day: DEFAULT_REQUESTS_PER_DAY,
            tokens_per_minute: DEFAULT_TOKENS_PER_MINUTE,
            tokens_per_day: DEFAULT_TOKENS_PER_DAY,
        }
    }
}

impl QuotaLimits {
    pub fn new(
        requests_per_minute: u64,
        requests_per_day: u64,
        tokens_per_minute: u64,
        tokens_per_day: u64,
    ) -> Self {
        Self {
            requests_per_minute,
            requests_per_day,
            tokens_per_minute,
            tokens_per_day,
        }
    }
}

/// Partial limits from user configuration
///
/// Only the fields present override the service's current limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaLimitsOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_day: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_per_minute: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_per_day: Option<u64>,
}

impl QuotaLimitsOverride {
    /// Apply the present fields to `limits`
    pub fn apply(&self, limits: &mut QuotaLimits) {
        if let Some(v) = self.requests_per_minute {
            limits.requests_per_minute = v;
        }
        if let Some(v) = self.requests_per_day {
            limits.requests_per_day = v;
        }
        if let Some(v) = self.tokens_per_minute {
            limits.tokens_per_minute = v;
        }
        if let Some(v) = self.tokens_per_day {
            limits.tokens_per_day = v;
        }
    }

    /// Limits built from the defaults plus the present fields
    pub fn resolve(&self) -> QuotaLimits {
        let mut limits = QuotaLimits::default();
        self.apply(&mut limits);
        limits
    }
}
