//! Quota Status
//!
//! Health classification of current usage against limits.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::guard::CurrentUsage;
use super::limits::QuotaLimits;

/// Ratio above which a metric produces a warning
pub const WARNING_RATIO: f64 = 0.8;

/// Ratio above which a metric is critical
pub const CRITICAL_RATIO: f64 = 0.95;

pub const RATE_CRITICAL_MESSAGE: &str = "Approaching rate limit, throttle now.";
pub const DAILY_CRITICAL_MESSAGE: &str = "Daily quota nearly exhausted.";

/// Overall quota health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaLevel {
    Healthy,
    Warning,
    Critical,
}

impl fmt::Display for QuotaLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QuotaLevel::Healthy => "healthy",
            QuotaLevel::Warning => "warning",
            QuotaLevel::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Derived quota status, computed fresh per query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub level: QuotaLevel,
    pub warnings: Vec<String>,
    pub usage: CurrentUsage,
}

impl QuotaStatus {
    /// Classify `usage` against `limits`
    pub fn evaluate(usage: CurrentUsage, limits: &QuotaLimits) -> Self {
        let mut level = QuotaLevel::Healthy;
        let mut warnings = Vec::new();
        let mut rate_critical = false;
        let mut daily_critical = false;

        let rate_metrics = [
            (
                "Request rate",
                usage.requests_last_minute,
                limits.requests_per_minute,
            ),
            (
                "Token rate",
                usage.tokens_last_minute,
                limits.tokens_per_minute,
            ),
        ];
        for (label, actual, limit) in rate_metrics {
            let ratio = ratio(actual, limit);
            if ratio > WARNING_RATIO {
                level = level.max(QuotaLevel::Warning);
                warnings.push(format!(
                    "{}: {}/{} per minute",
                    label,
                    group_thousands(actual),
                    group_thousands(limit)
                ));
            }
            rate_critical |= ratio > CRITICAL_RATIO;
        }

        let daily_metrics = [
            ("Daily tokens", usage.daily_tokens, limits.tokens_per_day),
            ("Daily requests", usage.daily_requests, limits.requests_per_day),
        ];
        for (label, actual, limit) in daily_metrics {
            let ratio = ratio(actual, limit);
            if ratio > WARNING_RATIO {
                level = level.max(QuotaLevel::Warning);
                warnings.push(format!(
                    "{}: {}/{} ({:.1}%)",
                    label,
                    group_thousands(actual),
                    group_thousands(limit),
                    ratio * 100.0
                ));
            }
            daily_critical |= ratio > CRITICAL_RATIO;
        }

        if rate_critical {
            level = QuotaLevel::Critical;
            warnings.push(RATE_CRITICAL_MESSAGE.to_string());
        }
        if daily_critical {
            level = QuotaLevel::Critical;
            warnings.push(DAILY_CRITICAL_MESSAGE.to_string());
        }

        Self {
            level,
            warnings,
            usage,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.level == QuotaLevel::Healthy
    }
}

/// `actual / limit`, 0 when the limit is 0
fn ratio(actual: u64, limit: u64) -> f64 {
    if limit == 0 {
        0.0
    } else {
        actual as f64 / limit as f64
    }
}

/// Format with comma thousands separators
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
