//! Usage Summaries
//!
//! Aggregates over a window of usage events, overall and per service.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::event::UsageEvent;

/// Per-service totals within a summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceUsage {
    pub requests: u64,
    pub successful: u64,
    pub tokens_used: u64,
    /// Sum of durations in seconds
    pub total_duration: f64,
}

impl ServiceUsage {
    fn record(&mut self, event: &UsageEvent) {
        self.requests += 1;
        if event.success {
            self.successful += 1;
        }
        self.tokens_used += event.tokens_used;
        self.total_duration += event.duration;
    }

    /// Success percentage (0 when there were no requests)
    pub fn success_rate(&self) -> f64 {
        percentage(self.successful, self.requests)
    }

    /// Mean duration in seconds (0 when there were no requests)
    pub fn avg_duration(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.total_duration / self.requests as f64
        }
    }
}

/// Aggregate usage over a period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Length of the analysed window in hours
    pub period_hours: i64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub total_tokens: u64,
    /// Breakdown keyed by service name
    pub services: BTreeMap<String, ServiceUsage>,
}

impl UsageSummary {
    /// Fold a sequence of events into a summary
    pub fn collect<I>(events: I, period: Duration) -> Self
    where
        I: IntoIterator<Item = UsageEvent>,
    {
        let mut summary = UsageSummary {
            period_hours: period.num_hours(),
            ..Default::default()
        };
        for event in events {
            summary.record(&event);
        }
        summary
    }

    fn record(&mut self, event: &UsageEvent) {
        self.total_requests += 1;
        if event.success {
            self.successful_requests += 1;
        }
        self.total_tokens += event.tokens_used;
        self.services
            .entry(event.service.clone())
            .or_default()
            .record(event);
    }

    /// Overall success percentage (0 when empty)
    pub fn success_rate(&self) -> f64 {
        percentage(self.successful_requests, self.total_requests)
    }

    pub fn is_empty(&self) -> bool {
        self.total_requests == 0
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
