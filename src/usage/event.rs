//! Usage Events
//!
//! One line of `usage.jsonl`: a single attempted delegation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Record of one attempted delegation
///
/// Immutable once written. Events are only ever appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// When the delegation finished (UTC)
    pub timestamp: DateTime<Utc>,

    /// Service name the request was sent to
    pub service: String,

    /// Command line that was executed
    #[serde(default)]
    pub command: String,

    /// Whether the external command exited successfully
    pub success: bool,

    /// Wall-clock duration in seconds
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: f64,

    /// Estimated tokens consumed by the request
    #[serde(default, deserialize_with = "null_as_default")]
    pub tokens_used: u64,

    /// Process exit code (124 on timeout)
    #[serde(default)]
    pub exit_code: Option<i32>,

    /// Captured stderr for failed requests
    #[serde(default)]
    pub error: Option<String>,

    /// Session this event was attributed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl UsageEvent {
    /// Create an event stamped with the current time
    pub fn new(service: impl Into<String>, tokens_used: u64, success: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            service: service.into(),
            command: String::new(),
            success,
            duration: 0.0,
            tokens_used,
            exit_code: None,
            error: None,
            session_id: None,
        }
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Older log lines wrote `null` for numbers that were never measured.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builder() {
        let event = UsageEvent::new("gemini", 250, false)
            .with_command("gemini -p hi")
            .with_duration(1.5)
            .with_exit_code(2)
            .with_error("boom");

        assert_eq!(event.service, "gemini");
        assert_eq!(event.tokens_used, 250);
        assert!(!event.success);
        assert_eq!(event.command, "gemini -p hi");
        assert_eq!(event.exit_code, Some(2));
        assert_eq!(event.error.as_deref(), Some("boom"));
        assert!(event.session_id.is_none());
    }

    #[test]
    fn test_parse_log_line() {
        let line = r#"{"timestamp":"2025-01-15T10:30:00Z","service":"qwen","command":"qwen -p x","success":true,"duration":2.25,"tokens_used":1200,"exit_code":0,"error":null}"#;
        let event: UsageEvent = serde_json::from_str(line).unwrap();

        assert_eq!(event.service, "qwen");
        assert_eq!(event.tokens_used, 1200);
        assert_eq!(event.exit_code, Some(0));
        assert!(event.error.is_none());
        assert!(event.session_id.is_none());
    }

    #[test]
    fn test_parse_null_tokens_and_duration() {
        let line = r#"{"timestamp":"2025-01-15T10:30:00Z","service":"gemini","success":false,"duration":null,"tokens_used":null,"exit_code":124,"error":"Command timed out after 300 seconds"}"#;
        let event: UsageEvent = serde_json::from_str(line).unwrap();

        assert_eq!(event.tokens_used, 0);
        assert_eq!(event.duration, 0.0);
        assert_eq!(event.exit_code, Some(124));
    }

    #[test]
    fn test_session_id_omitted_when_absent() {
        let event = UsageEvent::new("gemini", 1, true);
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("session_id"));
    }
}
