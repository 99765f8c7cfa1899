//! Delegation Error Types
//!
//! This module defines the error taxonomy shared by the delegation core.
//!
//! Anything that decides whether the external call happens is surfaced as a
//! [`DelegationError`]. Bookkeeping failures ([`PersistenceError`]) are logged
//! and swallowed at the [`UsageStore`](crate::usage::UsageStore) boundary, and
//! invocation failures are captured as data in
//! [`ExecutionResult`](crate::delegation::ExecutionResult).

use std::path::PathBuf;

/// Errors loading or validating configuration
///
/// Recoverable: callers fall back to the built-in defaults.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file exists but could not be read
    #[error("Failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the expected shape
    #[error("Failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Config parsed but holds an invalid value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors writing usage state to disk
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// I/O failure on one of the state files
    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to encode a record
    #[error("Failed to serialize {what}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that stop a delegation before the external call is made
#[derive(Debug, thiserror::Error)]
pub enum DelegationError {
    /// Caller named a service the registry does not know
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// No registered service is ready for the request
    #[error("No delegation services available")]
    NoServiceAvailable,

    /// The quota guard refused the request
    #[error("Quota check failed for {service}: {}", reasons.join("; "))]
    QuotaDenied {
        service: String,
        reasons: Vec<String>,
    },
}

pub type Result<T> = std::result::Result<T, DelegationError>;

/// Render an error and its sources on one line, for log messages
pub(crate) fn describe_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
