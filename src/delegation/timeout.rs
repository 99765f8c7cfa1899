//! Execution Timeout Management
//!
//! Bounds on how long a delegated call or a readiness probe may run.

use std::future::Future;
use std::time::Duration;
use tokio::time;

/// Default bound for a delegated call (5 minutes)
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default bound for a readiness probe
pub const PROBE_TIMEOUT_SECS: u64 = 10;

/// Execution timeout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionTimeout {
    duration: Duration,
}

impl Default for ExecutionTimeout {
    fn default() -> Self {
        Self::from_secs(DEFAULT_TIMEOUT_SECS)
    }
}

impl ExecutionTimeout {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Timeout for readiness probes (10 seconds)
    pub fn probe() -> Self {
        Self::from_secs(PROBE_TIMEOUT_SECS)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Whole seconds, as reported in timeout messages
    pub fn as_secs(&self) -> u64 {
        self.duration.as_secs()
    }

    /// Execute a future with a timeout
    ///
    /// Returns `None` if the timeout expires first; the future is dropped.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use delegate_orchestrator::delegation::ExecutionTimeout;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let timeout = ExecutionTimeout::probe();
    ///     let value = timeout.run(async { 42 }).await;
    ///     assert_eq!(value, Some(42));
    /// }
    /// ```
    pub async fn run<F, T>(&self, future: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        time::timeout(self.duration, future).await.ok()
    }
}
