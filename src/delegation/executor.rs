//! Delegation Executor
//!
//! Runs one delegated call as a child process under a timeout, classifies
//! the outcome and records exactly one usage event for it.
//!
//! Each request moves `Built → Running → {Succeeded, Failed, TimedOut}`.
//! Invocation problems never surface as errors: they are captured in the
//! returned [`ExecutionResult`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::invocation::{build_invocation, Invocation, InvocationOptions};
use super::timeout::ExecutionTimeout;
use crate::quota::estimate_tokens;
use crate::registry::ServiceConfig;
use crate::usage::{UsageEvent, UsageStore};

/// Exit code reported for a call killed by the timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the program does not exist
pub const NOT_FOUND_EXIT_CODE: i32 = 127;

/// Exit code reported for any other spawn failure
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 1;

/// Maximum captured output per stream in bytes (1MB)
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Terminal state of a delegated call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

/// Lifecycle of one delegated call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationPhase {
    Built,
    Running,
    Finished(ExecutionOutcome),
}

impl fmt::Display for DelegationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelegationPhase::Built => f.write_str("built"),
            DelegationPhase::Running => f.write_str("running"),
            DelegationPhase::Finished(ExecutionOutcome::Succeeded) => f.write_str("succeeded"),
            DelegationPhase::Finished(ExecutionOutcome::Failed) => f.write_str("failed"),
            DelegationPhase::Finished(ExecutionOutcome::TimedOut) => f.write_str("timed out"),
        }
    }
}

/// Result of one delegated call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub service: String,

    /// Command line as recorded in the usage log
    pub command: String,

    pub success: bool,

    /// Standard output (truncated if too large)
    pub stdout: String,

    /// Standard error (truncated if too large)
    pub stderr: String,

    /// Exit code (None if the process was terminated by a signal)
    pub exit_code: Option<i32>,

    /// Wall-clock duration in seconds
    pub duration: f64,

    pub estimated_tokens: u64,

    pub outcome: ExecutionOutcome,
}

impl ExecutionResult {
    fn new(service: &str, command: String, estimated_tokens: u64) -> Self {
        Self {
            service: service.to_string(),
            command,
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            duration: 0.0,
            estimated_tokens,
            outcome: ExecutionOutcome::Failed,
        }
    }

    fn completed(
        mut self,
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
        success: bool,
    ) -> Self {
        self.success = success;
        self.stdout = stdout;
        self.stderr = stderr;
        self.exit_code = exit_code;
        self.outcome = if success {
            ExecutionOutcome::Succeeded
        } else {
            ExecutionOutcome::Failed
        };
        self
    }

    fn timed_out(mut self, timeout: ExecutionTimeout) -> Self {
        self.stderr = format!("Command timed out after {} seconds", timeout.as_secs());
        self.exit_code = Some(TIMEOUT_EXIT_CODE);
        self.outcome = ExecutionOutcome::TimedOut;
        self
    }

    fn spawn_failed(mut self, program: &str, err: &std::io::Error) -> Self {
        self.exit_code = Some(if err.kind() == std::io::ErrorKind::NotFound {
            NOT_FOUND_EXIT_CODE
        } else {
            SPAWN_FAILURE_EXIT_CODE
        });
        self.stderr = format!("Failed to spawn {}: {}", program, err);
        self
    }

    fn finished_in(mut self, start: Instant) -> Self {
        self.duration = start.elapsed().as_secs_f64();
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.outcome == ExecutionOutcome::TimedOut
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match self.outcome {
            ExecutionOutcome::TimedOut => format!("Timeout after {:.1}s", self.duration),
            ExecutionOutcome::Succeeded => format!(
                "Success (exit code: {:?}, {:.1}s, {} bytes output)",
                self.exit_code,
                self.duration,
                self.stdout.len()
            ),
            ExecutionOutcome::Failed => format!(
                "Failed (exit code: {:?}, {:.1}s, {} bytes output)",
                self.exit_code,
                self.duration,
                self.stdout.len() + self.stderr.len()
            ),
        }
    }

    /// The usage record for this call
    ///
    /// Failed calls carry stderr as the error, or the exit status when
    /// stderr is empty.
    pub fn to_usage_event(&self) -> UsageEvent {
        let event = UsageEvent::new(&self.service, self.estimated_tokens, self.success)
            .with_command(&self.command)
            .with_duration(self.duration);
        let event = match self.exit_code {
            Some(code) => event.with_exit_code(code),
            None => event,
        };

        if self.success {
            event
        } else if self.stderr.trim().is_empty() {
            let status = self
                .exit_code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            event.with_error(format!("Exited with status {}", status))
        } else {
            event.with_error(&self.stderr)
        }
    }
}

/// Configuration for delegated calls
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Timeout used when a call names none (default: 300 seconds)
    pub timeout: ExecutionTimeout,

    /// Maximum output size in bytes per stream (default: 1MB)
    pub max_output_size: usize,

    /// Working directory for the child (default: current directory)
    pub working_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: ExecutionTimeout::default(),
            max_output_size: MAX_OUTPUT_SIZE,
            working_dir: None,
        }
    }
}

impl ExecutorConfig {
    /// Create a new executor config with custom timeout
    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            timeout: ExecutionTimeout::from_secs(timeout_secs),
            ..Default::default()
        }
    }

    /// Create a new executor config with custom output limit
    pub fn with_max_output_size(size: usize) -> Self {
        Self {
            max_output_size: size,
            ..Default::default()
        }
    }

    /// Create a new executor config with custom working directory
    pub fn with_working_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
            ..Default::default()
        }
    }
}

/// Executes delegated calls and records their usage
#[derive(Debug, Clone)]
pub struct DelegationExecutor {
    store: Arc<UsageStore>,
    config: ExecutorConfig,
}

impl DelegationExecutor {
    pub fn new(store: Arc<UsageStore>) -> Self {
        Self::with_config(store, ExecutorConfig::default())
    }

    pub fn with_config(store: Arc<UsageStore>, config: ExecutorConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<UsageStore> {
        &self.store
    }

    /// Run `prompt` on `service` and record the attempt
    ///
    /// `timeout` falls back to the configured default. Exactly one usage
    /// event is appended whatever the outcome.
    pub async fn run(
        &self,
        service: &ServiceConfig,
        prompt: &str,
        files: &[PathBuf],
        options: &InvocationOptions,
        timeout: Option<ExecutionTimeout>,
    ) -> ExecutionResult {
        let trace_id = Uuid::new_v4();
        let timeout = timeout.unwrap_or(self.config.timeout);
        let invocation = build_invocation(service, prompt, files, options);
        let estimated_tokens = estimate_tokens(files, prompt.len() as u64);

        debug!(%trace_id, phase = %DelegationPhase::Built, "{}", invocation);
        info!(
            %trace_id,
            service = %service.name,
            estimated_tokens,
            "Delegating to {} (timeout {}s)",
            service.name,
            timeout.as_secs()
        );

        let result = self
            .execute(&invocation, &service.name, estimated_tokens, timeout, trace_id)
            .await;

        let phase = DelegationPhase::Finished(result.outcome);
        if result.success {
            info!(%trace_id, %phase, "{}", result.summary());
        } else {
            warn!(%trace_id, %phase, "{}", result.summary());
        }

        self.store.append(result.to_usage_event());
        result
    }

    async fn execute(
        &self,
        invocation: &Invocation,
        service: &str,
        estimated_tokens: u64,
        timeout: ExecutionTimeout,
        trace_id: Uuid,
    ) -> ExecutionResult {
        let start = Instant::now();
        let result = ExecutionResult::new(service, invocation.command_line(), estimated_tokens);

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return result
                    .spawn_failed(&invocation.program, &e)
                    .finished_in(start)
            }
        };
        debug!(%trace_id, phase = %DelegationPhase::Running, pid = ?child.id());

        // Dropping the pending wait on timeout drops the child, which kills it.
        let output = match timeout.run(child.wait_with_output()).await {
            Some(Ok(output)) => output,
            Some(Err(e)) => {
                return result
                    .spawn_failed(&invocation.program, &e)
                    .finished_in(start)
            }
            None => return result.timed_out(timeout).finished_in(start),
        };

        let stdout = truncate_output(
            String::from_utf8_lossy(&output.stdout).into_owned(),
            self.config.max_output_size,
        );
        let stderr = truncate_output(
            String::from_utf8_lossy(&output.stderr).into_owned(),
            self.config.max_output_size,
        );

        result
            .completed(stdout, stderr, output.status.code(), output.status.success())
            .finished_in(start)
    }
}

/// Truncate to at most `max_len` bytes on a char boundary, marking the cut
fn truncate_output(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len.saturating_sub(3);
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("...");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AuthMethod;
    use chrono::Duration as ChronoDuration;
    use proptest::prelude::*;
    use std::time::Duration;
    use tempfile::TempDir;

    /// A service whose flag table is empty, so the prompt is the only argument
    fn bare(name: &str, command: &str) -> ServiceConfig {
        let mut service = ServiceConfig::new(name, command, AuthMethod::Cli);
        service.flags.prompt = String::new();
        service
    }

    fn executor(dir: &TempDir, config: ExecutorConfig) -> DelegationExecutor {
        DelegationExecutor::with_config(Arc::new(UsageStore::open(dir.path())), config)
    }

    fn logged(executor: &DelegationExecutor) -> Vec<UsageEvent> {
        executor
            .store()
            .recent_events(ChronoDuration::hours(1))
            .collect()
    }

    #[tokio::test]
    async fn test_run_echo() {
        let dir = TempDir::new().unwrap();
        let executor = executor(&dir, ExecutorConfig::default());

        let result = executor
            .run(&bare("echo", "echo"), "hello world", &[], &InvocationOptions::default(), None)
            .await;

        assert!(result.success);
        assert_eq!(result.outcome, ExecutionOutcome::Succeeded);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("hello world"));
        assert_eq!(result.estimated_tokens, 2);

        let events = logged(&executor);
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
        assert_eq!(
            shlex::split(&events[0].command).unwrap(),
            vec!["echo", "hello world"]
        );
        assert!(events[0].error.is_none());
    }

    #[tokio::test]
    async fn test_run_failing_command() {
        let dir = TempDir::new().unwrap();
        let executor = executor(&dir, ExecutorConfig::default());

        let result = executor
            .run(&bare("false", "false"), "x", &[], &InvocationOptions::default(), None)
            .await;

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(1));
        assert_eq!(result.outcome, ExecutionOutcome::Failed);

        let events = logged(&executor);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error.as_deref(), Some("Exited with status 1"));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let dir = TempDir::new().unwrap();
        let executor = executor(&dir, ExecutorConfig::default());

        let result = executor
            .run(
                &bare("sleep", "sleep"),
                "10",
                &[],
                &InvocationOptions::default(),
                Some(ExecutionTimeout::from_secs(1)),
            )
            .await;

        assert!(!result.success);
        assert!(result.is_timeout());
        assert_eq!(result.exit_code, Some(TIMEOUT_EXIT_CODE));
        assert_eq!(result.stderr, "Command timed out after 1 seconds");
        assert!(result.duration < 5.0);

        let events = logged(&executor);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].exit_code, Some(124));
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let dir = TempDir::new().unwrap();
        let executor = executor(&dir, ExecutorConfig::default());

        let result = executor
            .run(
                &bare("ghost", "delegate-test-no-such-command"),
                "hi",
                &[],
                &InvocationOptions::default(),
                None,
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(NOT_FOUND_EXIT_CODE));
        assert!(result.stderr.contains("Failed to spawn"));
        assert_eq!(logged(&executor).len(), 1);
    }

    #[tokio::test]
    async fn test_output_truncation() {
        let dir = TempDir::new().unwrap();
        let executor = executor(&dir, ExecutorConfig::with_max_output_size(100));

        let result = executor
            .run(&bare("seq", "seq"), "1000", &[], &InvocationOptions::default(), None)
            .await;

        assert!(result.success);
        assert!(result.stdout.len() <= 100);
        assert!(result.stdout.ends_with("..."));
    }

    #[tokio::test]
    async fn test_working_directory() {
        let dir = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let executor = executor(&dir, ExecutorConfig::with_working_dir(work.path()));

        let mut service = bare("sh", "sh");
        service.flags.prompt = "-c".to_string();
        let result = executor
            .run(&service, "pwd", &[], &InvocationOptions::default(), None)
            .await;

        assert!(result.success, "{}", result.stderr);
        let reported = std::fs::canonicalize(result.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(work.path()).unwrap());
    }

    #[test]
    fn test_execution_result_summary() {
        let base = ExecutionResult::new("gemini", "gemini -p hi".to_string(), 1);

        let success = base
            .clone()
            .completed("output".to_string(), String::new(), Some(0), true);
        assert!(success.summary().contains("Success"));

        let failure = base
            .clone()
            .completed("out".to_string(), "err".to_string(), Some(1), false);
        assert!(failure.summary().contains("Failed"));
        assert_eq!(failure.to_usage_event().error.as_deref(), Some("err"));

        let timeout = base.timed_out(ExecutionTimeout::new(Duration::from_secs(5)));
        assert!(timeout.summary().contains("Timeout"));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(DelegationPhase::Built.to_string(), "built");
        assert_eq!(
            DelegationPhase::Finished(ExecutionOutcome::TimedOut).to_string(),
            "timed out"
        );
    }

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output("hello".to_string(), 10), "hello");
        assert_eq!(truncate_output("hello".to_string(), 5), "hello");
        assert_eq!(truncate_output("hello world".to_string(), 5), "he...");
        assert_eq!(truncate_output(String::new(), 10), "");
    }

    #[test]
    fn test_executor_config_builder() {
        let config = ExecutorConfig::default();
        assert_eq!(config.timeout.as_secs(), 300);
        assert_eq!(config.max_output_size, MAX_OUTPUT_SIZE);

        assert_eq!(ExecutorConfig::with_timeout(60).timeout.as_secs(), 60);
        assert_eq!(ExecutorConfig::with_max_output_size(2048).max_output_size, 2048);
        assert_eq!(
            ExecutorConfig::with_working_dir("/tmp").working_dir,
            Some(PathBuf::from("/tmp"))
        );
    }

    proptest! {
        #[test]
        fn prop_truncation_respects_char_boundaries(s in "\\PC{0,200}", max in 3usize..64) {
            let out = truncate_output(s.clone(), max);
            prop_assert!(out.len() <= max || out == s);
            if s.len() <= max {
                prop_assert_eq!(out, s);
            } else {
                prop_assert!(out.ends_with("..."));
            }
        }
    }
}
