//! Service Readiness Checks
//!
//! Probes whether a service's command runs and whether it is authenticated.
//! Every failure becomes an issue string; nothing here returns an error.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::service::{AuthMethod, ServiceConfig};
use crate::delegation::ExecutionTimeout;

/// Readiness report for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub service: String,
    pub ready: bool,
    pub issues: Vec<String>,
}

impl Verification {
    pub(crate) fn from_issues(service: impl Into<String>, issues: Vec<String>) -> Self {
        Self {
            service: service.into(),
            ready: issues.is_empty(),
            issues,
        }
    }

    pub(crate) fn unknown(service: &str) -> Self {
        Self::from_issues(service, vec![format!("Unknown service: {}", service)])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeOutcome {
    Passed,
    Exited,
    SpawnFailed,
    TimedOut,
}

async fn probe(program: &str, args: &[&str], timeout: ExecutionTimeout) -> ProbeOutcome {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match timeout.run(command.output()).await {
        None => {
            debug!("Probe {} {:?} timed out", program, args);
            ProbeOutcome::TimedOut
        }
        Some(Err(e)) => {
            debug!("Probe {} {:?} failed to start: {}", program, args, e);
            ProbeOutcome::SpawnFailed
        }
        Some(Ok(output)) if output.status.success() => ProbeOutcome::Passed,
        Some(Ok(output)) => {
            debug!(
                "Probe {} {:?} exited with {:?}",
                program,
                args,
                output.status.code()
            );
            ProbeOutcome::Exited
        }
    }
}

/// Check that `service` can be invoked and is authenticated
pub async fn verify_service(service: &ServiceConfig, timeout: ExecutionTimeout) -> Verification {
    let mut issues = Vec::new();

    if probe(&service.command, &["--version"], timeout).await != ProbeOutcome::Passed {
        issues.push(format!(
            "Command '{}' not found or not working",
            service.command
        ));
    }

    match service.auth_method {
        AuthMethod::ApiKey => {
            if let Some(var) = &service.auth_env_var {
                let set = std::env::var(var).is_ok_and(|v| !v.is_empty());
                if !set {
                    issues.push(format!("Environment variable {} not set", var));
                }
            }
        }
        AuthMethod::Cli => match probe(&service.command, &["auth", "status"], timeout).await {
            ProbeOutcome::Passed => {}
            ProbeOutcome::Exited => issues.push("Service not authenticated".to_string()),
            ProbeOutcome::SpawnFailed | ProbeOutcome::TimedOut => {
                issues.push("Could not verify authentication status".to_string())
            }
        },
    }

    Verification::from_issues(&service.name, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_working_cli_service_is_ready() {
        let service = ServiceConfig::new("stub", "true", AuthMethod::Cli);
        let verification = verify_service(&service, ExecutionTimeout::probe()).await;

        assert!(verification.ready, "{:?}", verification.issues);
        assert_eq!(verification.service, "stub");
    }

    #[tokio::test]
    async fn test_missing_command_accumulates_issues() {
        let service = ServiceConfig::new("ghost", "delegate-test-no-such-command", AuthMethod::Cli);
        let verification = verify_service(&service, ExecutionTimeout::probe()).await;

        assert!(!verification.ready);
        assert_eq!(
            verification.issues,
            vec![
                "Command 'delegate-test-no-such-command' not found or not working".to_string(),
                "Could not verify authentication status".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_cli() {
        let service = ServiceConfig::new("stub", "false", AuthMethod::Cli);
        let verification = verify_service(&service, ExecutionTimeout::probe()).await;

        assert!(verification
            .issues
            .contains(&"Service not authenticated".to_string()));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let service = ServiceConfig::new("keyed", "true", AuthMethod::ApiKey)
            .with_auth_env_var("DELEGATE_TEST_KEY_THAT_IS_NEVER_SET");
        let verification = verify_service(&service, ExecutionTimeout::probe()).await;

        assert_eq!(
            verification.issues,
            vec!["Environment variable DELEGATE_TEST_KEY_THAT_IS_NEVER_SET not set".to_string()]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_timeout_is_an_issue() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("slow-tool");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let service = ServiceConfig::new("slow", script.to_string_lossy(), AuthMethod::ApiKey);
        let timeout = ExecutionTimeout::new(Duration::from_millis(200));
        let verification = verify_service(&service, timeout).await;

        assert!(!verification.ready);
        assert_eq!(verification.issues.len(), 1);
    }

    #[test]
    fn test_unknown_service_issue() {
        let verification = Verification::unknown("nope");
        assert!(!verification.ready);
        assert_eq!(verification.issues, vec!["Unknown service: nope".to_string()]);
    }
}
