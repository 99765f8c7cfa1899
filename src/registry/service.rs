//! Service Definitions
//!
//! Static description of one delegation target: how to invoke it, how it
//! authenticates, its quota limits and what it is good at.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;
use crate::quota::{QuotaLimits, QuotaLimitsOverride};

/// How a service authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Key read from an environment variable
    ApiKey,
    /// Login state managed by the tool itself (`<command> auth status`)
    Cli,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::ApiKey => f.write_str("api_key"),
            AuthMethod::Cli => f.write_str("cli"),
        }
    }
}

/// What a service is good at, used by automatic selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceCapabilities {
    /// Context window in tokens
    pub context_window: u64,
    pub code_execution: bool,
    /// Relative speed rating, higher is faster
    pub speed: u8,
}

impl Default for ServiceCapabilities {
    fn default() -> Self {
        Self {
            context_window: 32_000,
            code_execution: false,
            speed: 1,
        }
    }
}

/// Command-line flag names; an empty name disables that flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvocationFlags {
    pub model: String,
    pub output_format: String,
    pub temperature: String,
    pub prompt: String,
}

impl Default for InvocationFlags {
    fn default() -> Self {
        Self {
            model: "--model".to_string(),
            output_format: "--output-format".to_string(),
            temperature: "--temperature".to_string(),
            prompt: "-p".to_string(),
        }
    }
}

/// Preferred models per kind of request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast: Option<String>,
}

/// Configuration for one delegation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub command: String,
    pub auth_method: AuthMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_env_var: Option<String>,
    #[serde(default)]
    pub quota_limits: QuotaLimits,
    #[serde(default)]
    pub capabilities: ServiceCapabilities,
    #[serde(default)]
    pub flags: InvocationFlags,
    #[serde(default)]
    pub models: ModelPreferences,
}

impl ServiceConfig {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        auth_method: AuthMethod,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            auth_method,
            auth_env_var: None,
            quota_limits: QuotaLimits::default(),
            capabilities: ServiceCapabilities::default(),
            flags: InvocationFlags::default(),
            models: ModelPreferences::default(),
        }
    }

    pub fn with_auth_env_var(mut self, var: impl Into<String>) -> Self {
        self.auth_env_var = Some(var.into());
        self
    }

    pub fn with_quota_limits(mut self, limits: QuotaLimits) -> Self {
        self.quota_limits = limits;
        self
    }

    pub fn with_capabilities(mut self, capabilities: ServiceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_flags(mut self, flags: InvocationFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_models(mut self, models: ModelPreferences) -> Self {
        self.models = models;
        self
    }

    /// Google Gemini CLI
    pub fn gemini() -> Self {
        Self::new("gemini", "gemini", AuthMethod::ApiKey)
            .with_auth_env_var("GEMINI_API_KEY")
            .with_quota_limits(QuotaLimits::new(60, 1_000, 32_000, 1_000_000))
            .with_capabilities(ServiceCapabilities {
                context_window: 1_000_000,
                code_execution: false,
                speed: 3,
            })
            .with_models(ModelPreferences {
                large_context: Some("gemini-2.0-pro-exp".to_string()),
                fast: Some("gemini-2.0-flash-exp".to_string()),
            })
    }

    /// Qwen Code CLI
    pub fn qwen() -> Self {
        Self::new("qwen", "qwen", AuthMethod::Cli)
            .with_quota_limits(QuotaLimits::new(120, 2_000, 32_000, 2_000_000))
            .with_capabilities(ServiceCapabilities {
                context_window: 128_000,
                code_execution: true,
                speed: 2,
            })
            .with_flags(InvocationFlags {
                output_format: "--format".to_string(),
                ..Default::default()
            })
            .with_models(ModelPreferences {
                large_context: Some("qwen-max".to_string()),
                fast: Some("qwen-turbo".to_string()),
            })
    }

    /// Built-in services in registration order
    pub fn builtin() -> Vec<Self> {
        vec![Self::gemini(), Self::qwen()]
    }
}

/// Partial flag table from user configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagsOverride {
    pub model: Option<String>,
    pub output_format: Option<String>,
    pub temperature: Option<String>,
    pub prompt: Option<String>,
}

impl FlagsOverride {
    fn apply(&self, flags: &mut InvocationFlags) {
        let fields = [
            (&self.model, &mut flags.model),
            (&self.output_format, &mut flags.output_format),
            (&self.temperature, &mut flags.temperature),
            (&self.prompt, &mut flags.prompt),
        ];
        for (patch, target) in fields {
            if let Some(value) = patch {
                *target = value.clone();
            }
        }
    }
}

/// One entry of the `services` table in `config.json`
///
/// Fields present override the named service; an unknown name adds a new
/// service, which must at least name its command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOverride {
    pub command: Option<String>,
    pub auth_method: Option<AuthMethod>,
    pub auth_env_var: Option<String>,
    pub quota_limits: Option<QuotaLimitsOverride>,
    pub capabilities: Option<ServiceCapabilities>,
    pub flags: Option<FlagsOverride>,
    pub models: Option<ModelPreferences>,
}

impl ServiceOverride {
    /// Update an existing service in place
    pub fn apply(&self, service: &mut ServiceConfig) {
        if let Some(command) = &self.command {
            service.command = command.clone();
        }
        if let Some(auth_method) = self.auth_method {
            service.auth_method = auth_method;
        }
        if let Some(var) = &self.auth_env_var {
            service.auth_env_var = Some(var.clone());
        }
        if let Some(limits) = &self.quota_limits {
            limits.apply(&mut service.quota_limits);
        }
        if let Some(capabilities) = self.capabilities {
            service.capabilities = capabilities;
        }
        if let Some(flags) = &self.flags {
            flags.apply(&mut service.flags);
        }
        if let Some(models) = &self.models {
            service.models = models.clone();
        }
    }

    /// Build a new service named `name`
    ///
    /// Auth method defaults to `cli` when not given.
    pub fn to_service(&self, name: &str) -> Result<ServiceConfig, ConfigError> {
        let command = self
            .command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::Invalid(format!("new service '{}' has no command", name))
            })?;

        let mut service =
            ServiceConfig::new(name, command, self.auth_method.unwrap_or(AuthMethod::Cli));
        self.apply(&mut service);
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_services() {
        let services = ServiceConfig::builtin();
        let names: Vec<_> = services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["gemini", "qwen"]);

        let gemini = &services[0];
        assert_eq!(gemini.auth_method, AuthMethod::ApiKey);
        assert_eq!(gemini.auth_env_var.as_deref(), Some("GEMINI_API_KEY"));
        assert_eq!(gemini.quota_limits.requests_per_minute, 60);
        assert_eq!(gemini.flags.output_format, "--output-format");

        let qwen = &services[1];
        assert_eq!(qwen.auth_method, AuthMethod::Cli);
        assert_eq!(qwen.quota_limits.tokens_per_day, 2_000_000);
        assert_eq!(qwen.flags.output_format, "--format");
        assert!(qwen.capabilities.code_execution);
    }

    #[test]
    fn test_auth_method_serde() {
        assert_eq!(
            serde_json::to_string(&AuthMethod::ApiKey).unwrap(),
            "\"api_key\""
        );
        let parsed: AuthMethod = serde_json::from_str("\"cli\"").unwrap();
        assert_eq!(parsed, AuthMethod::Cli);
        assert_eq!(AuthMethod::ApiKey.to_string(), "api_key");
    }

    #[test]
    fn test_override_updates_individual_limits() {
        let mut service = ServiceConfig::gemini();
        let patch: ServiceOverride = serde_json::from_str(
            r#"{"command": "/opt/gemini", "quota_limits": {"requests_per_minute": 10}}"#,
        )
        .unwrap();
        patch.apply(&mut service);

        assert_eq!(service.command, "/opt/gemini");
        assert_eq!(service.quota_limits.requests_per_minute, 10);
        assert_eq!(service.quota_limits.tokens_per_day, 1_000_000);
        assert_eq!(service.auth_method, AuthMethod::ApiKey);
    }

    #[test]
    fn test_override_flags_partially() {
        let mut service = ServiceConfig::qwen();
        let patch: ServiceOverride =
            serde_json::from_str(r#"{"flags": {"temperature": ""}}"#).unwrap();
        patch.apply(&mut service);

        assert_eq!(service.flags.temperature, "");
        assert_eq!(service.flags.output_format, "--format");
    }

    #[test]
    fn test_new_service_requires_command() {
        let patch = ServiceOverride::default();
        let err = patch.to_service("custom").unwrap_err();
        assert!(err.to_string().contains("custom"));
    }

    #[test]
    fn test_new_service_from_override() {
        let patch: ServiceOverride = serde_json::from_str(
            r#"{"command": "claude", "auth_method": "api_key", "auth_env_var": "CLAUDE_KEY"}"#,
        )
        .unwrap();
        let service = patch.to_service("claude").unwrap();

        assert_eq!(service.name, "claude");
        assert_eq!(service.auth_method, AuthMethod::ApiKey);
        assert_eq!(service.auth_env_var.as_deref(), Some("CLAUDE_KEY"));
        assert_eq!(service.quota_limits, QuotaLimits::default());
        assert_eq!(service.flags, InvocationFlags::default());
    }
}
