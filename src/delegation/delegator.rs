//! Delegator
//!
//! Full delegation flow: pick or resolve a service, admit the request
//! against its quota, run it, and report the result with the quota status
//! after the call.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::executor::{DelegationExecutor, ExecutionResult};
use super::invocation::InvocationOptions;
use super::timeout::ExecutionTimeout;
use crate::error::{DelegationError, Result};
use crate::quota::{estimate_tokens, QuotaGuard, QuotaStatus};
use crate::registry::{Availability, Requirements, ServiceRegistry};
use crate::usage::UsageStore;

/// Service name accepted for automatic selection
pub const AUTO_SERVICE: &str = "auto";

/// Which service a request goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceChoice {
    Named(String),
    Auto,
}

impl FromStr for ServiceChoice {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(if s == AUTO_SERVICE {
            ServiceChoice::Auto
        } else {
            ServiceChoice::Named(s.to_string())
        })
    }
}

/// One delegation request
#[derive(Debug, Clone)]
pub struct DelegationRequest {
    pub service: ServiceChoice,
    pub prompt: String,
    pub files: Vec<PathBuf>,
    pub options: InvocationOptions,
    pub requirements: Requirements,
    pub timeout: Option<ExecutionTimeout>,
    /// Skip the quota check
    pub force: bool,
}

impl DelegationRequest {
    pub fn new(service: ServiceChoice, prompt: impl Into<String>) -> Self {
        Self {
            service,
            prompt: prompt.into(),
            files: Vec::new(),
            options: InvocationOptions::default(),
            requirements: Requirements::default(),
            timeout: None,
            force: false,
        }
    }

    pub fn named(service: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(ServiceChoice::Named(service.into()), prompt)
    }

    pub fn auto(prompt: impl Into<String>) -> Self {
        Self::new(ServiceChoice::Auto, prompt)
    }

    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = files;
        self
    }

    pub fn with_options(mut self, options: InvocationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_timeout(mut self, timeout: ExecutionTimeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Outcome of a delegation that reached the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationReport {
    pub service: String,
    pub result: ExecutionResult,
    /// Quota status of the service after the call
    pub status: QuotaStatus,
}

/// Entry point tying registry, quota guard and executor together
#[derive(Debug, Clone)]
pub struct Delegator {
    registry: Arc<ServiceRegistry>,
    executor: DelegationExecutor,
    availability: Availability,
}

impl Delegator {
    pub fn new(registry: Arc<ServiceRegistry>, executor: DelegationExecutor) -> Self {
        Self {
            registry,
            executor,
            availability: Availability::Probe,
        }
    }

    /// Use `availability` instead of probing during automatic selection
    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &DelegationExecutor {
        &self.executor
    }

    pub fn store(&self) -> &UsageStore {
        self.executor.store()
    }

    /// Run one delegation request
    ///
    /// Quota denial returns [`DelegationError::QuotaDenied`] without spawning
    /// anything. Once the executor runs, failures are reported in the
    /// [`ExecutionResult`] rather than as errors.
    pub async fn delegate(&self, request: DelegationRequest) -> Result<DelegationReport> {
        let store = self.store();
        let pruned = store.prune();
        if pruned.pruned > 0 || pruned.daily_reset {
            debug!(
                "Pruned {} usage events (daily reset: {})",
                pruned.pruned, pruned.daily_reset
            );
        }

        let mut options = request.options.clone();
        let service = match &request.service {
            ServiceChoice::Named(name) => self.registry.resolve(name)?,
            ServiceChoice::Auto => {
                let service = self
                    .registry
                    .select_best(&request.requirements, &self.availability)
                    .await?;
                if options.model.is_none() {
                    options.model = request
                        .requirements
                        .preferred_model(service)
                        .map(str::to_string);
                }
                info!("Automatically selected {}", service.name);
                service
            }
        };

        let guard = QuotaGuard::for_service(store, &service.name);
        let limits = &service.quota_limits;

        if request.force {
            debug!("Skipping quota check for {}", service.name);
        } else {
            let estimated = estimate_tokens(request.files.as_slice(), request.prompt.len() as u64);
            let admission = guard.can_handle(estimated, limits);
            if !admission.allowed {
                warn!(
                    "Refusing delegation to {}: {}",
                    service.name,
                    admission.reasons.join("; ")
                );
                return Err(DelegationError::QuotaDenied {
                    service: service.name.clone(),
                    reasons: admission.reasons,
                });
            }
        }

        let result = self
            .executor
            .run(
                service,
                &request.prompt,
                &request.files,
                &options,
                request.timeout,
            )
            .await;

        Ok(DelegationReport {
            service: service.name.clone(),
            status: guard.status(limits),
            result,
        })
    }
}
