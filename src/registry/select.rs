//! Automatic Service Selection

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use super::service::ServiceConfig;
use super::ServiceRegistry;
use crate::error::{DelegationError, Result};

/// What the caller needs from a service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    pub large_context: bool,
    pub code_execution: bool,
    pub fast_response: bool,
}

impl Requirements {
    /// Preferred model for these requirements, if the service names one
    pub fn preferred_model<'s>(&self, service: &'s ServiceConfig) -> Option<&'s str> {
        if self.large_context {
            service.models.large_context.as_deref()
        } else if self.fast_response {
            service.models.fast.as_deref()
        } else {
            None
        }
    }
}

/// How selection learns which services are available
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Availability {
    /// Run the readiness probes
    #[default]
    Probe,
    /// Trust the caller's list of available services
    Known(BTreeSet<String>),
}

impl Availability {
    pub fn known<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Availability::Known(names.into_iter().map(Into::into).collect())
    }

    async fn includes(&self, registry: &ServiceRegistry, service: &ServiceConfig) -> bool {
        match self {
            Availability::Probe => registry.verify(&service.name).await.ready,
            Availability::Known(names) => names.contains(&service.name),
        }
    }
}

impl ServiceRegistry {
    /// Pick the service that best fits `requirements`
    ///
    /// Large-context requests take the available service with the largest
    /// context window, code-execution requests the first available service
    /// that can run code, and fast requests the fastest-rated service.
    /// Otherwise the first registered service that passes verification wins.
    pub async fn select_best(
        &self,
        requirements: &Requirements,
        availability: &Availability,
    ) -> Result<&ServiceConfig> {
        if requirements.large_context {
            let mut best: Option<&ServiceConfig> = None;
            for service in self.services() {
                if !availability.includes(self, service).await {
                    continue;
                }
                if best.is_none_or(|b| service.capabilities.context_window > b.capabilities.context_window) {
                    best = Some(service);
                }
            }
            if let Some(service) = best {
                debug!("Selected {} for large context", service.name);
                return Ok(service);
            }
        }

        if requirements.code_execution {
            for service in self.services() {
                if service.capabilities.code_execution
                    && availability.includes(self, service).await
                {
                    debug!("Selected {} for code execution", service.name);
                    return Ok(service);
                }
            }
        }

        if requirements.fast_response {
            let fastest = self
                .services()
                .fold(None::<&ServiceConfig>, |best, service| match best {
                    Some(b) if b.capabilities.speed >= service.capabilities.speed => Some(b),
                    _ => Some(service),
                });
            if let Some(service) = fastest {
                debug!("Selected {} for fast response", service.name);
                return Ok(service);
            }
        }

        for service in self.services() {
            if self.verify(&service.name).await.ready {
                debug!("Selected first ready service {}", service.name);
                return Ok(service);
            }
        }

        Err(DelegationError::NoServiceAvailable)
    }
}
