//! Service Registry Module
//!
//! Known delegation services, their configuration, readiness checks and
//! automatic selection.
//!
//! One registry is built per process (built-ins merged with `config.json`)
//! and shared by `Arc` handle.

pub mod select;
pub mod service;
pub mod verify;

pub use select::{Availability, Requirements};
pub use service::{
    AuthMethod, FlagsOverride, InvocationFlags, ModelPreferences, ServiceCapabilities,
    ServiceConfig, ServiceOverride,
};
pub use verify::{verify_service, Verification};

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::delegation::ExecutionTimeout;
use crate::error::{ConfigError, DelegationError, Result};

/// Ordered set of delegation services
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    services: Vec<ServiceConfig>,
    probe_timeout: ExecutionTimeout,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ServiceRegistry {
    /// Registry holding the built-in services
    pub fn with_defaults() -> Self {
        Self::from_services(ServiceConfig::builtin())
    }

    /// Registry holding exactly `services`, in order
    pub fn from_services(services: Vec<ServiceConfig>) -> Self {
        Self {
            services,
            probe_timeout: ExecutionTimeout::probe(),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: ExecutionTimeout) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn probe_timeout(&self) -> ExecutionTimeout {
        self.probe_timeout
    }

    /// Look up a service by name
    pub fn get(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Look up a service by name, failing for unknown names
    pub fn resolve(&self, name: &str) -> Result<&ServiceConfig> {
        self.get(name)
            .ok_or_else(|| DelegationError::UnknownService(name.to_string()))
    }

    /// Services in registration order
    pub fn services(&self) -> impl Iterator<Item = &ServiceConfig> {
        self.services.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Merge user overrides into the registry
    ///
    /// Known names are updated field by field; unknown names are added.
    /// Rejected entries are logged, skipped and returned.
    pub fn merge_user_config(
        &mut self,
        overrides: &BTreeMap<String, ServiceOverride>,
    ) -> Vec<ConfigError> {
        let mut rejected = Vec::new();

        for (name, patch) in overrides {
            if let Some(existing) = self.services.iter_mut().find(|s| &s.name == name) {
                patch.apply(existing);
                debug!("Applied configuration override for service {}", name);
                continue;
            }

            match patch.to_service(name) {
                Ok(service) => {
                    debug!("Registered service {} from configuration", name);
                    self.services.push(service);
                }
                Err(e) => {
                    warn!("Skipping service {}: {}", name, e);
                    rejected.push(e);
                }
            }
        }

        rejected
    }

    /// Readiness report for `name`
    ///
    /// Unknown services produce an issue rather than an error.
    pub async fn verify(&self, name: &str) -> Verification {
        match self.get(name) {
            Some(service) => verify_service(service, self.probe_timeout).await,
            None => Verification::unknown(name),
        }
    }
}
