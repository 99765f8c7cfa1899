//! Delegate Orchestrator Library
//!
//! Quota-aware delegation of prompts to command-line AI services: durable
//! usage tracking, quota admission, service registry and selection, and
//! timeout-bounded execution of the delegated call.

pub mod config;
pub mod delegation;
pub mod error;
pub mod logging;
pub mod quota;
pub mod registry;
pub mod usage;

pub use config::Config;
pub use delegation::{
    DelegationExecutor, DelegationReport, DelegationRequest, Delegator, ExecutionResult,
    ServiceChoice,
};
pub use error::{ConfigError, DelegationError, PersistenceError};
pub use quota::{QuotaGuard, QuotaLimits, QuotaStatus};
pub use registry::{ServiceConfig, ServiceRegistry};
pub use usage::{UsageEvent, UsageStore};
