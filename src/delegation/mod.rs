//! Delegation Module
//!
//! Building and running delegated calls, and the [`Delegator`] facade that
//! puts registry, quota guard, executor and usage store in sequence.
//!
//! # Architecture
//!
//! ```text
//! caller
//!   │  DelegationRequest
//!   ▼
//! Delegator ──► ServiceRegistry (resolve / select_best)
//!   │       ──► QuotaGuard (can_handle, unless forced)
//!   ▼
//! DelegationExecutor ──► child process (timeout, kill on drop)
//!   │
//!   └──► UsageStore::append (exactly once)
//! ```

pub mod delegator;
pub mod executor;
pub mod invocation;
pub mod timeout;

pub use delegator::{DelegationReport, DelegationRequest, Delegator, ServiceChoice, AUTO_SERVICE};
pub use executor::{
    DelegationExecutor, DelegationPhase, ExecutionOutcome, ExecutionResult, ExecutorConfig,
    NOT_FOUND_EXIT_CODE, TIMEOUT_EXIT_CODE,
};
pub use invocation::{build_invocation, Invocation, InvocationOptions};
pub use timeout::ExecutionTimeout;
