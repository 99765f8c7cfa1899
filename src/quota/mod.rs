//! Quota Management Module
//!
//! Admission and health decisions for delegated requests, computed from the
//! usage store against per-service limits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        QuotaGuard                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UsageStore working view ──► CurrentUsage                   │
//! │     (last 60 s, since last daily reset)                     │
//! │                                                             │
//! │  CurrentUsage + QuotaLimits + estimate ──► Admission        │
//! │  CurrentUsage + QuotaLimits            ──► QuotaStatus      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod estimate;
pub mod guard;
pub mod limits;
pub mod status;

pub use estimate::{estimate_tokens, estimate_tokens_from_command};
pub use guard::{evaluate_admission, Admission, CurrentUsage, QuotaGuard};
pub use limits::{QuotaLimits, QuotaLimitsOverride};
pub use status::{QuotaLevel, QuotaStatus};
