//! Usage Tracking Module
//!
//! Durable record of every delegation attempt, backing all quota decisions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       UsageStore                         │
//! ├──────────────────────────────────────────────────────────┤
//! │  append ──► usage.jsonl (append-only, locked)            │
//! │         └─► current_session.json (SessionState)          │
//! │         └─► working view (events within retention)       │
//! │                                                          │
//! │  prune  ──► working view + quota_state.json (last_reset) │
//! │  recent_events / summarize ──► read-only log scans       │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod event;
pub mod session;
pub mod store;
pub mod summary;

pub use event::UsageEvent;
pub use session::SessionState;
pub use store::{PruneReport, RecentEvents, UsageSettings, UsageSnapshot, UsageStore};
pub use summary::{ServiceUsage, UsageSummary};
