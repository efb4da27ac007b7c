//! Core orchestration engine (platform-agnostic)
//!
//! CRITICAL: This module MUST NOT import platform-specific code. The
//! transport is reached only through the `Connector`/`ProfileSession` traits.

pub mod filter;
pub mod orchestrator;
pub mod pool;
pub mod report;
pub mod session;

// Scripted mock transport (tests only)
#[cfg(test)]
pub mod mock_session;

pub use filter::{evaluate, DenyReason, ExclusionSet, FilterDecision};
pub use orchestrator::{Orchestrator, PrerequisiteCheck, Selection};
pub use pool::WorkerPool;
pub use report::{
    InventoryReport, Outcome, ProfileRow, Subject, SweepReport, SweepSummary, TargetListing,
    TaskResult,
};
pub use session::{
    sort_most_recent_first, Connector, IdleDuration, ProfileRecord, ProfileSession, Reachability,
    Target,
};
