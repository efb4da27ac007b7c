//! ProfileSweep - concurrent inventory and removal of per-user Windows
//! profiles across remote hosts
//!
//! Core library exposing the platform-agnostic orchestration engine; the
//! PowerShell/WinRM transport lives behind the `cfg(windows)` platform gate.

// Public modules
pub mod constants;
pub mod core;
pub mod models;
pub mod normalize;
pub mod utils;

// Platform-specific modules
#[cfg(windows)]
pub mod platform;

// Re-export commonly used types
pub use core::{
    ExclusionSet, InventoryReport, Orchestrator, PrerequisiteCheck, Selection, SweepReport, Target,
    WorkerPool,
};
pub use models::{Credentials, SecureString, Username};
pub use utils::{PreconditionError, RegistryError, SessionError, TargetError};
