//! # Utilities Module
//!
//! Cross-cutting concerns shared by the core engine and the platform layer.
//!
//! ## Modules
//!
//! - [`errors`]: Typed error hierarchy using `thiserror` for domain-specific errors
//! - [`retry`]: Exponential backoff retry logic for transient transport failures
//!
//! ## Design Notes
//!
//! Error types live here to avoid circular dependencies between the `core`
//! and `platform` modules. System errors stay typed until they are converted
//! into report rows at the orchestrator boundary.
//!
//! Retry logic uses tokio's async timer and is configurable per operation
//! type. Transient errors (network timeouts, a busy WinRM service) are
//! retried with exponential backoff; permanent errors (invalid credentials,
//! missing permissions) fail immediately. Deletes never pass through retry.

pub mod errors;
pub mod retry;

pub use errors::{CredentialError, PreconditionError, RegistryError, SessionError, TargetError};
pub use retry::{is_transient_error, retry_with_backoff, RetryConfig};
