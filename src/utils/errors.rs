//! Error types for ProfileSweep
//!
//! All error types use thiserror for clean error handling.
//! SECURITY: Error messages MUST NOT contain passwords or sensitive data.

use std::time::Duration;

/// Errors from remote session establishment and script transport
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("WinRM error: {0}")]
    WinRm(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors from the profile store query/delete primitives
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Profile query failed: {0}")]
    Query(String),

    #[error("Profile removal failed: {0}")]
    Delete(String),

    #[error("Malformed profile record: {0}")]
    Parse(String),
}

/// Fatal failures detected before any orchestration begins
#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    #[error("Required capability unavailable: {0}")]
    Unavailable(String),
}

/// Errors from credential handling
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Invalid username format: {0}")]
    InvalidUsername(String),
}

/// Invalid user-supplied target or profile name input
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("Host name cannot be empty")]
    EmptyHost,

    #[error("Host name exceeds maximum length ({0})")]
    HostTooLong(usize),

    #[error("Invalid profile name: {0}")]
    InvalidProfileName(String),
}
