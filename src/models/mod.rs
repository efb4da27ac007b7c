//! # Domain Models
//!
//! Credential data structures shared by the platform transport and the CLI.
//!
//! ## Security Design
//!
//! The [`SecureString`] type provides memory-safe credential handling:
//! - Password data is zeroed on drop to prevent leakage via swap/core dumps
//! - Never exposed in `Debug` or `Display` implementations
//! - Uses unsafe code (carefully audited) for memory zeroing
//!
//! Credentials are held only for the duration of a run. They are read from
//! the environment at startup, passed to PowerShell over stdin, and never
//! written to disk or logs.

pub mod credentials;

pub use credentials::{Credentials, SecureString, Username};
