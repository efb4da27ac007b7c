//! # Application-Wide Constants
//!
//! Centralized configuration values and magic numbers used throughout ProfileSweep.
//!
//! ## Design Rationale
//!
//! Constants are defined here (rather than scattered across modules) to:
//! - Make configuration changes easier (single source of truth)
//! - Improve discoverability (grep for constant name finds definition + all uses)
//! - Document WHY each value was chosen
//!
//! ## Usage
//!
//! ```rust
//! use profilesweep::constants::*;
//! use std::time::Duration;
//!
//! let timeout = Duration::from_secs(SESSION_VALIDATION_TIMEOUT_SECS);
//! ```

/// Windows API flag to create a process without a visible console window
///
/// Used when launching powershell.exe or ping.exe so console hosts that run
/// the sweep from a shortcut do not get a flash of command prompt window.
#[cfg(windows)]
pub const CREATE_NO_WINDOW: u32 = 0x08000000;

// ============================================================================
// Concurrency
// ============================================================================

/// Default ceiling on simultaneously in-flight tasks per dispatch
///
/// **Rationale**: 50 matches what a single operator host can sustain in
/// outbound WinRM sessions without exhausting ephemeral ports or WinRM
/// client connection quotas. Tasks beyond the ceiling queue; they never fail.
pub const DEFAULT_WORKER_LIMIT: usize = 50;

// ============================================================================
// Timeouts and Performance Limits
// ============================================================================

/// ICMP ping wait per echo request (milliseconds)
pub const PING_TIMEOUT_MS: u64 = 800;

/// TCP connection timeout for reachability probes (milliseconds)
///
/// **Rationale**: 1200ms (1.2 seconds) is:
/// - Fast enough that an unreachable host does not stall its worker
/// - Slow enough for typical LAN/WAN latency
/// - Balances speed vs. false negatives on slow networks
pub const TCP_PROBE_TIMEOUT_MS: u64 = 1200;

/// Maximum time to wait for the Test-WSMan session validation
///
/// **Rationale**: 10 seconds allows for:
/// - Network round-trip to the remote server
/// - WinRM auth handshake
/// - Slow domain controllers
///
///   But prevents indefinite hangs on half-reachable hosts.
pub const SESSION_VALIDATION_TIMEOUT_SECS: u64 = 10;

/// Maximum time to wait for a profile enumeration query
///
/// Win32_UserProfile enumeration walks every profile's registry metadata;
/// a minute covers file servers carrying hundreds of profiles.
pub const PROFILE_QUERY_TIMEOUT_SECS: u64 = 60;

/// Maximum time to wait for a single profile deletion
///
/// **Rationale**: deleting a profile removes the directory tree and unloads
/// the registry hive. Multi-gigabyte roaming profiles legitimately take
/// minutes, so this bound is deliberately generous. A delete that exceeds it
/// is reported as a failure for that profile only.
pub const PROFILE_DELETE_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// Network Defaults
// ============================================================================

/// TCP ports probed when ICMP is filtered
///
/// - **5985**: WinRM HTTP (PowerShell Remoting)
/// - **5986**: WinRM HTTPS
///
/// A host answering on either port can accept a management session even when
/// a perimeter firewall drops echo requests.
pub const WINRM_TCP_PORTS: &[u16] = &[5985, 5986];

// ============================================================================
// Security / Validation
// ============================================================================

/// Maximum hostname length (characters)
///
/// **Rationale**: DNS hostnames limited to 253 characters (RFC 1035),
/// but 255 gives buffer for display and matches common validation.
pub const MAX_HOSTNAME_LENGTH: usize = 255;

/// Maximum profile username length (characters)
///
/// Windows caps SAM account names well below this; 256 matches the limit
/// the credential types already enforce.
pub const MAX_USERNAME_LENGTH: usize = 256;
