//! Target and profile-session abstractions for the remote transport
//!
//! These traits allow testing without real servers by supporting mock
//! implementations. Platform-specific implementations are in `src/platform/`.

use crate::normalize::normalize_host_name;
use crate::utils::{RegistryError, SessionError, TargetError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Canonical display name for the operator's own machine
pub const LOCAL_HOST_NAME: &str = "localhost";

/// A host selected for profile operations
///
/// Remote names are canonicalized (trimmed, uppercased, FQDN preserved) on
/// construction. `"."` and `"localhost"` map to [`Target::Local`], which
/// skips the network probe and runs scripts directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Local,
    Remote(String),
}

impl Target {
    /// Parse a user-supplied host name into a canonical target.
    pub fn parse(input: &str) -> Result<Self, TargetError> {
        let trimmed = input.trim();
        if trimmed == "." || trimmed.eq_ignore_ascii_case(LOCAL_HOST_NAME) {
            return Ok(Target::Local);
        }

        Ok(Target::Remote(normalize_host_name(trimmed)?))
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Target::Local)
    }

    /// Canonical name, suitable for report rows and log fields.
    pub fn as_str(&self) -> &str {
        match self {
            Target::Local => LOCAL_HOST_NAME,
            Target::Remote(name) => name,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Target::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// One user profile as reported by a target's profile store
///
/// Sourced read-only per run, never cached across runs. `special` accounts
/// (system, service, default profiles) must never be surfaced to callers;
/// the orchestrator re-filters them even when a session implementation
/// claims to pre-filter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileRecord {
    pub target: Target,
    /// Derived from the last segment of `local_path`
    pub user_name: String,
    pub local_path: String,
    pub last_use_time: Option<DateTime<Utc>>,
    pub loaded: bool,
    pub special: bool,
    /// Security identifier used to address deletes; absent on malformed records
    pub sid: Option<String>,
}

impl ProfileRecord {
    /// Derive the profile username from a profile directory path.
    ///
    /// `C:\Users\alice` and `C:\Users\alice\` both yield `alice`.
    pub fn user_name_from_path(path: &str) -> String {
        let trimmed = path.trim_end_matches(['\\', '/']);
        trimmed
            .rsplit(['\\', '/'])
            .next()
            .unwrap_or(trimmed)
            .to_string()
    }

    /// Time since the profile was last used, relative to `now`.
    pub fn idle_duration(&self, now: DateTime<Utc>) -> IdleDuration {
        match self.last_use_time {
            Some(last_use) => IdleDuration::since(last_use, now),
            None => IdleDuration::Unavailable,
        }
    }
}

/// Derived days/hours/minutes since last use
///
/// A missing last-use timestamp yields `Unavailable`, never zero; an idle
/// time of zero means "used this minute" and must not be conflated with
/// "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleDuration {
    Since { days: i64, hours: i64, minutes: i64 },
    Unavailable,
}

impl IdleDuration {
    /// Compute elapsed time between `last_use` and `now`, clamped at zero
    /// for clock-skewed future timestamps.
    pub fn since(last_use: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let total_minutes = (now - last_use).num_minutes().max(0);
        IdleDuration::Since {
            days: total_minutes / (24 * 60),
            hours: (total_minutes / 60) % 24,
            minutes: total_minutes % 60,
        }
    }
}

impl fmt::Display for IdleDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdleDuration::Since {
                days,
                hours,
                minutes,
            } => write!(f, "{}d {}h {}m", days, hours, minutes),
            IdleDuration::Unavailable => f.write_str("N/A"),
        }
    }
}

impl Serialize for IdleDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Outcome of the reachability probe
///
/// Absence of connectivity is a normal outcome, not an error: an unreachable
/// host short-circuits further processing for that target without raising.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable(String),
}

/// Connection factory for profile sessions
///
/// Implemented by the PowerShell/WinRM transport for production and by the
/// mock transport for tests. `probe` must not be skipped for remote targets:
/// the orchestrator only calls `open` after a `Reachable` probe.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Check whether the target accepts management connections.
    async fn probe(&self, target: &Target) -> Reachability;

    /// Open a management session against a reachable target.
    async fn open(&self, target: &Target) -> Result<Box<dyn ProfileSession>, SessionError>;
}

/// Scoped, per-target connection exposing the profile store primitives
///
/// Implementations release their underlying transport when dropped, so the
/// session is freed on every exit path including errors.
#[async_trait::async_trait]
pub trait ProfileSession: Send + Sync {
    /// The target this session is connected to
    fn target(&self) -> &Target;

    /// All non-special profiles on the target, most recently used first.
    async fn list_profiles(&self) -> Result<Vec<ProfileRecord>, RegistryError>;

    /// Remove one profile's directory and registry hive.
    ///
    /// Callers must have passed the record through the filter policy first;
    /// a loaded profile reaching this method is a bug, and implementations
    /// still reject it rather than corrupting an in-use hive.
    async fn delete_profile(&self, record: &ProfileRecord) -> Result<(), RegistryError>;
}

/// Order profiles most-recently-used first; records without a last-use
/// timestamp sort last. Stable, so equal timestamps keep store order.
pub fn sort_most_recent_first(profiles: &mut [ProfileRecord]) {
    profiles.sort_by(|a, b| match (a.last_use_time, b.last_use_time) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}
