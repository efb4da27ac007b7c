//! Input normalisation helpers for host names and profile usernames.
//!
//! Every user-supplied string passes through one of these functions before
//! reaching the orchestrator, ensuring a single canonical representation
//! (trimmed, uppercased hosts, deduplicated lists) across a run.

use crate::constants::{MAX_HOSTNAME_LENGTH, MAX_USERNAME_LENGTH};
use crate::utils::TargetError;
use std::collections::HashSet;

/// Normalise a host name: trim whitespace and uppercase.
///
/// FQDNs are preserved; profile targets are frequently addressed by their
/// fully qualified name. Returns an error if the result is empty or overlong.
pub fn normalize_host_name(input: &str) -> Result<String, TargetError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TargetError::EmptyHost);
    }
    if trimmed.len() > MAX_HOSTNAME_LENGTH {
        return Err(TargetError::HostTooLong(MAX_HOSTNAME_LENGTH));
    }

    Ok(trimmed.to_uppercase())
}

/// Normalise a profile username.
///
/// A profile username is the last segment of a profile directory path and is
/// never a path itself: path separators and wildcard characters are rejected,
/// along with empty and overlong names. Case is preserved; comparisons
/// elsewhere are case-insensitive.
pub fn normalize_username(raw: &str) -> Result<String, TargetError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TargetError::InvalidProfileName(
            "name cannot be empty".to_string(),
        ));
    }

    if trimmed.len() > MAX_USERNAME_LENGTH {
        return Err(TargetError::InvalidProfileName(format!(
            "'{}' exceeds {} characters",
            trimmed, MAX_USERNAME_LENGTH
        )));
    }

    const FORBIDDEN: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];
    if trimmed.chars().any(|c| FORBIDDEN.contains(&c)) {
        return Err(TargetError::InvalidProfileName(format!(
            "'{}' contains path or wildcard characters",
            trimmed
        )));
    }

    Ok(trimmed.to_string())
}

/// Normalise a list of usernames, deduplicating case-insensitively while
/// preserving first occurrence.
pub fn normalize_username_list<I, S>(names: I) -> Result<Vec<String>, TargetError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut cleaned = Vec::new();
    for name in names {
        let normalized = normalize_username(name.as_ref())?;
        if seen.insert(normalized.to_lowercase()) {
            cleaned.push(normalized);
        }
    }
    Ok(cleaned)
}
