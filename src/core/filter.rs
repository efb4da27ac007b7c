//! Deletion policy: the single choke point every profile removal passes through
//!
//! `evaluate` is a pure function of its three inputs. No deletion path may
//! bypass it; the orchestrator consults it once per candidate before any
//! delete task is dispatched.

use super::session::ProfileRecord;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Case-insensitive set of usernames exempt from bulk deletion
///
/// Windows account names compare case-insensitively, so membership does too.
/// The set applies to the "delete all" sweep and to listing only; an
/// explicitly named username is never blocked by it.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    names: HashSet<String>,
}

impl ExclusionSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, user_name: &str) -> bool {
        self.names.contains(&user_name.trim().to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// Why a candidate was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotFound,
    Excluded,
    Loaded,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DenyReason::NotFound => "does not exist on the computer",
            DenyReason::Excluded => "excluded from deletion",
            DenyReason::Loaded => "loaded, cannot remove",
        };
        f.write_str(text)
    }
}

/// Verdict for one candidate username on one target
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    /// Deletion may proceed against this record
    Permitted(ProfileRecord),
    Denied(DenyReason),
}

/// Decide whether `user_name` may be deleted from the target's profile set.
///
/// Matching is exact equality against the derived profile username,
/// case-insensitive; a raw suffix match would let "an" hit "Ivan".
/// Precedence: existence, then exclusion, then loaded state. Existence wins
/// so a caller naming an absent excluded user learns the profile is gone,
/// and exclusion wins over loaded so an exempt profile is reported as exempt
/// whether or not it happens to be in use.
pub fn evaluate(
    user_name: &str,
    profiles: &[ProfileRecord],
    exclusions: &ExclusionSet,
) -> FilterDecision {
    let wanted = user_name.trim().to_lowercase();
    // Profiles arrive most-recently-used first; duplicate usernames from a
    // second profile volume resolve to the most recent record.
    let matched = profiles
        .iter()
        .find(|record| record.user_name.to_lowercase() == wanted);

    let Some(record) = matched else {
        return FilterDecision::Denied(DenyReason::NotFound);
    };

    if exclusions.contains(user_name) {
        return FilterDecision::Denied(DenyReason::Excluded);
    }

    if record.loaded {
        return FilterDecision::Denied(DenyReason::Loaded);
    }

    FilterDecision::Permitted(record.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::Target;

    fn record(user: &str, loaded: bool) -> ProfileRecord {
        ProfileRecord {
            target: Target::Local,
            user_name: user.to_string(),
            local_path: format!("C:\\Users\\{}", user),
            last_use_time: None,
            loaded,
            special: false,
            sid: Some(format!("S-1-5-21-0-0-0-{}", user.len())),
        }
    }

    #[test]
    fn evaluate_denies_missing_profile() {
        let profiles = vec![record("alice", false)];
        let decision = evaluate("dave", &profiles, &ExclusionSet::empty());
        assert_eq!(decision, FilterDecision::Denied(DenyReason::NotFound));
    }

    #[test]
    fn evaluate_denies_excluded_profile() {
        let profiles = vec![record("alice", false)];
        let exclusions = ExclusionSet::new(["alice"]);
        let decision = evaluate("alice", &profiles, &exclusions);
        assert_eq!(decision, FilterDecision::Denied(DenyReason::Excluded));
    }

    #[test]
    fn evaluate_denies_loaded_profile() {
        let profiles = vec![record("bob", true)];
        let decision = evaluate("bob", &profiles, &ExclusionSet::empty());
        assert_eq!(decision, FilterDecision::Denied(DenyReason::Loaded));
    }

    #[test]
    fn evaluate_permits_unloaded_unexcluded_profile() {
        let profiles = vec![record("carol", false)];
        match evaluate("carol", &profiles, &ExclusionSet::empty()) {
            FilterDecision::Permitted(matched) => assert_eq!(matched.user_name, "carol"),
            other => panic!("expected permit, got {:?}", other),
        }
    }

    #[test]
    fn nonexistence_dominates_exclusion() {
        let profiles = vec![record("alice", false)];
        let exclusions = ExclusionSet::new(["dave"]);
        let decision = evaluate("dave", &profiles, &exclusions);
        assert_eq!(decision, FilterDecision::Denied(DenyReason::NotFound));
    }

    #[test]
    fn exclusion_dominates_loaded_state() {
        let profiles = vec![record("alice", true)];
        let exclusions = ExclusionSet::new(["ALICE"]);
        let decision = evaluate("alice", &profiles, &exclusions);
        assert_eq!(decision, FilterDecision::Denied(DenyReason::Excluded));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let profiles = vec![record("Alice", false)];
        match evaluate("aLiCe", &profiles, &ExclusionSet::empty()) {
            FilterDecision::Permitted(matched) => assert_eq!(matched.user_name, "Alice"),
            other => panic!("expected permit, got {:?}", other),
        }
    }

    #[test]
    fn matching_is_exact_not_suffix() {
        // "an" must not match "Ivan"
        let profiles = vec![record("Ivan", false)];
        let decision = evaluate("an", &profiles, &ExclusionSet::empty());
        assert_eq!(decision, FilterDecision::Denied(DenyReason::NotFound));
    }

    #[test]
    fn duplicate_usernames_resolve_to_first_record() {
        let mut first = record("bob", false);
        first.local_path = "C:\\Users\\bob".to_string();
        let mut second = record("bob", true);
        second.local_path = "D:\\Profiles\\bob".to_string();

        match evaluate("bob", &[first, second], &ExclusionSet::empty()) {
            FilterDecision::Permitted(matched) => {
                assert_eq!(matched.local_path, "C:\\Users\\bob")
            }
            other => panic!("expected permit for first record, got {:?}", other),
        }
    }

    #[test]
    fn exclusion_set_trims_and_ignores_case() {
        let exclusions = ExclusionSet::new([" Admin ", "svc_backup"]);
        assert!(exclusions.contains("admin"));
        assert!(exclusions.contains("ADMIN"));
        assert!(exclusions.contains("SVC_BACKUP"));
        assert!(!exclusions.contains("administrator"));
        assert_eq!(exclusions.len(), 2);
    }

    #[test]
    fn deny_reason_messages() {
        assert_eq!(
            DenyReason::NotFound.to_string(),
            "does not exist on the computer"
        );
        assert_eq!(DenyReason::Excluded.to_string(), "excluded from deletion");
        assert_eq!(DenyReason::Loaded.to_string(), "loaded, cannot remove");
    }
}
