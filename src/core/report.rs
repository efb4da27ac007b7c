//! Run outcomes and their aggregation into ordered reports
//!
//! Every task in a run, successful or not, contributes exactly one row.
//! Aggregation concatenates per-target rows in target submission order and
//! derives summary counts from the rows; the counts never replace them.

use super::session::{IdleDuration, ProfileRecord, Target};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// What a task was acting on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    /// Target-level work: probe, session open, profile enumeration
    Enumerate,
    /// One named profile on the target
    Profile(String),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Enumerate => f.write_str("enumerate"),
            Subject::Profile(name) => f.write_str(name),
        }
    }
}

/// How a task ended
///
/// `Denied` is a business-rule refusal from the filter policy; `Failure` is
/// a system error. The distinction matters for exit codes and summaries: a
/// sweep that only hit exclusions did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Denied,
    Failure,
}

/// One row of the final report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub target: Target,
    pub subject: Subject,
    pub outcome: Outcome,
    pub message: String,
}

impl TaskResult {
    pub fn success(target: Target, subject: Subject, message: impl Into<String>) -> Self {
        Self {
            target,
            subject,
            outcome: Outcome::Success,
            message: message.into(),
        }
    }

    pub fn denied(target: Target, subject: Subject, message: impl Into<String>) -> Self {
        Self {
            target,
            subject,
            outcome: Outcome::Denied,
            message: message.into(),
        }
    }

    pub fn failure(target: Target, subject: Subject, message: impl Into<String>) -> Self {
        Self {
            target,
            subject,
            outcome: Outcome::Failure,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.target, self.subject, self.message)
    }
}

/// One profile row of the inventory report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRow {
    pub target: Target,
    pub user_name: String,
    pub local_path: String,
    pub last_used: Option<DateTime<Utc>>,
    pub loaded: bool,
    pub idle: IdleDuration,
}

impl ProfileRow {
    pub fn from_record(record: &ProfileRecord, now: DateTime<Utc>) -> Self {
        Self {
            target: record.target.clone(),
            user_name: record.user_name.clone(),
            local_path: record.local_path.clone(),
            last_used: record.last_use_time,
            loaded: record.loaded,
            idle: record.idle_duration(now),
        }
    }
}

/// Per-target section of the inventory report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetListing {
    pub target: Target,
    pub profiles: Vec<ProfileRow>,
    /// Informational or failure row when enumeration produced no profile rows
    pub note: Option<TaskResult>,
}

/// Ordered result of the enumerate operation, one listing per target in
/// submission order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryReport {
    pub listings: Vec<TargetListing>,
}

impl InventoryReport {
    pub fn profile_count(&self) -> usize {
        self.listings.iter().map(|l| l.profiles.len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.listings
            .iter()
            .filter(|l| {
                matches!(
                    &l.note,
                    Some(note) if note.outcome == Outcome::Failure
                )
            })
            .count()
    }
}

/// Success/denied/failed tallies derived from sweep rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub succeeded: usize,
    pub denied: usize,
    pub failed: usize,
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} removed, {} denied, {} failed",
            self.succeeded, self.denied, self.failed
        )
    }
}

/// Ordered result of the sweep operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub results: Vec<TaskResult>,
    pub summary: SweepSummary,
}

impl SweepReport {
    /// Concatenate per-target rows in submission order and tally outcomes.
    /// No row is ever dropped.
    pub fn collect(per_target: Vec<Vec<TaskResult>>) -> Self {
        let results: Vec<TaskResult> = per_target.into_iter().flatten().collect();

        let mut summary = SweepSummary::default();
        for row in &results {
            match row.outcome {
                Outcome::Success => summary.succeeded += 1,
                Outcome::Denied => summary.denied += 1,
                Outcome::Failure => summary.failed += 1,
            }
        }

        Self { results, summary }
    }
}
