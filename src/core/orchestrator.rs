//! Per-target state machine and the two user-facing operations
//!
//! Each target progresses probe → open → enumerate → (filter → dispatch) →
//! report independently; one target failing never blocks another. All
//! fan-out goes through [`WorkerPool`], once across targets and once across
//! a target's delete candidates.

use super::filter::{evaluate, ExclusionSet, FilterDecision};
use super::pool::WorkerPool;
use super::report::{
    InventoryReport, ProfileRow, Subject, SweepReport, TargetListing, TaskResult,
};
use super::session::{Connector, ProfileRecord, ProfileSession, Reachability, Target};
use crate::utils::{is_transient_error, retry_with_backoff, PreconditionError, RetryConfig};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

/// Capability check that must pass before any orchestration begins
///
/// The platform provides a PowerShell availability check; tests provide
/// stubs. Failure here is the only fatal, run-aborting condition.
pub trait PrerequisiteCheck: Send + Sync {
    fn verify(&self) -> Result<(), PreconditionError>;
}

/// Which profiles a sweep acts on
#[derive(Debug, Clone)]
pub enum Selection {
    /// Explicitly named usernames. The exclusion set does not apply here;
    /// naming a user is an instruction, not a pattern match. Loaded and
    /// existence checks still do.
    Named(Vec<String>),
    /// Every deletable profile on the target, minus the exclusions.
    All { exclusions: ExclusionSet },
}

/// Composes probe, session, registry, policy, pool and aggregation into the
/// enumerate and sweep operations
pub struct Orchestrator {
    connector: Arc<dyn Connector>,
    pool: WorkerPool,
    retry: RetryConfig,
}

impl Orchestrator {
    /// Construct the engine, running the prerequisite check exactly once.
    pub fn new(
        connector: Arc<dyn Connector>,
        pool: WorkerPool,
        prerequisite: &dyn PrerequisiteCheck,
    ) -> Result<Self, PreconditionError> {
        prerequisite.verify()?;
        Ok(Self {
            connector,
            pool,
            retry: RetryConfig::default(),
        })
    }

    /// Inventory profiles on every target, in parallel.
    ///
    /// Excluded usernames are omitted from the rows. Per-target failures
    /// become that target's note; other targets are unaffected.
    pub async fn enumerate(
        &self,
        targets: &[Target],
        exclusions: &ExclusionSet,
    ) -> InventoryReport {
        let tasks: Vec<_> = targets
            .iter()
            .cloned()
            .map(|target| {
                let connector = Arc::clone(&self.connector);
                let retry = self.retry.clone();
                let exclusions = exclusions.clone();
                move || async move { enumerate_target(connector, retry, target, exclusions).await }
            })
            .collect();

        let submitted: Vec<Target> = targets.to_vec();
        let listings = self
            .pool
            .dispatch(tasks, |index| aborted_listing(&submitted[index]))
            .await;

        tracing::info!(
            targets = targets.len(),
            profiles = listings.iter().map(|l| l.profiles.len()).sum::<usize>(),
            "enumeration complete"
        );
        InventoryReport { listings }
    }

    /// Delete the selected profiles on every target, in parallel.
    ///
    /// Every candidate contributes exactly one row: a policy denial, a
    /// removal success, or a failure. Rows are grouped per target in
    /// submission order.
    pub async fn sweep(&self, targets: &[Target], selection: &Selection) -> SweepReport {
        let tasks: Vec<_> = targets
            .iter()
            .cloned()
            .map(|target| {
                let connector = Arc::clone(&self.connector);
                let pool = self.pool;
                let retry = self.retry.clone();
                let selection = selection.clone();
                move || async move { sweep_target(connector, pool, retry, target, selection).await }
            })
            .collect();

        let submitted: Vec<Target> = targets.to_vec();
        let per_target = self
            .pool
            .dispatch(tasks, |index| {
                vec![TaskResult::failure(
                    submitted[index].clone(),
                    Subject::Enumerate,
                    "worker aborted",
                )]
            })
            .await;

        let report = SweepReport::collect(per_target);
        tracing::info!(summary = %report.summary, "sweep complete");
        report
    }
}

fn aborted_listing(target: &Target) -> TargetListing {
    TargetListing {
        target: target.clone(),
        profiles: Vec::new(),
        note: Some(TaskResult::failure(
            target.clone(),
            Subject::Enumerate,
            "worker aborted",
        )),
    }
}

/// Probe, open and enumerate one target. On success the session is returned
/// alive so sweeps can reuse it for deletes; enumeration drops it, which
/// releases the underlying transport.
async fn acquire_profiles(
    connector: &Arc<dyn Connector>,
    retry: &RetryConfig,
    target: &Target,
) -> Result<(Arc<dyn ProfileSession>, Vec<ProfileRecord>), TaskResult> {
    // Local runs skip the network probe; there is no wire to be down.
    if !target.is_local() {
        match connector.probe(target).await {
            Reachability::Reachable => {
                tracing::debug!(target = %target, "probe: reachable");
            }
            Reachability::Unreachable(reason) => {
                tracing::warn!(target = %target, %reason, "probe: unreachable");
                return Err(TaskResult::failure(
                    target.clone(),
                    Subject::Enumerate,
                    format!("connection failed: {}", reason),
                ));
            }
        }
    }

    let session = retry_with_backoff(
        retry.clone(),
        || connector.open(target),
        |err| is_transient_error(&err.to_string()),
    )
    .await
    .map_err(|err| {
        tracing::warn!(target = %target, error = %err, "session open failed");
        TaskResult::failure(
            target.clone(),
            Subject::Enumerate,
            format!("session open failed: {}", err),
        )
    })?;
    let session: Arc<dyn ProfileSession> = Arc::from(session);
    tracing::debug!(target = %target, "session opened");

    let mut profiles = retry_with_backoff(
        retry.clone(),
        || session.list_profiles(),
        |err| is_transient_error(&err.to_string()),
    )
    .await
    .map_err(|err| {
        tracing::warn!(target = %target, error = %err, "profile query failed");
        TaskResult::failure(
            target.clone(),
            Subject::Enumerate,
            format!("profile query failed: {}", err),
        )
    })?;

    // Session implementations claim to pre-filter special profiles; enforce
    // it anyway. A system account must never reach the policy or a caller.
    profiles.retain(|record| !record.special);
    super::session::sort_most_recent_first(&mut profiles);
    tracing::debug!(target = %target, count = profiles.len(), "profiles enumerated");

    Ok((session, profiles))
}

async fn enumerate_target(
    connector: Arc<dyn Connector>,
    retry: RetryConfig,
    target: Target,
    exclusions: ExclusionSet,
) -> TargetListing {
    let profiles = match acquire_profiles(&connector, &retry, &target).await {
        Ok((_session, profiles)) => profiles,
        Err(note) => {
            return TargetListing {
                target,
                profiles: Vec::new(),
                note: Some(note),
            }
        }
    };

    let now = Utc::now();
    let rows: Vec<ProfileRow> = profiles
        .iter()
        .filter(|record| !exclusions.contains(&record.user_name))
        .map(|record| ProfileRow::from_record(record, now))
        .collect();

    let note = if rows.is_empty() {
        Some(TaskResult::success(
            target.clone(),
            Subject::Enumerate,
            format!("no profiles found on {}", target),
        ))
    } else {
        None
    };

    TargetListing {
        target,
        profiles: rows,
        note,
    }
}

async fn sweep_target(
    connector: Arc<dyn Connector>,
    pool: WorkerPool,
    retry: RetryConfig,
    target: Target,
    selection: Selection,
) -> Vec<TaskResult> {
    let (session, profiles) = match acquire_profiles(&connector, &retry, &target).await {
        Ok(acquired) => acquired,
        Err(note) => return vec![note],
    };

    let (candidates, exclusions) = match selection {
        Selection::All { exclusions } => {
            if profiles.is_empty() {
                return vec![TaskResult::success(
                    target.clone(),
                    Subject::Enumerate,
                    format!("no profiles found on {}", target),
                )];
            }
            let names: Vec<String> = profiles
                .iter()
                .map(|record| record.user_name.clone())
                .collect();
            (names, exclusions)
        }
        Selection::Named(names) => (names, ExclusionSet::empty()),
    };
    // One candidate per distinct username, wherever the duplicate came from:
    // a second profile volume in the listing, or a repeated (or case-variant)
    // name in an explicit request. One username, one delete task.
    let mut seen = HashSet::new();
    let candidates: Vec<String> = candidates
        .into_iter()
        .filter(|name| seen.insert(name.to_lowercase()))
        .collect();
    tracing::debug!(target = %target, candidates = candidates.len(), "sweep candidates selected");

    // Evaluate every candidate up front; denials become rows immediately,
    // permits become delete tasks. Slots keep the candidate order stable in
    // the final report regardless of delete completion order.
    let mut rows: Vec<Option<TaskResult>> = Vec::with_capacity(candidates.len());
    let mut delete_tasks = Vec::new();
    let mut pending_slots = Vec::new();
    let mut pending_names = Vec::new();

    for name in candidates {
        match evaluate(&name, &profiles, &exclusions) {
            FilterDecision::Denied(reason) => {
                tracing::debug!(target = %target, user = %name, %reason, "delete denied");
                rows.push(Some(TaskResult::denied(
                    target.clone(),
                    Subject::Profile(name),
                    reason.to_string(),
                )));
            }
            FilterDecision::Permitted(record) => {
                pending_slots.push(rows.len());
                pending_names.push(name);
                rows.push(None);
                let session = Arc::clone(&session);
                let target = target.clone();
                delete_tasks.push(move || async move { delete_one(session, target, record).await });
            }
        }
    }

    let results = pool
        .dispatch(delete_tasks, |index| {
            TaskResult::failure(
                target.clone(),
                Subject::Profile(pending_names[index].clone()),
                "delete worker aborted",
            )
        })
        .await;
    for (slot, result) in pending_slots.into_iter().zip(results) {
        rows[slot] = Some(result);
    }

    rows.into_iter().flatten().collect()
}

async fn delete_one(
    session: Arc<dyn ProfileSession>,
    target: Target,
    record: ProfileRecord,
) -> TaskResult {
    let name = record.user_name.clone();
    // Deletes are never retried: a timed-out delete may have completed
    // remotely, and a second attempt would run against a half-removed hive.
    match session.delete_profile(&record).await {
        Ok(()) => {
            tracing::debug!(target = %target, user = %name, "profile removed");
            TaskResult::success(
                target,
                Subject::Profile(name),
                format!("removed {}", record.local_path),
            )
        }
        Err(err) => {
            tracing::warn!(target = %target, user = %name, error = %err, "profile removal failed");
            TaskResult::failure(target, Subject::Profile(name), format!("removal failed: {}", err))
        }
    }
}
