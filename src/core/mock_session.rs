//! Mock transport for exercising the orchestrator without real hosts
//!
//! Hosts are scripted up front: profiles to return, failures to inject at
//! the probe/open/list/delete stages, and an optional per-delete delay for
//! concurrency tests. Shared accounting records what the engine actually
//! did: probes, open attempts, sessions opened and released, deletions and
//! the delete-in-flight high-water mark.

use super::session::{Connector, ProfileRecord, ProfileSession, Reachability, Target};
use crate::utils::{RegistryError, SessionError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Observed engine behavior, shared across all sessions of one connector
#[derive(Debug, Default)]
pub struct MockAccounting {
    pub probes: AtomicUsize,
    pub open_attempts: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub delete_in_flight: AtomicUsize,
    pub delete_high_water: AtomicUsize,
    /// (target, username) pairs in completion order
    pub deleted: Mutex<Vec<(String, String)>>,
}

#[derive(Debug, Clone, Default)]
struct HostScript {
    unreachable: Option<String>,
    open_failure: Option<String>,
    list_failure: Option<String>,
    profiles: Vec<ProfileRecord>,
    delete_failures: HashMap<String, String>,
    delete_delay: Option<Duration>,
}

/// Scripted [`Connector`] implementation
#[derive(Debug, Default)]
pub struct MockConnector {
    hosts: Mutex<HashMap<String, HostScript>>,
    accounting: Arc<MockAccounting>,
}

/// Build an unloaded-or-loaded, non-special record for tests.
pub fn profile(target: &Target, user: &str, loaded: bool) -> ProfileRecord {
    ProfileRecord {
        target: target.clone(),
        user_name: user.to_string(),
        local_path: format!("C:\\Users\\{}", user),
        last_use_time: None,
        loaded,
        special: false,
        sid: Some(format!("S-1-5-21-1111-2222-3333-{}", user.len())),
    }
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accounting(&self) -> Arc<MockAccounting> {
        Arc::clone(&self.accounting)
    }

    fn script<F: FnOnce(&mut HostScript)>(self, host: &str, configure: F) -> Self {
        {
            let mut hosts = self.hosts.lock().unwrap();
            configure(hosts.entry(host.to_string()).or_default());
        }
        self
    }

    /// Serve these profiles from `host`. Keys match `Target::as_str()`, so
    /// remote names are the canonical uppercase form.
    pub fn with_profiles(self, host: &str, profiles: Vec<ProfileRecord>) -> Self {
        self.script(host, |s| s.profiles = profiles)
    }

    pub fn unreachable(self, host: &str, reason: &str) -> Self {
        let reason = reason.to_string();
        self.script(host, |s| s.unreachable = Some(reason))
    }

    pub fn open_fails(self, host: &str, reason: &str) -> Self {
        let reason = reason.to_string();
        self.script(host, |s| s.open_failure = Some(reason))
    }

    pub fn list_fails(self, host: &str, reason: &str) -> Self {
        let reason = reason.to_string();
        self.script(host, |s| s.list_failure = Some(reason))
    }

    pub fn delete_fails(self, host: &str, user: &str, reason: &str) -> Self {
        let user = user.to_lowercase();
        let reason = reason.to_string();
        self.script(host, |s| {
            s.delete_failures.insert(user, reason);
        })
    }

    pub fn delete_delay(self, host: &str, delay: Duration) -> Self {
        self.script(host, |s| s.delete_delay = Some(delay))
    }

    fn script_for(&self, target: &Target) -> HostScript {
        self.hosts
            .lock()
            .unwrap()
            .get(target.as_str())
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn probe(&self, target: &Target) -> Reachability {
        self.accounting.probes.fetch_add(1, Ordering::SeqCst);
        match self.script_for(target).unreachable {
            Some(reason) => Reachability::Unreachable(reason),
            None => Reachability::Reachable,
        }
    }

    async fn open(&self, target: &Target) -> Result<Box<dyn ProfileSession>, SessionError> {
        self.accounting.open_attempts.fetch_add(1, Ordering::SeqCst);
        let script = self.script_for(target);
        if let Some(reason) = script.open_failure {
            return Err(SessionError::Connection(reason));
        }
        self.accounting.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            target: target.clone(),
            script,
            accounting: Arc::clone(&self.accounting),
        }))
    }
}

struct MockSession {
    target: Target,
    script: HostScript,
    accounting: Arc<MockAccounting>,
}

#[async_trait::async_trait]
impl ProfileSession for MockSession {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn list_profiles(&self) -> Result<Vec<ProfileRecord>, RegistryError> {
        if let Some(reason) = &self.script.list_failure {
            return Err(RegistryError::Query(reason.clone()));
        }
        Ok(self.script.profiles.clone())
    }

    async fn delete_profile(&self, record: &ProfileRecord) -> Result<(), RegistryError> {
        let current = self.accounting.delete_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.accounting
            .delete_high_water
            .fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.script.delete_delay {
            tokio::time::sleep(delay).await;
        }
        self.accounting.delete_in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(reason) = self.script.delete_failures.get(&record.user_name.to_lowercase()) {
            return Err(RegistryError::Delete(reason.clone()));
        }

        self.accounting
            .deleted
            .lock()
            .unwrap()
            .push((self.target.as_str().to_string(), record.user_name.clone()));
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.accounting.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str) -> Target {
        Target::parse(name).expect("valid host")
    }

    #[tokio::test]
    async fn unscripted_host_is_reachable_and_empty() {
        let connector = MockConnector::new();
        let target = host("fs01");

        assert_eq!(connector.probe(&target).await, Reachability::Reachable);
        let session = connector.open(&target).await.expect("open succeeds");
        assert!(session.list_profiles().await.expect("list succeeds").is_empty());
    }

    #[tokio::test]
    async fn scripted_unreachable_host_reports_reason() {
        let connector = MockConnector::new().unreachable("FS02", "no route to host");
        match connector.probe(&host("fs02")).await {
            Reachability::Unreachable(reason) => assert_eq!(reason, "no route to host"),
            other => panic!("expected unreachable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dropping_a_session_counts_as_release() {
        let connector = MockConnector::new();
        let accounting = connector.accounting();

        let session = connector.open(&host("fs01")).await.expect("open succeeds");
        assert_eq!(accounting.opened.load(Ordering::SeqCst), 1);
        assert_eq!(accounting.closed.load(Ordering::SeqCst), 0);

        drop(session);
        assert_eq!(accounting.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn scripted_delete_failure_matches_case_insensitively() {
        let target = host("fs01");
        let connector = MockConnector::new()
            .with_profiles("FS01", vec![profile(&target, "Alice", false)])
            .delete_fails("FS01", "ALICE", "Access is denied");

        let session = connector.open(&target).await.expect("open succeeds");
        let record = profile(&target, "Alice", false);
        let err = session.delete_profile(&record).await.expect_err("scripted failure");
        assert!(err.to_string().contains("Access is denied"));
        assert!(connector.accounting().deleted.lock().unwrap().is_empty());
    }
}
