//! Test doubles for the directory and acceptor ports.
//!
//! Used by this crate's tests and by hosts exercising the realm without a
//! directory server or KDC.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kerberos_realm_sdk::{DirectoryClient, DirectoryEntry, DirectoryError, NegotiationError};
use parking_lot::Mutex;

use crate::domain::negotiation::{AcceptStep, AcceptorMechanism, SecurityContext};

/// Directory double keyed by lowercased DN or account name.
#[derive(Default)]
pub struct InMemoryDirectory {
    entries: HashMap<String, DirectoryEntry>,
    nested: HashMap<String, Vec<String>>,
    user_groups: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    latency: Option<Duration>,
    member_group_queries: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_group(mut self, dn: &str) -> Self {
        self.entries.insert(
            dn.to_lowercase(),
            DirectoryEntry {
                distinguished_name: dn.to_owned(),
                object_class: vec!["top".to_owned(), "group".to_owned()],
                object_sid: Some(sample_sid()),
                ..DirectoryEntry::default()
            },
        );
        self
    }

    #[must_use]
    pub fn with_user(mut self, dn: &str, user_principal_name: &str) -> Self {
        self.entries.insert(
            dn.to_lowercase(),
            DirectoryEntry {
                distinguished_name: dn.to_owned(),
                object_class: vec![
                    "top".to_owned(),
                    "person".to_owned(),
                    "organizationalPerson".to_owned(),
                    "user".to_owned(),
                ],
                user_principal_name: Some(user_principal_name.to_owned()),
                ..DirectoryEntry::default()
            },
        );
        self
    }

    /// `children` are the groups whose `memberOf` includes `group`.
    #[must_use]
    pub fn with_nested(mut self, group: &str, children: &[&str]) -> Self {
        self.nested.insert(
            group.to_lowercase(),
            children.iter().map(|c| (*c).to_owned()).collect(),
        );
        self
    }

    #[must_use]
    pub fn with_user_groups(mut self, account: &str, groups: &[&str]) -> Self {
        self.user_groups.insert(
            account.to_lowercase(),
            groups.iter().map(|g| g.to_lowercase()).collect(),
        );
        self
    }

    #[must_use]
    pub fn failing_on(mut self, key: &str) -> Self {
        self.failing.insert(key.to_lowercase());
        self
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    #[must_use]
    pub fn member_group_queries(&self) -> usize {
        self.member_group_queries.load(Ordering::SeqCst)
    }

    /// Member group queries currently awaiting their answer.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn check(&self, key: &str) -> Result<(), DirectoryError> {
        if self.failing.contains(&key.to_lowercase()) {
            return Err(DirectoryError::Query(format!("injected failure for {key}")));
        }
        Ok(())
    }

    /// Count a query as in flight until the returned guard drops, including
    /// when the query future is abandoned mid-sleep.
    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DirectoryClient for InMemoryDirectory {
    async fn object_attributes(&self, dn: &str) -> Result<Option<DirectoryEntry>, DirectoryError> {
        self.check(dn)?;
        Ok(self.entries.get(&dn.to_lowercase()).cloned())
    }

    async fn member_groups(&self, group_dn: &str) -> Result<Vec<String>, DirectoryError> {
        self.member_group_queries.fetch_add(1, Ordering::SeqCst);
        let _in_flight = self.enter().await;
        self.check(group_dn)
            .map(|()| self.nested.get(&group_dn.to_lowercase()).cloned().unwrap_or_default())
    }

    async fn user_groups(&self, account: &str) -> Result<Vec<String>, DirectoryError> {
        self.check(account)?;
        Ok(self
            .user_groups
            .get(&account.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn is_member_transitive(
        &self,
        group_dn: &str,
        account: &str,
    ) -> Result<bool, DirectoryError> {
        self.check(account)?;
        let direct: HashSet<String> = self
            .user_groups
            .get(&account.to_lowercase())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([group_dn.to_lowercase()]);
        while let Some(group) = queue.pop_front() {
            if direct.contains(&group) {
                return Ok(true);
            }
            if !seen.insert(group.clone()) {
                continue;
            }
            for child in self.nested.get(&group).into_iter().flatten() {
                queue.push_back(child.to_lowercase());
            }
        }
        Ok(false)
    }
}

/// `S-1-5-21-1004336348-1177238915-682003330-512`
#[must_use]
pub fn sample_sid() -> Vec<u8> {
    let mut sid = vec![1, 5, 0, 0, 0, 0, 0, 5];
    for sub in [21_u32, 1_004_336_348, 1_177_238_915, 682_003_330, 512] {
        sid.extend_from_slice(&sub.to_le_bytes());
    }
    sid
}

/// What every context opened by a [`ScriptedMechanism`] answers.
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    Continue(Vec<u8>),
    Established {
        name: Option<String>,
        out_token: Option<Vec<u8>>,
    },
    Reject(NegotiationError),
}

/// Acceptor double that records tokens and disposals.
pub struct ScriptedMechanism {
    step: Option<ScriptedStep>,
    fail_dispose: bool,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    disposed: Arc<AtomicUsize>,
}

impl ScriptedMechanism {
    #[must_use]
    pub fn new(step: ScriptedStep) -> Self {
        Self {
            step: Some(step),
            fail_dispose: false,
            received: Arc::default(),
            disposed: Arc::default(),
        }
    }

    #[must_use]
    pub fn failing_credentials() -> Self {
        Self {
            step: None,
            ..Self::new(ScriptedStep::Continue(Vec::new()))
        }
    }

    #[must_use]
    pub fn with_failing_dispose(mut self) -> Self {
        self.fail_dispose = true;
        self
    }

    #[must_use]
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().clone()
    }

    #[must_use]
    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl AcceptorMechanism for ScriptedMechanism {
    fn open_context(&self) -> Result<Box<dyn SecurityContext>, NegotiationError> {
        let step = self
            .step
            .clone()
            .ok_or_else(|| NegotiationError::CredentialFailure("keytab rejected".to_owned()))?;
        Ok(Box::new(ScriptedContext {
            step,
            established: false,
            fail_dispose: self.fail_dispose,
            received: Arc::clone(&self.received),
            disposed: Arc::clone(&self.disposed),
        }))
    }
}

struct ScriptedContext {
    step: ScriptedStep,
    established: bool,
    fail_dispose: bool,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    disposed: Arc<AtomicUsize>,
}

impl SecurityContext for ScriptedContext {
    fn accept(&mut self, token: &[u8]) -> Result<AcceptStep, NegotiationError> {
        self.received.lock().push(token.to_vec());
        match &self.step {
            ScriptedStep::Continue(out) => Ok(AcceptStep::Continue(out.clone())),
            ScriptedStep::Established { out_token, .. } => {
                self.established = true;
                Ok(AcceptStep::Established(out_token.clone()))
            }
            ScriptedStep::Reject(e) => Err(e.clone()),
        }
    }

    fn source_name(&mut self) -> Result<Option<String>, NegotiationError> {
        match &self.step {
            ScriptedStep::Established { name, .. } if self.established => Ok(name.clone()),
            _ => Ok(None),
        }
    }

    fn dispose(&mut self) -> Result<(), NegotiationError> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        if self.fail_dispose {
            return Err(NegotiationError::TokenFailure("dispose failed".to_owned()));
        }
        Ok(())
    }
}
