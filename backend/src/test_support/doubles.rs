//! Hand-rolled doubles for the outbound ports.
//!
//! Unlike `mockall` mocks these keep state across calls, which the
//! multi-tick worker tests rely on.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{
    BearerTokenProvider, DirectoryError, LimsDatasetSource, LimsError, Notifier, NotifierError,
    OutboundEmail, RecipientDirectory,
};
use crate::domain::{AccessToken, LimsDataset, NotificationKind, ProjectId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Notifier that records every accepted email.
///
/// Addresses registered with [`RecordingNotifier::fail_for`] are rejected
/// until [`RecordingNotifier::recover`] is called.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutboundEmail>>,
    failing: Mutex<BTreeSet<String>>,
    attempts: AtomicUsize,
}

impl RecordingNotifier {
    /// Reject every send to `address`.
    pub fn fail_for(&self, address: &str) {
        lock(&self.failing).insert(address.to_owned());
    }

    /// Accept sends to every address again.
    pub fn recover(&self) {
        lock(&self.failing).clear();
    }

    /// Emails accepted so far, in send order.
    pub fn sent(&self) -> Vec<OutboundEmail> {
        lock(&self.sent).clone()
    }

    /// Accepted emails addressed to `address`.
    pub fn sent_to(&self, address: &str) -> Vec<OutboundEmail> {
        self.sent()
            .into_iter()
            .filter(|email| email.to == address)
            .collect()
    }

    /// Number of send calls, accepted or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, email: &OutboundEmail) -> Result<(), NotifierError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if lock(&self.failing).contains(&email.to) {
            return Err(NotifierError::rejected(format!("mailbox {} unavailable", email.to)));
        }
        lock(&self.sent).push(email.clone());
        Ok(())
    }
}

/// Directory answering from a fixed project map.
///
/// Unknown projects resolve to no recipients.
#[derive(Default)]
pub struct StaticDirectory {
    projects: Mutex<HashMap<ProjectId, Result<Vec<String>, DirectoryError>>>,
    lookups: AtomicUsize,
}

impl StaticDirectory {
    /// Register the members of `project_id`.
    pub fn with_project(self, project_id: &str, addresses: &[&str]) -> Self {
        lock(&self.projects).insert(
            ProjectId::new(project_id),
            Ok(addresses.iter().map(|address| (*address).to_owned()).collect()),
        );
        self
    }

    /// Make lookups for `project_id` fail.
    pub fn with_failure(self, project_id: &str, error: DirectoryError) -> Self {
        lock(&self.projects).insert(ProjectId::new(project_id), Err(error));
        self
    }

    /// Number of lookups served.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecipientDirectory for StaticDirectory {
    async fn project_recipients(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<String>, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        lock(&self.projects)
            .get(project_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Dataset feed replaying queued responses per kind.
///
/// Once a kind's queue is empty it answers with no datasets.
#[derive(Default)]
pub struct ScriptedDatasetSource {
    queued: Mutex<HashMap<NotificationKind, VecDeque<Result<Vec<LimsDataset>, LimsError>>>>,
    calls: Mutex<Vec<(NotificationKind, DateTime<Utc>)>>,
}

impl ScriptedDatasetSource {
    /// Queue the next response for `kind`.
    pub fn push(&self, kind: NotificationKind, response: Result<Vec<LimsDataset>, LimsError>) {
        lock(&self.queued)
            .entry(kind)
            .or_default()
            .push_back(response);
    }

    /// Every `(kind, since)` the feed was queried with.
    pub fn calls(&self) -> Vec<(NotificationKind, DateTime<Utc>)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl LimsDatasetSource for ScriptedDatasetSource {
    async fn list_changed_since(
        &self,
        kind: NotificationKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<LimsDataset>, LimsError> {
        lock(&self.calls).push((kind, since));
        lock(&self.queued)
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Token provider holding a fixed token.
#[derive(Default)]
pub struct StaticTokenProvider {
    token: Mutex<Option<AccessToken>>,
    unauthorized: AtomicUsize,
}

impl StaticTokenProvider {
    /// Provider handing out `token`.
    pub fn new(token: Option<AccessToken>) -> Self {
        Self {
            token: Mutex::new(token),
            unauthorized: AtomicUsize::new(0),
        }
    }

    /// Number of unauthorized reports received.
    pub fn unauthorized_reports(&self) -> usize {
        self.unauthorized.load(Ordering::SeqCst)
    }
}

impl BearerTokenProvider for StaticTokenProvider {
    fn current_token(&self) -> Option<AccessToken> {
        lock(&self.token).clone()
    }

    fn report_unauthorized(&self) {
        self.unauthorized.fetch_add(1, Ordering::SeqCst);
        *lock(&self.token) = None;
    }
}
