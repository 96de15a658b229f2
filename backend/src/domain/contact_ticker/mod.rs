//! Periodic delivery of credentials and staging outcome notices.
//!
//! A tick runs three independent steps: flag cancelled successful requests
//! for deletion, deliver ready credentials, then announce staging outcomes.
//! A failing step or item is logged and the tick moves on.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::domain::scheduling::PeriodicJob;
use crate::domain::{ContactBroadcaster, RequestLifecycleService};

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Cancelled requests newly flagged for deletion.
    pub cancelled_flagged: u64,
    /// Contacts delivered and removed.
    pub credentials_delivered: usize,
    /// Contacts left for the next tick.
    pub credentials_pending: usize,
    /// Outcome notices delivered and stamped.
    pub notices_sent: usize,
    /// Outcome notices left for the next tick.
    pub notices_pending: usize,
}

/// Job draining the contact queue and the owed outcome notices.
pub struct ContactTickerJob {
    service: Arc<RequestLifecycleService>,
    broadcaster: Arc<ContactBroadcaster>,
}

impl ContactTickerJob {
    /// Job over the given service and broadcaster.
    pub fn new(
        service: Arc<RequestLifecycleService>,
        broadcaster: Arc<ContactBroadcaster>,
    ) -> Self {
        Self {
            service,
            broadcaster,
        }
    }

    /// Run every step once.
    pub async fn tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        match self.service.reconcile_cancelled().await {
            Ok(flagged) => summary.cancelled_flagged = flagged,
            Err(err) => error!(error = %err, "cancelled request reconciliation failed"),
        }

        self.deliver_credentials(&mut summary).await;
        self.announce_outcomes(&mut summary).await;
        summary
    }

    async fn deliver_credentials(&self, summary: &mut TickSummary) {
        let contacts = match self.service.ready_contacts().await {
            Ok(contacts) => contacts,
            Err(err) => {
                error!(error = %err, "could not list ready contacts");
                return;
            }
        };

        for contact in contacts {
            let Some(credential) = contact.ready_credential().cloned() else {
                continue;
            };
            let report = self.broadcaster.send_credential(&contact, &credential).await;
            if !report.is_complete() {
                warn!(
                    project_id = %contact.project_id,
                    contact_type = %contact.contact_type,
                    "credential delivery incomplete; contact kept"
                );
                summary.credentials_pending += 1;
                continue;
            }
            match self.service.acknowledge_contact(&contact, &credential).await {
                Ok(true) => summary.credentials_delivered += 1,
                Ok(false) => {
                    info!(
                        project_id = %contact.project_id,
                        contact_type = %contact.contact_type,
                        "contact reset during delivery; kept for the new credential"
                    );
                    summary.credentials_pending += 1;
                }
                Err(err) => {
                    error!(
                        project_id = %contact.project_id,
                        error = %err,
                        "could not remove delivered contact"
                    );
                    summary.credentials_pending += 1;
                }
            }
        }
    }

    async fn announce_outcomes(&self, summary: &mut TickSummary) {
        let owed = match self.service.pending_notices().await {
            Ok(owed) => owed,
            Err(err) => {
                error!(error = %err, "could not list owed staging notices");
                return;
            }
        };

        for (request, notice) in owed {
            let report = self.broadcaster.send_status_notice(&request, notice).await;
            if !report.is_complete() {
                warn!(
                    dataset_id = %request.dataset_id,
                    transfer_type = %request.transfer_type,
                    ?notice,
                    "staging notice incomplete; will retry"
                );
                summary.notices_pending += 1;
                continue;
            }
            match self.service.record_notification(&request).await {
                Ok(()) => summary.notices_sent += 1,
                Err(err) => {
                    error!(
                        dataset_id = %request.dataset_id,
                        error = %err,
                        "could not stamp notification"
                    );
                    summary.notices_pending += 1;
                }
            }
        }
    }
}

#[async_trait]
impl PeriodicJob for ContactTickerJob {
    fn name(&self) -> &'static str {
        "contact-ticker"
    }

    async fn run_tick(&self) {
        let summary = self.tick().await;
        if summary == TickSummary::default() {
            debug!("contact ticker idle");
        } else {
            info!(
                cancelled_flagged = summary.cancelled_flagged,
                credentials_delivered = summary.credentials_delivered,
                credentials_pending = summary.credentials_pending,
                notices_sent = summary.notices_sent,
                notices_pending = summary.notices_pending,
                "contact ticker finished"
            );
        }
    }
}
