//! Fan-out of rendered emails to project members or fixed address lists.
//!
//! Every recipient gets an individual message; sends run concurrently and
//! each outcome is reported separately so callers can decide whether a
//! delivery counts as complete.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{error, info, warn};

use crate::domain::ports::{Notifier, OutboundEmail, RecipientDirectory};
use crate::domain::{
    Contact, Credential, DownloadRequest, LimsDataset, NotificationKind, ProjectId, StatusNotice,
};

mod messages;

pub use messages::{Message, MessageSettings, MessageTemplates};

/// Who a message goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientGroup {
    /// Every member of a project, resolved through the user directory.
    Project(ProjectId),
    /// A fixed list of addresses.
    Addresses(Vec<String>),
}

/// Per-recipient outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Addresses the transport accepted.
    pub delivered: Vec<String>,
    /// Addresses the transport refused or could not reach.
    pub failed: Vec<String>,
    /// Set when the recipient list itself could not be resolved.
    pub unresolved: bool,
}

impl BroadcastReport {
    /// True when recipients resolved and no individual send failed.
    pub fn is_complete(&self) -> bool {
        !self.unresolved && self.failed.is_empty()
    }
}

/// Sends templated emails through the [`Notifier`] port.
pub struct ContactBroadcaster {
    directory: Arc<dyn RecipientDirectory>,
    notifier: Arc<dyn Notifier>,
    templates: MessageTemplates,
    error_monitoring_email: Option<String>,
}

impl ContactBroadcaster {
    /// Build a broadcaster.
    ///
    /// `error_monitoring_email` receives an alert whenever a project's
    /// recipients cannot be resolved.
    pub fn new(
        directory: Arc<dyn RecipientDirectory>,
        notifier: Arc<dyn Notifier>,
        templates: MessageTemplates,
        error_monitoring_email: Option<String>,
    ) -> Self {
        Self {
            directory,
            notifier,
            templates,
            error_monitoring_email,
        }
    }

    /// Templates used for every message kind.
    pub fn templates(&self) -> &MessageTemplates {
        &self.templates
    }

    /// Send `message` to every address in `recipients`.
    ///
    /// An empty fixed address list is a configuration fault and reports as
    /// unresolved, so callers hold the item instead of dropping it.
    pub async fn broadcast(
        &self,
        recipients: &RecipientGroup,
        message: &Message,
    ) -> BroadcastReport {
        let addresses = match recipients {
            RecipientGroup::Addresses(addresses) if addresses.is_empty() => {
                error!(subject = %message.subject, "no fixed recipients configured");
                return BroadcastReport {
                    unresolved: true,
                    ..BroadcastReport::default()
                };
            }
            RecipientGroup::Addresses(addresses) => addresses.clone(),
            RecipientGroup::Project(project_id) => match self.resolve(project_id).await {
                Some(addresses) => addresses,
                None => {
                    return BroadcastReport {
                        unresolved: true,
                        ..BroadcastReport::default()
                    };
                }
            },
        };
        self.send_all(addresses, message).await
    }

    /// Deliver a credential to the contact's project members.
    pub async fn send_credential(
        &self,
        contact: &Contact,
        credential: &Credential,
    ) -> BroadcastReport {
        let message = self.templates.credential(contact, credential);
        let report = self
            .broadcast(&RecipientGroup::Project(contact.project_id.clone()), &message)
            .await;
        info!(
            project_id = %contact.project_id,
            contact_type = %contact.contact_type,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "credential broadcast finished"
        );
        report
    }

    /// Tell the request's project members that staging succeeded or failed.
    pub async fn send_status_notice(
        &self,
        request: &DownloadRequest,
        notice: StatusNotice,
    ) -> BroadcastReport {
        let message = self.templates.status_notice(request, notice);
        self.broadcast(&RecipientGroup::Project(request.project_id.clone()), &message)
            .await
    }

    /// Announce a dataset change from a LIMS feed.
    ///
    /// Released datasets go to the project members and are skipped when no
    /// readset has been released. Validated datasets go to `validation_recipients`.
    pub async fn send_dataset_notice(
        &self,
        kind: NotificationKind,
        dataset: &LimsDataset,
        validation_recipients: &[String],
    ) -> BroadcastReport {
        match kind {
            NotificationKind::Released => {
                if dataset.released_status_count <= 0 {
                    info!(
                        dataset_id = dataset.id,
                        "no released readsets; release notice skipped"
                    );
                    return BroadcastReport::default();
                }
                let message = self.templates.release(dataset);
                self.broadcast(&RecipientGroup::Project(dataset.project_id.clone()), &message)
                    .await
            }
            NotificationKind::Validated => {
                let message = self.templates.validation(dataset);
                self.broadcast(
                    &RecipientGroup::Addresses(validation_recipients.to_vec()),
                    &message,
                )
                .await
            }
        }
    }

    async fn resolve(&self, project_id: &ProjectId) -> Option<Vec<String>> {
        match self.directory.project_recipients(project_id).await {
            Ok(addresses) => {
                if addresses.is_empty() {
                    warn!(%project_id, "project has no recipients");
                }
                Some(addresses)
            }
            Err(err) => {
                error!(%project_id, error = %err, "could not resolve project recipients");
                self.alert(project_id, &err.to_string()).await;
                None
            }
        }
    }

    async fn alert(&self, project_id: &ProjectId, cause: &str) {
        let Some(address) = self.error_monitoring_email.as_ref() else {
            return;
        };
        let message = self.templates.directory_alert(project_id, cause);
        let report = self.send_all(vec![address.clone()], &message).await;
        if !report.is_complete() {
            warn!(%project_id, "directory failure alert could not be delivered");
        }
    }

    async fn send_all(&self, addresses: Vec<String>, message: &Message) -> BroadcastReport {
        let sends = addresses.into_iter().map(|to| async move {
            let email = OutboundEmail {
                to,
                subject: message.subject.clone(),
                html_body: message.html_body.clone(),
            };
            let outcome = self.notifier.send(&email).await;
            (email.to, outcome)
        });

        let mut report = BroadcastReport::default();
        for (to, outcome) in join_all(sends).await {
            match outcome {
                Ok(()) => report.delivered.push(to),
                Err(err) => {
                    warn!(recipient = %to, error = %err, "email delivery failed");
                    report.failed.push(to);
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests;
