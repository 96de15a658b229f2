//! Incremental release and validation notices driven by stored watermarks.
//!
//! Each tick reads the watermark for its feed, asks the LIMS for every
//! dataset changed strictly after it, and announces the changes oldest
//! first. Datasets sharing a change timestamp form one group; the watermark
//! only moves past a group once every email for every dataset in it was
//! accepted. The first failing dataset ends the tick, so the next tick
//! starts again from the last complete group and may resend part of it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::{debug, error, info, warn};

use crate::domain::ports::{LimsDatasetSource, NotificationWatermarkRepository};
use crate::domain::scheduling::PeriodicJob;
use crate::domain::{
    ContactBroadcaster, LimsDataset, NotificationKind, StagingError, StagingResult,
};

/// What a single sync tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No watermark existed; it was initialised to the current time.
    Seeded {
        /// The stored starting point.
        at: DateTime<Utc>,
    },
    /// Nothing changed after the watermark.
    UpToDate,
    /// Changes were announced.
    Processed {
        /// Datasets whose notices were fully delivered.
        delivered: usize,
        /// New watermark, when at least one group completed.
        advanced_to: Option<DateTime<Utc>>,
        /// False when a delivery failed and the tick stopped early.
        complete: bool,
    },
}

/// Collaborators shared by both feeds.
#[derive(Clone)]
pub struct NotificationSyncPorts {
    /// Stored watermarks.
    pub watermarks: Arc<dyn NotificationWatermarkRepository>,
    /// LIMS change feed.
    pub source: Arc<dyn LimsDatasetSource>,
    /// Email fan-out.
    pub broadcaster: Arc<ContactBroadcaster>,
    /// Time source used to seed missing watermarks.
    pub clock: Arc<dyn Clock>,
}

/// Periodic job keeping one feed's notices up to date.
pub struct NotificationSyncJob {
    kind: NotificationKind,
    ports: NotificationSyncPorts,
    validation_recipients: Vec<String>,
}

impl NotificationSyncJob {
    /// Job announcing released datasets to their project members.
    pub fn released(ports: NotificationSyncPorts) -> Self {
        Self {
            kind: NotificationKind::Released,
            ports,
            validation_recipients: Vec::new(),
        }
    }

    /// Job announcing validation changes to `recipients`.
    pub fn validated(ports: NotificationSyncPorts, recipients: Vec<String>) -> Self {
        Self {
            kind: NotificationKind::Validated,
            ports,
            validation_recipients: recipients,
        }
    }

    /// Feed handled by this job.
    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    /// Run one sync pass.
    ///
    /// # Errors
    /// - `InternalError` when watermarks cannot be read or stored.
    /// - `AuthFailure` or `UpstreamUnavailable` when the LIMS feed fails.
    pub async fn sync_once(&self) -> StagingResult<SyncOutcome> {
        let watermarks = self
            .ports
            .watermarks
            .load()
            .await
            .map_err(|err| watermark_error(&err))?;

        let Some(since) = watermarks.get(self.kind) else {
            let at = self.ports.clock.utc();
            self.store(at).await?;
            info!(kind = %self.kind, %at, "notification watermark initialised");
            return Ok(SyncOutcome::Seeded { at });
        };

        let changed = self
            .ports
            .source
            .list_changed_since(self.kind, since)
            .await
            .map_err(StagingError::from)?;
        let batch = order_after(self.kind, changed, since);
        if batch.is_empty() {
            debug!(kind = %self.kind, %since, "no dataset changes");
            return Ok(SyncOutcome::UpToDate);
        }

        let (delivered, advanced_to, complete) = self.announce(&batch).await;
        if let Some(at) = advanced_to {
            self.store(at).await?;
        }
        Ok(SyncOutcome::Processed {
            delivered,
            advanced_to,
            complete,
        })
    }

    /// Announce `batch` in order, returning the delivered count, the last
    /// fully delivered timestamp, and whether every dataset was delivered.
    async fn announce(
        &self,
        batch: &[(DateTime<Utc>, LimsDataset)],
    ) -> (usize, Option<DateTime<Utc>>, bool) {
        let mut delivered = 0;
        let mut safe_until = None;

        for (index, (changed_at, dataset)) in batch.iter().enumerate() {
            let report = self
                .ports
                .broadcaster
                .send_dataset_notice(self.kind, dataset, &self.validation_recipients)
                .await;
            if !report.is_complete() {
                warn!(
                    kind = %self.kind,
                    dataset_id = dataset.id,
                    %changed_at,
                    failed = report.failed.len(),
                    "dataset notice incomplete; watermark held"
                );
                return (delivered, safe_until, false);
            }
            delivered += 1;

            let group_closed = batch
                .get(index + 1)
                .is_none_or(|(next_at, _)| next_at > changed_at);
            if group_closed {
                safe_until = Some(*changed_at);
            }
        }
        (delivered, safe_until, true)
    }

    async fn store(&self, at: DateTime<Utc>) -> StagingResult<()> {
        self.ports
            .watermarks
            .advance(self.kind, at)
            .await
            .map_err(|err| watermark_error(&err))
    }
}

/// Keep datasets changed strictly after `since`, oldest first.
fn order_after(
    kind: NotificationKind,
    datasets: Vec<LimsDataset>,
    since: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, LimsDataset)> {
    let mut batch: Vec<_> = datasets
        .into_iter()
        .filter_map(|dataset| match dataset.changed_at(kind) {
            Some(at) if at > since => Some((at, dataset)),
            Some(_) => None,
            None => {
                warn!(%kind, dataset_id = dataset.id, "dataset without change timestamp skipped");
                None
            }
        })
        .collect();
    batch.sort_by_key(|(at, _)| *at);
    batch
}

fn watermark_error(err: &impl std::fmt::Display) -> StagingError {
    error!(error = %err, "notification watermark storage failed");
    StagingError::internal("notification watermarks are unavailable")
}

#[async_trait]
impl PeriodicJob for NotificationSyncJob {
    fn name(&self) -> &'static str {
        match self.kind {
            NotificationKind::Released => "released-notifications",
            NotificationKind::Validated => "validated-notifications",
        }
    }

    async fn run_tick(&self) {
        match self.sync_once().await {
            Ok(SyncOutcome::Processed {
                delivered,
                advanced_to,
                complete,
            }) => {
                info!(
                    kind = %self.kind,
                    delivered,
                    advanced_to = ?advanced_to,
                    complete,
                    "notification sync tick finished"
                );
            }
            Ok(_) => {}
            Err(err) => {
                error!(
                    kind = %self.kind,
                    code = ?err.code(),
                    error = %err,
                    "notification sync tick failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests;
