//! Port for the LIMS dataset change feeds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{LimsDataset, NotificationKind};

use super::LimsError;

/// Port listing datasets changed upstream since a watermark.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LimsDatasetSource: Send + Sync {
    /// Datasets whose `kind` timestamp is strictly after `since`.
    async fn list_changed_since(
        &self,
        kind: NotificationKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<LimsDataset>, LimsError>;
}
