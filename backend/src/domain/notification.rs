//! Change-feed records and watermarks for release and validation notices.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::download::ProjectId;

/// The two independent change feeds polled from the LIMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Datasets whose readsets were released.
    Released,
    /// Datasets whose validation status changed.
    Validated,
}

impl NotificationKind {
    /// Label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Released => "released",
            Self::Validated => "validated",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation outcome reported by the LIMS for a dataset lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationFlag {
    /// Lane available, not yet judged.
    Available,
    /// Lane passed validation.
    Passed,
    /// Lane failed validation.
    Failed,
}

impl ValidationFlag {
    /// Map the LIMS numeric code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Available),
            1 => Some(Self::Passed),
            2 => Some(Self::Failed),
            _ => None,
        }
    }

    /// Human label used in emails.
    pub fn label(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Passed => "Passed",
            Self::Failed => "Failed",
        }
    }
}

/// Reviewer comment attached to a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetComment {
    /// Comment text.
    pub comment: String,
    /// When the comment was left.
    pub created_at: DateTime<Utc>,
    /// LIMS user id of the author.
    pub created_by: i64,
}

/// Dataset summary returned by the LIMS change feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimsDataset {
    /// LIMS dataset id.
    pub id: i64,
    /// Sequencing lane.
    pub lane: i64,
    /// Owning project.
    pub project_id: ProjectId,
    /// Project display name.
    pub project_name: String,
    /// Sequencing run name.
    pub run_name: String,
    /// Number of released readsets.
    pub released_status_count: i64,
    /// Last release change.
    pub latest_release_update: Option<DateTime<Utc>>,
    /// Last validation change.
    pub latest_validation_update: Option<DateTime<Utc>>,
    /// Validation outcome.
    pub validation_status: Option<ValidationFlag>,
    /// Who validated the lane.
    pub validated_by: Option<String>,
    /// Reviewer comments.
    pub comments: Vec<DatasetComment>,
}

impl LimsDataset {
    /// Change timestamp relevant to `kind`.
    pub fn changed_at(&self, kind: NotificationKind) -> Option<DateTime<Utc>> {
        match kind {
            NotificationKind::Released => self.latest_release_update,
            NotificationKind::Validated => self.latest_validation_update,
        }
    }

    /// Most recent reviewer comment.
    pub fn latest_comment(&self) -> Option<&DatasetComment> {
        self.comments.iter().max_by_key(|comment| comment.created_at)
    }
}

/// Last fully processed change timestamp per feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationWatermarks {
    /// Released feed watermark.
    pub last_released: Option<DateTime<Utc>>,
    /// Validated feed watermark.
    pub last_validated: Option<DateTime<Utc>>,
}

impl NotificationWatermarks {
    /// Watermark for `kind`.
    pub fn get(&self, kind: NotificationKind) -> Option<DateTime<Utc>> {
        match kind {
            NotificationKind::Released => self.last_released,
            NotificationKind::Validated => self.last_validated,
        }
    }
}
