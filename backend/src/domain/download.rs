//! Staging request aggregate and its supporting value types.
//!
//! A [`DownloadRequest`] tracks one dataset staged through one transfer
//! medium. At most one live (not `should_delete`) request exists per
//! `(dataset, transfer type)` pair, and its status only ever moves forward.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_identifier! {
    /// LIMS dataset identifier, as shown to users ("Dataset #42").
    DatasetId
}

string_identifier! {
    /// External project identifier shared by the LIMS and the user directory.
    ProjectId
}

/// Database identity of a staging request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(i64);

impl RequestId {
    /// Wrap a raw row identifier.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw row identifier.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raised when a stored or supplied label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownLabel {
    kind: &'static str,
    value: String,
}

impl UnknownLabel {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

/// Medium used to deliver a staged dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferType {
    /// Direct HTTP download; needs no credential.
    Http,
    /// SFTP account scoped to the project.
    Sftp,
    /// Globus endpoint scoped to the project.
    Globus,
}

impl TransferType {
    /// Stored label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Sftp => "SFTP",
            Self::Globus => "GLOBUS",
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferType {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "HTTP" => Ok(Self::Http),
            "SFTP" => Ok(Self::Sftp),
            "GLOBUS" => Ok(Self::Globus),
            other => Err(UnknownLabel::new("transfer type", other)),
        }
    }
}

/// Progress of a staging request as reported by the staging agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestStatus {
    /// Created by a user, not yet picked up.
    Requested,
    /// Picked up by the staging agent.
    Pending,
    /// Queued for transfer.
    Queued,
    /// Files are staged and downloadable.
    Success,
    /// Staging failed.
    Failed,
}

impl RequestStatus {
    /// Stored label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// Whether no further transition is allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Requested => 0,
            Self::Pending => 1,
            Self::Queued => 2,
            Self::Success | Self::Failed => 3,
        }
    }

    /// Whether moving from `self` to `next` keeps the status moving forward.
    ///
    /// Intermediate steps may be skipped; terminal states are final.
    ///
    /// # Examples
    /// ```
    /// use staging_backend::domain::RequestStatus;
    ///
    /// assert!(RequestStatus::Requested.can_advance_to(RequestStatus::Success));
    /// assert!(!RequestStatus::Success.can_advance_to(RequestStatus::Requested));
    /// assert!(!RequestStatus::Queued.can_advance_to(RequestStatus::Queued));
    /// ```
    pub fn can_advance_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "REQUESTED" => Ok(Self::Requested),
            "PENDING" => Ok(Self::Pending),
            "QUEUED" => Ok(Self::Queued),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownLabel::new("request status", other)),
        }
    }
}

/// One file to stage: where it lives in the LIMS and where it lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTransfer {
    /// Source path on the LIMS storage.
    pub source: String,
    /// Destination path on the staging medium.
    pub destination: String,
}

/// Stored file row, unique per `(dataset_id, source)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFile {
    /// Dataset the file belongs to.
    pub dataset_id: DatasetId,
    /// Source path on the LIMS storage.
    pub source: String,
    /// Destination path on the staging medium.
    pub destination: String,
}

/// Input for a new staging request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDownloadRequest {
    /// Project owning the dataset.
    pub project_id: ProjectId,
    /// Dataset to stage.
    pub dataset_id: DatasetId,
    /// Delivery medium.
    pub transfer_type: TransferType,
    /// Identity of the user who asked for staging.
    pub requester: String,
    /// Files making up the payload; must not be empty.
    pub files: Vec<FileTransfer>,
}

/// A staging request row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    /// Generated identity.
    pub id: RequestId,
    /// Dataset being staged.
    pub dataset_id: DatasetId,
    /// Project owning the dataset.
    pub project_id: ProjectId,
    /// Delivery medium.
    pub transfer_type: TransferType,
    /// Current status.
    pub status: RequestStatus,
    /// Requesting user.
    pub requester: String,
    /// When the request was created.
    pub creation_date: DateTime<Utc>,
    /// When staging succeeded.
    pub completion_date: Option<DateTime<Utc>>,
    /// When staged files will be removed.
    pub expiry_date: Option<DateTime<Utc>>,
    /// When staging failed.
    pub failure_date: Option<DateTime<Utc>>,
    /// Last time project members were told about this request.
    pub notification_date: Option<DateTime<Utc>>,
    /// Flagged for teardown by the staging agent.
    pub should_delete: bool,
    /// Cancelled upstream; reconciled into `should_delete`.
    pub is_cancelled: bool,
}

/// Terminal-status notice owed to project members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusNotice {
    /// Staging completed; data is ready.
    Succeeded,
    /// Staging failed.
    Failed,
}

impl DownloadRequest {
    /// Whether the request counts against the one-live-request rule.
    pub fn is_live(&self) -> bool {
        !self.should_delete
    }

    /// Notice owed to project members, if any.
    ///
    /// A notice is owed when the terminal timestamp is newer than the last
    /// notification, so a request that succeeds again after an earlier
    /// notice is announced again.
    pub fn pending_notice(&self) -> Option<StatusNotice> {
        let newer = |event: Option<DateTime<Utc>>| match (event, self.notification_date) {
            (Some(event), Some(notified)) => notified < event,
            (Some(_), None) => true,
            (None, _) => false,
        };
        match self.status {
            RequestStatus::Success if newer(self.completion_date) => Some(StatusNotice::Succeeded),
            RequestStatus::Failed if newer(self.failure_date) => Some(StatusNotice::Failed),
            _ => None,
        }
    }
}

/// Status change reported by the staging agent, with the timestamps it sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    /// New status.
    pub status: RequestStatus,
    /// Stamped when moving to SUCCESS.
    pub completion_date: Option<DateTime<Utc>>,
    /// Stamped when moving to SUCCESS.
    pub expiry_date: Option<DateTime<Utc>>,
    /// Stamped when moving to FAILED.
    pub failure_date: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    /// Build the update for `status` observed at `now`.
    pub fn at(status: RequestStatus, now: DateTime<Utc>, constants: &StagingConstants) -> Self {
        match status {
            RequestStatus::Success => Self {
                status,
                completion_date: Some(now),
                expiry_date: Some(constants.expiry_from(now)),
                failure_date: None,
            },
            RequestStatus::Failed => Self {
                status,
                completion_date: None,
                expiry_date: None,
                failure_date: Some(now),
            },
            _ => Self {
                status,
                completion_date: None,
                expiry_date: None,
                failure_date: None,
            },
        }
    }
}

/// System-wide staging limits stored as a singleton row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingConstants {
    /// Days a staged dataset stays available.
    pub expiry_days: i32,
    /// Per-project quota on the Globus endpoint, in bytes.
    pub globus_project_size: i64,
    /// Per-project quota on the SFTP server, in bytes.
    pub sftp_project_size: i64,
}

impl StagingConstants {
    /// Expiry instant for data staged at `now`.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(i64::from(self.expiry_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[fixture]
    fn now() -> DateTime<Utc> {
        base_time()
    }

    fn request(status: RequestStatus) -> DownloadRequest {
        DownloadRequest {
            id: RequestId::new(1),
            dataset_id: DatasetId::new("42"),
            project_id: ProjectId::new("P1"),
            transfer_type: TransferType::Globus,
            status,
            requester: "alice".to_owned(),
            creation_date: base_time(),
            completion_date: None,
            expiry_date: None,
            failure_date: None,
            notification_date: None,
            should_delete: false,
            is_cancelled: false,
        }
    }

    #[rstest]
    #[case(RequestStatus::Requested, RequestStatus::Pending, true)]
    #[case(RequestStatus::Requested, RequestStatus::Failed, true)]
    #[case(RequestStatus::Queued, RequestStatus::Success, true)]
    #[case(RequestStatus::Pending, RequestStatus::Requested, false)]
    #[case(RequestStatus::Success, RequestStatus::Failed, false)]
    #[case(RequestStatus::Failed, RequestStatus::Success, false)]
    #[case(RequestStatus::Pending, RequestStatus::Pending, false)]
    fn status_only_moves_forward(
        #[case] from: RequestStatus,
        #[case] to: RequestStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_advance_to(to), allowed);
    }

    #[rstest]
    #[case("HTTP", TransferType::Http)]
    #[case("SFTP", TransferType::Sftp)]
    #[case("GLOBUS", TransferType::Globus)]
    fn transfer_type_labels_parse(#[case] label: &str, #[case] expected: TransferType) {
        assert_eq!(label.parse::<TransferType>(), Ok(expected));
        assert_eq!(expected.as_str(), label);
    }

    #[rstest]
    fn unknown_status_label_is_rejected() {
        let err = "DONE".parse::<RequestStatus>().expect_err("unknown label");
        assert_eq!(err.to_string(), "unknown request status `DONE`");
    }

    #[rstest]
    fn success_without_notification_owes_ready_notice(now: DateTime<Utc>) {
        let mut req = request(RequestStatus::Success);
        req.completion_date = Some(now);
        assert_eq!(req.pending_notice(), Some(StatusNotice::Succeeded));

        req.notification_date = Some(now + Duration::seconds(1));
        assert_eq!(req.pending_notice(), None);
    }

    #[rstest]
    fn failure_newer_than_notification_owes_failed_notice(now: DateTime<Utc>) {
        let mut req = request(RequestStatus::Failed);
        req.notification_date = Some(now);
        req.failure_date = Some(now + Duration::minutes(5));
        assert_eq!(req.pending_notice(), Some(StatusNotice::Failed));
    }

    #[rstest]
    fn success_without_completion_date_owes_nothing() {
        assert_eq!(request(RequestStatus::Success).pending_notice(), None);
        assert_eq!(request(RequestStatus::Queued).pending_notice(), None);
    }

    #[rstest]
    fn success_update_stamps_completion_and_expiry(now: DateTime<Utc>) {
        let constants = StagingConstants {
            expiry_days: 14,
            globus_project_size: 1,
            sftp_project_size: 1,
        };
        let update = StatusUpdate::at(RequestStatus::Success, now, &constants);
        assert_eq!(update.completion_date, Some(now));
        assert_eq!(update.expiry_date, Some(now + Duration::days(14)));
        assert_eq!(update.failure_date, None);
    }
}
