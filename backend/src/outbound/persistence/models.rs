//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. Conversions into domain types are
//! fallible because enum columns are stored as text.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::domain::{
    Contact, ContactStatus, ContactType, Credential, DatasetId, DownloadFile, DownloadRequest,
    ProjectId, RequestId, StagingConstants, UnknownLabel,
};

use super::schema::{
    contacts, download_files, download_requests, notification_watermarks, staging_constants,
};

/// Row struct for reading from the download_requests table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = download_requests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DownloadRequestRow {
    pub id: i64,
    pub dataset_id: String,
    pub project_id: String,
    pub transfer_type: String,
    pub status: String,
    pub requester: String,
    pub creation_date: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub failure_date: Option<DateTime<Utc>>,
    pub notification_date: Option<DateTime<Utc>>,
    pub should_delete: bool,
    pub is_cancelled: bool,
}

impl TryFrom<DownloadRequestRow> for DownloadRequest {
    type Error = UnknownLabel;

    fn try_from(row: DownloadRequestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: RequestId::new(row.id),
            dataset_id: DatasetId::new(row.dataset_id),
            project_id: ProjectId::new(row.project_id),
            transfer_type: row.transfer_type.parse()?,
            status: row.status.parse()?,
            requester: row.requester,
            creation_date: row.creation_date,
            completion_date: row.completion_date,
            expiry_date: row.expiry_date,
            failure_date: row.failure_date,
            notification_date: row.notification_date,
            should_delete: row.should_delete,
            is_cancelled: row.is_cancelled,
        })
    }
}

/// Insertable struct for creating staging requests.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = download_requests)]
pub(crate) struct NewDownloadRequestRow<'a> {
    pub dataset_id: &'a str,
    pub project_id: &'a str,
    pub transfer_type: &'a str,
    pub status: &'a str,
    pub requester: &'a str,
    pub creation_date: DateTime<Utc>,
}

/// Changeset applied by a status transition; `None` columns are left alone.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = download_requests)]
pub(crate) struct StatusChangeset<'a> {
    pub status: &'a str,
    pub completion_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub failure_date: Option<DateTime<Utc>>,
}

/// Row struct for the download_files table; also used for upserts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = download_files)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DownloadFileRow {
    pub dataset_id: String,
    pub source: String,
    pub destination: String,
}

impl From<DownloadFileRow> for DownloadFile {
    fn from(row: DownloadFileRow) -> Self {
        Self {
            dataset_id: DatasetId::new(row.dataset_id),
            source: row.source,
            destination: row.destination,
        }
    }
}

/// Row struct for the contacts table; also used for inserts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = contacts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ContactRow {
    pub project_id: String,
    pub contact_type: String,
    pub status: String,
    pub depth: Option<String>,
}

impl TryFrom<ContactRow> for Contact {
    type Error = UnknownLabel;

    fn try_from(row: ContactRow) -> Result<Self, Self::Error> {
        Ok(Self {
            project_id: ProjectId::new(row.project_id),
            contact_type: row.contact_type.parse::<ContactType>()?,
            status: row.status.parse::<ContactStatus>()?,
            depth: row.depth.map(Credential::new),
        })
    }
}

/// Row struct for the staging_constants singleton.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = staging_constants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct StagingConstantsRow {
    pub expiry_days: i32,
    pub globus_project_size: i64,
    pub sftp_project_size: i64,
}

impl From<StagingConstantsRow> for StagingConstants {
    fn from(row: StagingConstantsRow) -> Self {
        Self {
            expiry_days: row.expiry_days,
            globus_project_size: row.globus_project_size,
            sftp_project_size: row.sftp_project_size,
        }
    }
}

/// Row struct for the notification_watermarks singleton.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = notification_watermarks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct WatermarkRow {
    pub last_released: Option<DateTime<Utc>>,
    pub last_validated: Option<DateTime<Utc>>,
}
