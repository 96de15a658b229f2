//! Port for staging request persistence.
//!
//! Implementations own the multi-row invariants: a request and its files are
//! written in one transaction, and at most one live request exists per
//! `(dataset, transfer type)` pair.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    DatasetId, DownloadFile, DownloadRequest, NewDownloadRequest, RequestId, RequestStatus,
    StagingConstants, StatusUpdate, TransferType,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by staging request repositories.
    pub enum DownloadRequestRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "download request repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "download request repository query failed: {message}",
        /// A live request already exists for the dataset and transfer type.
        DuplicateLive { message: String } => "live download request already exists: {message}",
    }
}

/// Port for reading and mutating staging requests and their files.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DownloadRequestRepository: Send + Sync {
    /// Upsert the file set and insert a REQUESTED row in one transaction.
    ///
    /// Files conflicting on `(dataset_id, source)` update `destination` only.
    /// Fails with [`DownloadRequestRepositoryError::DuplicateLive`] when a
    /// live request already exists, in which case nothing is written.
    async fn create_with_files(
        &self,
        request: &NewDownloadRequest,
        created_at: DateTime<Utc>,
    ) -> Result<(DownloadRequest, Vec<DownloadFile>), DownloadRequestRepositoryError>;

    /// Live request for the pair, if any.
    async fn find_live(
        &self,
        dataset_id: &DatasetId,
        transfer_type: TransferType,
    ) -> Result<Option<DownloadRequest>, DownloadRequestRepositoryError>;

    /// Every request row, live or not, ordered by id.
    async fn list_requests(&self) -> Result<Vec<DownloadRequest>, DownloadRequestRepositoryError>;

    /// Files registered for `dataset_id`, ordered by source.
    async fn list_files(
        &self,
        dataset_id: &DatasetId,
    ) -> Result<Vec<DownloadFile>, DownloadRequestRepositoryError>;

    /// Set `expiry_date` on every live SUCCESS request of the dataset.
    ///
    /// Returns the updated rows; empty when none matched.
    async fn extend_successful(
        &self,
        dataset_id: &DatasetId,
        expiry_date: DateTime<Utc>,
    ) -> Result<Vec<DownloadRequest>, DownloadRequestRepositoryError>;

    /// Set `should_delete` on every request of the dataset.
    ///
    /// Returns the matching rows after the update; empty when the dataset has
    /// no requests at all.
    async fn mark_for_deletion(
        &self,
        dataset_id: &DatasetId,
    ) -> Result<Vec<DownloadRequest>, DownloadRequestRepositoryError>;

    /// Flag cancelled SUCCESS requests for deletion.
    ///
    /// Returns how many rows changed; rows already flagged are not counted.
    async fn flag_cancelled_for_deletion(&self) -> Result<u64, DownloadRequestRepositoryError>;

    /// Set `is_cancelled` on the live request for the pair.
    async fn mark_cancelled(
        &self,
        dataset_id: &DatasetId,
        transfer_type: TransferType,
    ) -> Result<Option<DownloadRequest>, DownloadRequestRepositoryError>;

    /// Apply `update` only if the row still has status `expected`.
    ///
    /// Returns `None` when the row is gone or its status moved on.
    async fn transition_status(
        &self,
        id: RequestId,
        expected: RequestStatus,
        update: StatusUpdate,
    ) -> Result<Option<DownloadRequest>, DownloadRequestRepositoryError>;

    /// Record that project members were notified about the request.
    async fn stamp_notification(
        &self,
        id: RequestId,
        notified_at: DateTime<Utc>,
    ) -> Result<(), DownloadRequestRepositoryError>;

    /// The singleton constants row.
    async fn constants(&self) -> Result<Option<StagingConstants>, DownloadRequestRepositoryError>;
}
