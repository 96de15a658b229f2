//! PostgreSQL-backed `DownloadRequestRepository` implementation using Diesel ORM.
//!
//! Request creation and file upserts share one transaction. The live-request
//! uniqueness rule is enforced by the partial unique index on
//! `download_requests`, so a concurrent duplicate surfaces as
//! `DuplicateLive` rather than a second row.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{DownloadRequestRepository, DownloadRequestRepositoryError};
use crate::domain::{
    DatasetId, DownloadFile, DownloadRequest, NewDownloadRequest, RequestId, RequestStatus,
    StagingConstants, StatusUpdate, TransferType,
};

use super::diesel_basic_error_mapping::{
    corrupt_row, is_unique_violation, map_basic_diesel_error, map_basic_pool_error,
};
use super::models::{
    DownloadFileRow, DownloadRequestRow, NewDownloadRequestRow, StagingConstantsRow,
    StatusChangeset,
};
use super::pool::{DbPool, PoolError};
use super::schema::{download_files, download_requests, staging_constants};

/// Diesel-backed implementation of the `DownloadRequestRepository` port.
#[derive(Clone)]
pub struct DieselDownloadRequestRepository {
    pool: DbPool,
}

impl DieselDownloadRequestRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> DownloadRequestRepositoryError {
    map_basic_pool_error(error, DownloadRequestRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> DownloadRequestRepositoryError {
    map_basic_diesel_error(
        error,
        DownloadRequestRepositoryError::query,
        DownloadRequestRepositoryError::connection,
    )
}

fn to_domain(row: DownloadRequestRow) -> Result<DownloadRequest, DownloadRequestRepositoryError> {
    DownloadRequest::try_from(row)
        .map_err(|err| DownloadRequestRepositoryError::query(corrupt_row(&err)))
}

fn to_domain_all(
    rows: Vec<DownloadRequestRow>,
) -> Result<Vec<DownloadRequest>, DownloadRequestRepositoryError> {
    rows.into_iter().map(to_domain).collect()
}

/// Input files keyed by source, so repeated sources collapse to the last
/// destination instead of hitting the same conflict twice in one statement.
fn file_rows(request: &NewDownloadRequest) -> Vec<DownloadFileRow> {
    let by_source: BTreeMap<&str, &str> = request
        .files
        .iter()
        .map(|file| (file.source.as_str(), file.destination.as_str()))
        .collect();
    by_source
        .into_iter()
        .map(|(source, destination)| DownloadFileRow {
            dataset_id: request.dataset_id.as_str().to_owned(),
            source: source.to_owned(),
            destination: destination.to_owned(),
        })
        .collect()
}

#[async_trait]
impl DownloadRequestRepository for DieselDownloadRequestRepository {
    async fn create_with_files(
        &self,
        request: &NewDownloadRequest,
        created_at: DateTime<Utc>,
    ) -> Result<(DownloadRequest, Vec<DownloadFile>), DownloadRequestRepositoryError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let files = file_rows(request);
        let new_row = NewDownloadRequestRow {
            dataset_id: request.dataset_id.as_str(),
            project_id: request.project_id.as_str(),
            transfer_type: request.transfer_type.as_str(),
            status: RequestStatus::Requested.as_str(),
            requester: &request.requester,
            creation_date: created_at,
        };

        let outcome = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    let stored_files: Vec<DownloadFileRow> =
                        diesel::insert_into(download_files::table)
                            .values(&files)
                            .on_conflict((download_files::dataset_id, download_files::source))
                            .do_update()
                            .set(
                                download_files::destination
                                    .eq(excluded(download_files::destination)),
                            )
                            .returning(DownloadFileRow::as_returning())
                            .get_results(conn)
                            .await?;
                    let stored_request: DownloadRequestRow =
                        diesel::insert_into(download_requests::table)
                            .values(&new_row)
                            .returning(DownloadRequestRow::as_returning())
                            .get_result(conn)
                            .await?;
                    Ok((stored_request, stored_files))
                }
                .scope_boxed()
            })
            .await;

        let (row, files) = match outcome {
            Ok(stored) => stored,
            Err(err) if is_unique_violation(&err) => {
                return Err(DownloadRequestRepositoryError::duplicate_live(format!(
                    "dataset {} via {}",
                    request.dataset_id, request.transfer_type
                )));
            }
            Err(err) => return Err(map_diesel_error(err)),
        };
        Ok((
            to_domain(row)?,
            files.into_iter().map(DownloadFile::from).collect(),
        ))
    }

    async fn find_live(
        &self,
        dataset_id: &DatasetId,
        transfer_type: TransferType,
    ) -> Result<Option<DownloadRequest>, DownloadRequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<DownloadRequestRow> = download_requests::table
            .filter(download_requests::dataset_id.eq(dataset_id.as_str()))
            .filter(download_requests::transfer_type.eq(transfer_type.as_str()))
            .filter(download_requests::should_delete.eq(false))
            .select(DownloadRequestRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(to_domain).transpose()
    }

    async fn list_requests(&self) -> Result<Vec<DownloadRequest>, DownloadRequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<DownloadRequestRow> = download_requests::table
            .order(download_requests::id.asc())
            .select(DownloadRequestRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        to_domain_all(rows)
    }

    async fn list_files(
        &self,
        dataset_id: &DatasetId,
    ) -> Result<Vec<DownloadFile>, DownloadRequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<DownloadFileRow> = download_files::table
            .filter(download_files::dataset_id.eq(dataset_id.as_str()))
            .order(download_files::source.asc())
            .select(DownloadFileRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(DownloadFile::from).collect())
    }

    async fn extend_successful(
        &self,
        dataset_id: &DatasetId,
        expiry_date: DateTime<Utc>,
    ) -> Result<Vec<DownloadRequest>, DownloadRequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<DownloadRequestRow> = diesel::update(
            download_requests::table
                .filter(download_requests::dataset_id.eq(dataset_id.as_str()))
                .filter(download_requests::status.eq(RequestStatus::Success.as_str()))
                .filter(download_requests::should_delete.eq(false)),
        )
        .set(download_requests::expiry_date.eq(Some(expiry_date)))
        .returning(DownloadRequestRow::as_returning())
        .get_results(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        to_domain_all(rows)
    }

    async fn mark_for_deletion(
        &self,
        dataset_id: &DatasetId,
    ) -> Result<Vec<DownloadRequest>, DownloadRequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<DownloadRequestRow> = diesel::update(
            download_requests::table.filter(download_requests::dataset_id.eq(dataset_id.as_str())),
        )
        .set(download_requests::should_delete.eq(true))
        .returning(DownloadRequestRow::as_returning())
        .get_results(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        to_domain_all(rows)
    }

    async fn flag_cancelled_for_deletion(&self) -> Result<u64, DownloadRequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let changed = diesel::update(
            download_requests::table
                .filter(download_requests::status.eq(RequestStatus::Success.as_str()))
                .filter(download_requests::is_cancelled.eq(true))
                .filter(download_requests::should_delete.eq(false)),
        )
        .set(download_requests::should_delete.eq(true))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    async fn mark_cancelled(
        &self,
        dataset_id: &DatasetId,
        transfer_type: TransferType,
    ) -> Result<Option<DownloadRequest>, DownloadRequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<DownloadRequestRow> = diesel::update(
            download_requests::table
                .filter(download_requests::dataset_id.eq(dataset_id.as_str()))
                .filter(download_requests::transfer_type.eq(transfer_type.as_str()))
                .filter(download_requests::should_delete.eq(false)),
        )
        .set(download_requests::is_cancelled.eq(true))
        .returning(DownloadRequestRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()
        .map_err(map_diesel_error)?;
        row.map(to_domain).transpose()
    }

    async fn transition_status(
        &self,
        id: RequestId,
        expected: RequestStatus,
        update: StatusUpdate,
    ) -> Result<Option<DownloadRequest>, DownloadRequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let changeset = StatusChangeset {
            status: update.status.as_str(),
            completion_date: update.completion_date,
            expiry_date: update.expiry_date,
            failure_date: update.failure_date,
        };
        let row: Option<DownloadRequestRow> = diesel::update(
            download_requests::table
                .filter(download_requests::id.eq(id.get()))
                .filter(download_requests::status.eq(expected.as_str())),
        )
        .set(&changeset)
        .returning(DownloadRequestRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()
        .map_err(map_diesel_error)?;
        row.map(to_domain).transpose()
    }

    async fn stamp_notification(
        &self,
        id: RequestId,
        notified_at: DateTime<Utc>,
    ) -> Result<(), DownloadRequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::update(download_requests::table.filter(download_requests::id.eq(id.get())))
            .set(download_requests::notification_date.eq(Some(notified_at)))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn constants(&self) -> Result<Option<StagingConstants>, DownloadRequestRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<StagingConstantsRow> = staging_constants::table
            .select(StagingConstantsRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(StagingConstants::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FileTransfer, ProjectId};
    use rstest::rstest;

    #[rstest]
    fn repeated_sources_collapse_to_last_destination() {
        let request = NewDownloadRequest {
            project_id: ProjectId::new("P1"),
            dataset_id: DatasetId::new("42"),
            transfer_type: TransferType::Globus,
            requester: "alice".to_owned(),
            files: vec![
                FileTransfer {
                    source: "/a".to_owned(),
                    destination: "/old".to_owned(),
                },
                FileTransfer {
                    source: "/b".to_owned(),
                    destination: "/b".to_owned(),
                },
                FileTransfer {
                    source: "/a".to_owned(),
                    destination: "/new".to_owned(),
                },
            ],
        };

        let rows = file_rows(&request);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source, "/a");
        assert_eq!(rows[0].destination, "/new");
        assert!(rows.iter().all(|row| row.dataset_id == "42"));
    }

    #[rstest]
    fn unknown_stored_status_is_a_query_error() {
        let row = DownloadRequestRow {
            id: 1,
            dataset_id: "42".to_owned(),
            project_id: "P1".to_owned(),
            transfer_type: "SFTP".to_owned(),
            status: "ARCHIVED".to_owned(),
            requester: "alice".to_owned(),
            creation_date: Utc::now(),
            completion_date: None,
            expiry_date: None,
            failure_date: None,
            notification_date: None,
            should_delete: false,
            is_cancelled: false,
        };

        let err = to_domain(row).expect_err("unknown status rejected");

        assert!(matches!(err, DownloadRequestRepositoryError::Query { .. }));
    }
}
