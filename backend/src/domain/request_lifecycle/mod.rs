//! Authoritative state machine for staging requests and credential contacts.
//!
//! Request handlers call into [`RequestLifecycleService`] synchronously;
//! conflicts and missing rows come back as structured errors and are never
//! retried here. Storage failures surface as [`ErrorCode::InternalError`]
//! with a generic message, the underlying cause only reaching the logs.
//!
//! [`ErrorCode::InternalError`]: crate::domain::ErrorCode::InternalError

use std::fmt::Display;
use std::sync::Arc;

use mockable::Clock;
use serde_json::json;
use tracing::{error, info, warn};

use crate::domain::ports::{
    ContactRepository, DownloadRequestRepository, DownloadRequestRepositoryError,
};
use crate::domain::{
    Contact, ContactType, Credential, DatasetId, DownloadFile, DownloadRequest,
    NewDownloadRequest, ProjectId, RequestStatus, StagingConstants, StagingError, StagingResult,
    StatusNotice, StatusUpdate, TransferType,
};

mod activity;

pub use activity::DownloadActivityRegistry;

/// Persistence ports used by the service.
#[derive(Clone)]
pub struct RequestLifecyclePorts {
    /// Staging request storage.
    pub requests: Arc<dyn DownloadRequestRepository>,
    /// Credential contact storage.
    pub contacts: Arc<dyn ContactRepository>,
}

/// A newly created request with its stored files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRequest {
    /// The REQUESTED row.
    pub request: DownloadRequest,
    /// Stored files, one per input file.
    pub files: Vec<DownloadFile>,
}

/// Result of flagging a dataset's requests for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOutcome {
    /// Every request of the dataset, now flagged.
    pub requests: Vec<DownloadRequest>,
    /// HTTP downloads of the dataset still in progress.
    pub active_downloads: u32,
}

/// Owner of staging request and contact mutations.
pub struct RequestLifecycleService {
    requests: Arc<dyn DownloadRequestRepository>,
    contacts: Arc<dyn ContactRepository>,
    clock: Arc<dyn Clock>,
    activity: DownloadActivityRegistry,
}

impl RequestLifecycleService {
    /// Build the service over the given ports.
    pub fn new(ports: RequestLifecyclePorts, clock: Arc<dyn Clock>) -> Self {
        Self {
            requests: ports.requests,
            contacts: ports.contacts,
            clock,
            activity: DownloadActivityRegistry::default(),
        }
    }

    /// Create a staging request and its files atomically.
    ///
    /// # Errors
    /// - `InvalidRequest` when `request.files` is empty.
    /// - `Conflict` when a live request exists for the dataset and medium.
    pub async fn create_request(
        &self,
        request: NewDownloadRequest,
    ) -> StagingResult<CreatedRequest> {
        if request.files.is_empty() {
            return Err(StagingError::invalid_request("cannot create a request with zero files")
                .with_details(json!({ "datasetId": request.dataset_id })));
        }

        let now = self.clock.utc();
        match self.requests.create_with_files(&request, now).await {
            Ok((created, files)) => {
                info!(
                    dataset_id = %created.dataset_id,
                    transfer_type = %created.transfer_type,
                    request_id = %created.id,
                    file_count = files.len(),
                    "staging request created"
                );
                Ok(CreatedRequest {
                    request: created,
                    files,
                })
            }
            Err(DownloadRequestRepositoryError::DuplicateLive { .. }) => Err(StagingError::conflict(
                format!(
                    "a live {} request already exists for dataset {}",
                    request.transfer_type, request.dataset_id
                ),
            )
            .with_details(json!({
                "datasetId": request.dataset_id,
                "transferType": request.transfer_type,
            }))),
            Err(err) => Err(storage_error(&err)),
        }
    }

    /// Push back the expiry of every live SUCCESS request of the dataset.
    ///
    /// # Errors
    /// `NotFound` when the dataset has no live request in SUCCESS.
    pub async fn extend_request(
        &self,
        dataset_id: &DatasetId,
    ) -> StagingResult<Vec<DownloadRequest>> {
        let constants = self.get_constants().await?;
        let expiry = constants.expiry_from(self.clock.utc());
        let extended = self
            .requests
            .extend_successful(dataset_id, expiry)
            .await
            .map_err(|err| storage_error(&err))?;
        if extended.is_empty() {
            return Err(StagingError::not_found(format!(
                "no staged request to extend for dataset {dataset_id}"
            )));
        }
        info!(dataset_id = %dataset_id, expiry_date = %expiry, "staging expiry extended");
        Ok(extended)
    }

    /// Flag every request of the dataset for teardown by the staging agent.
    ///
    /// Rows are never removed. Repeating the call leaves them unchanged.
    ///
    /// # Errors
    /// `NotFound` when the dataset has no request at all.
    pub async fn delete_request(&self, dataset_id: &DatasetId) -> StagingResult<DeletionOutcome> {
        let requests = self
            .requests
            .mark_for_deletion(dataset_id)
            .await
            .map_err(|err| storage_error(&err))?;
        if requests.is_empty() {
            return Err(StagingError::not_found(format!(
                "no request to delete for dataset {dataset_id}"
            )));
        }
        let active_downloads = self.activity.active(dataset_id);
        if active_downloads > 0 {
            warn!(
                dataset_id = %dataset_id,
                active_downloads,
                "dataset flagged for deletion while downloading"
            );
        }
        info!(dataset_id = %dataset_id, count = requests.len(), "requests flagged for deletion");
        Ok(DeletionOutcome {
            requests,
            active_downloads,
        })
    }

    /// Flag cancelled SUCCESS requests for deletion; returns how many changed.
    pub async fn reconcile_cancelled(&self) -> StagingResult<u64> {
        let flagged = self
            .requests
            .flag_cancelled_for_deletion()
            .await
            .map_err(|err| storage_error(&err))?;
        if flagged > 0 {
            info!(flagged, "cancelled requests flagged for deletion");
        }
        Ok(flagged)
    }

    /// Enqueue a credential reset for the project and medium.
    ///
    /// # Errors
    /// `InvalidRequest` for HTTP, which has no credential.
    pub async fn reset_contact_password(
        &self,
        project_id: &ProjectId,
        transfer_type: TransferType,
    ) -> StagingResult<Contact> {
        let contact_type = ContactType::try_from(transfer_type).map_err(|_| {
            StagingError::invalid_request(format!(
                "{transfer_type} transfers have no credential to reset"
            ))
        })?;
        let contact = self
            .contacts
            .request_reset(project_id, contact_type)
            .await
            .map_err(|err| storage_error(&err))?;
        info!(project_id = %project_id, contact_type = %contact_type, "credential reset enqueued");
        Ok(contact)
    }

    /// System staging constants.
    ///
    /// # Errors
    /// `InternalError` when the constants row is missing.
    pub async fn get_constants(&self) -> StagingResult<StagingConstants> {
        self.requests
            .constants()
            .await
            .map_err(|err| storage_error(&err))?
            .ok_or_else(|| {
                error!("staging constants row is missing");
                StagingError::internal("staging constants unavailable")
            })
    }

    /// Live request for the dataset and medium.
    ///
    /// # Errors
    /// `NotFound` when none exists.
    pub async fn get_request(
        &self,
        dataset_id: &DatasetId,
        transfer_type: TransferType,
    ) -> StagingResult<DownloadRequest> {
        self.find_live(dataset_id, transfer_type).await
    }

    /// Every request, live or flagged.
    pub async fn list_requests(&self) -> StagingResult<Vec<DownloadRequest>> {
        self.requests
            .list_requests()
            .await
            .map_err(|err| storage_error(&err))
    }

    /// Files registered for the dataset.
    pub async fn list_files(&self, dataset_id: &DatasetId) -> StagingResult<Vec<DownloadFile>> {
        self.requests
            .list_files(dataset_id)
            .await
            .map_err(|err| storage_error(&err))
    }

    /// Apply a status reported by the staging agent.
    ///
    /// SUCCESS stamps the completion and expiry dates; FAILED stamps the
    /// failure date.
    ///
    /// # Errors
    /// - `NotFound` when no live request exists.
    /// - `InvalidRequest` when the change would move the status backwards or
    ///   leave a terminal state.
    /// - `Conflict` when another report changed the status concurrently.
    pub async fn record_status(
        &self,
        dataset_id: &DatasetId,
        transfer_type: TransferType,
        status: RequestStatus,
    ) -> StagingResult<DownloadRequest> {
        let current = self.find_live(dataset_id, transfer_type).await?;
        if !current.status.can_advance_to(status) {
            return Err(StagingError::invalid_request(format!(
                "cannot move request {} from {} to {status}",
                current.id, current.status
            )));
        }

        let constants = self.get_constants().await?;
        let update = StatusUpdate::at(status, self.clock.utc(), &constants);
        let updated = self
            .requests
            .transition_status(current.id, current.status, update)
            .await
            .map_err(|err| storage_error(&err))?
            .ok_or_else(|| {
                StagingError::conflict(format!(
                    "request {} changed status concurrently",
                    current.id
                ))
            })?;
        info!(
            request_id = %updated.id,
            dataset_id = %dataset_id,
            from = %current.status,
            to = %updated.status,
            "request status recorded"
        );
        Ok(updated)
    }

    /// Mark the live request as cancelled upstream.
    ///
    /// # Errors
    /// `NotFound` when no live request exists.
    pub async fn mark_cancelled(
        &self,
        dataset_id: &DatasetId,
        transfer_type: TransferType,
    ) -> StagingResult<DownloadRequest> {
        self.requests
            .mark_cancelled(dataset_id, transfer_type)
            .await
            .map_err(|err| storage_error(&err))?
            .ok_or_else(|| not_found_live(dataset_id, transfer_type))
    }

    /// Store a generated credential so the ticker can deliver it.
    pub async fn record_credential(
        &self,
        project_id: &ProjectId,
        contact_type: ContactType,
        credential: &Credential,
    ) -> StagingResult<Contact> {
        let contact = self
            .contacts
            .record_credential(project_id, contact_type, credential)
            .await
            .map_err(|err| storage_error(&err))?;
        info!(
            project_id = %project_id,
            contact_type = %contact_type,
            "credential ready for delivery"
        );
        Ok(contact)
    }

    /// Contacts whose credential is ready for delivery.
    pub async fn ready_contacts(&self) -> StagingResult<Vec<Contact>> {
        self.contacts
            .list_ready()
            .await
            .map_err(|err| storage_error(&err))
    }

    /// Remove a delivered contact unless it was reset while being delivered.
    ///
    /// Returns `false` when the contact now holds a newer credential.
    pub async fn acknowledge_contact(
        &self,
        contact: &Contact,
        delivered: &Credential,
    ) -> StagingResult<bool> {
        self.contacts
            .remove_delivered(&contact.project_id, contact.contact_type, delivered)
            .await
            .map_err(|err| storage_error(&err))
    }

    /// Requests owing a succeeded or failed notice, with the notice owed.
    pub async fn pending_notices(&self) -> StagingResult<Vec<(DownloadRequest, StatusNotice)>> {
        let requests = self.list_requests().await?;
        Ok(requests
            .into_iter()
            .filter_map(|request| request.pending_notice().map(|notice| (request, notice)))
            .collect())
    }

    /// Record that project members were told about the request.
    pub async fn record_notification(&self, request: &DownloadRequest) -> StagingResult<()> {
        self.requests
            .stamp_notification(request.id, self.clock.utc())
            .await
            .map_err(|err| storage_error(&err))
    }

    /// Registry of in-progress HTTP downloads.
    pub fn activity(&self) -> &DownloadActivityRegistry {
        &self.activity
    }

    async fn find_live(
        &self,
        dataset_id: &DatasetId,
        transfer_type: TransferType,
    ) -> StagingResult<DownloadRequest> {
        self.requests
            .find_live(dataset_id, transfer_type)
            .await
            .map_err(|err| storage_error(&err))?
            .ok_or_else(|| not_found_live(dataset_id, transfer_type))
    }
}

fn not_found_live(dataset_id: &DatasetId, transfer_type: TransferType) -> StagingError {
    StagingError::not_found(format!(
        "no live {transfer_type} request for dataset {dataset_id}"
    ))
}

fn storage_error(err: &impl Display) -> StagingError {
    error!(error = %err, "staging storage operation failed");
    StagingError::internal("staging storage is unavailable")
}
