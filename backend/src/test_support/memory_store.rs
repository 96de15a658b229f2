//! In-memory implementation of the persistence ports.
//!
//! Mirrors the SQL schema's constraints: one live request per
//! `(dataset, transfer type)`, files unique per `(dataset, source)`, one
//! contact per `(project, contact type)`, and monotonic watermarks.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{
    ContactRepository, ContactRepositoryError, DownloadRequestRepository,
    DownloadRequestRepositoryError, NotificationWatermarkRepository,
    NotificationWatermarkRepositoryError,
};
use crate::domain::{
    Contact, ContactStatus, ContactType, Credential, DatasetId, DownloadFile, DownloadRequest,
    NewDownloadRequest, NotificationKind, NotificationWatermarks, ProjectId, RequestId,
    RequestStatus, StagingConstants, StatusUpdate, TransferType,
};

#[derive(Default)]
struct State {
    next_id: i64,
    requests: BTreeMap<i64, DownloadRequest>,
    files: BTreeMap<(DatasetId, String), DownloadFile>,
    contacts: BTreeMap<(ProjectId, ContactType), Contact>,
    watermarks: NotificationWatermarks,
    constants: Option<StagingConstants>,
}

/// Thread-safe in-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Store holding the given constants row.
    pub fn with_constants(constants: StagingConstants) -> Self {
        let store = Self::default();
        store.lock().constants = Some(constants);
        store
    }

    /// Replace both watermarks.
    pub fn set_watermarks(&self, watermarks: NotificationWatermarks) {
        self.lock().watermarks = watermarks;
    }

    /// Snapshot of every request row.
    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.lock().requests.values().cloned().collect()
    }

    /// Snapshot of every file row.
    pub fn files(&self) -> Vec<DownloadFile> {
        self.lock().files.values().cloned().collect()
    }

    /// Snapshot of every contact row.
    pub fn contacts(&self) -> Vec<Contact> {
        self.lock().contacts.values().cloned().collect()
    }

    /// Current watermarks.
    pub fn watermarks(&self) -> NotificationWatermarks {
        self.lock().watermarks
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn live_for<'a>(
    state: &'a mut State,
    dataset_id: &DatasetId,
    transfer_type: TransferType,
) -> Option<&'a mut DownloadRequest> {
    state.requests.values_mut().find(|request| {
        request.is_live()
            && &request.dataset_id == dataset_id
            && request.transfer_type == transfer_type
    })
}

#[async_trait]
impl DownloadRequestRepository for MemoryStore {
    async fn create_with_files(
        &self,
        request: &NewDownloadRequest,
        created_at: DateTime<Utc>,
    ) -> Result<(DownloadRequest, Vec<DownloadFile>), DownloadRequestRepositoryError> {
        let mut state = self.lock();
        if live_for(&mut state, &request.dataset_id, request.transfer_type).is_some() {
            return Err(DownloadRequestRepositoryError::duplicate_live(format!(
                "dataset {} via {}",
                request.dataset_id, request.transfer_type
            )));
        }

        let mut files = Vec::with_capacity(request.files.len());
        for file in &request.files {
            let row = DownloadFile {
                dataset_id: request.dataset_id.clone(),
                source: file.source.clone(),
                destination: file.destination.clone(),
            };
            state
                .files
                .insert((row.dataset_id.clone(), row.source.clone()), row.clone());
            files.push(row);
        }

        state.next_id += 1;
        let id = state.next_id;
        let row = DownloadRequest {
            id: RequestId::new(id),
            dataset_id: request.dataset_id.clone(),
            project_id: request.project_id.clone(),
            transfer_type: request.transfer_type,
            status: RequestStatus::Requested,
            requester: request.requester.clone(),
            creation_date: created_at,
            completion_date: None,
            expiry_date: None,
            failure_date: None,
            notification_date: None,
            should_delete: false,
            is_cancelled: false,
        };
        state.requests.insert(id, row.clone());
        Ok((row, files))
    }

    async fn find_live(
        &self,
        dataset_id: &DatasetId,
        transfer_type: TransferType,
    ) -> Result<Option<DownloadRequest>, DownloadRequestRepositoryError> {
        Ok(live_for(&mut self.lock(), dataset_id, transfer_type).cloned())
    }

    async fn list_requests(&self) -> Result<Vec<DownloadRequest>, DownloadRequestRepositoryError> {
        Ok(self.requests())
    }

    async fn list_files(
        &self,
        dataset_id: &DatasetId,
    ) -> Result<Vec<DownloadFile>, DownloadRequestRepositoryError> {
        Ok(self
            .lock()
            .files
            .values()
            .filter(|file| &file.dataset_id == dataset_id)
            .cloned()
            .collect())
    }

    async fn extend_successful(
        &self,
        dataset_id: &DatasetId,
        expiry_date: DateTime<Utc>,
    ) -> Result<Vec<DownloadRequest>, DownloadRequestRepositoryError> {
        let mut state = self.lock();
        let updated = state
            .requests
            .values_mut()
            .filter(|request| {
                request.is_live()
                    && &request.dataset_id == dataset_id
                    && request.status == RequestStatus::Success
            })
            .map(|request| {
                request.expiry_date = Some(expiry_date);
                request.clone()
            })
            .collect();
        Ok(updated)
    }

    async fn mark_for_deletion(
        &self,
        dataset_id: &DatasetId,
    ) -> Result<Vec<DownloadRequest>, DownloadRequestRepositoryError> {
        let mut state = self.lock();
        let marked = state
            .requests
            .values_mut()
            .filter(|request| &request.dataset_id == dataset_id)
            .map(|request| {
                request.should_delete = true;
                request.clone()
            })
            .collect();
        Ok(marked)
    }

    async fn flag_cancelled_for_deletion(&self) -> Result<u64, DownloadRequestRepositoryError> {
        let mut state = self.lock();
        let mut changed = 0;
        for request in state.requests.values_mut() {
            if request.status == RequestStatus::Success
                && request.is_cancelled
                && !request.should_delete
            {
                request.should_delete = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn mark_cancelled(
        &self,
        dataset_id: &DatasetId,
        transfer_type: TransferType,
    ) -> Result<Option<DownloadRequest>, DownloadRequestRepositoryError> {
        let mut state = self.lock();
        Ok(live_for(&mut state, dataset_id, transfer_type).map(|request| {
            request.is_cancelled = true;
            request.clone()
        }))
    }

    async fn transition_status(
        &self,
        id: RequestId,
        expected: RequestStatus,
        update: StatusUpdate,
    ) -> Result<Option<DownloadRequest>, DownloadRequestRepositoryError> {
        let mut state = self.lock();
        let Some(request) = state.requests.get_mut(&id.get()) else {
            return Ok(None);
        };
        if request.status != expected {
            return Ok(None);
        }
        request.status = update.status;
        if update.completion_date.is_some() {
            request.completion_date = update.completion_date;
        }
        if update.expiry_date.is_some() {
            request.expiry_date = update.expiry_date;
        }
        if update.failure_date.is_some() {
            request.failure_date = update.failure_date;
        }
        Ok(Some(request.clone()))
    }

    async fn stamp_notification(
        &self,
        id: RequestId,
        notified_at: DateTime<Utc>,
    ) -> Result<(), DownloadRequestRepositoryError> {
        if let Some(request) = self.lock().requests.get_mut(&id.get()) {
            request.notification_date = Some(notified_at);
        }
        Ok(())
    }

    async fn constants(&self) -> Result<Option<StagingConstants>, DownloadRequestRepositoryError> {
        Ok(self.lock().constants)
    }
}

#[async_trait]
impl ContactRepository for MemoryStore {
    async fn request_reset(
        &self,
        project_id: &ProjectId,
        contact_type: ContactType,
    ) -> Result<Contact, ContactRepositoryError> {
        let mut state = self.lock();
        let contact = state
            .contacts
            .entry((project_id.clone(), contact_type))
            .and_modify(|contact| {
                contact.status = ContactStatus::Modified;
                contact.depth = None;
            })
            .or_insert_with(|| Contact {
                project_id: project_id.clone(),
                contact_type,
                status: ContactStatus::Modified,
                depth: None,
            });
        Ok(contact.clone())
    }

    async fn record_credential(
        &self,
        project_id: &ProjectId,
        contact_type: ContactType,
        credential: &Credential,
    ) -> Result<Contact, ContactRepositoryError> {
        let mut state = self.lock();
        let contact = state
            .contacts
            .entry((project_id.clone(), contact_type))
            .and_modify(|contact| contact.depth = Some(credential.clone()))
            .or_insert_with(|| Contact {
                project_id: project_id.clone(),
                contact_type,
                status: ContactStatus::New,
                depth: Some(credential.clone()),
            });
        Ok(contact.clone())
    }

    async fn list_ready(&self) -> Result<Vec<Contact>, ContactRepositoryError> {
        Ok(self
            .lock()
            .contacts
            .values()
            .filter(|contact| contact.depth.is_some())
            .cloned()
            .collect())
    }

    async fn find(
        &self,
        project_id: &ProjectId,
        contact_type: ContactType,
    ) -> Result<Option<Contact>, ContactRepositoryError> {
        Ok(self
            .lock()
            .contacts
            .get(&(project_id.clone(), contact_type))
            .cloned())
    }

    async fn remove_delivered(
        &self,
        project_id: &ProjectId,
        contact_type: ContactType,
        delivered: &Credential,
    ) -> Result<bool, ContactRepositoryError> {
        let mut state = self.lock();
        let key = (project_id.clone(), contact_type);
        let matches = state
            .contacts
            .get(&key)
            .is_some_and(|contact| contact.depth.as_ref() == Some(delivered));
        if matches {
            state.contacts.remove(&key);
        }
        Ok(matches)
    }
}

#[async_trait]
impl NotificationWatermarkRepository for MemoryStore {
    async fn load(&self) -> Result<NotificationWatermarks, NotificationWatermarkRepositoryError> {
        Ok(self.watermarks())
    }

    async fn advance(
        &self,
        kind: NotificationKind,
        to: DateTime<Utc>,
    ) -> Result<(), NotificationWatermarkRepositoryError> {
        let mut state = self.lock();
        let slot = match kind {
            NotificationKind::Released => &mut state.watermarks.last_released,
            NotificationKind::Validated => &mut state.watermarks.last_validated,
        };
        if slot.is_none_or(|current| current < to) {
            *slot = Some(to);
        }
        Ok(())
    }
}
