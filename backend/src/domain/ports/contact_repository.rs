//! Port for the credential contact work queue.

use async_trait::async_trait;

use crate::domain::{Contact, ContactType, Credential, ProjectId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by contact repositories.
    pub enum ContactRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "contact repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "contact repository query failed: {message}",
    }
}

/// Port for pending credential deliveries, unique per project and medium.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Enqueue a credential reset.
    ///
    /// Inserts a MODIFIED row or, on conflict, sets the existing row to
    /// MODIFIED and clears its credential. Repeated calls collapse.
    async fn request_reset(
        &self,
        project_id: &ProjectId,
        contact_type: ContactType,
    ) -> Result<Contact, ContactRepositoryError>;

    /// Store a generated credential, making the contact ready.
    ///
    /// Inserts a NEW row when absent; an existing row keeps its status.
    async fn record_credential(
        &self,
        project_id: &ProjectId,
        contact_type: ContactType,
        credential: &Credential,
    ) -> Result<Contact, ContactRepositoryError>;

    /// Contacts whose credential has been generated.
    async fn list_ready(&self) -> Result<Vec<Contact>, ContactRepositoryError>;

    /// Contact for the pair, ready or not.
    async fn find(
        &self,
        project_id: &ProjectId,
        contact_type: ContactType,
    ) -> Result<Option<Contact>, ContactRepositoryError>;

    /// Delete the contact only if it still holds `delivered`.
    ///
    /// Returns `false` when a reset replaced the credential in the meantime.
    async fn remove_delivered(
        &self,
        project_id: &ProjectId,
        contact_type: ContactType,
        delivered: &Credential,
    ) -> Result<bool, ContactRepositoryError>;
}
