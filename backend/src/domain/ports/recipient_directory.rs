//! Port resolving project members' email addresses.

use async_trait::async_trait;

use crate::domain::ProjectId;

use super::define_port_error;

define_port_error! {
    /// Errors raised by user directory adapters.
    pub enum DirectoryError {
        /// Network failure, timeout, or a non-success status.
        Unavailable { message: String } => "user directory request failed: {message}",
        /// The directory answered but reported failure.
        Rejected { message: String } => "user directory rejected lookup: {message}",
        /// The response body could not be decoded.
        Decode { message: String } => "user directory response could not be decoded: {message}",
    }
}

/// Port listing the addresses of a project's members.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Email addresses of every member of `project_id`.
    async fn project_recipients(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<String>, DirectoryError>;
}
