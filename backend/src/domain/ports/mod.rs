//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod bearer_token;
mod contact_repository;
mod download_request_repository;
mod lims_auth_source;
mod lims_dataset_source;
mod lims_error;
mod notification_watermark_repository;
mod notifier;
mod recipient_directory;

#[cfg(test)]
pub use bearer_token::MockBearerTokenProvider;
pub use bearer_token::BearerTokenProvider;
#[cfg(test)]
pub use contact_repository::MockContactRepository;
pub use contact_repository::{ContactRepository, ContactRepositoryError};
#[cfg(test)]
pub use download_request_repository::MockDownloadRequestRepository;
pub use download_request_repository::{DownloadRequestRepository, DownloadRequestRepositoryError};
#[cfg(test)]
pub use lims_auth_source::MockLimsAuthSource;
pub use lims_auth_source::LimsAuthSource;
#[cfg(test)]
pub use lims_dataset_source::MockLimsDatasetSource;
pub use lims_dataset_source::LimsDatasetSource;
pub use lims_error::LimsError;
#[cfg(test)]
pub use notification_watermark_repository::MockNotificationWatermarkRepository;
pub use notification_watermark_repository::{
    NotificationWatermarkRepository, NotificationWatermarkRepositoryError,
};
#[cfg(test)]
pub use notifier::MockNotifier;
pub use notifier::{Notifier, NotifierError, OutboundEmail};
#[cfg(test)]
pub use recipient_directory::MockRecipientDirectory;
pub use recipient_directory::{DirectoryError, RecipientDirectory};
