//! Port for the notification watermark singleton.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{NotificationKind, NotificationWatermarks};

use super::define_port_error;

define_port_error! {
    /// Errors raised by watermark repositories.
    pub enum NotificationWatermarkRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "watermark repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "watermark repository query failed: {message}",
    }
}

/// Port for reading and advancing the change-feed watermarks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationWatermarkRepository: Send + Sync {
    /// Current watermarks; both absent before the first seed.
    async fn load(&self) -> Result<NotificationWatermarks, NotificationWatermarkRepositoryError>;

    /// Move the watermark for `kind` to `to` unless it is already at or past it.
    async fn advance(
        &self,
        kind: NotificationKind,
        to: DateTime<Utc>,
    ) -> Result<(), NotificationWatermarkRepositoryError>;
}
