//! Port delivering one email to one recipient.

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors raised by notifier adapters.
    pub enum NotifierError {
        /// The mail transport could not be started.
        Transport { message: String } => "mail transport unavailable: {message}",
        /// The transport ran but refused the message.
        Rejected { message: String } => "mail transport rejected message: {message}",
    }
}

/// A rendered HTML email addressed to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html_body: String,
}

/// Port sending emails, one recipient per call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `email`; outcomes are independent per call.
    async fn send(&self, email: &OutboundEmail) -> Result<(), NotifierError>;
}
