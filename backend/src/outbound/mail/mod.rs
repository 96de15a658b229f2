//! Mail outbound adapter.

mod sendmail;

pub use sendmail::SendmailNotifier;
