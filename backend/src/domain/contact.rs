//! Credential contacts: pending credential deliveries per project and medium.
//!
//! A contact is a work-queue entry. It exists from the moment a credential is
//! requested until that credential has been delivered to every project
//! member, at which point it is deleted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::download::{ProjectId, TransferType, UnknownLabel};

/// Transfer media that need a project credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContactType {
    /// SFTP account.
    Sftp,
    /// Globus account.
    Globus,
}

impl ContactType {
    /// Stored label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sftp => "SFTP",
            Self::Globus => "GLOBUS",
        }
    }
}

impl fmt::Display for ContactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactType {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SFTP" => Ok(Self::Sftp),
            "GLOBUS" => Ok(Self::Globus),
            other => Err(UnknownLabel::new("contact type", other)),
        }
    }
}

impl TryFrom<TransferType> for ContactType {
    type Error = UnknownLabel;

    fn try_from(value: TransferType) -> Result<Self, Self::Error> {
        match value {
            TransferType::Sftp => Ok(Self::Sftp),
            TransferType::Globus => Ok(Self::Globus),
            TransferType::Http => Err(UnknownLabel::new("contact type", value.as_str())),
        }
    }
}

/// Whether the credential is a first issue or a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContactStatus {
    /// First credential for the project on this medium.
    New,
    /// Replacement credential after a password reset.
    Modified,
}

impl ContactStatus {
    /// Stored label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Modified => "MODIFIED",
        }
    }
}

impl FromStr for ContactStatus {
    type Err = UnknownLabel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "NEW" => Ok(Self::New),
            "MODIFIED" => Ok(Self::Modified),
            other => Err(UnknownLabel::new("contact status", other)),
        }
    }
}

/// Generated credential awaiting delivery.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a generated secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Expose the secret for rendering or storage.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// A pending credential delivery, unique per `(project_id, contact_type)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    /// Project the credential grants access to.
    pub project_id: ProjectId,
    /// Medium the credential is for.
    pub contact_type: ContactType,
    /// First issue or reset.
    pub status: ContactStatus,
    /// Generated credential; `None` while generation is still pending.
    pub depth: Option<Credential>,
}

impl Contact {
    /// Credential ready for broadcast, if generation has finished.
    pub fn ready_credential(&self) -> Option<&Credential> {
        self.depth.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn credential_debug_is_redacted() {
        let contact = Contact {
            project_id: ProjectId::new("P1"),
            contact_type: ContactType::Sftp,
            status: ContactStatus::New,
            depth: Some(Credential::new("hunter2")),
        };
        let rendered = format!("{contact:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[rstest]
    #[case(TransferType::Sftp, Some(ContactType::Sftp))]
    #[case(TransferType::Globus, Some(ContactType::Globus))]
    #[case(TransferType::Http, None)]
    fn only_credentialed_media_map_to_contacts(
        #[case] transfer: TransferType,
        #[case] expected: Option<ContactType>,
    ) {
        assert_eq!(ContactType::try_from(transfer).ok(), expected);
    }

    #[rstest]
    fn pending_contact_is_not_ready() {
        let contact = Contact {
            project_id: ProjectId::new("P1"),
            contact_type: ContactType::Globus,
            status: ContactStatus::Modified,
            depth: None,
        };
        assert!(contact.ready_credential().is_none());
    }
}
