//! DTOs for decoding directory replies.

use serde::Deserialize;

/// Envelope wrapping every directory reply.
#[derive(Debug, Deserialize)]
pub(super) struct ReplyDto {
    pub(super) ok: OkFlag,
    pub(super) data: Option<ProjectUsersDto>,
    pub(super) message: Option<String>,
}

/// The portal has shipped `ok` both as a boolean and as `"true"`/`"false"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum OkFlag {
    Bool(bool),
    Text(String),
}

impl OkFlag {
    pub(super) fn is_ok(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Text(value) => value.eq_ignore_ascii_case("true"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ProjectUsersDto {
    #[serde(default)]
    pub(super) users: Vec<ProjectUserDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProjectUserDto {
    pub(super) email: Option<String>,
}

impl ProjectUsersDto {
    /// Distinct, non-blank addresses in reply order.
    pub(super) fn into_addresses(self) -> Vec<String> {
        let mut addresses: Vec<String> = Vec::with_capacity(self.users.len());
        for email in self.users.into_iter().filter_map(|user| user.email) {
            let email = email.trim();
            if email.is_empty() || addresses.iter().any(|known| known.eq_ignore_ascii_case(email)) {
                continue;
            }
            addresses.push(email.to_owned());
        }
        addresses
    }
}
