//! Port for obtaining LIMS bearer tokens.

use async_trait::async_trait;

use crate::domain::{RefreshToken, TokenPair};

use super::LimsError;

/// Port issuing LIMS tokens with the service account credentials.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LimsAuthSource: Send + Sync {
    /// Full login with the configured account.
    async fn login(&self) -> Result<TokenPair, LimsError>;

    /// Exchange `refresh` for a fresh token pair.
    async fn refresh(&self, refresh: &RefreshToken) -> Result<TokenPair, LimsError>;
}
