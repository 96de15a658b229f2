//! Port giving outbound LIMS calls access to the current bearer token.

use crate::domain::AccessToken;

/// Source of the bearer token attached to authenticated LIMS calls.
///
/// Both operations return immediately; neither waits on the network.
#[cfg_attr(test, mockall::automock)]
pub trait BearerTokenProvider: Send + Sync {
    /// Current token, or `None` while no valid token is held.
    fn current_token(&self) -> Option<AccessToken>;

    /// Signal that the LIMS answered 401 to a call using the current token.
    fn report_unauthorized(&self);
}
