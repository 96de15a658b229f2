//! Domain-level error types.
//!
//! These errors are transport agnostic. The request-handling layer maps them
//! to HTTP responses using [`ErrorCode::http_status`]; background loops log
//! them and retry on their own schedule.

use serde::Serialize;
use serde_json::Value;

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request is malformed or fails validation.
    InvalidRequest,
    /// The requested resource does not exist.
    NotFound,
    /// The request collides with existing live state.
    Conflict,
    /// The LIMS answered with a failure while a token was available.
    UpstreamUnavailable,
    /// No LIMS token could be obtained for the call.
    AuthFailure,
    /// An unexpected error occurred inside the domain or a store.
    InternalError,
}

impl ErrorCode {
    /// HTTP status the request-handling layer should answer with.
    ///
    /// # Examples
    /// ```
    /// use staging_backend::domain::ErrorCode;
    ///
    /// assert_eq!(ErrorCode::Conflict.http_status(), 409);
    /// assert_eq!(ErrorCode::AuthFailure.http_status(), 503);
    /// ```
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::UpstreamUnavailable => 502,
            Self::AuthFailure => 503,
            Self::InternalError => 500,
        }
    }

    fn fallback_message(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid request",
            Self::NotFound => "not found",
            Self::Conflict => "conflicting request",
            Self::UpstreamUnavailable => "upstream service unavailable",
            Self::AuthFailure => "upstream authentication unavailable",
            Self::InternalError => "internal error",
        }
    }
}

/// Error surfaced by staging operations.
///
/// ## Invariants
/// - `message` is never blank; [`StagingError::new`] substitutes a
///   per-code default when given whitespace.
///
/// # Examples
/// ```
/// use staging_backend::domain::{ErrorCode, StagingError};
///
/// let err = StagingError::new(ErrorCode::NotFound, "  ");
/// assert_eq!(err.message(), "not found");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingError {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl StagingError {
    /// Build an error with `code` and `message`.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            code.fallback_message().to_owned()
        } else {
            message
        };
        Self {
            code,
            message,
            details: None,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Structured context attached by the raising operation.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Attach structured details to the error.
    ///
    /// # Examples
    /// ```
    /// use staging_backend::domain::StagingError;
    /// use serde_json::json;
    ///
    /// let err = StagingError::conflict("duplicate").with_details(json!({ "datasetId": "42" }));
    /// assert!(err.details().is_some());
    /// ```
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Convenience constructor for [`ErrorCode::InvalidRequest`].
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Convenience constructor for [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Convenience constructor for [`ErrorCode::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Convenience constructor for [`ErrorCode::UpstreamUnavailable`].
    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnavailable, message)
    }

    /// Convenience constructor for [`ErrorCode::AuthFailure`].
    pub fn auth_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthFailure, message)
    }

    /// Convenience constructor for [`ErrorCode::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl std::fmt::Display for StagingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StagingError {}

/// Result alias for staging operations.
pub type StagingResult<T> = Result<T, StagingError>;

#[cfg(test)]
mod tests {
    //! Coverage for the error envelope and its HTTP mapping.

    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::invalid(ErrorCode::InvalidRequest, 400)]
    #[case::not_found(ErrorCode::NotFound, 404)]
    #[case::conflict(ErrorCode::Conflict, 409)]
    #[case::upstream(ErrorCode::UpstreamUnavailable, 502)]
    #[case::auth(ErrorCode::AuthFailure, 503)]
    #[case::internal(ErrorCode::InternalError, 500)]
    fn codes_map_to_http_statuses(#[case] code: ErrorCode, #[case] status: u16) {
        assert_eq!(code.http_status(), status);
    }

    #[rstest]
    fn blank_messages_fall_back_to_code_default() {
        let err = StagingError::auth_failure("\t ");
        assert_eq!(err.message(), "upstream authentication unavailable");
        assert_eq!(err.code(), ErrorCode::AuthFailure);
    }

    #[rstest]
    fn serialises_as_camel_case_envelope() {
        let error = StagingError::conflict("a live request already exists")
            .with_details(json!({ "datasetId": "42" }));

        let value = serde_json::to_value(&error).expect("error serialises");
        assert_eq!(
            value,
            json!({
                "code": "conflict",
                "message": "a live request already exists",
                "details": { "datasetId": "42" },
            })
        );
    }

    #[rstest]
    fn details_are_omitted_when_absent() {
        let value = serde_json::to_value(StagingError::not_found("gone")).expect("serialises");
        assert_eq!(value, json!({ "code": "not_found", "message": "gone" }));
    }
}
