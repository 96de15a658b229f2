//! Error type shared by the LIMS ports.

use crate::domain::StagingError;

use super::define_port_error;

define_port_error! {
    /// Errors raised by LIMS adapters.
    pub enum LimsError {
        /// No bearer token is currently available.
        MissingToken => "no LIMS access token available",
        /// The LIMS rejected the credentials or bearer token.
        Unauthorized { message: String } => "LIMS rejected credentials: {message}",
        /// Network failure, timeout, or a non-success status.
        Unavailable { message: String } => "LIMS request failed: {message}",
        /// The response body could not be decoded.
        Decode { message: String } => "LIMS response could not be decoded: {message}",
    }
}

impl From<LimsError> for StagingError {
    fn from(value: LimsError) -> Self {
        match value {
            LimsError::MissingToken => Self::auth_failure(value.to_string()),
            LimsError::Unauthorized { .. }
            | LimsError::Unavailable { .. }
            | LimsError::Decode { .. } => Self::upstream_unavailable(value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use rstest::rstest;

    #[rstest]
    #[case(LimsError::missing_token(), ErrorCode::AuthFailure)]
    #[case(LimsError::unauthorized("401"), ErrorCode::UpstreamUnavailable)]
    #[case(LimsError::unavailable("timeout"), ErrorCode::UpstreamUnavailable)]
    #[case(LimsError::decode("bad json"), ErrorCode::UpstreamUnavailable)]
    fn lims_errors_map_to_staging_codes(#[case] error: LimsError, #[case] code: ErrorCode) {
        assert_eq!(StagingError::from(error).code(), code);
    }
}
