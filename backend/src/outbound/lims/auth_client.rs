//! Reqwest-backed `LimsAuthSource` adapter.
//!
//! Logs in with the service account and exchanges refresh tokens. Expiry is
//! taken from the returned access token rather than from local clocks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

use super::dto::{LoginRequestDto, RefreshRequestDto, TokenResponseDto};
use super::jwt;
use crate::domain::ports::{LimsAuthSource, LimsError};
use crate::domain::{AccessToken, RefreshToken, TokenPair};
use crate::outbound::http_support::{status_message, with_trailing_slash};

/// Token endpoints of one LIMS instance.
pub struct LimsAuthClient {
    client: Client,
    base: Url,
    username: String,
    password: String,
}

impl LimsAuthClient {
    /// Build a client for the LIMS at `base` with the service account.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        base: Url,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: with_trailing_slash(base),
            username: username.into(),
            password: password.into(),
        })
    }

    async fn post_for_tokens<B>(&self, path: &str, body: &B) -> Result<TokenPair, LimsError>
    where
        B: serde::Serialize + Sync,
    {
        let endpoint = self
            .base
            .join(path)
            .map_err(|error| LimsError::unavailable(format!("invalid LIMS endpoint: {error}")))?;
        let response = self
            .client
            .post(endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        parse_tokens(body.as_ref())
    }
}

#[async_trait]
impl LimsAuthSource for LimsAuthClient {
    async fn login(&self) -> Result<TokenPair, LimsError> {
        let body = LoginRequestDto {
            username: &self.username,
            password: &self.password,
        };
        self.post_for_tokens("token/", &body).await
    }

    async fn refresh(&self, refresh: &RefreshToken) -> Result<TokenPair, LimsError> {
        let body = RefreshRequestDto {
            refresh: refresh.expose(),
        };
        self.post_for_tokens("token/refresh/", &body).await
    }
}

fn parse_tokens(body: &[u8]) -> Result<TokenPair, LimsError> {
    let decoded: TokenResponseDto = serde_json::from_slice(body)
        .map_err(|error| LimsError::decode(format!("invalid token payload: {error}")))?;
    let expires_at = jwt::expiry(&decoded.access).map_err(LimsError::decode)?;
    Ok(TokenPair {
        access: AccessToken::new(decoded.access),
        refresh: RefreshToken::new(decoded.refresh),
        expires_at,
    })
}

fn map_transport_error(error: reqwest::Error) -> LimsError {
    LimsError::unavailable(error.to_string())
}

fn map_status_error(status: StatusCode, body: &[u8]) -> LimsError {
    let message = status_message(status, body);
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LimsError::unauthorized(message)
        }
        _ => LimsError::unavailable(message),
    }
}

#[cfg(test)]
mod tests {
    //! Coverage for the non-network token helpers.

    use super::*;
    use chrono::{DateTime, Utc};
    use rstest::rstest;

    #[rstest]
    fn parses_token_pair_with_jwt_expiry() {
        let access = jwt::forge(r#"{"exp":1767614400}"#);
        let body = format!(r#"{{"access":"{access}","refresh":"refresh-1"}}"#);

        let pair = parse_tokens(body.as_bytes()).expect("tokens decode");

        assert_eq!(pair.access.expose(), access);
        assert_eq!(pair.refresh.expose(), "refresh-1");
        assert_eq!(
            pair.expires_at,
            DateTime::<Utc>::from_timestamp(1_767_614_400, 0).expect("in range")
        );
    }

    #[rstest]
    #[case::missing_refresh(r#"{"access":"a.b.c"}"#)]
    #[case::opaque_access(r#"{"access":"opaque","refresh":"r"}"#)]
    #[case::not_json("<html>")]
    fn malformed_token_payloads_are_decode_errors(#[case] body: &str) {
        let error = parse_tokens(body.as_bytes()).expect_err("decode should fail");
        assert!(matches!(error, LimsError::Decode { .. }));
    }

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED, true)]
    #[case(StatusCode::BAD_REQUEST, true)]
    #[case(StatusCode::FORBIDDEN, true)]
    #[case(StatusCode::BAD_GATEWAY, false)]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, false)]
    fn rejected_credentials_are_distinguished_from_outages(
        #[case] status: StatusCode,
        #[case] unauthorized: bool,
    ) {
        let error = map_status_error(status, br#"{"detail":"No active account"}"#);
        assert_eq!(matches!(error, LimsError::Unauthorized { .. }), unauthorized);
        assert!(error.to_string().contains("No active account"));
    }
}
