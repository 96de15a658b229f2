//! Reqwest-backed `RecipientDirectory` adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use super::dto::ReplyDto;
use crate::domain::ProjectId;
use crate::domain::ports::{DirectoryError, RecipientDirectory};
use crate::outbound::http_support::{status_message, with_trailing_slash};

/// Directory adapter performing one GET per lookup.
pub struct DirectoryHttpClient {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl DirectoryHttpClient {
    /// Build a client for the directory at `base`.
    ///
    /// `token`, when set, is sent as a bearer on every lookup.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        base: Url,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: with_trailing_slash(base),
            token,
        })
    }
}

#[async_trait]
impl RecipientDirectory for DirectoryHttpClient {
    async fn project_recipients(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<String>, DirectoryError> {
        let url = lookup_url(&self.base, project_id)?;
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|error| DirectoryError::unavailable(error.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| DirectoryError::unavailable(error.to_string()))?;
        if !status.is_success() {
            return Err(DirectoryError::unavailable(status_message(status, body.as_ref())));
        }
        parse_recipients(body.as_ref())
    }
}

fn lookup_url(base: &Url, project_id: &ProjectId) -> Result<Url, DirectoryError> {
    let mut url = base.join("projectUsers/").map_err(|error| {
        DirectoryError::unavailable(format!("invalid directory endpoint: {error}"))
    })?;
    url.query_pairs_mut().append_pair("projectId", project_id.as_str());
    Ok(url)
}

fn parse_recipients(body: &[u8]) -> Result<Vec<String>, DirectoryError> {
    let reply: ReplyDto = serde_json::from_slice(body)
        .map_err(|error| DirectoryError::decode(format!("invalid directory reply: {error}")))?;
    if !reply.ok.is_ok() {
        return Err(DirectoryError::rejected(
            reply.message.unwrap_or_else(|| "no error message".to_owned()),
        ));
    }
    let Some(data) = reply.data else {
        return Err(DirectoryError::decode("reply was ok but carried no data"));
    };
    Ok(data.into_addresses())
}
