//! Reqwest-backed `LimsDatasetSource` adapter.
//!
//! Every call carries the bearer currently held by the token lifecycle
//! manager. A 401 is reported back to the manager so it can re-login; the
//! failed call is not retried here because the next tick polls again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use super::dto::DatasetListDto;
use crate::domain::ports::{BearerTokenProvider, LimsDatasetSource, LimsError};
use crate::domain::{LimsDataset, NotificationKind};
use crate::outbound::http_support::{status_message, with_trailing_slash};

/// Dataset change feeds of one LIMS instance.
pub struct LimsDatasetClient {
    client: Client,
    base: Url,
    tokens: Arc<dyn BearerTokenProvider>,
}

impl LimsDatasetClient {
    /// Build a client for the LIMS at `base`, authenticating with `tokens`.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        base: Url,
        tokens: Arc<dyn BearerTokenProvider>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: with_trailing_slash(base),
            tokens,
        })
    }
}

#[async_trait]
impl LimsDatasetSource for LimsDatasetClient {
    async fn list_changed_since(
        &self,
        kind: NotificationKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<LimsDataset>, LimsError> {
        let token = self.tokens.current_token().ok_or_else(LimsError::missing_token)?;
        let url = feed_url(&self.base, kind, since)?;
        debug!(%kind, %url, "polling LIMS change feed");

        let response = self
            .client
            .get(url)
            .bearer_auth(token.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|error| LimsError::unavailable(error.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| LimsError::unavailable(error.to_string()))?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref(), self.tokens.as_ref()));
        }

        let datasets = parse_datasets(body.as_ref())?;
        Ok(strictly_after(datasets, kind, since))
    }
}

fn feed_url(base: &Url, kind: NotificationKind, since: DateTime<Utc>) -> Result<Url, LimsError> {
    let mut url = base
        .join("datasets/")
        .map_err(|error| LimsError::unavailable(format!("invalid LIMS endpoint: {error}")))?;
    let filter = match kind {
        NotificationKind::Released => "latest_release_update",
        NotificationKind::Validated => "latest_validation_update",
    };
    url.query_pairs_mut()
        .append_pair(filter, &since.to_rfc3339_opts(SecondsFormat::Micros, true));
    Ok(url)
}

fn parse_datasets(body: &[u8]) -> Result<Vec<LimsDataset>, LimsError> {
    let decoded: DatasetListDto = serde_json::from_slice(body)
        .map_err(|error| LimsError::decode(format!("invalid dataset list payload: {error}")))?;
    decoded.into_domain().map_err(LimsError::decode)
}

/// The LIMS filter is inclusive on some deployments, so the boundary record
/// is dropped here.
fn strictly_after(
    datasets: Vec<LimsDataset>,
    kind: NotificationKind,
    since: DateTime<Utc>,
) -> Vec<LimsDataset> {
    datasets
        .into_iter()
        .filter(|dataset| dataset.changed_at(kind).is_some_and(|at| at > since))
        .collect()
}

fn map_status_error(
    status: StatusCode,
    body: &[u8],
    tokens: &dyn BearerTokenProvider,
) -> LimsError {
    let message = status_message(status, body);
    if status == StatusCode::UNAUTHORIZED {
        tokens.report_unauthorized();
        return LimsError::unauthorized(message);
    }
    LimsError::unavailable(message)
}
