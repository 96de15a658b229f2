//! Service configuration loaded via OrthoConfig.
//!
//! Values come from CLI flags, `STAGING_*` environment variables, or a
//! config file. Connection settings have no defaults and are checked by
//! [`AppSettings::validate`] before anything is started; timings fall back
//! to the defaults below.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::domain::MessageSettings;

const DEFAULT_SFTP_PORT: u16 = 22;
const DEFAULT_TOKEN_REFRESH_MARGIN_SECS: u64 = 90;
const DEFAULT_TOKEN_RETRY_DELAY_SECS: u64 = 3;
const DEFAULT_CONTACT_INTERVAL_SECS: u64 = 60;
const DEFAULT_NOTIFICATION_INTERVAL_SECS: u64 = 3600;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Problems found while validating [`AppSettings`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// A setting without a default was not supplied.
    #[error("missing required setting `{field}`")]
    Missing {
        /// Setting name.
        field: &'static str,
    },
    /// A URL setting could not be parsed.
    #[error("setting `{field}` is not a valid URL: {message}")]
    InvalidUrl {
        /// Setting name.
        field: &'static str,
        /// Parser message.
        message: String,
    },
    /// An interval or timeout was zero.
    #[error("setting `{field}` must be greater than zero")]
    Zero {
        /// Setting name.
        field: &'static str,
    },
}

/// Configuration for the staging background service.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "STAGING")]
pub struct AppSettings {
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Base URL of the LIMS API.
    pub lims_url: Option<String>,
    /// LIMS service account username.
    pub lims_username: Option<String>,
    /// LIMS service account password.
    pub lims_password: Option<String>,
    /// Base URL of the user directory API.
    pub directory_url: Option<String>,
    /// Optional bearer token for the user directory.
    pub directory_token: Option<String>,
    /// Sender address for outbound email.
    pub mail_from: Option<String>,
    /// Support address quoted in every email.
    pub tech_support_email: Option<String>,
    /// Address alerted when project recipients cannot be resolved.
    pub error_monitoring_email: Option<String>,
    /// Recipients of validation notices; comma-separated in the environment.
    pub validation_recipients: Option<Vec<String>>,
    /// SFTP host shown in credentials.
    pub sftp_server: Option<String>,
    /// SFTP port shown in credentials.
    pub sftp_port: Option<u16>,
    /// Globus endpoint shown in credentials.
    pub globus_endpoint: Option<String>,
    /// Seconds before token expiry at which a refresh starts.
    pub token_refresh_margin_secs: Option<u64>,
    /// Seconds between failed login attempts.
    pub token_retry_delay_secs: Option<u64>,
    /// Seconds between contact ticker runs.
    pub contact_interval_secs: Option<u64>,
    /// Seconds between released-feed syncs.
    pub released_interval_secs: Option<u64>,
    /// Seconds between validated-feed syncs.
    pub validated_interval_secs: Option<u64>,
    /// Timeout applied to every outbound HTTP call.
    pub http_timeout_secs: Option<u64>,
}

fn require<'a>(
    field: &'static str,
    value: Option<&'a String>,
) -> Result<&'a str, SettingsError> {
    value
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or(SettingsError::Missing { field })
}

fn parse_url(field: &'static str, value: Option<&String>) -> Result<Url, SettingsError> {
    let raw = require(field, value)?;
    Url::parse(raw).map_err(|err| SettingsError::InvalidUrl {
        field,
        message: err.to_string(),
    })
}

fn seconds(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.unwrap_or(default))
}

impl AppSettings {
    /// Check every required value and reject zero timings.
    ///
    /// # Errors
    /// The first problem found.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.database_url()?;
        self.lims_url()?;
        self.lims_credentials()?;
        self.directory_url()?;
        self.mail_from()?;
        self.tech_support_email()?;
        self.message_settings()?;
        self.validation_recipients()?;

        let timings = [
            ("token_retry_delay_secs", self.token_retry_delay()),
            ("contact_interval_secs", self.contact_interval()),
            ("released_interval_secs", self.released_interval()),
            ("validated_interval_secs", self.validated_interval()),
            ("http_timeout_secs", self.http_timeout()),
        ];
        for (field, value) in timings {
            if value.is_zero() {
                return Err(SettingsError::Zero { field });
            }
        }
        Ok(())
    }

    /// Database connection string.
    pub fn database_url(&self) -> Result<&str, SettingsError> {
        require("database_url", self.database_url.as_ref())
    }

    /// Parsed LIMS base URL.
    pub fn lims_url(&self) -> Result<Url, SettingsError> {
        parse_url("lims_url", self.lims_url.as_ref())
    }

    /// LIMS username and password.
    pub fn lims_credentials(&self) -> Result<(&str, &str), SettingsError> {
        Ok((
            require("lims_username", self.lims_username.as_ref())?,
            require("lims_password", self.lims_password.as_ref())?,
        ))
    }

    /// Parsed user directory base URL.
    pub fn directory_url(&self) -> Result<Url, SettingsError> {
        parse_url("directory_url", self.directory_url.as_ref())
    }

    /// Sender address.
    pub fn mail_from(&self) -> Result<&str, SettingsError> {
        require("mail_from", self.mail_from.as_ref())
    }

    /// Support address.
    pub fn tech_support_email(&self) -> Result<&str, SettingsError> {
        require("tech_support_email", self.tech_support_email.as_ref())
    }

    /// Validation recipients, trimmed, blanks dropped.
    ///
    /// # Errors
    /// `Missing` when no address remains.
    pub fn validation_recipients(&self) -> Result<Vec<String>, SettingsError> {
        let addresses: Vec<String> = self
            .validation_recipients
            .iter()
            .flatten()
            .flat_map(|entry| entry.split(','))
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(str::to_owned)
            .collect();
        if addresses.is_empty() {
            return Err(SettingsError::Missing {
                field: "validation_recipients",
            });
        }
        Ok(addresses)
    }

    /// Values interpolated into outgoing emails.
    pub fn message_settings(&self) -> Result<MessageSettings, SettingsError> {
        Ok(MessageSettings {
            tech_support_email: self.tech_support_email()?.to_owned(),
            sftp_server: require("sftp_server", self.sftp_server.as_ref())?.to_owned(),
            sftp_port: self.sftp_port(),
            globus_endpoint: require("globus_endpoint", self.globus_endpoint.as_ref())?
                .to_owned(),
        })
    }

    /// SFTP port, defaulting to 22.
    pub fn sftp_port(&self) -> u16 {
        self.sftp_port.unwrap_or(DEFAULT_SFTP_PORT)
    }

    /// Refresh margin before token expiry.
    pub fn token_refresh_margin(&self) -> Duration {
        seconds(self.token_refresh_margin_secs, DEFAULT_TOKEN_REFRESH_MARGIN_SECS)
    }

    /// Delay between failed logins.
    pub fn token_retry_delay(&self) -> Duration {
        seconds(self.token_retry_delay_secs, DEFAULT_TOKEN_RETRY_DELAY_SECS)
    }

    /// Contact ticker interval.
    pub fn contact_interval(&self) -> Duration {
        seconds(self.contact_interval_secs, DEFAULT_CONTACT_INTERVAL_SECS)
    }

    /// Released-feed interval.
    pub fn released_interval(&self) -> Duration {
        seconds(self.released_interval_secs, DEFAULT_NOTIFICATION_INTERVAL_SECS)
    }

    /// Validated-feed interval.
    pub fn validated_interval(&self) -> Duration {
        seconds(self.validated_interval_secs, DEFAULT_NOTIFICATION_INTERVAL_SECS)
    }

    /// Outbound HTTP timeout.
    pub fn http_timeout(&self) -> Duration {
        seconds(self.http_timeout_secs, DEFAULT_HTTP_TIMEOUT_SECS)
    }
}
