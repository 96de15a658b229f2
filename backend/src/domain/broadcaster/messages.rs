//! Email templates for credentials, staging outcomes, and LIMS changes.
//!
//! Interpolated values are HTML-escaped; the surrounding markup is fixed.

use chrono::{DateTime, Utc};

use crate::domain::{
    Contact, ContactStatus, ContactType, Credential, DownloadRequest, LimsDataset, ProjectId,
    StatusNotice,
};

/// A rendered subject and HTML body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html_body: String,
}

/// Site-specific values interpolated into every template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSettings {
    /// Address users are told to contact for help.
    pub tech_support_email: String,
    /// SFTP host shown in SFTP credentials.
    pub sftp_server: String,
    /// SFTP port shown in SFTP credentials.
    pub sftp_port: u16,
    /// Globus endpoint shown in Globus credentials.
    pub globus_endpoint: String,
}

/// Renders every outbound message kind.
#[derive(Debug, Clone)]
pub struct MessageTemplates {
    settings: MessageSettings,
}

impl MessageTemplates {
    /// Templates using `settings`.
    pub fn new(settings: MessageSettings) -> Self {
        Self { settings }
    }

    fn closing(&self) -> String {
        format!(
            "If you have any issues please contact us at {}.<br/><br/>Thank you.<br/>",
            escape(&self.settings.tech_support_email)
        )
    }

    /// New or reset credential for a project account.
    pub fn credential(&self, contact: &Contact, credential: &Credential) -> Message {
        let project = escape(contact.project_id.as_str());
        let medium = contact.contact_type.as_str();
        let subject = match contact.status {
            ContactStatus::New => {
                format!("Credentials for project {} through {medium}", contact.project_id)
            }
            ContactStatus::Modified => {
                format!("Password reset for project {} through {medium}", contact.project_id)
            }
        };
        let (account, opening) = match contact.contact_type {
            ContactType::Globus => ("Globus", "Endpoint"),
            ContactType::Sftp => ("SFTP", "Server"),
        };
        let headline = match contact.status {
            ContactStatus::New => {
                format!("A new {account} account has been created for the project {project}.")
            }
            ContactStatus::Modified => {
                format!("The {account} password has been reset for the project {project}.")
            }
        };

        let mut body = format!("Hello,<br/><br/>{headline}<br/><br/>");
        match contact.contact_type {
            ContactType::Globus => {
                body.push_str(&format!(
                    "{opening}: <b>{}</b><br/>",
                    escape(&self.settings.globus_endpoint)
                ));
            }
            ContactType::Sftp => {
                body.push_str(&format!(
                    "{opening}: <b>{}</b><br/>Port: <b>{}</b><br/>",
                    escape(&self.settings.sftp_server),
                    self.settings.sftp_port
                ));
            }
        }
        body.push_str(&format!(
            "Username: <b>{project}</b><br/>Password: <b>{}</b><br/><br/>{}",
            escape(credential.expose()),
            self.closing()
        ));

        Message {
            subject,
            html_body: body,
        }
    }

    /// Outcome of a staging request.
    pub fn status_notice(&self, request: &DownloadRequest, notice: StatusNotice) -> Message {
        let dataset = escape(request.dataset_id.as_str());
        let project = escape(request.project_id.as_str());
        match notice {
            StatusNotice::Succeeded => {
                let subject = format!(
                    "The dataset #{} for project '{}' is ready",
                    request.dataset_id, request.project_id
                );
                let html_body = format!(
                    "The dataset #{dataset} for project '{project}' is ready.<br/>\
                     The dataset can be downloaded using {} with the credential provided \
                     to you.<br/>If you forgot your credential or did not receive it, you \
                     can reset your password in the data portal.<br/><br/>{}",
                    request.transfer_type,
                    self.closing()
                );
                Message { subject, html_body }
            }
            StatusNotice::Failed => {
                let subject = format!(
                    "The dataset #{} for project '{}' failed to be staged",
                    request.dataset_id, request.project_id
                );
                let html_body = format!(
                    "The dataset #{dataset} for project '{project}' failed to be \
                     staged.<br/><br/>{}",
                    self.closing()
                );
                Message { subject, html_body }
            }
        }
    }

    /// Dataset released in the LIMS and now available for staging.
    pub fn release(&self, dataset: &LimsDataset) -> Message {
        let subject = format!(
            "The dataset for project '{}' (Dataset #{}) is now ready for staging and then download",
            dataset.project_id, dataset.id
        );
        let released_at = dataset
            .latest_release_update
            .map_or_else(|| "unknown".to_owned(), format_utc);
        let html_body = format!(
            "{}.<br/><br/>\
             - <b>Project ID: {}</b><br/>\
             - <b>Run Name: {}</b><br/>\
             - <b>Dataset ID: {}</b><br/>\
             - Dataset Lane: {}<br/>\
             - Dataset release time: {released_at} (UTC)<br/><br/>\
             Datasets can be downloaded from the data portal via SFTP or Globus using the \
             credentials provided during staging.<br/>If you forgot or did not receive your \
             credential, you can reset your password in the data portal.<br/><br/>{}",
            escape(&subject),
            escape(dataset.project_id.as_str()),
            escape(&dataset.run_name),
            dataset.id,
            dataset.lane,
            self.closing()
        );
        Message { subject, html_body }
    }

    /// Lane validation status change, for the validation recipients.
    pub fn validation(&self, dataset: &LimsDataset) -> Message {
        let status = dataset
            .validation_status
            .map_or("Unknown", |flag| flag.label());
        let mut body = format!(
            "A run has been validated:<br/><br/>\
             - Run Name: {}<br/>\
             - Validated by: {}<br/>\
             - Project: {} {}<br/>\
             - Dataset/lane {} status {status}<br/>",
            escape(&dataset.run_name),
            escape(dataset.validated_by.as_deref().unwrap_or("")),
            escape(&dataset.project_name),
            escape(dataset.project_id.as_str()),
            dataset.lane,
        );
        match dataset.latest_comment() {
            Some(comment) => {
                body.push_str(&format!(
                    "- Comments: {}<br/>- Comment left by user #{}<br/>- Created at: {}<br/>",
                    escape(&comment.comment),
                    comment.created_by,
                    format_utc(comment.created_at)
                ));
            }
            None => body.push_str("No comments<br/>"),
        }
        body.push_str("<br/>Thank you.<br/>This is an automated email, do not reply.<br/>");
        Message {
            subject: format!("A run has been validated: {}", dataset.run_name),
            html_body: body,
        }
    }

    /// Alert sent to the monitoring address when recipients cannot be resolved.
    pub fn directory_alert(&self, project_id: &ProjectId, cause: &str) -> Message {
        Message {
            subject: format!("Error while getting emails for project with ID {project_id}"),
            html_body: format!(
                "ProjectID: {}<br/><pre>{}</pre>",
                escape(project_id.as_str()),
                escape(cause)
            ),
        }
    }
}

fn format_utc(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S").to_string()
}

/// Escape text for inclusion in HTML.
pub(crate) fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
