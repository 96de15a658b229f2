//! `Notifier` adapter piping messages into the local `sendmail -t`.
//!
//! One process is spawned per recipient; the MTA resolves routing from the
//! headers. A non-zero exit status is treated as a rejection.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt as _;
use tokio::process::Command;
use tracing::debug;

use crate::domain::ports::{Notifier, NotifierError, OutboundEmail};

const DEFAULT_PROGRAM: &str = "sendmail";
const STDERR_PREVIEW_CHARS: usize = 200;

/// Notifier handing each email to a sendmail-compatible program.
#[derive(Debug, Clone)]
pub struct SendmailNotifier {
    program: String,
    from: String,
}

impl SendmailNotifier {
    /// Notifier using `sendmail` from `PATH` with the given sender address.
    pub fn new(from: impl Into<String>) -> Self {
        Self::with_program(DEFAULT_PROGRAM, from)
    }

    /// Notifier invoking `program` instead of `sendmail`.
    pub fn with_program(program: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl Notifier for SendmailNotifier {
    async fn send(&self, email: &OutboundEmail) -> Result<(), NotifierError> {
        let message = render_message(&self.from, email);
        let mut child = Command::new(&self.program)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| NotifierError::transport(format!("{}: {error}", self.program)))?;

        let Some(mut stdin) = child.stdin.take() else {
            return Err(NotifierError::transport("sendmail stdin was not captured"));
        };
        stdin
            .write_all(message.as_bytes())
            .await
            .map_err(|error| NotifierError::transport(format!("writing message: {error}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|error| NotifierError::transport(format!("waiting for sendmail: {error}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let preview: String = stderr.trim().chars().take(STDERR_PREVIEW_CHARS).collect();
            return Err(NotifierError::rejected(format!("{}: {preview}", output.status)));
        }
        debug!(to = %email.to, "handed message to sendmail");
        Ok(())
    }
}

/// RFC 5322 message text with an HTML body.
fn render_message(from: &str, email: &OutboundEmail) -> String {
    format!(
        "From: {from}\r\nTo: {to}\r\nSubject: {subject}\r\nMIME-Version: 1.0\r\n\
         Content-Type: text/html; charset=utf-8\r\n\r\n{body}\r\n",
        from = header_value(from),
        to = header_value(&email.to),
        subject = header_value(&email.subject),
        body = email.html_body,
    )
}

/// Header values are single-line; embedded line breaks would start new headers.
fn header_value(raw: &str) -> String {
    raw.split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn email() -> OutboundEmail {
        OutboundEmail {
            to: "member@lab.org".to_owned(),
            subject: "The dataset #42 for project 'P100' is ready".to_owned(),
            html_body: "<p>Ready.</p>".to_owned(),
        }
    }

    #[rstest]
    fn message_carries_headers_then_html_body(email: OutboundEmail) {
        let message = render_message("staging@lab.org", &email);

        let (headers, body) = message.split_once("\r\n\r\n").expect("header separator");
        assert_eq!(
            headers.split("\r\n").collect::<Vec<_>>(),
            vec![
                "From: staging@lab.org",
                "To: member@lab.org",
                "Subject: The dataset #42 for project 'P100' is ready",
                "MIME-Version: 1.0",
                "Content-Type: text/html; charset=utf-8",
            ]
        );
        assert_eq!(body, "<p>Ready.</p>\r\n");
    }

    #[rstest]
    fn header_injection_is_flattened(mut email: OutboundEmail) {
        email.to = "member@lab.org\r\nBcc: everyone@lab.org".to_owned();

        let message = render_message("staging@lab.org", &email);

        assert!(message.contains("To: member@lab.org Bcc: everyone@lab.org\r\n"));
        assert!(!message.contains("\r\nBcc:"));
    }

    #[rstest]
    #[tokio::test]
    async fn zero_exit_counts_as_delivered(email: OutboundEmail) {
        let notifier = SendmailNotifier::with_program("cat", "staging@lab.org");

        notifier.send(&email).await.expect("cat accepts the message");
    }

    #[rstest]
    #[tokio::test]
    async fn missing_program_is_a_transport_error(email: OutboundEmail) {
        let notifier =
            SendmailNotifier::with_program("/nonexistent/sendmail", "staging@lab.org");

        let error = notifier.send(&email).await.expect_err("spawn fails");

        assert!(matches!(error, NotifierError::Transport { .. }));
    }
}
