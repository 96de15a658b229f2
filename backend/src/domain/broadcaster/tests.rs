//! Broadcaster fan-out and failure reporting.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rstest::{fixture, rstest};

use super::*;
use crate::domain::ports::{DirectoryError, MockNotifier};
use crate::domain::{ContactStatus, ContactType, ValidationFlag};
use crate::test_support::{RecordingNotifier, StaticDirectory};

struct Harness {
    notifier: Arc<RecordingNotifier>,
    directory: Arc<StaticDirectory>,
    broadcaster: ContactBroadcaster,
}

fn settings() -> MessageSettings {
    MessageSettings {
        tech_support_email: "support@example.org".to_owned(),
        sftp_server: "sftp.example.org".to_owned(),
        sftp_port: 22,
        globus_endpoint: "example#staging".to_owned(),
    }
}

fn build(directory: StaticDirectory) -> Harness {
    let notifier = Arc::new(RecordingNotifier::default());
    let directory = Arc::new(directory);
    let broadcaster = ContactBroadcaster::new(
        directory.clone(),
        notifier.clone(),
        MessageTemplates::new(settings()),
        Some("alerts@example.org".to_owned()),
    );
    Harness {
        notifier,
        directory,
        broadcaster,
    }
}

#[fixture]
fn harness() -> Harness {
    build(
        StaticDirectory::default()
            .with_project("P1", &["ann@example.org", "ben@example.org"])
            .with_failure("P9", DirectoryError::unavailable("connection refused")),
    )
}

fn contact(project: &str) -> Contact {
    Contact {
        project_id: ProjectId::new(project),
        contact_type: ContactType::Sftp,
        status: ContactStatus::New,
        depth: Some(Credential::new("s3cret")),
    }
}

fn dataset(released: i64) -> LimsDataset {
    LimsDataset {
        id: 7,
        lane: 1,
        project_id: ProjectId::new("P1"),
        project_name: "Cohort".to_owned(),
        run_name: "RUN-1".to_owned(),
        released_status_count: released,
        latest_release_update: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single(),
        latest_validation_update: None,
        validation_status: Some(ValidationFlag::Passed),
        validated_by: Some("val".to_owned()),
        comments: Vec::new(),
    }
}

#[rstest]
#[tokio::test]
async fn credential_reaches_every_project_member(harness: Harness) {
    let report = harness
        .broadcaster
        .send_credential(&contact("P1"), &Credential::new("s3cret"))
        .await;

    assert!(report.is_complete());
    assert_eq!(report.delivered.len(), 2);
    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|email| email.html_body.contains("s3cret")));
}

#[rstest]
#[tokio::test]
async fn one_failed_recipient_marks_report_incomplete(harness: Harness) {
    harness.notifier.fail_for("ben@example.org");

    let report = harness
        .broadcaster
        .send_credential(&contact("P1"), &Credential::new("s3cret"))
        .await;

    assert!(!report.is_complete());
    assert_eq!(report.delivered, vec!["ann@example.org".to_owned()]);
    assert_eq!(report.failed, vec!["ben@example.org".to_owned()]);
}

#[rstest]
#[tokio::test]
async fn unresolved_project_alerts_monitoring_address(harness: Harness) {
    let report = harness
        .broadcaster
        .send_credential(&contact("P9"), &Credential::new("s3cret"))
        .await;

    assert!(report.unresolved);
    assert!(!report.is_complete());
    let alerts = harness.notifier.sent_to("alerts@example.org");
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].subject.contains("P9"));
    assert!(alerts[0].html_body.contains("connection refused"));
    assert!(!alerts[0].html_body.contains("s3cret"));
}

#[rstest]
#[tokio::test]
async fn project_without_members_is_complete_and_sends_nothing(harness: Harness) {
    let report = harness
        .broadcaster
        .send_credential(&contact("P2"), &Credential::new("x"))
        .await;

    assert!(report.is_complete());
    assert!(report.delivered.is_empty());
    assert_eq!(harness.notifier.attempts(), 0);
    assert_eq!(harness.directory.lookups(), 1);
}

#[rstest]
#[tokio::test]
async fn release_without_released_readsets_is_skipped(harness: Harness) {
    let report = harness
        .broadcaster
        .send_dataset_notice(NotificationKind::Released, &dataset(0), &[])
        .await;

    assert!(report.is_complete());
    assert_eq!(harness.directory.lookups(), 0);
    assert_eq!(harness.notifier.attempts(), 0);
}

#[rstest]
#[tokio::test]
async fn validation_goes_to_fixed_recipients_only(harness: Harness) {
    let recipients = vec!["lab@example.org".to_owned()];

    let report = harness
        .broadcaster
        .send_dataset_notice(NotificationKind::Validated, &dataset(3), &recipients)
        .await;

    assert_eq!(report.delivered, recipients);
    assert_eq!(harness.directory.lookups(), 0);
    assert!(harness.notifier.sent()[0].html_body.contains("status Passed"));
}

#[rstest]
#[tokio::test]
async fn empty_fixed_recipient_list_is_unresolved(harness: Harness) {
    let report = harness
        .broadcaster
        .send_dataset_notice(NotificationKind::Validated, &dataset(3), &[])
        .await;

    assert!(report.unresolved);
    assert!(!report.is_complete());
    assert_eq!(harness.notifier.attempts(), 0);
}

#[tokio::test]
async fn missing_monitoring_address_skips_alert() {
    let mut notifier = MockNotifier::new();
    notifier.expect_send().never();
    let broadcaster = ContactBroadcaster::new(
        Arc::new(
            StaticDirectory::default()
                .with_failure("P9", DirectoryError::rejected("no such project")),
        ),
        Arc::new(notifier),
        MessageTemplates::new(settings()),
        None,
    );

    let report = broadcaster
        .broadcast(
            &RecipientGroup::Project(ProjectId::new("P9")),
            &Message {
                subject: "s".to_owned(),
                html_body: "b".to_owned(),
            },
        )
        .await;

    assert!(report.unresolved);
}
