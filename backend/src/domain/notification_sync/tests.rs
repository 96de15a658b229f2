//! Watermark advancement and redelivery behaviour.

use std::sync::Arc;

use chrono::{TimeDelta, TimeZone, Utc};
use rstest::{fixture, rstest};

use super::*;
use crate::domain::ports::LimsError;
use crate::domain::{
    ErrorCode, MessageSettings, MessageTemplates, NotificationWatermarks, ProjectId,
    ValidationFlag,
};
use crate::test_support::{
    MemoryStore, MutableClock, RecordingNotifier, ScriptedDatasetSource, StaticDirectory,
};

struct Harness {
    store: Arc<MemoryStore>,
    source: Arc<ScriptedDatasetSource>,
    notifier: Arc<RecordingNotifier>,
    ports: NotificationSyncPorts,
}

fn watermark() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn minutes_after(minutes: i64) -> DateTime<Utc> {
    watermark() + TimeDelta::minutes(minutes)
}

#[fixture]
fn harness() -> Harness {
    let store = Arc::new(MemoryStore::default());
    store.set_watermarks(NotificationWatermarks {
        last_released: Some(watermark()),
        last_validated: Some(watermark()),
    });
    let source = Arc::new(ScriptedDatasetSource::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let directory = StaticDirectory::default()
        .with_project("P1", &["ann@example.org", "ben@example.org"])
        .with_project("P2", &["cat@example.org"]);
    let broadcaster = Arc::new(ContactBroadcaster::new(
        Arc::new(directory),
        notifier.clone(),
        MessageTemplates::new(MessageSettings {
            tech_support_email: "support@example.org".to_owned(),
            sftp_server: "sftp.example.org".to_owned(),
            sftp_port: 22,
            globus_endpoint: "example#staging".to_owned(),
        }),
        None,
    ));
    let ports = NotificationSyncPorts {
        watermarks: store.clone(),
        source: source.clone(),
        broadcaster,
        clock: Arc::new(MutableClock::new(minutes_after(600))),
    };
    Harness {
        store,
        source,
        notifier,
        ports,
    }
}

fn released(id: i64, project: &str, at: DateTime<Utc>) -> LimsDataset {
    LimsDataset {
        id,
        lane: 1,
        project_id: ProjectId::new(project),
        project_name: format!("Project {project}"),
        run_name: format!("RUN-{id}"),
        released_status_count: 2,
        latest_release_update: Some(at),
        latest_validation_update: None,
        validation_status: None,
        validated_by: None,
        comments: Vec::new(),
    }
}

#[rstest]
#[tokio::test]
async fn missing_watermark_is_seeded_without_polling(harness: Harness) {
    harness.store.set_watermarks(NotificationWatermarks::default());
    let job = NotificationSyncJob::released(harness.ports.clone());

    let outcome = job.sync_once().await.expect("sync succeeds");

    assert_eq!(outcome, SyncOutcome::Seeded { at: minutes_after(600) });
    assert_eq!(harness.store.watermarks().last_released, Some(minutes_after(600)));
    assert!(harness.source.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn same_instant_records_are_processed_together(harness: Harness) {
    let t = minutes_after(5);
    harness.source.push(
        NotificationKind::Released,
        Ok(vec![released(2, "P2", t), released(1, "P1", t)]),
    );
    let job = NotificationSyncJob::released(harness.ports.clone());

    let outcome = job.sync_once().await.expect("sync succeeds");

    assert_eq!(
        outcome,
        SyncOutcome::Processed {
            delivered: 2,
            advanced_to: Some(t),
            complete: true,
        }
    );
    assert_eq!(harness.notifier.sent().len(), 3);
    assert_eq!(harness.store.watermarks().last_released, Some(t));
    assert_eq!(
        harness.source.calls(),
        vec![(NotificationKind::Released, watermark())]
    );
}

#[rstest]
#[tokio::test]
async fn partial_failure_holds_watermark_and_next_tick_redelivers(harness: Harness) {
    let t = minutes_after(5);
    let batch = vec![released(1, "P1", t)];
    harness
        .source
        .push(NotificationKind::Released, Ok(batch.clone()));
    harness.source.push(NotificationKind::Released, Ok(batch));
    harness.notifier.fail_for("ben@example.org");
    let job = NotificationSyncJob::released(harness.ports.clone());

    let first = job.sync_once().await.expect("sync succeeds");
    assert_eq!(
        first,
        SyncOutcome::Processed {
            delivered: 0,
            advanced_to: None,
            complete: false,
        }
    );
    assert_eq!(harness.store.watermarks().last_released, Some(watermark()));

    harness.notifier.recover();
    job.sync_once().await.expect("sync succeeds");

    assert_eq!(harness.notifier.sent_to("ann@example.org").len(), 2);
    assert_eq!(harness.notifier.sent_to("ben@example.org").len(), 1);
    assert_eq!(harness.store.watermarks().last_released, Some(t));
    assert_eq!(
        harness.source.calls(),
        vec![
            (NotificationKind::Released, watermark()),
            (NotificationKind::Released, watermark()),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn failure_in_later_group_keeps_earlier_progress(harness: Harness) {
    let (t1, t2, t3) = (minutes_after(1), minutes_after(2), minutes_after(3));
    harness.source.push(
        NotificationKind::Released,
        Ok(vec![
            released(3, "P2", t3),
            released(1, "P2", t1),
            released(2, "P1", t2),
        ]),
    );
    harness.notifier.fail_for("ben@example.org");
    let job = NotificationSyncJob::released(harness.ports.clone());

    let outcome = job.sync_once().await.expect("sync succeeds");

    assert_eq!(
        outcome,
        SyncOutcome::Processed {
            delivered: 1,
            advanced_to: Some(t1),
            complete: false,
        }
    );
    assert_eq!(harness.store.watermarks().last_released, Some(t1));
    let subjects: Vec<_> = harness
        .notifier
        .sent_to("cat@example.org")
        .into_iter()
        .map(|email| email.subject)
        .collect();
    assert_eq!(subjects.len(), 1, "dataset 3 is not attempted after the failure");
    assert!(subjects[0].contains("Dataset #1"));
}

#[rstest]
#[tokio::test]
async fn unreleased_dataset_advances_without_email(harness: Harness) {
    let t = minutes_after(9);
    let mut dataset = released(4, "P1", t);
    dataset.released_status_count = 0;
    harness
        .source
        .push(NotificationKind::Released, Ok(vec![dataset]));
    let job = NotificationSyncJob::released(harness.ports.clone());

    job.sync_once().await.expect("sync succeeds");

    assert_eq!(harness.notifier.attempts(), 0);
    assert_eq!(harness.store.watermarks().last_released, Some(t));
}

#[rstest]
#[tokio::test]
async fn records_at_or_before_watermark_are_ignored(harness: Harness) {
    harness.source.push(
        NotificationKind::Released,
        Ok(vec![released(1, "P1", watermark()), released(2, "P1", minutes_after(-3))]),
    );
    let job = NotificationSyncJob::released(harness.ports.clone());

    let outcome = job.sync_once().await.expect("sync succeeds");

    assert_eq!(outcome, SyncOutcome::UpToDate);
    assert_eq!(harness.notifier.attempts(), 0);
}

#[rstest]
#[tokio::test]
async fn validated_feed_uses_its_own_watermark_and_recipients(harness: Harness) {
    let t = minutes_after(30);
    let mut dataset = released(5, "P1", minutes_after(1));
    dataset.latest_validation_update = Some(t);
    dataset.validation_status = ValidationFlag::from_code(1);
    harness
        .source
        .push(NotificationKind::Validated, Ok(vec![dataset]));
    let job = NotificationSyncJob::validated(
        harness.ports.clone(),
        vec!["lab@example.org".to_owned()],
    );

    job.sync_once().await.expect("sync succeeds");

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "lab@example.org");
    let watermarks = harness.store.watermarks();
    assert_eq!(watermarks.last_validated, Some(t));
    assert_eq!(watermarks.last_released, Some(watermark()));
}

#[rstest]
#[tokio::test]
async fn validated_feed_without_recipients_holds_watermark(harness: Harness) {
    let mut dataset = released(6, "P1", minutes_after(1));
    dataset.latest_validation_update = Some(minutes_after(30));
    dataset.validation_status = ValidationFlag::from_code(1);
    harness
        .source
        .push(NotificationKind::Validated, Ok(vec![dataset]));
    let job = NotificationSyncJob::validated(harness.ports.clone(), Vec::new());

    let outcome = job.sync_once().await.expect("sync runs");

    assert_eq!(
        outcome,
        SyncOutcome::Processed {
            delivered: 0,
            advanced_to: None,
            complete: false,
        }
    );
    assert_eq!(harness.notifier.attempts(), 0);
    assert_eq!(harness.store.watermarks().last_validated, Some(watermark()));
}

#[rstest]
#[case(LimsError::missing_token(), ErrorCode::AuthFailure)]
#[case(LimsError::unavailable("503"), ErrorCode::UpstreamUnavailable)]
#[tokio::test]
async fn feed_errors_leave_watermark_untouched(
    harness: Harness,
    #[case] failure: LimsError,
    #[case] code: ErrorCode,
) {
    harness.source.push(NotificationKind::Released, Err(failure));
    let job = NotificationSyncJob::released(harness.ports.clone());

    let err = job.sync_once().await.expect_err("feed failure surfaces");

    assert_eq!(err.code(), code);
    assert_eq!(harness.store.watermarks().last_released, Some(watermark()));
}
