//! Behaviour tests for the staging request lifecycle.
//!
//! Scenarios drive the request lifecycle service and the contact ticker over
//! the in-memory store, with a controllable clock and a recording notifier.

#![expect(
    clippy::expect_used,
    reason = "test code uses expect for clear failure messages"
)]

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use staging_backend::domain::{
    ContactBroadcaster, ContactTickerJob, DatasetId, DownloadRequest, ErrorCode, FileTransfer,
    MessageSettings, MessageTemplates, NewDownloadRequest, ProjectId, RequestLifecyclePorts,
    RequestLifecycleService, RequestStatus, StagingConstants, StagingError, TransferType,
};
use staging_backend::test_support::{MemoryStore, MutableClock, RecordingNotifier, StaticDirectory};
use tokio::runtime::Runtime;

const EXPIRY_DAYS: i32 = 7;

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<MutableClock>,
    notifier: Arc<RecordingNotifier>,
    service: Arc<RequestLifecycleService>,
    ticker: ContactTickerJob,
}

struct StagingWorld {
    runtime: Runtime,
    members: RefCell<HashMap<String, Vec<String>>>,
    harness: OnceCell<Harness>,
    transfer_types: RefCell<HashMap<String, TransferType>>,
    last_error: RefCell<Option<StagingError>>,
    sent_before: RefCell<usize>,
    expiry_before: RefCell<Option<DateTime<Utc>>>,
}

fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 1, 8, 0, 0)
        .single()
        .expect("valid timestamp")
}

impl StagingWorld {
    fn new() -> Self {
        Self {
            runtime: Runtime::new().expect("create runtime"),
            members: RefCell::new(HashMap::new()),
            harness: OnceCell::new(),
            transfer_types: RefCell::new(HashMap::new()),
            last_error: RefCell::new(None),
            sent_before: RefCell::new(0),
            expiry_before: RefCell::new(None),
        }
    }

    /// Wire the services on first use so `Given` steps can shape the directory.
    fn harness(&self) -> &Harness {
        self.harness.get_or_init(|| {
            let store = Arc::new(MemoryStore::with_constants(StagingConstants {
                expiry_days: EXPIRY_DAYS,
                globus_project_size: 1_000_000,
                sftp_project_size: 1_000_000,
            }));
            let clock = Arc::new(MutableClock::new(origin()));
            let notifier = Arc::new(RecordingNotifier::default());
            let directory = self
                .members
                .borrow()
                .iter()
                .fold(StaticDirectory::default(), |directory, (project, addresses)| {
                    let addresses: Vec<&str> = addresses.iter().map(String::as_str).collect();
                    directory.with_project(project, &addresses)
                });
            let service = Arc::new(RequestLifecycleService::new(
                RequestLifecyclePorts {
                    requests: store.clone(),
                    contacts: store.clone(),
                },
                clock.clone(),
            ));
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
            let ticker = ContactTickerJob::new(service.clone(), broadcaster);
            Harness {
                store,
                clock,
                notifier,
                service,
                ticker,
            }
        })
    }

    fn only_request(&self) -> DownloadRequest {
        let requests = self.harness().store.requests();
        assert_eq!(requests.len(), 1, "exactly one request row expected");
        requests.into_iter().next().expect("one request")
    }

    fn transfer_type(&self, dataset: &str) -> TransferType {
        *self
            .transfer_types
            .borrow()
            .get(dataset)
            .expect("dataset was requested earlier in the scenario")
    }

    fn record_error(&self, result: Result<(), StagingError>) {
        *self.last_error.borrow_mut() = result.err();
    }
}

#[fixture]
fn world() -> StagingWorld {
    StagingWorld::new()
}

#[given("project {project} has members {first} and {second}")]
fn project_has_members(world: &StagingWorld, project: String, first: String, second: String) {
    world.members.borrow_mut().insert(project, vec![first, second]);
}

#[when("a {medium} request for dataset {dataset} with {count} files is created")]
fn a_request_is_created(world: &StagingWorld, medium: String, dataset: String, count: usize) {
    let transfer_type: TransferType = medium.parse().expect("known transfer type");
    world
        .transfer_types
        .borrow_mut()
        .insert(dataset.clone(), transfer_type);
    let files = (0..count)
        .map(|index| FileTransfer {
            source: format!("/lims/{dataset}/reads_{index}.fastq.gz"),
            destination: format!("/staging/{dataset}/reads_{index}.fastq.gz"),
        })
        .collect();
    let request = NewDownloadRequest {
        project_id: ProjectId::new("P100"),
        dataset_id: DatasetId::new(&dataset),
        transfer_type,
        requester: "ann".to_owned(),
        files,
    };
    let harness = world.harness();
    let result = world
        .runtime
        .block_on(harness.service.create_request(request))
        .map(drop);
    world.record_error(result);
}

#[when("the staging agent reports {status} for dataset {dataset}")]
fn the_staging_agent_reports(world: &StagingWorld, status: String, dataset: String) {
    let status: RequestStatus = status.parse().expect("known status");
    let transfer_type = world.transfer_type(&dataset);
    let harness = world.harness();
    world
        .runtime
        .block_on(
            harness
                .service
                .record_status(&DatasetId::new(&dataset), transfer_type, status),
        )
        .expect("status recorded");
}

#[when("the contact ticker runs")]
fn the_contact_ticker_runs(world: &StagingWorld) {
    let harness = world.harness();
    *world.sent_before.borrow_mut() = harness.notifier.sent().len();
    world.runtime.block_on(harness.ticker.tick());
}

#[when("{days} days pass and dataset {dataset} is extended")]
fn days_pass_and_dataset_is_extended(world: &StagingWorld, days: i64, dataset: String) {
    let harness = world.harness();
    *world.expiry_before.borrow_mut() = world.only_request().expiry_date;
    harness.clock.advance_seconds(days * 86_400);
    world
        .runtime
        .block_on(harness.service.extend_request(&DatasetId::new(&dataset)))
        .expect("extension succeeds");
}

#[when("dataset {dataset} is deleted")]
fn dataset_is_deleted(world: &StagingWorld, dataset: String) {
    let harness = world.harness();
    let outcome = world
        .runtime
        .block_on(harness.service.delete_request(&DatasetId::new(&dataset)))
        .expect("deletion succeeds");
    assert_eq!(outcome.active_downloads, 0);
}

#[then("the request status is {status}")]
fn the_request_status_is(world: &StagingWorld, status: String) {
    assert_eq!(world.only_request().status.as_str(), status);
}

#[then("{count} file rows are stored for dataset {dataset}")]
fn file_rows_are_stored(world: &StagingWorld, count: usize, dataset: String) {
    let stored = world
        .harness()
        .store
        .files()
        .into_iter()
        .filter(|file| file.dataset_id.as_str() == dataset)
        .count();
    assert_eq!(stored, count);
}

#[then("{address} receives exactly {count} ready email")]
fn receives_ready_emails(world: &StagingWorld, address: String, count: usize) {
    let ready = world
        .harness()
        .notifier
        .sent_to(&address)
        .into_iter()
        .filter(|email| email.subject.ends_with("is ready"))
        .count();
    assert_eq!(ready, count);
}

#[then("{address} receives exactly {count} failure email")]
fn receives_failure_emails(world: &StagingWorld, address: String, count: usize) {
    let failed = world
        .harness()
        .notifier
        .sent_to(&address)
        .into_iter()
        .filter(|email| email.subject.ends_with("failed to be staged"))
        .count();
    assert_eq!(failed, count);
}

#[then("the request carries a notification date")]
fn the_request_carries_a_notification_date(world: &StagingWorld) {
    assert_eq!(world.only_request().notification_date, Some(origin()));
}

#[then("no further emails are sent")]
fn no_further_emails_are_sent(world: &StagingWorld) {
    assert_eq!(world.harness().notifier.sent().len(), *world.sent_before.borrow());
}

#[then("the expiry date moved forward by {days} days")]
fn the_expiry_date_moved_forward(world: &StagingWorld, days: i64) {
    let before = world.expiry_before.borrow().expect("expiry stamped on success");
    let after = world.only_request().expiry_date.expect("expiry still set");
    assert_eq!(after - before, Duration::days(days));
}

#[then("the request is flagged for deletion with status {status}")]
fn the_request_is_flagged_for_deletion(world: &StagingWorld, status: String) {
    let request = world.only_request();
    assert!(request.should_delete);
    assert_eq!(request.status.as_str(), status);
}

#[then("the last call fails with a conflict")]
fn the_last_call_fails_with_a_conflict(world: &StagingWorld) {
    let error = world.last_error.borrow_mut().take().expect("last call failed");
    assert_eq!(error.code(), ErrorCode::Conflict);
}

#[then("extending dataset {dataset} fails with not found")]
fn extending_fails_with_not_found(world: &StagingWorld, dataset: String) {
    let harness = world.harness();
    let error = world
        .runtime
        .block_on(harness.service.extend_request(&DatasetId::new(&dataset)))
        .expect_err("nothing to extend");
    assert_eq!(error.code(), ErrorCode::NotFound);
}

#[scenario(
    path = "tests/features/staging_lifecycle.feature",
    name = "A Globus request is staged, announced, extended, and deleted"
)]
fn globus_request_full_lifecycle(world: StagingWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/staging_lifecycle.feature",
    name = "A second live request for the same medium is refused"
)]
fn second_live_request_is_refused(world: StagingWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/staging_lifecycle.feature",
    name = "A failed staging is announced as a failure"
)]
fn failed_staging_is_announced(world: StagingWorld) {
    drop(world);
}
