//! Domain primitives, services, and background workers.
//!
//! Purpose: hold the staging model (requests, files, contacts, watermarks)
//! together with the services that mutate it and the periodic jobs that
//! drive notifications. Adapters in `outbound` implement the traits under
//! [`ports`]; nothing here talks to the network or the database directly.
//!
//! Public surface:
//! - [`StagingError`] and [`ErrorCode`]: the error envelope returned by every
//!   service operation.
//! - [`RequestLifecycleService`]: request, contact, and constants operations.
//! - [`TokenLifecycleManager`]: keeps a LIMS bearer token available.
//! - [`ContactBroadcaster`]: renders and fans out emails.
//! - [`NotificationSyncJob`] and [`ContactTickerJob`]: periodic jobs run by
//!   [`scheduling::PeriodicTask`].

pub mod auth_token;
pub mod broadcaster;
pub mod contact;
pub mod contact_ticker;
pub mod download;
pub mod error;
pub mod notification;
pub mod notification_sync;
pub mod ports;
pub mod request_lifecycle;
pub mod scheduling;
pub mod token_lifecycle;

pub use self::auth_token::{AccessToken, RefreshToken, TokenPair};
pub use self::broadcaster::{
    BroadcastReport, ContactBroadcaster, Message, MessageSettings, MessageTemplates,
    RecipientGroup,
};
pub use self::contact::{Contact, ContactStatus, ContactType, Credential};
pub use self::contact_ticker::{ContactTickerJob, TickSummary};
pub use self::download::{
    DatasetId, DownloadFile, DownloadRequest, FileTransfer, NewDownloadRequest, ProjectId,
    RequestId, RequestStatus, StagingConstants, StatusNotice, StatusUpdate, TransferType,
    UnknownLabel,
};
pub use self::error::{ErrorCode, StagingError, StagingResult};
pub use self::notification::{
    DatasetComment, LimsDataset, NotificationKind, NotificationWatermarks, ValidationFlag,
};
pub use self::notification_sync::{NotificationSyncJob, NotificationSyncPorts, SyncOutcome};
pub use self::request_lifecycle::{
    CreatedRequest, DeletionOutcome, DownloadActivityRegistry, RequestLifecyclePorts,
    RequestLifecycleService,
};
pub use self::token_lifecycle::{TokenLifecycleConfig, TokenLifecycleManager};
