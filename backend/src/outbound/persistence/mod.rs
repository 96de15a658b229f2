//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Concrete implementations of the staging repository ports, backed by
//! PostgreSQL via `diesel-async` with `bb8` pooling.
//!
//! # Architecture
//!
//! - **Thin adapters**: repositories translate between Diesel rows and
//!   domain types. Status rules live in the domain services.
//! - **Constraints in SQL**: live-request uniqueness, file and contact
//!   upserts, and monotonic watermarks are enforced by the schema and by
//!   single conditional statements.
//! - **Internal models**: `models.rs` and `schema.rs` never leave this
//!   module.
//!
//! # Example
//!
//! ```ignore
//! use staging_backend::outbound::persistence::{DbPool, DieselContactRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/staging")).await?;
//! let contacts = DieselContactRepository::new(pool);
//! ```

mod diesel_basic_error_mapping;
mod diesel_contact_repository;
mod diesel_download_request_repository;
mod diesel_notification_watermark_repository;
mod models;
mod pool;
mod schema;

pub use diesel_contact_repository::DieselContactRepository;
pub use diesel_download_request_repository::DieselDownloadRequestRepository;
pub use diesel_notification_watermark_repository::DieselNotificationWatermarkRepository;
pub use pool::{DbPool, PoolConfig, PoolError};
