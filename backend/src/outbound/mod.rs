//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL-backed repositories using Diesel ORM
//! - **lims**: reqwest clients for the LIMS token and dataset endpoints
//! - **directory**: reqwest client resolving project members
//! - **mail**: sendmail-backed notifier
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod directory;
mod http_support;
pub mod lims;
pub mod mail;
pub mod persistence;
