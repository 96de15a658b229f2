//! Background orchestration for dataset staging.
//!
//! The crate keeps an authenticated LIMS session alive, owns the lifecycle of
//! staging requests and their credential contacts, and drives the periodic
//! notification loops that tell project members when data becomes available.
//! HTTP routing and UI concerns live elsewhere; they call into
//! [`domain::RequestLifecycleService`] and read its outputs.

pub mod config;
pub mod domain;
pub mod outbound;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::AppSettings;
