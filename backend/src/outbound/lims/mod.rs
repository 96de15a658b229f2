//! LIMS outbound adapters.
//!
//! Two reqwest clients share one base URL: [`LimsAuthClient`] issues tokens
//! for the token lifecycle manager, and [`LimsDatasetClient`] polls the
//! dataset change feeds with whatever bearer the manager currently holds.

mod auth_client;
mod dataset_client;
mod dto;
mod jwt;

pub use auth_client::LimsAuthClient;
pub use dataset_client::LimsDatasetClient;
