//! User directory outbound adapter.
//!
//! Resolves a project's member addresses through the identity portal's
//! `projectUsers` endpoint.

mod dto;
mod http_client;

pub use http_client::DirectoryHttpClient;
