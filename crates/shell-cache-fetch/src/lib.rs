//! Shell Cache Network Boundary
//!
//! This crate provides the request/response types exchanged with the
//! network and the reqwest-backed client that performs real fetches.

pub mod client;
pub mod error;
pub mod types;

pub use client::{Fetcher, HttpFetcher, HttpFetcherConfig, VIA_PSEUDONYM, already_forwarded};
pub use error::FetchError;
pub use types::{FetchRequest, FetchResponse};
